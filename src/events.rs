/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Notifications that are emitted when significant things happen in the local chain.
//!
//! ## Event enum
//!
//! Significant occurrences include inserting a header, installing a stamping certificate,
//! advancing the watermarks, pruning final certificates behind the frozen tip, and the start
//! and end of a sync run. Each corresponds to a variant of the [event enum](Event), whose
//! variant tuple contains an inner struct carrying a timestamp and a summary of the
//! occurrence.
//!
//! ## Registering event handlers
//!
//! Library users can register event handler closures, which are called by the
//! [event bus](crate::event_bus::start_event_bus) thread when the handler's particular event
//! variant happens. Default handlers that log out events can be enabled when constructing the
//! [`EventHandlers`](crate::event_bus::EventHandlers).
//!
//! ## Timing
//!
//! Events are always emitted **after** the corresponding occurrence is completed, outside the
//! chain's write lock.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::types::chain_types::{Header, SCStatus, StampingCertificate};
use crate::types::data_types::BlockHeight;

/// Enumerates all events defined for this crate.
pub enum Event {
    // Events that change chain state.
    InsertHeader(InsertHeaderEvent),
    InsertStampingCertificate(InsertStampingCertificateEvent),
    UpdateSCStatus(UpdateSCStatusEvent),
    PruneFinalCertificates(PruneFinalCertificatesEvent),

    // Sync events.
    StartSync(StartSyncEvent),
    EndSync(EndSyncEvent),
}

impl Event {
    /// Publishes this event on the event publisher channel (if the channel is defined).
    pub fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(self);
        }
    }
}

/// A new header was accepted into the chain.
pub struct InsertHeaderEvent {
    pub timestamp: SystemTime,
    pub header: Header,
}

/// A stamping certificate was accepted into the chain.
pub struct InsertStampingCertificateEvent {
    pub timestamp: SystemTime,
    pub stamping_certificate: StampingCertificate,
}

/// One or more chain watermarks advanced. Carries the full new [`SCStatus`].
pub struct UpdateSCStatusEvent {
    pub timestamp: SystemTime,
    pub status: SCStatus,
}

/// The frozen tip advanced, and the final certificates at or below it were discarded.
pub struct PruneFinalCertificatesEvent {
    pub timestamp: SystemTime,
    pub fz: BlockHeight,
    pub pruned: u64,
}

/// A sync run against a remote chain began.
pub struct StartSyncEvent {
    pub timestamp: SystemTime,
    pub local: SCStatus,
    pub remote: SCStatus,
}

/// A sync run completed successfully.
pub struct EndSyncEvent {
    pub timestamp: SystemTime,
    pub status: SCStatus,
    pub heights_synced: u64,
}
