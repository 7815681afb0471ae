/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these
//! messages printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two
//! values are always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as
//!    constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. Hashes and public keys are
//! printed as the first seven characters of their Base64 encoding.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use log;
use std::time::SystemTime;

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const INSERT_HEADER: &str = "InsertHeader";
pub const INSERT_STAMPING_CERTIFICATE: &str = "InsertStampingCertificate";
pub const UPDATE_SC_STATUS: &str = "UpdateSCStatus";
pub const PRUNE_FINAL_CERTIFICATES: &str = "PruneFinalCertificates";

pub const START_SYNC: &str = "StartSync";
pub const END_SYNC: &str = "EndSync";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for InsertHeaderEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |insert_header_event: &InsertHeaderEvent| {
            log::info!(
                "{}, {}, {}, {}",
                INSERT_HEADER,
                secs_since_unix_epoch(insert_header_event.timestamp),
                first_seven_base64_chars(&insert_header_event.header.hash.bytes()),
                insert_header_event.header.height
            )
        };
        Box::new(logger)
    }
}

impl Logger for InsertStampingCertificateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |insert_sc_event: &InsertStampingCertificateEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                INSERT_STAMPING_CERTIFICATE,
                secs_since_unix_epoch(insert_sc_event.timestamp),
                insert_sc_event.stamping_certificate.height,
                insert_sc_event.stamping_certificate.proof_height,
                first_seven_base64_chars(&insert_sc_event.stamping_certificate.proof_hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateSCStatusEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_status_event: &UpdateSCStatusEvent| {
            log::info!(
                "{}, {}, {}",
                UPDATE_SC_STATUS,
                secs_since_unix_epoch(update_status_event.timestamp),
                update_status_event.status
            )
        };
        Box::new(logger)
    }
}

impl Logger for PruneFinalCertificatesEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |prune_event: &PruneFinalCertificatesEvent| {
            log::info!(
                "{}, {}, {}, {}",
                PRUNE_FINAL_CERTIFICATES,
                secs_since_unix_epoch(prune_event.timestamp),
                prune_event.fz,
                prune_event.pruned
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_sync_event: &StartSyncEvent| {
            log::info!(
                "{}, {}, {}, {}",
                START_SYNC,
                secs_since_unix_epoch(start_sync_event.timestamp),
                start_sync_event.local,
                start_sync_event.remote
            )
        };
        Box::new(logger)
    }
}

impl Logger for EndSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |end_sync_event: &EndSyncEvent| {
            log::info!(
                "{}, {}, {}, {}",
                END_SYNC,
                secs_since_unix_epoch(end_sync_event.timestamp),
                end_sync_event.status,
                end_sync_event.heights_synced
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the
// first 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Event occured before the Unix Epoch.")
        .as_secs()
}
