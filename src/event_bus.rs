/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Thread that receives events emitted by the [chain](crate::chain::Chain) and the
//! [sync engine](crate::sync) and passes them to event handlers.
//!
//! When the thread receives a message containing an [event](crate::events::Event), it triggers
//! the execution of all handlers defined for the contained event type, where the handlers for
//! each event type are stored in [`EventHandlers`].
//!
//! ## Event Handlers
//!
//! An instance of `EventHandlers` contains, per event type:
//! 1. An optional user-defined handler, and
//! 2. If logging is enabled, the default logging handler defined in
//!    [logging](crate::logging).

use std::{
    sync::mpsc::{Receiver, TryRecvError},
    thread,
    thread::JoinHandle,
};

use crate::{events::*, logging::Logger};

/// Pointer to a handler closure, parametrised by the argument (for our use case, event) type.
pub type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// Stores the two optional handlers enabled for an event type: one logging handler, defined in
/// [`logging`](crate::logging), and one user-defined handler.
pub(crate) struct HandlerPair<T: Logger> {
    pub(crate) user_defined_handler: Option<HandlerPtr<T>>,
    pub(crate) logging_handler: Option<HandlerPtr<T>>,
}

impl<T: Logger> HandlerPair<T> {
    // Checks if no event handlers are defined for this event.
    pub(crate) fn is_empty(&self) -> bool {
        self.user_defined_handler.is_none() && self.logging_handler.is_none()
    }

    /// Creates a new `HandlerPair` with the user-defined handler, and the default logging
    /// handler if logging is enabled.
    pub(crate) fn new(log: bool, user_defined_handler: Option<HandlerPtr<T>>) -> HandlerPair<T> {
        HandlerPair {
            user_defined_handler,
            logging_handler: if log { Some(T::get_logger()) } else { None },
        }
    }

    fn fire(&self, event: &T) {
        self.user_defined_handler
            .iter()
            .for_each(|handler| handler(event));
        self.logging_handler
            .iter()
            .for_each(|handler| handler(event));
    }
}

/// Stores the `HandlerPair` of user-defined and optional logging handlers for each pre-defined
/// event type from [events](crate::events).
pub struct EventHandlers {
    pub(crate) insert_header_handlers: HandlerPair<InsertHeaderEvent>,
    pub(crate) insert_stamping_certificate_handlers: HandlerPair<InsertStampingCertificateEvent>,
    pub(crate) update_sc_status_handlers: HandlerPair<UpdateSCStatusEvent>,
    pub(crate) prune_final_certificates_handlers: HandlerPair<PruneFinalCertificatesEvent>,

    pub(crate) start_sync_handlers: HandlerPair<StartSyncEvent>,
    pub(crate) end_sync_handlers: HandlerPair<EndSyncEvent>,
}

impl EventHandlers {
    /// Creates the [handler pairs](HandlerPair) for all pre-defined event types from
    /// [events](crate::events) given the user-defined handlers, and information on whether
    /// logging is enabled.
    pub fn new(
        log: bool,
        insert_header_handler: Option<HandlerPtr<InsertHeaderEvent>>,
        insert_stamping_certificate_handler: Option<HandlerPtr<InsertStampingCertificateEvent>>,
        update_sc_status_handler: Option<HandlerPtr<UpdateSCStatusEvent>>,
        prune_final_certificates_handler: Option<HandlerPtr<PruneFinalCertificatesEvent>>,
        start_sync_handler: Option<HandlerPtr<StartSyncEvent>>,
        end_sync_handler: Option<HandlerPtr<EndSyncEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            insert_header_handlers: HandlerPair::new(log, insert_header_handler),
            insert_stamping_certificate_handlers: HandlerPair::new(
                log,
                insert_stamping_certificate_handler,
            ),
            update_sc_status_handlers: HandlerPair::new(log, update_sc_status_handler),
            prune_final_certificates_handlers: HandlerPair::new(
                log,
                prune_final_certificates_handler,
            ),
            start_sync_handlers: HandlerPair::new(log, start_sync_handler),
            end_sync_handlers: HandlerPair::new(log, end_sync_handler),
        }
    }

    /// Checks if no handlers are defined, i.e., neither user-defined handlers were defined nor
    /// logging is enabled.
    pub fn is_empty(&self) -> bool {
        self.insert_header_handlers.is_empty()
            && self.insert_stamping_certificate_handlers.is_empty()
            && self.update_sc_status_handlers.is_empty()
            && self.prune_final_certificates_handlers.is_empty()
            && self.start_sync_handlers.is_empty()
            && self.end_sync_handlers.is_empty()
    }

    /// Triggers the execution of each of the two handlers - the user-defined and the logging
    /// handler, if defined - for a given event type from [events](crate::events).
    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::InsertHeader(insert_header_event) => {
                self.insert_header_handlers.fire(&insert_header_event)
            }
            Event::InsertStampingCertificate(insert_sc_event) => self
                .insert_stamping_certificate_handlers
                .fire(&insert_sc_event),
            Event::UpdateSCStatus(update_sc_status_event) => self
                .update_sc_status_handlers
                .fire(&update_sc_status_event),
            Event::PruneFinalCertificates(prune_event) => {
                self.prune_final_certificates_handlers.fire(&prune_event)
            }
            Event::StartSync(start_sync_event) => self.start_sync_handlers.fire(&start_sync_event),
            Event::EndSync(end_sync_event) => self.end_sync_handlers.fire(&end_sync_event),
        }
    }
}

/// Starts the event bus thread, which runs an infinite loop until a shutdown signal is
/// received from the parent thread. In each iteration of the loop, the thread checks if it
/// received any event notifications, and if so, then triggers the execution of the handlers
/// defined for the event.
pub fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("event_bus thread disconnected from main thread")
            }
        }

        match event_subscriber.try_recv() {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(TryRecvError::Empty) => thread::yield_now(),
            Err(TryRecvError::Disconnected) => return,
        }
    })
}
