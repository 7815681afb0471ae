/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait for pluggable peer-to-peer transports.
//!
//! Main trait: [`MsgReadWriter`].

use std::time::Duration;

use crate::messages::Frame;

/// A reliable, ordered, framed byte channel to a single peer.
///
/// One instance exists per connection. Implementations must be usable from multiple threads:
/// the per-peer broadcaster thread and vote senders write concurrently, while the receive loop
/// reads.
pub trait MsgReadWriter: Send + Sync {
    /// Send a frame to the peer.
    fn send(&self, frame: Frame) -> Result<(), TransportError>;

    /// Receive the next frame from the peer, waiting at most `timeout`.
    fn recv(&self, timeout: Duration) -> Result<Frame, TransportError>;
}

/// Error when sending or receiving on a transport.
#[derive(Debug)]
pub enum TransportError {
    /// The connection is gone; no further frames will move in either direction.
    Closed,
    /// No frame arrived within the allotted time.
    Timeout,
}
