//! A "mock" (totally local) transport for passing frames between two in-process peers.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;

use stampchain::messages::Frame;
use stampchain::networking::{MsgReadWriter, TransportError};

/// One end of an in-memory connection. Frames written into one end come out of the other, in
/// order.
pub(crate) struct ChannelTransport {
    outbound: Sender<Frame>,
    inbound: Mutex<Receiver<Frame>>,
}

/// Create a connected pair of transports.
pub(crate) fn transport_pair() -> (ChannelTransport, ChannelTransport) {
    let (left_tx, right_rx) = mpsc::channel();
    let (right_tx, left_rx) = mpsc::channel();
    (
        ChannelTransport {
            outbound: left_tx,
            inbound: Mutex::new(left_rx),
        },
        ChannelTransport {
            outbound: right_tx,
            inbound: Mutex::new(right_rx),
        },
    )
}

impl MsgReadWriter for ChannelTransport {
    fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.outbound.send(frame).map_err(|_| TransportError::Closed)
    }

    fn recv(&self, timeout: Duration) -> Result<Frame, TransportError> {
        match self.inbound.lock().unwrap().recv_timeout(timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }
}
