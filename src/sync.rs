/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The breadcrumb walk: reconstructing a chain from a remote's sparse stamping certificates
//! plus selective headers.
//!
//! ## The walk
//!
//! Starting from the local `candidate` watermark, the engine repeatedly asks the remote for
//! the next stamping-certificate-anchored stretch, verifies it in full **outside** the chain
//! lock, applies it atomically, and advances to the stretch's anchor. One round trip covers
//! one anchor-to-anchor stretch, so a chain of length `n` with certificates roughly every `B`
//! heights syncs in `O(n / B)` round trips. After the last anchor, the remaining headers up to
//! the remote's tip are pulled in bulk.
//!
//! ## Sources
//!
//! The walk runs against anything implementing [`SyncSource`]: a [`Chain`] directly (used by
//! the tests to sync two in-process chains) or a [`Peer`](crate::peer::Peer), whose
//! implementation turns each call into a request/response round trip.
//!
//! ## Failure
//!
//! A verification mismatch aborts the walk with [`SyncError::Verify`]; the remote is faulty
//! and the caller may retry against a different peer. A transport failure mid-walk is
//! retryable: the next attempt resumes from the last applied anchor, because that is where the
//! local `candidate` watermark now sits.

use std::cmp::min;
use std::time::SystemTime;

use log;

use crate::chain::{Chain, ChainError};
use crate::events::{EndSyncEvent, Event, StartSyncEvent};
use crate::messages::MAX_HEADERS_PER_RESPONSE;
use crate::networking::TransportError;
use crate::types::chain_types::{Breadcrumb, Header, SCStatus};
use crate::types::data_types::BlockHeight;

/// A remote chain the breadcrumb walk can read from.
pub trait SyncSource {
    /// The remote's current watermarks.
    fn sc_status(&self) -> Result<SCStatus, SyncError>;

    /// The remote's next stamping-certificate-anchored stretch above `from`.
    fn next_breadcrumb(&self, from: BlockHeight) -> Result<Option<Breadcrumb>, SyncError>;

    /// The remote's headers in `[begin, end]`, ascending.
    fn headers(&self, begin: BlockHeight, end: BlockHeight) -> Result<Vec<Header>, SyncError>;
}

impl SyncSource for Chain {
    fn sc_status(&self) -> Result<SCStatus, SyncError> {
        Ok(self.status())
    }

    fn next_breadcrumb(&self, from: BlockHeight) -> Result<Option<Breadcrumb>, SyncError> {
        Ok(Chain::next_breadcrumb(self, from))
    }

    fn headers(&self, begin: BlockHeight, end: BlockHeight) -> Result<Vec<Header>, SyncError> {
        let end = min(end, begin + (MAX_HEADERS_PER_RESPONSE - 1));
        Ok(Chain::headers(self, begin, end))
    }
}

pub(crate) fn sync_chain(local: &Chain, remote: &dyn SyncSource) -> Result<(), SyncError> {
    let remote_status = remote.sc_status()?;
    let start_status = local.status();

    local.publish_event(Event::StartSync(StartSyncEvent {
        timestamp: SystemTime::now(),
        local: start_status,
        remote: remote_status,
    }));

    let mut cur = start_status.candidate;
    while cur < remote_status.candidate {
        let bc = remote
            .next_breadcrumb(cur)?
            .ok_or(SyncVerifyError::MissingBreadcrumb { from: cur })?;
        verify_breadcrumb(local, cur, &bc)?;
        local.apply_breadcrumb(&bc)?;
        cur = bc.tail_sc.height;
        log::trace!("sync applied breadcrumb, anchor {}", cur);
    }

    // Pull the unstamped tail above the last anchor.
    let mut begin = local.status().height + 1;
    while begin <= remote_status.height {
        let end = min(remote_status.height, begin + (MAX_HEADERS_PER_RESPONSE - 1));
        let headers = remote.headers(begin, end)?;
        if headers.is_empty() {
            return Err(SyncVerifyError::EmptyHeaderRange { begin, end }.into());
        }
        local.extend_headers(&headers)?;
        begin = local.status().height + 1;
    }

    let status = local.status();
    local.publish_event(Event::EndSync(EndSyncEvent {
        timestamp: SystemTime::now(),
        status,
        heights_synced: status.height - start_status.height,
    }));
    Ok(())
}

/// Check a breadcrumb received for walk position `from` against the local chain, without
/// touching any chain state.
fn verify_breadcrumb(local: &Chain, from: BlockHeight, bc: &Breadcrumb) -> Result<(), SyncError> {
    let sc = &bc.tail_sc;
    let b = local.stamping_horizon();

    if sc.height <= from {
        return Err(SyncVerifyError::StaleAnchor {
            from,
            anchor: sc.height,
        }
        .into());
    }
    if sc.proof_height.int() == 0 || sc.proof_height + b != sc.height {
        return Err(SyncVerifyError::ProofHeightMismatch {
            height: sc.height,
            proof_height: sc.proof_height,
        }
        .into());
    }
    if bc.tail_header.height != sc.height {
        return Err(SyncVerifyError::BrokenHeaderChain {
            height: bc.tail_header.height,
        }
        .into());
    }

    // The stretch must chain parent-to-child from the header we already hold at `from` up to
    // the anchor.
    let mut prev = local
        .header(from)
        .ok_or(SyncVerifyError::MissingLocalAnchor { height: from })?;
    for header in bc.body_headers.iter().chain(Some(&bc.tail_header)) {
        if header.height != prev.height + 1 || header.parent_hash != prev.hash {
            return Err(SyncVerifyError::BrokenHeaderChain {
                height: header.height,
            }
            .into());
        }
        prev = *header;
    }

    // The certificate's proof pins one header of the stretch, or one we already hold when the
    // anchors sit closer together than one horizon.
    let proof_header = if sc.proof_height > from {
        bc.body_headers
            .iter()
            .find(|header| header.height == sc.proof_height)
            .copied()
            .ok_or(SyncVerifyError::MissingProofHeader {
                proof_height: sc.proof_height,
            })?
    } else {
        local
            .header(sc.proof_height)
            .ok_or(SyncVerifyError::MissingProofHeader {
                proof_height: sc.proof_height,
            })?
    };
    if proof_header.hash != sc.proof_hash {
        return Err(SyncVerifyError::ProofHashMismatch {
            proof_height: sc.proof_height,
        }
        .into());
    }

    Ok(())
}

/// Error when syncing against a remote.
#[derive(Debug)]
pub enum SyncError {
    /// The remote sent something inconsistent; it is considered faulty and the sync is not
    /// retryable against it.
    Verify(SyncVerifyError),
    /// The connection failed mid-walk; retryable from the last applied anchor.
    Transport(TransportError),
    /// A verified stretch was rejected by the local chain.
    Chain(ChainError),
    /// The remote did not answer within the response timeout.
    Timeout,
    /// No peer is available to sync against.
    NoPeer,
}

/// The specific inconsistency that failed breadcrumb verification.
#[derive(Debug)]
pub enum SyncVerifyError {
    MissingBreadcrumb {
        from: BlockHeight,
    },
    StaleAnchor {
        from: BlockHeight,
        anchor: BlockHeight,
    },
    ProofHeightMismatch {
        height: BlockHeight,
        proof_height: BlockHeight,
    },
    BrokenHeaderChain {
        height: BlockHeight,
    },
    MissingProofHeader {
        proof_height: BlockHeight,
    },
    ProofHashMismatch {
        proof_height: BlockHeight,
    },
    MissingLocalAnchor {
        height: BlockHeight,
    },
    EmptyHeaderRange {
        begin: BlockHeight,
        end: BlockHeight,
    },
}

impl From<SyncVerifyError> for SyncError {
    fn from(value: SyncVerifyError) -> Self {
        SyncError::Verify(value)
    }
}

impl From<TransportError> for SyncError {
    fn from(value: TransportError) -> Self {
        SyncError::Transport(value)
    }
}

impl From<ChainError> for SyncError {
    fn from(value: ChainError) -> Self {
        SyncError::Chain(value)
    }
}
