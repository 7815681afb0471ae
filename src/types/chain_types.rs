/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Value records stored in the [chain](crate::chain::Chain) and carried on the wire: headers,
//! the two kinds of finality certificate, the watermark summary, and the breadcrumb.
//!
//! ## Headers and certificates
//!
//! A [`Header`] is the consensus-final skeleton of a block: height, parent linkage, and a
//! content hash standing in for the fields (state root, seed, ...) that this crate does not
//! interpret. A [`FinalCertificate`] accompanies a header out of block production and asserts
//! single-step finality. A [`StampingCertificate`] is produced sparsely, roughly once every
//! stamping horizon, and retroactively pins the header one horizon below its own height.
//!
//! ## Breadcrumbs
//!
//! A [`Breadcrumb`] is the unit of sync transfer: the stretch of headers between two
//! consecutive stamping-certificate anchors, together with the certificate that seals the
//! stretch. A fresh peer replays a remote chain as a sequence of breadcrumbs instead of a
//! header-by-header download.

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};

use super::data_types::{BlockHeight, CryptoHash};

/// The header of a consensus-final block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Header {
    pub height: BlockHeight,
    pub parent_hash: CryptoHash,
    pub hash: CryptoHash,
}

impl Header {
    /// Create the header at `height` extending `parent`.
    pub fn new(height: BlockHeight, parent: &Header) -> Header {
        let hash = Header::compute_hash(height, &parent.hash);
        Header {
            height,
            parent_hash: parent.hash,
            hash,
        }
    }

    fn compute_hash(height: BlockHeight, parent_hash: &CryptoHash) -> CryptoHash {
        let mut hasher = Sha256::new();
        hasher.update(height.to_le_bytes());
        hasher.update(parent_hash.bytes());
        CryptoHash::new(hasher.finalize().into())
    }
}

/// The well-known genesis header: height 0, parent of itself, never transmitted, never pruned.
pub fn genesis_header() -> Header {
    let mut hasher = Sha256::new();
    hasher.update(b"stampchain.genesis");
    let hash = CryptoHash::new(hasher.finalize().into());
    Header {
        height: BlockHeight::new(0),
        parent_hash: hash,
        hash,
    }
}

/// Asserts that the block at `height` with parent `parent_hash` is consensus-final.
///
/// One `FinalCertificate` exists per height or none: headers obtained through sync arrive
/// without one, anchored by a stamping certificate instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct FinalCertificate {
    pub height: BlockHeight,
    pub parent_hash: CryptoHash,
}

impl FinalCertificate {
    /// Create the final certificate for the block at `height` extending `parent`.
    pub fn new(height: BlockHeight, parent: &Header) -> FinalCertificate {
        FinalCertificate {
            height,
            parent_hash: parent.hash,
        }
    }
}

/// Asserts that a supermajority of the committee has attested to the header at `height`,
/// thereby retroactively stamping `proof_height = height - B`.
///
/// Signature-equivalent material is not carried here; the threshold decision is delegated to
/// the [`CommitteeOracle`](crate::oracles::CommitteeOracle), which sees the supporting
/// [stamping votes](super::vote_types::StampingVote) alongside the certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct StampingCertificate {
    pub height: BlockHeight,
    pub proof_height: BlockHeight,
    pub proof_hash: CryptoHash,
}

impl StampingCertificate {
    /// Create the stamping certificate at `height` whose proof pins `proof_header`.
    pub fn new(height: BlockHeight, proof_header: &Header) -> StampingCertificate {
        StampingCertificate {
            height,
            proof_height: proof_header.height,
            proof_hash: proof_header.hash,
        }
    }
}

/// The four chain watermarks, each monotonically non-decreasing.
///
/// Ordering invariant: `fz <= proof <= candidate <= height`, and
/// `proof + B == candidate` whenever `candidate > 0`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SCStatus {
    /// Heights at or below `fz` are irrevocably final; their final certificates are pruned.
    pub fz: BlockHeight,
    /// The last fully-stamped height.
    pub proof: BlockHeight,
    /// The height of the highest accepted stamping certificate.
    pub candidate: BlockHeight,
    /// The height of the highest accepted header.
    pub height: BlockHeight,
}

impl Display for SCStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.fz, self.proof, self.candidate, self.height
        )
    }
}

/// One stamping-certificate-anchored stretch of the chain, the unit of sync transfer.
///
/// For a walk position `from`, `tail_sc` is the next stamping certificate above `from` and
/// `tail_header` the header at its height; `body_headers` carries the headers strictly between
/// `from` and the anchor, in ascending order (empty when successive anchors are adjacent). The
/// certificate's proof header travels inside `body_headers` whenever its height is above
/// `from`; otherwise the requester already holds it.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Breadcrumb {
    pub tail_header: Header,
    pub tail_sc: StampingCertificate,
    pub body_headers: Vec<Header>,
}
