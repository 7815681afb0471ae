/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for the pluggable committee collaborators.
//!
//! Cryptographic verification of individual votes and the supermajority-threshold decision
//! both live outside this crate, behind these two seams. Library users provide
//! implementations backed by their committee/sortition machinery; the tests use permissive
//! stand-ins.

use crate::types::chain_types::StampingCertificate;
use crate::types::vote_types::StampingVote;

/// Verifies the committee signature of a single stamping vote.
pub trait VoteOracle: Send + Sync {
    /// Returns whether `vote` carries a valid signature from the committee member it names.
    fn verify(&self, vote: &StampingVote) -> bool;
}

/// Decides whether a set of collected votes reaches the committee threshold.
pub trait CommitteeOracle: Send + Sync {
    /// Returns whether `votes` constitute a supermajority attestation for `sc`, i.e. whether
    /// `sc` may be installed into the chain.
    fn is_stamping_certificate(&self, sc: &StampingCertificate, votes: &[StampingVote]) -> bool;
}
