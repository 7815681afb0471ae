/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Stamping votes and the per-height accumulation set the certificate builder collects them in.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::{BlockHeight, SignatureBytes, VoterIndex};

/// A single committee member's attestation to the header at `height`.
///
/// The signature is opaque to this crate; see
/// [`VoteOracle`](crate::oracles::VoteOracle).
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct StampingVote {
    pub height: BlockHeight,
    pub voter: VoterIndex,
    pub signature: SignatureBytes,
}

impl Display for StampingVote {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.height, self.voter)
    }
}

/// The informational "peer already has this vote" record, gossiped so that peers can avoid
/// re-sending votes to each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct HasSCVoteData {
    pub height: BlockHeight,
    pub voter: VoterIndex,
}

impl From<&StampingVote> for HasSCVoteData {
    fn from(vote: &StampingVote) -> Self {
        HasSCVoteData {
            height: vote.height,
            voter: vote.voter,
        }
    }
}

/// Votes collected for a single height while a stamping certificate is being built.
///
/// Keyed by voter index, so re-adding a voter's vote is a no-op.
#[derive(Clone, Debug, Default)]
pub struct StampingVotes {
    votes: BTreeMap<VoterIndex, StampingVote>,
}

impl StampingVotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `vote` to the set. Returns whether the vote was not present before.
    pub fn add_vote(&mut self, vote: StampingVote) -> bool {
        self.votes.insert(vote.voter, vote).is_none()
    }

    pub fn contains(&self, voter: VoterIndex) -> bool {
        self.votes.contains_key(&voter)
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Iterate over the collected votes in ascending voter-index order.
    pub fn iter(&self) -> impl Iterator<Item = &StampingVote> {
        self.votes.values()
    }

    /// The collected votes as a contiguous slice-friendly `Vec`, in ascending voter-index order.
    pub fn to_vec(&self) -> Vec<StampingVote> {
        self.votes.values().copied().collect()
    }
}
