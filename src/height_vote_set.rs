/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Per-peer bookkeeping of which stamping votes the peer is known to hold.
//!
//! Each connected peer gets one [`HeightVoteSet`]. Before gossiping a vote to the peer, the
//! set is consulted so that votes the peer already has (because it sent them to us, or because
//! it announced them via a has-vote message, or because we sent them earlier) are never
//! re-transmitted. The window of tracked heights is bounded below by the peer's `candidate`
//! watermark: once the peer's candidate advances, votes at or below it are uninteresting and
//! their state is dropped via [`remove`](HeightVoteSet::remove).

use std::collections::BTreeMap;

use rand::Rng;

use crate::types::data_types::{BlockHeight, VoterIndex};
use crate::types::vote_types::{HasSCVoteData, StampingVote};

/// Bitmap over the committee's voter-index space. Grows on demand.
#[derive(Clone, Debug, Default)]
struct VoterBitmap {
    words: Vec<u64>,
}

impl VoterBitmap {
    fn set(&mut self, index: VoterIndex) {
        let word = index.int() as usize / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (index.int() % 64);
    }

    fn get(&self, index: VoterIndex) -> bool {
        let word = index.int() as usize / 64;
        self.words
            .get(word)
            .is_some_and(|bits| bits & (1u64 << (index.int() % 64)) != 0)
    }
}

/// Maps heights to the bitmap of voters whose stamping votes the peer is known to hold.
#[derive(Clone, Debug, Default)]
pub struct HeightVoteSet {
    votes: BTreeMap<BlockHeight, VoterBitmap>,
}

impl HeightVoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the peer holds the vote described by `data`. Idempotent.
    pub fn set_has_vote(&mut self, data: &HasSCVoteData) {
        self.votes.entry(data.height).or_default().set(data.voter);
    }

    /// Returns whether the peer is known to hold `vote`.
    pub fn has_vote(&self, vote: &StampingVote) -> bool {
        self.votes
            .get(&vote.height)
            .is_some_and(|bitmap| bitmap.get(vote.voter))
    }

    /// Drop all state for heights in `[begin, end]`.
    pub fn remove(&mut self, begin: BlockHeight, end: BlockHeight) {
        self.votes.retain(|height, _| *height < begin || *height > end);
    }

    /// Out of `votes`, pick one the peer is not known to hold: the lowest height wins, and
    /// the voter within that height is chosen uniformly at random. Returns `None` when the
    /// peer already holds every vote in the slice.
    pub fn random_not_in(&self, votes: &[StampingVote]) -> Option<StampingVote> {
        let mut candidates: Vec<&StampingVote> = Vec::new();
        for vote in votes {
            if self.has_vote(vote) {
                continue;
            }
            let best_height = candidates.first().map(|best| best.height);
            match best_height {
                None => candidates.push(vote),
                Some(best) if vote.height < best => {
                    candidates.clear();
                    candidates.push(vote);
                }
                Some(best) if vote.height == best => candidates.push(vote),
                Some(_) => {}
            }
        }

        if candidates.is_empty() {
            return None;
        }
        let pick = rand::thread_rng().gen_range(0..candidates.len());
        Some(*candidates[pick])
    }
}
