//! Permissive oracle stand-ins: signature verification and the committee threshold are
//! external concerns, so the tests replace them with trivial rules.

use stampchain::oracles::{CommitteeOracle, VoteOracle};
use stampchain::StampingCertificate;
use stampchain::StampingVote;

/// Accepts every vote signature.
pub(crate) struct AcceptAllVotes;

impl VoteOracle for AcceptAllVotes {
    fn verify(&self, _vote: &StampingVote) -> bool {
        true
    }
}

/// Declares a stamping certificate valid once a fixed number of votes is collected.
pub(crate) struct FixedThresholdCommittee {
    pub(crate) threshold: usize,
}

impl CommitteeOracle for FixedThresholdCommittee {
    fn is_stamping_certificate(&self, _sc: &StampingCertificate, votes: &[StampingVote]) -> bool {
        votes.len() >= self.threshold
    }
}
