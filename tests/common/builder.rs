//! Chain builders: a block-generator thread feeding a probabilistic stamping producer through
//! a channel, the way the production data flow runs.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::Rng;
use rand_core::OsRng;

use stampchain::{
    BlockHeight, Chain, ChainConfig, FinalCertificate, Header, SignatureBytes,
    StampingCertificate, StampingVote, VoterIndex,
};
use stampchain::genesis_header;

/// Build a chain of `max_height` blocks where each height above the stamping horizon receives
/// a stamping certificate with probability `probability` percent.
pub(crate) fn build_chain(config: ChainConfig, max_height: u64, probability: u32) -> Arc<Chain> {
    let chain = Arc::new(Chain::new(config, None));
    let b = chain.stamping_horizon();

    let (height_tx, height_rx) = mpsc::channel();
    let generator = {
        let chain = Arc::clone(&chain);
        thread::spawn(move || {
            let mut parent = genesis_header();
            for height in 1..=max_height {
                let height = BlockHeight::new(height);
                let header = Header::new(height, &parent);
                let fc = FinalCertificate::new(height, &parent);
                chain.add_block(&header, &fc).unwrap();
                parent = header;
                height_tx.send(height).unwrap();
            }
        })
    };

    let mut rng = rand::thread_rng();
    for height in height_rx {
        if height.int() <= b {
            continue;
        }
        if rng.gen_range(0..100) < probability {
            let proof_header = chain.header(height - b).unwrap();
            chain
                .add_stamping_certificate(StampingCertificate::new(height, &proof_header))
                .unwrap();
        }
    }
    generator.join().unwrap();
    chain
}

/// Headers `1..=count` built off genesis, without touching a chain.
pub(crate) fn make_headers(count: u64) -> Vec<Header> {
    let mut headers = Vec::with_capacity(count as usize);
    let mut parent = genesis_header();
    for height in 1..=count {
        let header = Header::new(BlockHeight::new(height), &parent);
        headers.push(header);
        parent = header;
    }
    headers
}

pub(crate) fn make_vote(height: u64, voter: u32) -> StampingVote {
    StampingVote {
        height: BlockHeight::new(height),
        voter: VoterIndex::new(voter),
        signature: SignatureBytes::new([0; 64]),
    }
}

pub(crate) fn random_verifying_key() -> VerifyingKey {
    SigningKey::generate(&mut OsRng).verifying_key()
}

/// Assert the invariants that must hold after every chain mutation.
///
/// `expect_final_certificates` is false for chains populated through sync, whose headers
/// arrive anchored by stamping certificates instead of per-block final certificates.
pub(crate) fn check_invariants(chain: &Chain, expect_final_certificates: bool) {
    let status = chain.status();
    let b = chain.stamping_horizon();

    assert!(status.fz <= status.proof);
    assert!(status.proof <= status.candidate);
    assert!(status.candidate <= status.height);
    if status.candidate.int() > 0 {
        assert_eq!(status.proof + b, status.candidate);
    }

    // Parent linkage over the whole chain.
    let mut parent = chain.header(BlockHeight::new(0)).unwrap();
    for height in 1..=status.height.int() {
        let header = chain.header(BlockHeight::new(height)).unwrap();
        assert_eq!(header.parent_hash, parent.hash, "broken link at {}", height);
        parent = header;
    }

    for height in 0..=status.height.int() {
        let height = BlockHeight::new(height);
        if let Some(sc) = chain.stamping_certificate(height) {
            assert!(sc.height <= status.candidate);
            let proof_header = chain.header(sc.proof_height).unwrap();
            assert_eq!(proof_header.hash, sc.proof_hash);
        }
        if chain.final_certificate(height).is_some() {
            assert!(height > status.fz, "unpruned final certificate at {}", height);
        }
    }

    if expect_final_certificates {
        // Above the frozen tip, every unstamped height keeps its final certificate so that
        // the gap stays provable.
        for height in status.fz.int() + 1..=status.proof.int() {
            let height = BlockHeight::new(height);
            assert!(
                chain.stamping_certificate(height).is_some()
                    || chain.final_certificate(height).is_some(),
                "unprovable gap at {}",
                height
            );
        }
    }
}
