//! Tests for the breadcrumb walk: convergence against quiescent remotes, idempotence,
//! coverage of the synced range, and abort-on-tamper.

mod common;

use std::sync::Mutex;

use log::LevelFilter;

use common::builder::{build_chain, check_invariants, make_headers};
use common::logging::setup_logger;
use stampchain::genesis_header;
use stampchain::networking::TransportError;
use stampchain::sync::{SyncError, SyncSource};
use stampchain::{BlockHeight, Breadcrumb, Chain, ChainConfig, FinalCertificate, Header, SCStatus};

fn test_config() -> ChainConfig {
    ChainConfig {
        stamping_horizon: 20,
    }
}

fn assert_same_chain(local: &Chain, remote: &Chain) {
    assert_eq!(local.status(), remote.status());
    for height in 0..=remote.status().height.int() {
        let height = BlockHeight::new(height);
        assert_eq!(local.header(height), remote.header(height));
        assert_eq!(
            local.stamping_certificate(height),
            remote.stamping_certificate(height)
        );
    }
}

#[test]
fn sync_empty_to_ten_thousand() {
    setup_logger(LevelFilter::Info);

    let remote = build_chain(test_config(), 10_000, 30);
    remote.print();

    let local = Chain::new(test_config(), None);
    local.sync(remote.as_ref()).unwrap();
    local.print();

    assert_same_chain(&local, &remote);
    check_invariants(&local, false);
}

#[test]
fn sync_is_idempotent() {
    let remote = build_chain(test_config(), 1_000, 30);

    let local = Chain::new(test_config(), None);
    local.sync(remote.as_ref()).unwrap();
    let after_first = local.status();

    local.sync(remote.as_ref()).unwrap();
    assert_eq!(local.status(), after_first);
    assert_same_chain(&local, &remote);
}

#[test]
fn sync_from_lagging_chain() {
    let remote = build_chain(test_config(), 500, 40);

    // The local chain produced the same first 100 blocks itself, with final certificates but
    // no stamping certificates.
    let local = Chain::new(test_config(), None);
    let mut parent = genesis_header();
    for header in make_headers(100) {
        let fc = FinalCertificate::new(header.height, &parent);
        local.add_block(&header, &fc).unwrap();
        parent = header;
    }

    local.sync(remote.as_ref()).unwrap();
    assert_same_chain(&local, &remote);
}

#[test]
fn breadcrumb_walk_covers_synced_range() {
    let remote = build_chain(test_config(), 500, 30);
    let status = remote.status();

    let mut cur = status.fz;
    let mut expected = status.fz + 1;
    while cur < status.candidate {
        let bc = remote.next_breadcrumb(cur).unwrap();
        for header in bc.body_headers.iter().chain(Some(&bc.tail_header)) {
            assert_eq!(header.height, expected, "gap or overlap in breadcrumbs");
            assert_eq!(*header, remote.header(expected).unwrap());
            expected += 1;
        }
        cur = bc.tail_sc.height;
    }
    assert_eq!(cur, status.candidate);
    assert_eq!(expected, status.candidate + 1);
}

/// A remote that corrupts the proof hash of every breadcrumb it serves.
struct TamperingRemote<'a> {
    inner: &'a Chain,
}

impl SyncSource for TamperingRemote<'_> {
    fn sc_status(&self) -> Result<SCStatus, SyncError> {
        SyncSource::sc_status(self.inner)
    }

    fn next_breadcrumb(&self, from: BlockHeight) -> Result<Option<Breadcrumb>, SyncError> {
        let mut bc = SyncSource::next_breadcrumb(self.inner, from)?;
        if let Some(bc) = bc.as_mut() {
            bc.tail_sc.proof_hash = genesis_header().hash;
        }
        Ok(bc)
    }

    fn headers(&self, begin: BlockHeight, end: BlockHeight) -> Result<Vec<Header>, SyncError> {
        SyncSource::headers(self.inner, begin, end)
    }
}

#[test]
fn sync_aborts_on_tampered_breadcrumb() {
    let remote = build_chain(test_config(), 200, 50);
    let local = Chain::new(test_config(), None);

    let err = local
        .sync(&TamperingRemote { inner: &remote })
        .unwrap_err();
    assert!(matches!(err, SyncError::Verify(_)));
    assert_eq!(local.status(), SCStatus::default());
}

/// A remote whose connection drops after a fixed number of breadcrumb requests.
struct FlakyRemote<'a> {
    inner: &'a Chain,
    remaining: Mutex<u32>,
}

impl SyncSource for FlakyRemote<'_> {
    fn sc_status(&self) -> Result<SCStatus, SyncError> {
        SyncSource::sc_status(self.inner)
    }

    fn next_breadcrumb(&self, from: BlockHeight) -> Result<Option<Breadcrumb>, SyncError> {
        let mut remaining = self.remaining.lock().unwrap();
        if *remaining == 0 {
            return Err(SyncError::Transport(TransportError::Closed));
        }
        *remaining -= 1;
        SyncSource::next_breadcrumb(self.inner, from)
    }

    fn headers(&self, begin: BlockHeight, end: BlockHeight) -> Result<Vec<Header>, SyncError> {
        SyncSource::headers(self.inner, begin, end)
    }
}

#[test]
fn sync_resumes_after_transport_failure() {
    let remote = build_chain(test_config(), 300, 50);
    let local = Chain::new(test_config(), None);

    let flaky = FlakyRemote {
        inner: &remote,
        remaining: Mutex::new(3),
    };
    let err = local.sync(&flaky).unwrap_err();
    assert!(matches!(err, SyncError::Transport(_)));

    // Partial progress was kept, and the retry picks up from the last applied anchor.
    let partial = local.status();
    assert!(partial.candidate > BlockHeight::new(0));

    local.sync(remote.as_ref()).unwrap();
    assert_same_chain(&local, &remote);
    check_invariants(&local, false);
}
