//! Tests for the peer layer: handshakes, vote send suppression, per-peer vote bookkeeping,
//! queue overflow, and the service wiring two nodes together.

mod common;

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::LevelFilter;

use common::builder::{build_chain, make_headers, make_vote, random_verifying_key};
use common::logging::setup_logger;
use common::oracles::{AcceptAllVotes, FixedThresholdCommittee};
use common::transport::{transport_pair, ChannelTransport};
use stampchain::event_bus::{start_event_bus, EventHandlers};
use stampchain::genesis_header;
use stampchain::height_vote_set::HeightVoteSet;
use stampchain::messages::STAMPING_VOTE_MSG;
use stampchain::networking::{MsgReadWriter, TransportError};
use stampchain::peer::{HandshakeError, Peer, PeerError};
use stampchain::service::StampingService;
use stampchain::{
    BlockHeight, Chain, ChainConfig, Config, CryptoHash, FinalCertificate, HasSCVoteData,
    ProtocolConfig, SCStatus,
};

fn test_config() -> Config {
    Config {
        chain: ChainConfig {
            stamping_horizon: 20,
        },
        protocol: ProtocolConfig {
            handshake_timeout: Duration::from_secs(5),
            sync_response_timeout: Duration::from_secs(5),
            ..ProtocolConfig::default()
        },
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(25));
    }
    panic!("condition not reached within {:?}", timeout);
}

fn peer_pair(config: &ProtocolConfig) -> (Peer<ChannelTransport>, Peer<ChannelTransport>) {
    let (left, right) = transport_pair();
    (
        Peer::new(random_verifying_key(), left, config),
        Peer::new(random_verifying_key(), right, config),
    )
}

#[test]
fn handshake_exchanges_status() {
    setup_logger(LevelFilter::Debug);

    let config = test_config().protocol;
    let (left, right) = peer_pair(&config);
    let genesis = genesis_header().hash;

    let left_status = SCStatus {
        fz: BlockHeight::new(5),
        proof: BlockHeight::new(10),
        candidate: BlockHeight::new(30),
        height: BlockHeight::new(42),
    };
    let network_id = config.network_id;
    let handle = thread::spawn(move || left.handshake(network_id, genesis, left_status));
    right
        .handshake(config.network_id, genesis, SCStatus::default())
        .unwrap();
    handle.join().unwrap().unwrap();

    assert_eq!(right.chain_status(), left_status);
}

#[test]
fn handshake_genesis_mismatch_fails_both_sides() {
    let config = test_config().protocol;
    let (left, right) = peer_pair(&config);

    let genesis_left = genesis_header().hash;
    let genesis_right = CryptoHash::new([7; 32]);

    let network_id = config.network_id;
    let started = Instant::now();
    let handle =
        thread::spawn(move || left.handshake(network_id, genesis_left, SCStatus::default()));
    let right_err = right
        .handshake(config.network_id, genesis_right, SCStatus::default())
        .unwrap_err();
    let left_err = handle.join().unwrap().unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(right_err, HandshakeError::GenesisMismatch { .. }));
    assert!(matches!(left_err, HandshakeError::GenesisMismatch { .. }));
}

#[test]
fn handshake_version_mismatch_fails() {
    let config = test_config().protocol;
    let newer = ProtocolConfig {
        version: config.version + 1,
        ..config.clone()
    };
    let (left_rw, right_rw) = transport_pair();
    let left = Peer::new(random_verifying_key(), left_rw, &config);
    let right = Peer::new(random_verifying_key(), right_rw, &newer);
    let genesis = genesis_header().hash;

    let network_id = config.network_id;
    let handle = thread::spawn(move || left.handshake(network_id, genesis, SCStatus::default()));
    let right_err = right
        .handshake(config.network_id, genesis, SCStatus::default())
        .unwrap_err();
    let left_err = handle.join().unwrap().unwrap_err();

    assert!(matches!(
        right_err,
        HandshakeError::ProtocolVersionMismatch { .. }
    ));
    assert!(matches!(
        left_err,
        HandshakeError::ProtocolVersionMismatch { .. }
    ));
}

#[test]
fn duplicate_vote_suppressed() {
    let config = test_config().protocol;
    let (left, right) = transport_pair();
    let peer = Peer::new(random_verifying_key(), left, &config);

    let vote = make_vote(25, 3);
    peer.send_stamping_vote(&vote).unwrap();
    let err = peer.send_stamping_vote(&vote).unwrap_err();
    assert!(matches!(err, PeerError::Redundant { .. }));

    // Exactly one frame crossed the wire.
    let frame = right.recv(Duration::from_millis(200)).unwrap();
    assert_eq!(frame.code, STAMPING_VOTE_MSG);
    assert!(matches!(
        right.recv(Duration::from_millis(200)),
        Err(TransportError::Timeout)
    ));
}

#[test]
fn low_votes_rejected_and_bookkeeping_pruned() {
    let config = test_config().protocol;
    let (left, _right) = transport_pair();
    let peer = Peer::new(random_verifying_key(), left, &config);

    // The peer announced votes at heights 8 and 12.
    peer.set_has_vote(&HasSCVoteData::from(&make_vote(8, 0)));
    peer.set_has_vote(&HasSCVoteData::from(&make_vote(12, 0)));

    // Its status then advances to candidate 10: tracking at or below 10 is dropped.
    let advanced = peer.update_status(SCStatus {
        fz: BlockHeight::new(0),
        proof: BlockHeight::new(0),
        candidate: BlockHeight::new(10),
        height: BlockHeight::new(30),
    });
    assert_eq!(advanced, Some((BlockHeight::new(0), BlockHeight::new(10))));

    let err = peer.send_stamping_vote(&make_vote(8, 0)).unwrap_err();
    assert!(matches!(err, PeerError::TooLow { .. }));

    let err = peer.send_stamping_vote(&make_vote(12, 0)).unwrap_err();
    assert!(matches!(err, PeerError::Redundant { .. }));

    peer.send_stamping_vote(&make_vote(15, 0)).unwrap();
}

#[test]
fn regressing_status_ignored() {
    let config = test_config().protocol;
    let (left, _right) = transport_pair();
    let peer = Peer::new(random_verifying_key(), left, &config);

    let status = SCStatus {
        fz: BlockHeight::new(0),
        proof: BlockHeight::new(0),
        candidate: BlockHeight::new(10),
        height: BlockHeight::new(30),
    };
    assert!(peer.update_status(status).is_some());

    let regressed = SCStatus {
        candidate: BlockHeight::new(5),
        ..status
    };
    assert!(peer.update_status(regressed).is_none());
    assert_eq!(peer.chain_status(), status);
}

#[test]
fn height_vote_set_prefers_lowest_missing_height() {
    let mut counter = HeightVoteSet::new();
    let votes = [
        make_vote(30, 0),
        make_vote(25, 1),
        make_vote(25, 2),
        make_vote(40, 3),
    ];

    // Nothing known yet: one of the two height-25 votes must win.
    let picked = counter.random_not_in(&votes).unwrap();
    assert_eq!(picked.height, BlockHeight::new(25));

    counter.set_has_vote(&HasSCVoteData::from(&votes[1]));
    counter.set_has_vote(&HasSCVoteData::from(&votes[2]));
    let picked = counter.random_not_in(&votes).unwrap();
    assert_eq!(picked.height, BlockHeight::new(30));

    counter.set_has_vote(&HasSCVoteData::from(&votes[0]));
    counter.set_has_vote(&HasSCVoteData::from(&votes[3]));
    assert!(counter.random_not_in(&votes).is_none());
}

#[test]
fn height_vote_set_window_removal() {
    let mut counter = HeightVoteSet::new();
    for height in 1..=20 {
        counter.set_has_vote(&HasSCVoteData::from(&make_vote(height, 0)));
    }

    counter.remove(BlockHeight::new(5), BlockHeight::new(10));
    for height in 1..=20 {
        let expected = !(5..=10).contains(&height);
        assert_eq!(counter.has_vote(&make_vote(height, 0)), expected);
    }
}

#[test]
fn full_message_queue_drops_newest() {
    let config = ProtocolConfig {
        msg_queue_size: 2,
        ..test_config().protocol
    };
    let (left, right) = transport_pair();
    let peer = Arc::new(Peer::new(random_verifying_key(), left, &config));

    // Three enqueues against a capacity of two: the newest is dropped with a warning.
    for _ in 0..3 {
        peer.send_msg_async(stampchain::messages::Message::StampingStatus(
            SCStatus::default(),
        ));
    }
    let _ = peer.start_broadcaster();

    assert!(right.recv(Duration::from_millis(500)).is_ok());
    assert!(right.recv(Duration::from_millis(500)).is_ok());
    assert!(matches!(
        right.recv(Duration::from_millis(300)),
        Err(TransportError::Timeout)
    ));

    peer.close();
}

/// A node for service tests: a chain grown to `height`, wrapped in a service with a
/// permissive vote oracle and a fixed committee threshold.
fn make_node(
    height: u64,
    threshold: usize,
    event_publisher: Option<mpsc::Sender<stampchain::events::Event>>,
) -> Arc<StampingService<ChannelTransport>> {
    let config = test_config();
    let chain = Arc::new(Chain::new(config.chain, event_publisher));
    let mut parent = genesis_header();
    for header in make_headers(height) {
        let fc = FinalCertificate::new(header.height, &parent);
        chain.add_block(&header, &fc).unwrap();
        parent = header;
    }
    StampingService::new(
        config,
        chain,
        Arc::new(AcceptAllVotes),
        Arc::new(FixedThresholdCommittee { threshold }),
    )
}

fn connect(
    a: &Arc<StampingService<ChannelTransport>>,
    b: &Arc<StampingService<ChannelTransport>>,
) -> (
    Arc<Peer<ChannelTransport>>,
    Arc<Peer<ChannelTransport>>,
) {
    let (left, right) = transport_pair();
    let id_a = random_verifying_key();
    let id_b = random_verifying_key();

    let b_clone = Arc::clone(b);
    let handle = thread::spawn(move || b_clone.handle_peer(id_a, right).unwrap());
    let peer_on_a = a.handle_peer(id_b, left).unwrap();
    let peer_on_b = handle.join().unwrap();
    (peer_on_a, peer_on_b)
}

#[test]
fn vote_gossip_assembles_certificate() {
    setup_logger(LevelFilter::Debug);

    let (event_tx, event_rx) = mpsc::channel();
    let node_a = make_node(30, 1, None);
    let node_b = make_node(30, 1, Some(event_tx));

    // Forward node B's status updates through the event bus into a channel the test polls.
    let (status_tx, status_rx) = mpsc::channel();
    let handlers = EventHandlers::new(
        true,
        None,
        None,
        Some(Box::new(move |event| {
            let _ = status_tx.send(event.status);
        })),
        None,
        None,
        None,
    );
    let (bus_shutdown_tx, bus_shutdown_rx) = mpsc::channel();
    let _ = start_event_bus(handlers, event_rx, bus_shutdown_rx);

    let (peer_on_a, _peer_on_b) = connect(&node_a, &node_b);

    // A vote for height 25 reaches node B, whose single-vote committee threshold immediately
    // assembles the certificate.
    peer_on_a.send_stamping_vote(&make_vote(25, 0)).unwrap();

    wait_until(Duration::from_secs(5), || {
        node_b
            .chain()
            .stamping_certificate(BlockHeight::new(25))
            .is_some()
    });
    assert_eq!(node_b.chain().status().candidate, BlockHeight::new(25));
    assert_eq!(node_b.chain().status().proof, BlockHeight::new(5));

    // Node B broadcast its new status: node A's handle for B catches up.
    wait_until(Duration::from_secs(5), || {
        peer_on_a.chain_status().candidate == BlockHeight::new(25)
    });

    // And the status advance surfaced through the event bus.
    wait_until(Duration::from_secs(5), || {
        status_rx
            .try_recv()
            .map(|status: SCStatus| status.candidate == BlockHeight::new(25))
            .unwrap_or(false)
    });

    let _ = bus_shutdown_tx.send(());
    node_a.close();
    node_b.close();
}

#[test]
fn service_syncs_through_peer() {
    setup_logger(LevelFilter::Debug);

    let config = test_config();
    let chain_a = build_chain(config.chain, 300, 40);
    let node_a: Arc<StampingService<ChannelTransport>> = StampingService::new(
        config.clone(),
        Arc::clone(&chain_a),
        Arc::new(AcceptAllVotes),
        Arc::new(FixedThresholdCommittee { threshold: 1 }),
    );
    let node_b = make_node(0, 1, None);

    connect(&node_a, &node_b);
    node_b.sync().unwrap();

    assert_eq!(node_b.chain().status(), chain_a.status());
    for height in 0..=chain_a.status().height.int() {
        let height = BlockHeight::new(height);
        assert_eq!(node_b.chain().header(height), chain_a.header(height));
        assert_eq!(
            node_b.chain().stamping_certificate(height),
            chain_a.stamping_certificate(height)
        );
    }

    node_a.close();
    node_b.close();
}

#[test]
fn gossip_round_offers_missing_votes() {
    // Node A's committee threshold is out of reach, so the vote stays in its building set and
    // spreads only through the gossip ticker; node B assembles at one vote.
    let node_a = make_node(30, 2, None);
    let node_b = make_node(30, 1, None);
    let (_peer_on_a, _peer_on_b) = connect(&node_a, &node_b);

    let (gossip_shutdown_tx, gossip_shutdown_rx) = mpsc::channel();
    let _ = node_a.start_gossip(gossip_shutdown_rx);

    // A locally-produced vote spreads to node B through the gossip ticker, where it reaches
    // the committee threshold.
    node_a.submit_stamping_vote(make_vote(25, 4));
    wait_until(Duration::from_secs(5), || {
        node_b
            .chain()
            .stamping_certificate(BlockHeight::new(25))
            .is_some()
    });

    let _ = gossip_shutdown_tx.send(());
    node_a.close();
    node_b.close();
}
