/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Ties the chain, the peer set, and the oracles together: connection admission, frame
//! dispatch, vote accumulation, certificate assembly, and gossip.
//!
//! ## Threads
//!
//! The service spawns one receive loop per peer (plus the peer's own broadcaster), and
//! optionally one gossip ticker for the whole set. Peer-fatal conditions (transport failure,
//! undecodable or oversized frames) unregister and close that peer only; they never touch
//! chain state.
//!
//! ## Vote flow
//!
//! An incoming stamping vote is verified by the [`VoteOracle`], recorded as held by its
//! origin, accumulated into the per-height building set, and announced to the other peers as
//! a has-vote notice. When the [`CommitteeOracle`] judges the collected votes a supermajority,
//! the assembled certificate is installed into the chain and the new status is pushed to every
//! peer. The gossip ticker separately offers each peer one vote it is still missing, so votes
//! spread even to peers that never saw the original sender.

use std::cmp::min;
use std::collections::BTreeMap;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ed25519_dalek::VerifyingKey;

use crate::chain::Chain;
use crate::config::Config;
use crate::messages::{
    BreadcrumbResponse, Frame, HeadersResponse, Message, MessageError, MAX_HEADERS_PER_RESPONSE,
};
use crate::networking::{MsgReadWriter, TransportError};
use crate::oracles::{CommitteeOracle, VoteOracle};
use crate::peer::{HandshakeError, Peer, SyncResponse};
use crate::peer_set::{PeerSet, PeerSetError};
use crate::sync::SyncError;
use crate::types::chain_types::{genesis_header, SCStatus, StampingCertificate};
use crate::types::data_types::{BlockHeight, CryptoHash};
use crate::types::vote_types::{HasSCVoteData, StampingVote, StampingVotes};

/// How long the receive loop blocks on the transport before re-checking the close flag.
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct StampingService<T: MsgReadWriter + 'static> {
    config: Config,
    genesis: CryptoHash,
    chain: Arc<Chain>,
    peers: Arc<PeerSet<T>>,
    building_votes: Mutex<BTreeMap<BlockHeight, StampingVotes>>,
    vote_oracle: Arc<dyn VoteOracle>,
    committee_oracle: Arc<dyn CommitteeOracle>,
}

impl<T: MsgReadWriter + 'static> StampingService<T> {
    pub fn new(
        config: Config,
        chain: Arc<Chain>,
        vote_oracle: Arc<dyn VoteOracle>,
        committee_oracle: Arc<dyn CommitteeOracle>,
    ) -> Arc<StampingService<T>> {
        Arc::new(StampingService {
            config,
            genesis: genesis_header().hash,
            chain,
            peers: Arc::new(PeerSet::new()),
            building_votes: Mutex::new(BTreeMap::new()),
            vote_oracle,
            committee_oracle,
        })
    }

    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    pub fn peers(&self) -> &Arc<PeerSet<T>> {
        &self.peers
    }

    /// Admit a fresh connection: handshake, register, and start the peer's broadcaster and
    /// receive loop.
    pub fn handle_peer(
        self: &Arc<Self>,
        id: VerifyingKey,
        rw: T,
    ) -> Result<Arc<Peer<T>>, RegisterError> {
        let peer = Arc::new(Peer::new(id, rw, &self.config.protocol));
        peer.handshake(
            self.config.protocol.network_id,
            self.genesis,
            self.chain.status(),
        )?;
        self.peers.register(Arc::clone(&peer))?;
        let _ = peer.start_broadcaster();

        let service = Arc::clone(self);
        let receive_peer = Arc::clone(&peer);
        let _ = thread::spawn(move || service.receive_loop(receive_peer));

        Ok(peer)
    }

    fn receive_loop(&self, peer: Arc<Peer<T>>) {
        loop {
            if peer.is_closed() {
                break;
            }
            match peer.recv(RECV_POLL_INTERVAL) {
                Ok(frame) => {
                    if let Err(err) = self.dispatch(&peer, frame) {
                        log::warn!(
                            "peer {}: protocol violation: {:?}, disconnecting",
                            peer.short_id(),
                            err
                        );
                        break;
                    }
                }
                Err(TransportError::Timeout) => {}
                Err(TransportError::Closed) => break,
            }
        }
        let _ = self.peers.unregister(&peer.id());
        peer.close();
    }

    fn dispatch(&self, peer: &Arc<Peer<T>>, frame: Frame) -> Result<(), MessageError> {
        match frame.decode()? {
            Message::Handshake(_) => {
                log::warn!("peer {}: extra handshake message", peer.short_id());
            }
            Message::StampingVote(vote) => self.handle_stamping_vote(peer, vote),
            Message::StampingStatus(status) => {
                peer.update_status(status);
            }
            Message::HasSCVote(data) => peer.set_has_vote(&data),
            Message::GetBreadcrumb(request) => {
                let breadcrumb = self.chain.next_breadcrumb(request.from);
                peer.send_msg_async(Message::Breadcrumb(BreadcrumbResponse { breadcrumb }));
            }
            Message::Breadcrumb(response) => {
                peer.deliver_sync_response(SyncResponse::Breadcrumb(response.breadcrumb));
            }
            Message::GetHeaders(request) => {
                let end = min(request.end, request.begin + (MAX_HEADERS_PER_RESPONSE - 1));
                let headers = self.chain.headers(request.begin, end);
                peer.send_msg_async(Message::Headers(HeadersResponse { headers }));
            }
            Message::Headers(response) => {
                peer.deliver_sync_response(SyncResponse::Headers(response.headers));
            }
        }
        Ok(())
    }

    fn handle_stamping_vote(&self, peer: &Arc<Peer<T>>, vote: StampingVote) {
        if !self.vote_oracle.verify(&vote) {
            log::warn!(
                "peer {}: invalid stamping vote {}, dropping",
                peer.short_id(),
                vote
            );
            return;
        }
        let status = self.chain.status();
        if vote.height <= status.candidate {
            log::trace!("stale stamping vote {}, candidate {}", vote, status.candidate);
            return;
        }

        peer.set_has_vote(&HasSCVoteData::from(&vote));
        let fresh = self
            .building_votes
            .lock()
            .unwrap()
            .entry(vote.height)
            .or_default()
            .add_vote(vote);
        if !fresh {
            return;
        }

        let origin = peer.id();
        self.peers.for_each(|other| {
            if other.id() != origin {
                other.send_msg_async(Message::HasSCVote(HasSCVoteData::from(&vote)));
            }
        });
        self.try_assemble(vote.height);
    }

    /// Inject a locally-produced stamping vote. The gossip ticker spreads it to peers.
    pub fn submit_stamping_vote(&self, vote: StampingVote) {
        if !self.vote_oracle.verify(&vote) {
            log::warn!("invalid local stamping vote {}, dropping", vote);
            return;
        }
        if vote.height <= self.chain.status().candidate {
            return;
        }
        let fresh = self
            .building_votes
            .lock()
            .unwrap()
            .entry(vote.height)
            .or_default()
            .add_vote(vote);
        if fresh {
            self.try_assemble(vote.height);
        }
    }

    fn try_assemble(&self, height: BlockHeight) {
        let b = self.chain.stamping_horizon();
        if height.int() <= b || self.chain.header(height).is_none() {
            return;
        }
        let proof_header = match self.chain.header(height - b) {
            Some(header) => header,
            None => return,
        };
        let votes = match self.building_votes.lock().unwrap().get(&height) {
            Some(votes) => votes.to_vec(),
            None => return,
        };

        let sc = StampingCertificate::new(height, &proof_header);
        if !self.committee_oracle.is_stamping_certificate(&sc, &votes) {
            return;
        }

        match self.chain.add_stamping_certificate(sc) {
            Ok(()) => {
                let status = self.chain.status();
                self.building_votes
                    .lock()
                    .unwrap()
                    .retain(|height, _| *height > status.candidate);
                self.broadcast_status(status);
            }
            Err(err) => {
                log::warn!("stamping certificate at {} rejected: {:?}", height, err);
            }
        }
    }

    /// Push `status` to every connected peer.
    pub fn broadcast_status(&self, status: SCStatus) {
        self.peers.for_each(|peer| {
            peer.send_msg_async(Message::StampingStatus(status));
        });
    }

    /// One gossip round: offer each peer a vote it is still missing, lowest height first.
    pub fn gossip(&self) {
        let building: Vec<StampingVotes> = self
            .building_votes
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect();
        if building.is_empty() {
            return;
        }
        self.peers.for_each(|peer| {
            for votes in &building {
                if peer.pick_building_and_send(votes).is_ok() {
                    break;
                }
            }
        });
    }

    /// Start the gossip ticker thread, which runs a [gossip round](Self::gossip) every
    /// configured interval until the shutdown signal arrives.
    pub fn start_gossip(self: &Arc<Self>, shutdown_signal: Receiver<()>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let interval = service.config.protocol.gossip_interval;
        thread::spawn(move || loop {
            match shutdown_signal.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => {}
            }
            service.gossip();
            thread::sleep(interval);
        })
    }

    /// Reconstruct the local chain from the best-advanced peer.
    pub fn sync(&self) -> Result<(), SyncError> {
        let best = self.peers.best_peer().ok_or(SyncError::NoPeer)?;
        self.chain.sync(best.as_ref())
    }

    /// Disconnect every peer and refuse further registrations.
    pub fn close(&self) {
        self.peers.close();
    }
}

/// Error when admitting a fresh connection.
#[derive(Debug)]
pub enum RegisterError {
    Handshake(HandshakeError),
    PeerSet(PeerSetError),
}

impl From<HandshakeError> for RegisterError {
    fn from(value: HandshakeError) -> Self {
        RegisterError::Handshake(value)
    }
}

impl From<PeerSetError> for RegisterError {
    fn from(value: PeerSetError) -> Self {
        RegisterError::PeerSet(value)
    }
}
