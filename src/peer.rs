/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The per-peer state machine: handshake, stamping-vote exchange, status exchange, and the
//! outbound message queues.
//!
//! ## Lifecycle
//!
//! A fresh connection [handshakes](Peer::handshake) within an overall deadline, both
//! directions concurrently. Mismatched network id, genesis, or protocol version surface as
//! typed [`HandshakeError`]s and the connection is abandoned. After a successful handshake the
//! peer is registered with the [`PeerSet`](crate::peer_set::PeerSet) and its
//! [broadcaster](Peer::start_broadcaster) starts; [`close`](Peer::close) makes every loop
//! holding the peer exit promptly.
//!
//! ## Vote bookkeeping
//!
//! Each peer carries a [`HeightVoteSet`] recording which stamping votes the peer is known to
//! hold, so gossip never re-sends a vote. [`send_stamping_vote`](Peer::send_stamping_vote)
//! holds the peer's write lock across the transport send, keeping "send" and "mark as sent"
//! atomic with respect to concurrent senders.
//!
//! ## Queues
//!
//! Outbound traffic flows through two bounded queues, one for generic messages and one for
//! stamping votes, drained by the broadcaster thread. A send to a full queue is dropped with a
//! warning; vote gossip is redundant enough that a lost message is recovered by a later round.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ed25519_dalek::VerifyingKey;

use crate::config::ProtocolConfig;
use crate::height_vote_set::HeightVoteSet;
use crate::logging::first_seven_base64_chars;
use crate::messages::{
    code_name, Frame, GetBreadcrumbRequest, GetHeadersRequest, HandshakeData, Message,
    MessageError, HANDSHAKE_MSG,
};
use crate::networking::{MsgReadWriter, TransportError};
use crate::sync::{SyncError, SyncSource};
use crate::types::chain_types::{Breadcrumb, Header, SCStatus};
use crate::types::data_types::{BlockHeight, CryptoHash, NetworkId, VoterIndex};
use crate::types::vote_types::{HasSCVoteData, StampingVote, StampingVotes};

/// A connected remote peer.
pub struct Peer<T: MsgReadWriter> {
    id: VerifyingKey,
    version: u32,

    rw: T,
    closed: AtomicBool,
    msg_queue: SyncSender<Message>,
    vote_queue: SyncSender<StampingVote>,
    broadcast_queues: Mutex<Option<BroadcastQueues>>,

    state: RwLock<PeerState>,

    sync_response_tx: Sender<SyncResponse>,
    sync_responses: Mutex<Receiver<SyncResponse>>,

    handshake_timeout: Duration,
    sync_response_timeout: Duration,
}

struct PeerState {
    sc_status: SCStatus,
    counter: HeightVoteSet,
}

struct BroadcastQueues {
    msgs: Receiver<Message>,
    votes: Receiver<StampingVote>,
}

/// A sync response frame routed back to the requesting walk.
pub(crate) enum SyncResponse {
    Breadcrumb(Option<Breadcrumb>),
    Headers(Vec<Header>),
}

impl<T: MsgReadWriter> Peer<T> {
    pub fn new(id: VerifyingKey, rw: T, config: &ProtocolConfig) -> Peer<T> {
        let (msg_queue, msg_receiver) = mpsc::sync_channel(config.msg_queue_size);
        let (vote_queue, vote_receiver) = mpsc::sync_channel(config.msg_queue_size);
        let (sync_response_tx, sync_responses) = mpsc::channel();

        Peer {
            id,
            version: config.version,
            rw,
            closed: AtomicBool::new(false),
            msg_queue,
            vote_queue,
            broadcast_queues: Mutex::new(Some(BroadcastQueues {
                msgs: msg_receiver,
                votes: vote_receiver,
            })),
            state: RwLock::new(PeerState {
                sc_status: SCStatus::default(),
                counter: HeightVoteSet::new(),
            }),
            sync_response_tx,
            sync_responses: Mutex::new(sync_responses),
            handshake_timeout: config.handshake_timeout,
            sync_response_timeout: config.sync_response_timeout,
        }
    }

    pub fn id(&self) -> VerifyingKey {
        self.id
    }

    /// The first seven base64 characters of the peer's public key, for logging.
    pub fn short_id(&self) -> String {
        first_seven_base64_chars(&self.id.to_bytes())
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// The peer's last known watermarks.
    pub fn chain_status(&self) -> SCStatus {
        self.state.read().unwrap().sc_status
    }

    /// Exchange [`HandshakeData`] in both directions under one overall deadline.
    pub fn handshake(
        &self,
        network_id: NetworkId,
        genesis: CryptoHash,
        status: SCStatus,
    ) -> Result<(), HandshakeError> {
        let deadline = Instant::now() + self.handshake_timeout;
        let frame = Message::Handshake(HandshakeData {
            version: self.version,
            network_id,
            genesis,
            sc_status: status,
        })
        .to_frame()?;

        let theirs = thread::scope(|scope| {
            let sender = scope.spawn(move || self.rw.send(frame));
            let theirs = self.read_handshake(network_id, genesis, deadline);
            match sender.join() {
                Ok(Ok(())) => theirs,
                Ok(Err(err)) => Err(HandshakeError::Transport(err)),
                Err(_) => Err(HandshakeError::Transport(TransportError::Closed)),
            }
        })?;

        self.state.write().unwrap().sc_status = theirs.sc_status;
        log::debug!(
            "peer {}: handshake ok, status {}",
            self.short_id(),
            theirs.sc_status
        );
        Ok(())
    }

    fn read_handshake(
        &self,
        network_id: NetworkId,
        genesis: CryptoHash,
        deadline: Instant,
    ) -> Result<HandshakeData, HandshakeError> {
        let now = Instant::now();
        if now >= deadline {
            return Err(HandshakeError::ReadTimeout);
        }
        let frame = self.rw.recv(deadline - now).map_err(|err| match err {
            TransportError::Timeout => HandshakeError::ReadTimeout,
            other => HandshakeError::Transport(other),
        })?;

        if frame.code != HANDSHAKE_MSG {
            return Err(HandshakeError::UnexpectedMessage { code: frame.code });
        }
        let data = match frame.decode()? {
            Message::Handshake(data) => data,
            _ => return Err(HandshakeError::UnexpectedMessage { code: frame.code }),
        };

        if data.version != self.version {
            return Err(HandshakeError::ProtocolVersionMismatch {
                ours: self.version,
                theirs: data.version,
            });
        }
        if data.genesis != genesis {
            return Err(HandshakeError::GenesisMismatch {
                ours: genesis,
                theirs: data.genesis,
            });
        }
        if data.network_id != network_id {
            return Err(HandshakeError::NetworkIdMismatch {
                ours: network_id,
                theirs: data.network_id,
            });
        }
        Ok(data)
    }

    /// Send `vote` to the peer and record that the peer now has it. The peer's write lock is
    /// held across the transport send so that "send" and "mark as sent" are one step.
    pub fn send_stamping_vote(&self, vote: &StampingVote) -> Result<(), PeerError> {
        let mut state = self.state.write().unwrap();

        if vote.height <= state.sc_status.candidate {
            log::trace!(
                "peer {}: vote {} below candidate, status {}",
                self.short_id(),
                vote,
                state.sc_status
            );
            return Err(PeerError::TooLow {
                height: vote.height,
                candidate: state.sc_status.candidate,
            });
        }
        if state.counter.has_vote(vote) {
            log::trace!("peer {}: already has vote {}", self.short_id(), vote);
            return Err(PeerError::Redundant {
                height: vote.height,
                voter: vote.voter,
            });
        }

        self.send_vote_and_mark(&mut state, vote);
        Ok(())
    }

    fn send_vote_and_mark(&self, state: &mut PeerState, vote: &StampingVote) {
        match self.send_message(Message::StampingVote(*vote)) {
            Ok(()) => {
                state.counter.set_has_vote(&HasSCVoteData::from(vote));
                log::trace!("peer {}: sent vote {}", self.short_id(), vote);
            }
            Err(err) => {
                log::debug!(
                    "peer {}: vote {} send failed: {:?}",
                    self.short_id(),
                    vote,
                    err
                );
            }
        }
    }

    /// Record that the peer holds a vote, without transmitting anything. Ignored when the
    /// vote is at or below the peer's candidate.
    pub fn set_has_vote(&self, data: &HasSCVoteData) {
        let mut state = self.state.write().unwrap();
        if data.height <= state.sc_status.candidate {
            return;
        }
        state.counter.set_has_vote(data);
    }

    /// Unconditional status push. Send failures are logged and swallowed; status is re-sent
    /// on every change anyway.
    pub fn send_status(&self, status: &SCStatus) {
        // Hold the state lock so status frames serialize with vote sends on this connection.
        let _state = self.state.write().unwrap();
        if let Err(err) = self.send_message(Message::StampingStatus(*status)) {
            log::debug!(
                "peer {}: status {} send failed: {:?}",
                self.short_id(),
                status,
                err
            );
        }
    }

    /// Accept a status announcement from the peer. The update is taken only when neither
    /// `candidate` nor `height` regresses; on acceptance, vote bookkeeping at or below the new
    /// candidate is dropped. Returns the `(old, new)` candidate pair when accepted.
    pub fn update_status(&self, msg: SCStatus) -> Option<(BlockHeight, BlockHeight)> {
        let mut state = self.state.write().unwrap();

        if msg.candidate < state.sc_status.candidate || msg.height < state.sc_status.height {
            return None;
        }

        let before = state.sc_status.candidate;
        state.sc_status = msg;
        state.counter.remove(before, msg.candidate);
        log::debug!(
            "peer {}: status advanced {} -> {}",
            self.short_id(),
            before,
            msg.candidate
        );
        Some((before, msg.candidate))
    }

    /// Out of `votes`, send one the peer does not have.
    pub fn pick_and_send(&self, votes: &[StampingVote]) -> Result<(), PeerError> {
        if votes.is_empty() {
            return Err(PeerError::NothingToSend);
        }
        let vote = {
            let state = self.state.read().unwrap();
            state
                .counter
                .random_not_in(votes)
                .ok_or(PeerError::NothingToSend)?
        };
        if let Err(err) = self.send_stamping_vote(&vote) {
            log::debug!("peer {}: pick_and_send skipped: {:?}", self.short_id(), err);
        }
        Ok(())
    }

    /// Send the first vote of a building set that the peer does not have.
    pub fn pick_building_and_send(&self, votes: &StampingVotes) -> Result<(), PeerError> {
        if votes.is_empty() {
            return Err(PeerError::NothingToSend);
        }
        for vote in votes.iter() {
            let known = self.state.read().unwrap().counter.has_vote(vote);
            if !known {
                if let Err(err) = self.send_stamping_vote(vote) {
                    log::debug!(
                        "peer {}: pick_building_and_send skipped: {:?}",
                        self.short_id(),
                        err
                    );
                }
                return Ok(());
            }
        }
        Err(PeerError::NothingToSend)
    }

    /// Enqueue a message for the broadcaster. A full queue drops the message with a warning.
    pub fn send_msg_async(&self, msg: Message) {
        let code = msg.code();
        match self.msg_queue.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!(
                    "peer {}: msg queue full, dropping {}",
                    self.short_id(),
                    code_name(code)
                );
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Enqueue a stamping vote for the broadcaster. A full queue drops the vote with a warning.
    pub fn send_stamping_vote_async(&self, vote: StampingVote) {
        match self.vote_queue.try_send(vote) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("peer {}: vote queue full, dropping vote", self.short_id());
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Start the broadcaster thread, which drains the two outbound queues until the peer is
    /// closed.
    pub fn start_broadcaster(self: &Arc<Self>) -> JoinHandle<()>
    where
        T: 'static,
    {
        let peer = Arc::clone(self);
        let queues = peer
            .broadcast_queues
            .lock()
            .unwrap()
            .take()
            .expect("broadcaster started twice");

        thread::spawn(move || loop {
            if peer.is_closed() {
                return;
            }

            match queues.msgs.try_recv() {
                Ok(msg) => {
                    let code = msg.code();
                    match peer.send_message(msg) {
                        Ok(()) => log::trace!("peer {}: sent {}", peer.short_id(), code_name(code)),
                        Err(err) => log::debug!(
                            "peer {}: send {} failed: {:?}",
                            peer.short_id(),
                            code_name(code),
                            err
                        ),
                    }
                    continue;
                }
                Err(mpsc::TryRecvError::Empty) => {}
                Err(mpsc::TryRecvError::Disconnected) => return,
            }

            match queues.votes.try_recv() {
                Ok(vote) => {
                    let _ = peer.send_stamping_vote(&vote);
                    continue;
                }
                Err(mpsc::TryRecvError::Empty) => {}
                Err(mpsc::TryRecvError::Disconnected) => return,
            }

            thread::yield_now();
        })
    }

    /// Receive the next frame from the peer's transport.
    pub(crate) fn recv(&self, timeout: Duration) -> Result<Frame, TransportError> {
        self.rw.recv(timeout)
    }

    /// Route a received sync response frame to the walk waiting on it.
    pub(crate) fn deliver_sync_response(&self, response: SyncResponse) {
        let _ = self.sync_response_tx.send(response);
    }

    fn send_message(&self, msg: Message) -> Result<(), PeerError> {
        let frame = msg.to_frame()?;
        self.rw.send(frame).map_err(PeerError::Transport)
    }

    fn request_sync_response(
        &self,
        request: Message,
        mut take: impl FnMut(SyncResponse) -> Option<SyncResponse>,
    ) -> Result<SyncResponse, SyncError> {
        let responses = self.sync_responses.lock().unwrap();
        // Drop responses left over from an abandoned walk.
        while responses.try_recv().is_ok() {}

        self.send_message(request).map_err(|err| match err {
            PeerError::Transport(transport) => SyncError::Transport(transport),
            _ => SyncError::Transport(TransportError::Closed),
        })?;

        let deadline = Instant::now() + self.sync_response_timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(SyncError::Timeout);
            }
            match responses.recv_timeout(deadline - now) {
                Ok(response) => {
                    if let Some(matched) = take(response) {
                        return Ok(matched);
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Err(SyncError::Timeout),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SyncError::Transport(TransportError::Closed))
                }
            }
        }
    }
}

impl<T: MsgReadWriter> SyncSource for Peer<T> {
    fn sc_status(&self) -> Result<SCStatus, SyncError> {
        Ok(self.chain_status())
    }

    fn next_breadcrumb(&self, from: BlockHeight) -> Result<Option<Breadcrumb>, SyncError> {
        let response = self.request_sync_response(
            Message::GetBreadcrumb(GetBreadcrumbRequest { from }),
            |response| match response {
                SyncResponse::Breadcrumb(_) => Some(response),
                SyncResponse::Headers(_) => None,
            },
        )?;
        match response {
            SyncResponse::Breadcrumb(bc) => Ok(bc),
            SyncResponse::Headers(_) => unreachable!("filtered by take"),
        }
    }

    fn headers(&self, begin: BlockHeight, end: BlockHeight) -> Result<Vec<Header>, SyncError> {
        let response = self.request_sync_response(
            Message::GetHeaders(GetHeadersRequest { begin, end }),
            |response| match response {
                SyncResponse::Headers(_) => Some(response),
                SyncResponse::Breadcrumb(_) => None,
            },
        )?;
        match response {
            SyncResponse::Headers(headers) => Ok(headers),
            SyncResponse::Breadcrumb(_) => unreachable!("filtered by take"),
        }
    }
}

/// Error from a post-handshake peer operation.
#[derive(Debug)]
pub enum PeerError {
    /// The vote is at or below the peer's candidate watermark.
    TooLow {
        height: BlockHeight,
        candidate: BlockHeight,
    },
    /// The peer already has this vote.
    Redundant {
        height: BlockHeight,
        voter: VoterIndex,
    },
    /// No vote in the offered set qualifies for sending.
    NothingToSend,
    /// The message could not be framed.
    Message(MessageError),
    /// The connection failed.
    Transport(TransportError),
}

impl From<MessageError> for PeerError {
    fn from(value: MessageError) -> Self {
        PeerError::Message(value)
    }
}

/// Error that aborted a handshake. Any of these disconnects the connection attempt.
#[derive(Debug)]
pub enum HandshakeError {
    ProtocolVersionMismatch { ours: u32, theirs: u32 },
    GenesisMismatch { ours: CryptoHash, theirs: CryptoHash },
    NetworkIdMismatch { ours: NetworkId, theirs: NetworkId },
    MsgTooLarge { size: u64, max: u64 },
    Decode { source: std::io::Error },
    ReadTimeout,
    UnexpectedMessage { code: u64 },
    Transport(TransportError),
}

impl From<MessageError> for HandshakeError {
    fn from(value: MessageError) -> Self {
        match value {
            MessageError::MsgTooLarge { size, max } => HandshakeError::MsgTooLarge { size, max },
            MessageError::Decode { source } => HandshakeError::Decode { source },
            MessageError::UnknownCode { code } => HandshakeError::UnexpectedMessage { code },
        }
    }
}
