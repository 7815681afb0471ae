/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Exhaustive enumeration of every message exchanged between peers, and the framed codec that
//! carries them.
//!
//! ## Messages
//!
//! The protocol defines three categories of messages:
//!
//! 1. The [`HandshakeData`] exchanged once, immediately after a connection is established.
//! 2. Gossip messages ([`StampingVote`], [`SCStatus`], [`HasSCVoteData`]) pushed
//!    unsolicited between peers.
//! 3. Sync request/response pairs ([`GetBreadcrumbRequest`]/[`BreadcrumbResponse`] and
//!    [`GetHeadersRequest`]/[`HeadersResponse`]) driven by the
//!    [sync engine](crate::sync).
//!
//! ## Framing
//!
//! On the wire each message is a [`Frame`]: a `u64` code followed by the borsh-serialized
//! payload. Payloads larger than [`PROTOCOL_MAX_MSG_SIZE`] are rejected with
//! [`MessageError::MsgTooLarge`], which disconnects the offending peer.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    chain_types::{Breadcrumb, Header, SCStatus},
    data_types::{BlockHeight, CryptoHash, NetworkId},
    vote_types::{HasSCVoteData, StampingVote},
};

pub const HANDSHAKE_MSG: u64 = 0x00;
pub const STAMPING_VOTE_MSG: u64 = 0x01;
pub const STAMPING_STATUS_MSG: u64 = 0x02;
pub const HAS_SC_VOTE_MSG: u64 = 0x03;
pub const GET_BREADCRUMB_MSG: u64 = 0x04;
pub const BREADCRUMB_MSG: u64 = 0x05;
pub const GET_HEADERS_MSG: u64 = 0x06;
pub const HEADERS_MSG: u64 = 0x07;

/// Maximum accepted payload size of a single frame.
pub const PROTOCOL_MAX_MSG_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of headers returned in a single [`HeadersResponse`].
pub const MAX_HEADERS_PER_RESPONSE: u64 = 2048;

/// Get the human-readable name of a message code, for logging.
pub fn code_name(code: u64) -> &'static str {
    match code {
        HANDSHAKE_MSG => "Handshake",
        STAMPING_VOTE_MSG => "StampingVote",
        STAMPING_STATUS_MSG => "StampingStatus",
        HAS_SC_VOTE_MSG => "HasSCVote",
        GET_BREADCRUMB_MSG => "GetBreadcrumb",
        BREADCRUMB_MSG => "Breadcrumb",
        GET_HEADERS_MSG => "GetHeaders",
        HEADERS_MSG => "Headers",
        _ => "Unknown",
    }
}

/// All message variants exchanged between peers.
#[derive(Clone, Debug)]
pub enum Message {
    Handshake(HandshakeData),
    StampingVote(StampingVote),
    StampingStatus(SCStatus),
    HasSCVote(HasSCVoteData),
    GetBreadcrumb(GetBreadcrumbRequest),
    Breadcrumb(BreadcrumbResponse),
    GetHeaders(GetHeadersRequest),
    Headers(HeadersResponse),
}

impl Message {
    /// Get the wire code of this message.
    pub fn code(&self) -> u64 {
        match self {
            Message::Handshake(_) => HANDSHAKE_MSG,
            Message::StampingVote(_) => STAMPING_VOTE_MSG,
            Message::StampingStatus(_) => STAMPING_STATUS_MSG,
            Message::HasSCVote(_) => HAS_SC_VOTE_MSG,
            Message::GetBreadcrumb(_) => GET_BREADCRUMB_MSG,
            Message::Breadcrumb(_) => BREADCRUMB_MSG,
            Message::GetHeaders(_) => GET_HEADERS_MSG,
            Message::Headers(_) => HEADERS_MSG,
        }
    }

    /// Serialize this message into a [`Frame`].
    pub fn to_frame(&self) -> Result<Frame, MessageError> {
        let payload = match self {
            Message::Handshake(data) => data.try_to_vec(),
            Message::StampingVote(vote) => vote.try_to_vec(),
            Message::StampingStatus(status) => status.try_to_vec(),
            Message::HasSCVote(data) => data.try_to_vec(),
            Message::GetBreadcrumb(req) => req.try_to_vec(),
            Message::Breadcrumb(resp) => resp.try_to_vec(),
            Message::GetHeaders(req) => req.try_to_vec(),
            Message::Headers(resp) => resp.try_to_vec(),
        }
        .map_err(|source| MessageError::Decode { source })?;

        if payload.len() as u64 > PROTOCOL_MAX_MSG_SIZE {
            return Err(MessageError::MsgTooLarge {
                size: payload.len() as u64,
                max: PROTOCOL_MAX_MSG_SIZE,
            });
        }

        Ok(Frame {
            code: self.code(),
            payload,
        })
    }
}

impl From<HandshakeData> for Message {
    fn from(value: HandshakeData) -> Self {
        Message::Handshake(value)
    }
}

impl From<StampingVote> for Message {
    fn from(value: StampingVote) -> Self {
        Message::StampingVote(value)
    }
}

impl From<SCStatus> for Message {
    fn from(value: SCStatus) -> Self {
        Message::StampingStatus(value)
    }
}

impl From<HasSCVoteData> for Message {
    fn from(value: HasSCVoteData) -> Self {
        Message::HasSCVote(value)
    }
}

impl From<GetBreadcrumbRequest> for Message {
    fn from(value: GetBreadcrumbRequest) -> Self {
        Message::GetBreadcrumb(value)
    }
}

impl From<BreadcrumbResponse> for Message {
    fn from(value: BreadcrumbResponse) -> Self {
        Message::Breadcrumb(value)
    }
}

impl From<GetHeadersRequest> for Message {
    fn from(value: GetHeadersRequest) -> Self {
        Message::GetHeaders(value)
    }
}

impl From<HeadersResponse> for Message {
    fn from(value: HeadersResponse) -> Self {
        Message::Headers(value)
    }
}

/// The first message sent in each direction of a fresh connection. Carries everything needed
/// to decide whether the two peers speak the same protocol over the same chain.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct HandshakeData {
    pub version: u32,
    pub network_id: NetworkId,
    pub genesis: CryptoHash,
    pub sc_status: SCStatus,
}

/// Asks the remote for the next stamping-certificate-anchored stretch above `from`.
#[derive(Clone, Copy, Debug, BorshSerialize, BorshDeserialize)]
pub struct GetBreadcrumbRequest {
    pub from: BlockHeight,
}

/// Response to a [`GetBreadcrumbRequest`]. `breadcrumb` is `None` when the remote has no
/// stamping certificate above the requested height.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct BreadcrumbResponse {
    pub breadcrumb: Option<Breadcrumb>,
}

/// Asks the remote for the headers in `[begin, end]`. The remote caps the response at
/// [`MAX_HEADERS_PER_RESPONSE`] headers.
#[derive(Clone, Copy, Debug, BorshSerialize, BorshDeserialize)]
pub struct GetHeadersRequest {
    pub begin: BlockHeight,
    pub end: BlockHeight,
}

/// Response to a [`GetHeadersRequest`], ascending by height.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct HeadersResponse {
    pub headers: Vec<Header>,
}

/// A single framed message: the wire unit the [transport](crate::networking::MsgReadWriter)
/// moves around.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct Frame {
    pub code: u64,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Get the payload size of this frame.
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Deserialize the message carried by this frame.
    pub fn decode(&self) -> Result<Message, MessageError> {
        if self.size() > PROTOCOL_MAX_MSG_SIZE {
            return Err(MessageError::MsgTooLarge {
                size: self.size(),
                max: PROTOCOL_MAX_MSG_SIZE,
            });
        }

        let payload = &self.payload[..];
        let message = match self.code {
            HANDSHAKE_MSG => Message::Handshake(Self::decode_payload(payload)?),
            STAMPING_VOTE_MSG => Message::StampingVote(Self::decode_payload(payload)?),
            STAMPING_STATUS_MSG => Message::StampingStatus(Self::decode_payload(payload)?),
            HAS_SC_VOTE_MSG => Message::HasSCVote(Self::decode_payload(payload)?),
            GET_BREADCRUMB_MSG => Message::GetBreadcrumb(Self::decode_payload(payload)?),
            BREADCRUMB_MSG => Message::Breadcrumb(Self::decode_payload(payload)?),
            GET_HEADERS_MSG => Message::GetHeaders(Self::decode_payload(payload)?),
            HEADERS_MSG => Message::Headers(Self::decode_payload(payload)?),
            code => return Err(MessageError::UnknownCode { code }),
        };
        Ok(message)
    }

    fn decode_payload<M: BorshDeserialize>(payload: &[u8]) -> Result<M, MessageError> {
        M::try_from_slice(payload).map_err(|source| MessageError::Decode { source })
    }
}

/// Error when encoding or decoding a [`Frame`]. Any of these on a live connection is grounds
/// for disconnecting the peer.
#[derive(Debug)]
pub enum MessageError {
    MsgTooLarge { size: u64, max: u64 },
    Decode { source: std::io::Error },
    UnknownCode { code: u64 },
}
