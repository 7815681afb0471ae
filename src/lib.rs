/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A stamping-certificate chain: an append-only header ledger augmented with sparse,
//! committee-attested stamping certificates that retroactively finalize the chain one
//! stamping horizon behind, let frozen history shed its per-block final certificates, and
//! make the whole chain replayable to a fresh peer as a compact breadcrumb walk.
//!
//! The crate provides:
//! - The [chain](crate::chain) data structure and its watermark maintenance,
//! - The [sync engine](crate::sync) that reconstructs a chain from a remote's breadcrumbs,
//! - Per-peer [vote bookkeeping](crate::height_vote_set) to keep gossip non-redundant,
//! - The [peer](crate::peer) state machine, [peer set](crate::peer_set), and the
//!   [service](crate::service) that dispatches messages between them and the chain.
//!
//! Block production, vote signature verification, and the network transport are consumed as
//! interfaces: see [`oracles`](crate::oracles) and
//! [`MsgReadWriter`](crate::networking::MsgReadWriter).

pub mod chain;

pub mod config;

pub mod event_bus;

pub mod events;

pub mod height_vote_set;

pub mod logging;

pub mod messages;

pub mod networking;

pub mod oracles;

pub mod peer;

pub mod peer_set;

pub mod service;

pub mod sync;

pub mod types;

// Re-exports
pub use chain::{Chain, ChainError};
pub use config::{ChainConfig, Config, ProtocolConfig};
pub use types::chain_types::*;
pub use types::data_types::*;
pub use types::vote_types::*;
