/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Configuration as specified by the operator. This is split into subsystem-specific config
//! structs before being passed to components.

use std::time::Duration;

use crate::types::data_types::NetworkId;

#[derive(Clone, Debug)]
pub struct Config {
    pub chain: ChainConfig,
    pub protocol: ProtocolConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chain: ChainConfig::default(),
            protocol: ProtocolConfig::default(),
        }
    }
}

/// Parameters of the chain data structure.
#[derive(Clone, Copy, Debug)]
pub struct ChainConfig {
    /// The stamping horizon `B`: the distance between a stamping certificate and the header it
    /// pins. Must be at least 1.
    pub stamping_horizon: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            stamping_horizon: 20,
        }
    }
}

/// Parameters of the peer protocol.
#[derive(Clone, Debug)]
pub struct ProtocolConfig {
    pub version: u32,
    pub network_id: NetworkId,

    /// Overall deadline for both directions of the handshake.
    pub handshake_timeout: Duration,

    /// How long a sync round trip may wait for its breadcrumb or headers response.
    pub sync_response_timeout: Duration,

    /// Capacity of each of the two per-peer outbound queues. A send to a full queue drops the
    /// message with a warning rather than blocking the producer.
    pub msg_queue_size: usize,

    /// How often the gossip ticker offers each peer a stamping vote it is missing.
    pub gossip_interval: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            version: 1,
            network_id: NetworkId::new(1),
            handshake_timeout: Duration::from_secs(5),
            sync_response_timeout: Duration::from_secs(10),
            msg_queue_size: 1024,
            gossip_interval: Duration::from_millis(500),
        }
    }
}
