/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The collection of active peers currently participating in the stamping protocol.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ed25519_dalek::VerifyingKey;

use crate::networking::MsgReadWriter;
use crate::peer::Peer;

/// Registry of the connected peers. Closed once, at shutdown; no peer can be registered
/// afterwards.
pub struct PeerSet<T: MsgReadWriter> {
    inner: RwLock<PeerSetInner<T>>,
}

struct PeerSetInner<T: MsgReadWriter> {
    peers: HashMap<VerifyingKey, Arc<Peer<T>>>,
    closed: bool,
}

impl<T: MsgReadWriter> PeerSet<T> {
    pub fn new() -> PeerSet<T> {
        PeerSet {
            inner: RwLock::new(PeerSetInner {
                peers: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Inject a new peer into the working set.
    pub fn register(&self, peer: Arc<Peer<T>>) -> Result<(), PeerSetError> {
        let mut inner = self.inner.write().unwrap();
        if inner.closed {
            return Err(PeerSetError::Closed);
        }
        if inner.peers.contains_key(&peer.id()) {
            return Err(PeerSetError::AlreadyRegistered);
        }
        inner.peers.insert(peer.id(), peer);
        Ok(())
    }

    /// Remove a peer from the active set and close it, disabling any further traffic to or
    /// from it.
    pub fn unregister(&self, id: &VerifyingKey) -> Result<(), PeerSetError> {
        let mut inner = self.inner.write().unwrap();
        match inner.peers.remove(id) {
            Some(peer) => {
                peer.close();
                Ok(())
            }
            None => Err(PeerSetError::NotRegistered),
        }
    }

    /// Retrieve the registered peer with the given id.
    pub fn peer(&self, id: &VerifyingKey) -> Option<Arc<Peer<T>>> {
        self.inner.read().unwrap().peers.get(id).cloned()
    }

    /// The current number of peers in the set.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `f` on each registered peer.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<Peer<T>>)) {
        let inner = self.inner.read().unwrap();
        for peer in inner.peers.values() {
            f(peer);
        }
    }

    /// The peer with the greatest `candidate` watermark, if any.
    pub fn best_peer(&self) -> Option<Arc<Peer<T>>> {
        let inner = self.inner.read().unwrap();
        inner
            .peers
            .values()
            .max_by_key(|peer| peer.chain_status().candidate)
            .cloned()
    }

    /// Disconnect all peers. No new peer can be registered after `close` has returned.
    pub fn close(&self) {
        let mut inner = self.inner.write().unwrap();
        for peer in inner.peers.values() {
            peer.close();
        }
        inner.peers.clear();
        inner.closed = true;
    }
}

impl<T: MsgReadWriter> Default for PeerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Error when registering or unregistering a peer.
#[derive(Debug)]
pub enum PeerSetError {
    AlreadyRegistered,
    NotRegistered,
    Closed,
}
