/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The authoritative store of headers, final certificates, and stamping certificates, and the
//! maintenance of the four chain watermarks.
//!
//! ## Watermarks
//!
//! The chain tracks an [`SCStatus`] of four monotonically non-decreasing heights:
//!
//! |Watermark|Meaning|
//! |---|---|
//! |`height`|Highest header accepted through [`add_block`](Chain::add_block) or sync.|
//! |`candidate`|Height of the highest accepted stamping certificate.|
//! |`proof`|`candidate - B`: the last fully-stamped height.|
//! |`fz`|The frozen tip. Heights at or below it are irrevocably final.|
//!
//! ## Freezing
//!
//! Every accepted stamping certificate pins one proof height. The frozen tip advances along
//! these proof anchors in ascending order, and only while each next anchor lies within one
//! stamping horizon of the current tip: a fresh verifier can bridge at most `B` heights from a
//! frozen state to the committee that attested the next anchor. A larger gap permanently stalls
//! `fz` below it, and the final certificates above `fz` stay retained to keep the gap provable.
//! Behind the frozen tip, final certificates are discarded; headers and stamping certificates
//! are retained, because they are exactly what [breadcrumb](crate::types::chain_types::Breadcrumb)
//! replay hands to a freshly-joined peer.
//!
//! ## Locking
//!
//! All state lives behind a single reader-writer lock: many concurrent readers of headers and
//! watermarks, one writer per mutating operation. Writers never perform transport I/O while
//! holding the lock; the [sync engine](crate::sync) verifies a staged breadcrumb first and only
//! then takes the lock to apply it atomically.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::mpsc::Sender;
use std::sync::RwLock;
use std::time::SystemTime;

use crate::config::ChainConfig;
use crate::events::{
    Event, InsertHeaderEvent, InsertStampingCertificateEvent, PruneFinalCertificatesEvent,
    UpdateSCStatusEvent,
};
use crate::sync::{self, SyncError, SyncSource};
use crate::types::chain_types::{
    genesis_header, Breadcrumb, FinalCertificate, Header, SCStatus, StampingCertificate,
};
use crate::types::data_types::BlockHeight;

/// The chain: headers, certificates, and watermarks behind one reader-writer lock.
pub struct Chain {
    stamping_horizon: u64,
    inner: RwLock<ChainInner>,
    event_publisher: Option<Sender<Event>>,
}

struct ChainInner {
    headers: BTreeMap<BlockHeight, Header>,
    final_certificates: BTreeMap<BlockHeight, FinalCertificate>,
    stamping_certificates: BTreeMap<BlockHeight, StampingCertificate>,
    status: SCStatus,
}

impl Chain {
    /// Create a chain containing only the genesis header, with all watermarks at 0.
    pub fn new(config: ChainConfig, event_publisher: Option<Sender<Event>>) -> Chain {
        let genesis = genesis_header();
        let mut headers = BTreeMap::new();
        headers.insert(genesis.height, genesis);

        Chain {
            stamping_horizon: config.stamping_horizon,
            inner: RwLock::new(ChainInner {
                headers,
                final_certificates: BTreeMap::new(),
                stamping_certificates: BTreeMap::new(),
                status: SCStatus::default(),
            }),
            event_publisher,
        }
    }

    /// The stamping horizon `B` this chain was configured with.
    pub fn stamping_horizon(&self) -> u64 {
        self.stamping_horizon
    }

    /// Get the current watermarks.
    pub fn status(&self) -> SCStatus {
        self.inner.read().unwrap().status
    }

    /// Get the header at `height`, if present.
    pub fn header(&self, height: BlockHeight) -> Option<Header> {
        self.inner.read().unwrap().headers.get(&height).copied()
    }

    /// Get the final certificate at `height`, if present. Heights at or below the frozen tip
    /// never have one.
    pub fn final_certificate(&self, height: BlockHeight) -> Option<FinalCertificate> {
        self.inner
            .read()
            .unwrap()
            .final_certificates
            .get(&height)
            .copied()
    }

    /// Get the stamping certificate at `height`, if present.
    pub fn stamping_certificate(&self, height: BlockHeight) -> Option<StampingCertificate> {
        self.inner
            .read()
            .unwrap()
            .stamping_certificates
            .get(&height)
            .copied()
    }

    /// Get the headers in `[begin, end]`, ascending. Heights with no header are skipped.
    pub fn headers(&self, begin: BlockHeight, end: BlockHeight) -> Vec<Header> {
        let inner = self.inner.read().unwrap();
        inner
            .headers
            .range((Bound::Included(begin), Bound::Included(end)))
            .map(|(_, header)| *header)
            .collect()
    }

    /// Append the block at `height + 1` to the chain.
    ///
    /// The first writer wins: a concurrent producer for the same height gets
    /// [`ChainError::Duplicate`].
    pub fn add_block(&self, header: &Header, fc: &FinalCertificate) -> Result<(), ChainError> {
        let mut inner = self.inner.write().unwrap();

        if header.height <= inner.status.fz {
            return Err(ChainError::Frozen {
                height: header.height,
                fz: inner.status.fz,
            });
        }
        if inner.headers.contains_key(&header.height) {
            return Err(ChainError::Duplicate {
                height: header.height,
            });
        }
        if header.height != inner.status.height + 1 {
            return Err(ChainError::OutOfOrder {
                height: header.height,
                expected: inner.status.height + 1,
            });
        }
        let parent = inner
            .headers
            .get(&(header.height - 1))
            .copied()
            .ok_or(ChainError::BadParent {
                height: header.height,
            })?;
        if header.parent_hash != parent.hash {
            return Err(ChainError::BadParent {
                height: header.height,
            });
        }
        if fc.height != header.height || fc.parent_hash != header.parent_hash {
            return Err(ChainError::BadParent {
                height: header.height,
            });
        }

        inner.headers.insert(header.height, *header);
        inner.final_certificates.insert(fc.height, *fc);
        inner.status.height = header.height;

        drop(inner);
        Event::InsertHeader(InsertHeaderEvent {
            timestamp: SystemTime::now(),
            header: *header,
        })
        .publish(&self.event_publisher);

        Ok(())
    }

    /// Install a stamping certificate, advancing `candidate`, `proof`, and possibly `fz`.
    ///
    /// A certificate whose proof height is at or below the frozen tip is accepted as long as
    /// the retained header there still matches its proof hash.
    pub fn add_stamping_certificate(&self, sc: StampingCertificate) -> Result<(), ChainError> {
        let mut inner = self.inner.write().unwrap();
        let mut events = Vec::new();
        self.install_stamping_certificate(&mut inner, sc, &mut events)?;
        drop(inner);

        for event in events {
            event.publish(&self.event_publisher);
        }
        Ok(())
    }

    /// Get the next stamping-certificate-anchored stretch above `from`, or `None` when no
    /// stamping certificate exists above it.
    pub fn next_breadcrumb(&self, from: BlockHeight) -> Option<Breadcrumb> {
        let inner = self.inner.read().unwrap();
        let (anchor, sc) = inner
            .stamping_certificates
            .range((Bound::Excluded(from), Bound::Unbounded))
            .next()?;

        let tail_header = inner.headers.get(anchor).copied()?;
        let body_headers = inner
            .headers
            .range((Bound::Excluded(from), Bound::Excluded(*anchor)))
            .map(|(_, header)| *header)
            .collect();

        Some(Breadcrumb {
            tail_header,
            tail_sc: *sc,
            body_headers,
        })
    }

    /// Reconstruct this chain's state from `remote`, up to its `candidate` watermark plus the
    /// tail headers above it. See [the sync engine](crate::sync).
    pub fn sync(&self, remote: &dyn SyncSource) -> Result<(), SyncError> {
        sync::sync_chain(self, remote)
    }

    /// Atomically install a verified breadcrumb: its headers first, then its stamping
    /// certificate. Headers already present locally are kept; a disagreement between them and
    /// the certificate's proof surfaces as [`ChainError::BadProof`].
    pub(crate) fn apply_breadcrumb(&self, bc: &Breadcrumb) -> Result<(), ChainError> {
        let mut inner = self.inner.write().unwrap();
        let mut events = Vec::new();

        for header in bc.body_headers.iter().chain(Some(&bc.tail_header)) {
            if !inner.headers.contains_key(&header.height) {
                inner.headers.insert(header.height, *header);
            }
            if header.height > inner.status.height {
                inner.status.height = header.height;
            }
        }
        self.install_stamping_certificate(&mut inner, bc.tail_sc, &mut events)?;
        drop(inner);

        for event in events {
            event.publish(&self.event_publisher);
        }
        Ok(())
    }

    /// Append already-verified tail headers (heights above `candidate`) in order.
    pub(crate) fn extend_headers(&self, headers: &[Header]) -> Result<(), ChainError> {
        let mut inner = self.inner.write().unwrap();

        for header in headers {
            if header.height != inner.status.height + 1 {
                return Err(ChainError::OutOfOrder {
                    height: header.height,
                    expected: inner.status.height + 1,
                });
            }
            let parent = inner
                .headers
                .get(&(header.height - 1))
                .copied()
                .ok_or(ChainError::BadParent {
                    height: header.height,
                })?;
            if header.parent_hash != parent.hash {
                return Err(ChainError::BadParent {
                    height: header.height,
                });
            }
            inner.headers.insert(header.height, *header);
            inner.status.height = header.height;
        }
        Ok(())
    }

    pub(crate) fn publish_event(&self, event: Event) {
        event.publish(&self.event_publisher);
    }

    fn install_stamping_certificate(
        &self,
        inner: &mut ChainInner,
        sc: StampingCertificate,
        events: &mut Vec<Event>,
    ) -> Result<(), ChainError> {
        if sc.height <= inner.status.candidate {
            return Err(ChainError::TooOld {
                height: sc.height,
                candidate: inner.status.candidate,
            });
        }
        if sc.height > inner.status.height {
            return Err(ChainError::OutOfOrder {
                height: sc.height,
                expected: inner.status.height,
            });
        }
        if sc.proof_height.int() == 0 || sc.proof_height + self.stamping_horizon != sc.height {
            return Err(ChainError::BadProof { height: sc.height });
        }
        let proof_header =
            inner
                .headers
                .get(&sc.proof_height)
                .copied()
                .ok_or(ChainError::NoProofHeader {
                    proof_height: sc.proof_height,
                })?;
        if proof_header.hash != sc.proof_hash {
            return Err(ChainError::BadProof { height: sc.height });
        }

        inner.stamping_certificates.insert(sc.height, sc);
        inner.status.candidate = sc.height;
        inner.status.proof = sc.height - self.stamping_horizon;

        events.push(Event::InsertStampingCertificate(
            InsertStampingCertificateEvent {
                timestamp: SystemTime::now(),
                stamping_certificate: sc,
            },
        ));

        if self.advance_fz(inner) {
            let fz = inner.status.fz;
            let before = inner.final_certificates.len();
            inner.final_certificates.retain(|height, _| *height > fz);
            let pruned = (before - inner.final_certificates.len()) as u64;
            events.push(Event::PruneFinalCertificates(PruneFinalCertificatesEvent {
                timestamp: SystemTime::now(),
                fz,
                pruned,
            }));
        }

        events.push(Event::UpdateSCStatus(UpdateSCStatusEvent {
            timestamp: SystemTime::now(),
            status: inner.status,
        }));
        Ok(())
    }

    /// Walk the frozen tip up the proof anchors. Each step requires the next anchor to be
    /// within one stamping horizon of the current tip.
    fn advance_fz(&self, inner: &mut ChainInner) -> bool {
        let b = self.stamping_horizon;
        let mut advanced = false;
        loop {
            let fz = inner.status.fz;
            let next_anchor = inner
                .stamping_certificates
                .range((Bound::Excluded(fz + b), Bound::Unbounded))
                .map(|(_, sc)| sc.proof_height)
                .next();
            match next_anchor {
                Some(anchor) if anchor - fz <= b => {
                    inner.status.fz = anchor;
                    advanced = true;
                }
                _ => break,
            }
        }
        advanced
    }

    /// Print a human-readable summary of the chain, for tests.
    pub fn print(&self) {
        let inner = self.inner.read().unwrap();
        println!(
            "chain status={} headers={} final_certificates={} stamping_certificates={}",
            inner.status,
            inner.headers.len(),
            inner.final_certificates.len(),
            inner.stamping_certificates.len(),
        );
        let anchors: Vec<String> = inner
            .stamping_certificates
            .values()
            .map(|sc| format!("{}->{}", sc.height, sc.proof_height))
            .collect();
        println!("stamping anchors: {}", anchors.join(" "));
    }
}

/// Error when mutating the [`Chain`].
#[derive(Debug)]
pub enum ChainError {
    /// The header's parent hash does not match the stored parent, or its final certificate
    /// disagrees with it.
    BadParent { height: BlockHeight },
    /// The operation does not extend the current tip.
    OutOfOrder {
        height: BlockHeight,
        expected: BlockHeight,
    },
    /// A header already occupies this height; the first writer won.
    Duplicate { height: BlockHeight },
    /// The height is at or below the frozen tip.
    Frozen { height: BlockHeight, fz: BlockHeight },
    /// The stamping certificate's proof header is not in the chain.
    NoProofHeader { proof_height: BlockHeight },
    /// The stamping certificate's proof does not match the chain contents.
    BadProof { height: BlockHeight },
    /// The stamping certificate does not advance the candidate watermark.
    TooOld {
        height: BlockHeight,
        candidate: BlockHeight,
    },
}
