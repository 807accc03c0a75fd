//! Graph task: duplicate suppression, forwarding and local delivery.
//!
//! The graph task is the only owner of the seen set. Every wire, whether
//! read from a link or looped back after this node originated it, passes
//! through here exactly once per arrival:
//!
//! 1. Hash the frame bytes the wire arrived as; drop the wire if the hash
//!    was seen. Those bytes are already canonical, so nothing is re-encoded.
//! 2. Record the hash. Fresh wires from links are queued for re-broadcast.
//! 3. Wires addressed to this node are decrypted and verified on the
//!    blocking pool, bounded by `decrypt_workers`, then handed to the
//!    application.

use crate::block::{Block, Wire, WireHash};
use crate::engine::config::EngineConfig;
use crate::engine::link::{Frame, LinkId};
use crate::engine::stats::EngineStats;
use crate::error::Error;
use murmur_crypto::PrivateKey;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Semaphore, mpsc, oneshot, watch};

/// Where a wire entered the graph task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Read from a neighbour
    Link(LinkId),
    /// Originated here and already broadcast
    Loopback,
}

/// A wire on its way into the graph task
#[derive(Debug)]
pub(crate) struct Ingress {
    pub(crate) wire: Wire,
    /// Canonical encoding of `wire`, exactly as read or broadcast
    pub(crate) frame: Frame,
    pub(crate) origin: Origin,
}

/// A wire queued for the broadcaster, encoded once for every link
#[derive(Debug)]
pub(crate) struct Outbound {
    pub(crate) hash: WireHash,
    pub(crate) frame: Frame,
    /// Set for originated wires, which re-enter the graph after broadcast
    pub(crate) loopback: Option<Wire>,
}

/// Read-only questions about graph state
#[derive(Debug)]
pub(crate) enum GraphQuery {
    HasSeen {
        hash: WireHash,
        reply: oneshot::Sender<bool>,
    },
    SeenCount {
        reply: oneshot::Sender<usize>,
    },
}

pub(crate) struct Graph {
    pub(crate) key: Arc<PrivateKey>,
    pub(crate) config: EngineConfig,
    pub(crate) seen: HashSet<WireHash>,
    pub(crate) inbound: mpsc::Receiver<Ingress>,
    pub(crate) queries: mpsc::UnboundedReceiver<GraphQuery>,
    pub(crate) outbound: mpsc::UnboundedSender<Outbound>,
    pub(crate) delivered: mpsc::Sender<Block>,
    pub(crate) workers: Arc<Semaphore>,
    pub(crate) stats: Arc<EngineStats>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl Graph {
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = async { self.shutdown.wait_for(|stop| *stop).await.is_ok() } => break,
                Some(query) = self.queries.recv() => self.answer(query),
                ingress = self.inbound.recv() => match ingress {
                    Some(ingress) => self.process(ingress).await,
                    None => break,
                },
            }
        }

        // Let in-flight decrypt jobs finish so deliveries close after them
        let permits = u32::try_from(self.config.decrypt_workers).unwrap_or(u32::MAX);
        let _ = self.workers.acquire_many(permits).await;
        tracing::debug!("graph task stopped with {} seen wires", self.seen.len());
    }

    fn answer(&self, query: GraphQuery) {
        match query {
            GraphQuery::HasSeen { hash, reply } => {
                let _ = reply.send(self.seen.contains(&hash));
            }
            GraphQuery::SeenCount { reply } => {
                let _ = reply.send(self.seen.len());
            }
        }
    }

    async fn process(&mut self, ingress: Ingress) {
        EngineStats::incr(&self.stats.wires_received);

        let Ingress {
            wire,
            frame,
            origin,
        } = ingress;
        let hash = WireHash::of_encoded(&frame);

        if !self.seen.insert(hash) {
            EngineStats::incr(&self.stats.duplicates_dropped);
            tracing::trace!("dropping duplicate {hash}");
            return;
        }

        let addressed = wire.head.is_to(self.key.public_key());

        match origin {
            Origin::Link(id) => {
                tracing::trace!("{id}: fresh wire {hash}");
                let out = Outbound {
                    hash,
                    frame,
                    loopback: None,
                };
                if self.outbound.send(out).is_ok() {
                    EngineStats::incr(&self.stats.forwarded);
                }
                if !addressed {
                    EngineStats::incr(&self.stats.not_addressed);
                    return;
                }
            }
            Origin::Loopback => {
                if !addressed || !self.config.loopback_own {
                    return;
                }
            }
        }

        self.deliver(wire, hash).await;
    }

    async fn deliver(&self, wire: Wire, hash: WireHash) {
        let Ok(permit) = Arc::clone(&self.workers).acquire_owned().await else {
            return;
        };

        let key = Arc::clone(&self.key);
        let delivered = self.delivered.clone();
        let stats = Arc::clone(&self.stats);

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            match wire.open(&key) {
                Ok(block) => match delivered.try_send(block) {
                    Ok(()) => {
                        EngineStats::incr(&stats.delivered);
                        tracing::debug!("delivered {hash}");
                    }
                    Err(TrySendError::Full(_)) => {
                        EngineStats::incr(&stats.deliveries_dropped);
                        tracing::warn!("delivery queue full, dropping {hash}");
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!("no application reader, dropping {hash}");
                    }
                },
                Err(e) => record_rejection(&stats, hash, &e),
            }
        });
    }
}

fn record_rejection(stats: &EngineStats, hash: WireHash, err: &Error) {
    if !err.is_ingress_tolerable() {
        tracing::warn!("{hash} rejected: {err}");
        return;
    }

    match err {
        Error::NotAddressed | Error::CryptoKey(_) => {
            EngineStats::incr(&stats.not_addressed);
            tracing::debug!("{hash} did not unwrap: {err}");
        }
        Error::BadSignature => {
            EngineStats::incr(&stats.bad_signatures);
            tracing::warn!("{hash} failed signature verification");
        }
        Error::Malformed(_) | Error::CryptoSym => {
            EngineStats::incr(&stats.malformed);
            tracing::warn!("{hash} has an undecodable tail: {err}");
        }
        _ => {}
    }
}
