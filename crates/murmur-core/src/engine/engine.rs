//! Engine implementation - the flood-routing node
//!
//! The engine owns the private key and runs three kinds of tasks:
//!
//! ```text
//!   link tasks ──inbound──▶ graph task ──outbound──▶ broadcaster ──▶ link tasks
//!                              │   ▲                      │
//!                              │   └──────loopback────────┘
//!                              ▼
//!                      decrypt workers ──▶ deliveries
//! ```
//!
//! # Example
//!
//! ```no_run
//! use murmur_core::engine::{Engine, EngineConfig};
//! use murmur_crypto::PrivateKey;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key = PrivateKey::generate(4096)?;
//!     let me = key.public_key().clone();
//!     let engine = Engine::new(key, EngineConfig::default())?;
//!     let mut deliveries = engine.deliveries().expect("first call");
//!
//!     let stream = tokio::net::TcpStream::connect("127.0.0.1:3030").await?;
//!     engine.add_link(stream)?;
//!
//!     engine.send(&me, Vec::new(), b"note to self".to_vec())?;
//!     if let Some(block) = deliveries.recv().await {
//!         println!("{}", String::from_utf8_lossy(block.payload()));
//!     }
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

use crate::block::{Block, NodeId, WireHash, originate};
use crate::encoding::Encode;
use crate::engine::broadcast::Broadcaster;
use crate::engine::config::EngineConfig;
use crate::engine::graph::{Graph, GraphQuery, Ingress, Outbound};
use crate::engine::link::{Frame, Link, LinkHandle, LinkId};
use crate::engine::sender::Sender;
use crate::engine::stats::{EngineStats, StatsSnapshot};
use crate::error::{Error, Result};
use murmur_crypto::{PrivateKey, PublicKey};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, Notify, Semaphore, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Engine inner state
pub(crate) struct EngineInner {
    /// Long-lived identity
    pub(crate) key: Arc<PrivateKey>,
    /// Short identifier for logs
    pub(crate) node_id: NodeId,
    /// Encoded size of our public key, for payload limits
    pub(crate) public_key_len: usize,
    /// Engine configuration
    pub(crate) config: EngineConfig,
    /// Link readers to graph task
    pub(crate) inbound: mpsc::Sender<Ingress>,
    /// Originated wires to broadcaster
    pub(crate) outbound: mpsc::UnboundedSender<Outbound>,
    /// New link writers to broadcaster
    pub(crate) registrations: mpsc::UnboundedSender<LinkHandle>,
    /// Questions for the graph task
    pub(crate) queries: mpsc::UnboundedSender<GraphQuery>,
    /// Application side of the delivery queue, until taken
    pub(crate) deliveries: StdMutex<Option<Deliveries>>,
    /// Set once on shutdown
    pub(crate) shutdown: watch::Sender<bool>,
    /// Graph task and broadcaster
    pub(crate) tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Next link identifier
    pub(crate) next_link: AtomicU64,
    /// Shared counters
    pub(crate) stats: Arc<EngineStats>,
}

/// A flood-routing node
///
/// Cheap to clone; every clone drives the same node.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Constructors
// ═══════════════════════════════════════════════════════════════════════════

impl Engine {
    /// Start an engine for `key`.
    ///
    /// Spawns the graph task and the broadcaster on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` does not validate or no
    /// tokio runtime is running.
    pub fn new(key: PrivateKey, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::invalid_config(
                "engine must be started inside a tokio runtime",
            ));
        }

        let key = Arc::new(key);
        let node_id = NodeId::of(key.public_key());
        let public_key_len = key.public_key().to_canonical_bytes().len();
        let stats = Arc::new(EngineStats::default());

        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (registrations_tx, registrations_rx) = mpsc::unbounded_channel();
        let (queries_tx, queries_rx) = mpsc::unbounded_channel();
        let (delivered_tx, delivered_rx) = mpsc::channel(config.delivery_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let graph = Graph {
            key: Arc::clone(&key),
            config: config.clone(),
            seen: HashSet::new(),
            inbound: inbound_rx,
            queries: queries_rx,
            outbound: outbound_tx.clone(),
            delivered: delivered_tx,
            workers: Arc::new(Semaphore::new(config.decrypt_workers)),
            stats: Arc::clone(&stats),
            shutdown: shutdown_rx.clone(),
        };

        let broadcaster = Broadcaster {
            links: Vec::new(),
            registrations: registrations_rx,
            outbound: outbound_rx,
            inbound: inbound_tx.clone(),
            write_timeout: config.link_write_timeout(),
            stats: Arc::clone(&stats),
            shutdown: shutdown_rx,
        };

        let tasks = vec![tokio::spawn(graph.run()), tokio::spawn(broadcaster.run())];

        tracing::info!(
            "engine started: node {node_id}, {} bit key",
            key.public_key().size() * 8
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                key,
                node_id,
                public_key_len,
                config,
                inbound: inbound_tx,
                outbound: outbound_tx,
                registrations: registrations_tx,
                queries: queries_tx,
                deliveries: StdMutex::new(Some(Deliveries { rx: delivered_rx })),
                shutdown: shutdown_tx,
                tasks: Mutex::new(tasks),
                next_link: AtomicU64::new(1),
                stats,
            }),
        })
    }

    /// Start an engine with the default configuration.
    ///
    /// # Errors
    ///
    /// See [`Engine::new`].
    pub fn with_defaults(key: PrivateKey) -> Result<Self> {
        Self::new(key, EngineConfig::default())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Links
// ═══════════════════════════════════════════════════════════════════════════

impl Engine {
    /// Attach a bidirectional stream as a link.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] after [`Engine::shutdown`].
    pub fn add_link<S>(&self, stream: S) -> Result<LinkId>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        self.add_split_link(reader, writer)
    }

    /// Attach a link from separate read and write halves.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] after [`Engine::shutdown`].
    pub fn add_split_link<R, W>(&self, reader: R, writer: W) -> Result<LinkId>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.ensure_running()?;

        let id = LinkId(self.inner.next_link.fetch_add(1, Ordering::Relaxed));
        let (tx, frames) = mpsc::channel::<Frame>(self.inner.config.link_queue_capacity);
        let evict = Arc::new(Notify::new());

        self.inner
            .registrations
            .send(LinkHandle {
                id,
                tx,
                evict: Arc::clone(&evict),
            })
            .map_err(|_| Error::Shutdown)?;

        let link = Link {
            id,
            reader,
            writer,
            frames,
            evict,
            inbound: self.inner.inbound.clone(),
            config: self.inner.config.clone(),
            stats: Arc::clone(&self.inner.stats),
            shutdown: self.inner.shutdown.subscribe(),
        };
        tokio::spawn(link.run());

        EngineStats::incr(&self.inner.stats.links_added);
        tracing::info!("{id}: attached");
        Ok(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Sending and receiving
// ═══════════════════════════════════════════════════════════════════════════

impl Engine {
    /// Sign, encrypt and broadcast a block to `recipient`.
    ///
    /// The cryptographic work runs on the calling task. Returns the hash of
    /// the wire, which later blocks may name as a parent.
    ///
    /// # Errors
    ///
    /// - [`Error::Shutdown`] after [`Engine::shutdown`]
    /// - [`Error::PayloadTooLarge`] if the tail would exceed `max_field_len`
    /// - [`Error::Entropy`], [`Error::CryptoKey`] or [`Error::CryptoSym`] if
    ///   signing or encryption fails; nothing is broadcast in that case
    pub fn send(
        &self,
        recipient: &PublicKey,
        parents: Vec<WireHash>,
        payload: Vec<u8>,
    ) -> Result<WireHash> {
        self.ensure_running()?;

        let max = self.inner.config.max_payload_len(
            self.inner.public_key_len,
            parents.len(),
            self.inner.key.public_key().size(),
        );
        if payload.len() > max {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max,
            });
        }

        let wire = originate(&self.inner.key, recipient, parents, payload)?;
        let frame: Frame = wire.to_canonical_bytes().into();
        let hash = WireHash::of_encoded(&frame);

        self.inner
            .outbound
            .send(Outbound {
                hash,
                frame,
                loopback: Some(wire),
            })
            .map_err(|_| Error::Shutdown)?;

        EngineStats::incr(&self.inner.stats.originated);
        tracing::debug!("originated {hash} for {}", NodeId::of(recipient));
        Ok(hash)
    }

    /// Start a streaming payload for `recipient`.
    #[must_use]
    pub fn sender(&self, recipient: PublicKey) -> Sender {
        Sender::new(self.clone(), recipient)
    }

    /// Take the delivery queue.
    ///
    /// Returns `None` after the first call.
    #[must_use]
    pub fn deliveries(&self) -> Option<Deliveries> {
        self.inner
            .deliveries
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Introspection
// ═══════════════════════════════════════════════════════════════════════════

impl Engine {
    /// Whether a wire with `hash` has passed through this node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] once the graph task has stopped.
    pub async fn has_seen(&self, hash: WireHash) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .queries
            .send(GraphQuery::HasSeen { hash, reply })
            .map_err(|_| Error::Shutdown)?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    /// Number of distinct wires seen.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] once the graph task has stopped.
    pub async fn seen_count(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .queries
            .send(GraphQuery::SeenCount { reply })
            .map_err(|_| Error::Shutdown)?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Links currently attached
    #[must_use]
    pub fn link_count(&self) -> u64 {
        self.stats().active_links()
    }

    /// This node's address
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        self.inner.key.public_key()
    }

    /// This node's short identifier
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.inner.node_id
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Shutdown
// ═══════════════════════════════════════════════════════════════════════════

impl Engine {
    /// Whether [`Engine::shutdown`] has been called
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Stop the engine.
    ///
    /// Link readers stop, already queued wires are written out, links are
    /// closed and the delivery queue ends once in-flight decryptions finish.
    /// Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        let was_shut_down = self.inner.shutdown.send_replace(true);

        let tasks = std::mem::take(&mut *self.inner.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("engine task failed: {e}");
            }
        }

        if !was_shut_down {
            tracing::info!("engine stopped: node {}", self.inner.node_id);
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(Error::Shutdown);
        }
        Ok(())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("node_id", &self.inner.node_id)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// Verified blocks addressed to this node
#[derive(Debug)]
pub struct Deliveries {
    rx: mpsc::Receiver<Block>,
}

impl Deliveries {
    /// Wait for the next block.
    ///
    /// Returns `None` once the engine has shut down and the queue is empty.
    pub async fn recv(&mut self) -> Option<Block> {
        self.rx.recv().await
    }

    /// Take a block if one is ready.
    pub fn try_recv(&mut self) -> Option<Block> {
        self.rx.try_recv().ok()
    }
}
