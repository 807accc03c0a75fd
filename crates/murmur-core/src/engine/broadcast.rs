//! Broadcast task: writes every outbound wire to every link.
//!
//! Each wire is encoded once and the same buffer is queued on every link
//! writer. A full queue applies backpressure: the broadcaster waits for room
//! up to `link_write_timeout`, and a link that stays full that long is
//! evicted and closed rather than silently skipped. A closed queue removes
//! the link from the set. Originated wires are then looped back to the graph
//! task so they enter the seen set.

use crate::engine::graph::{Ingress, Origin, Outbound};
use crate::engine::link::LinkHandle;
use crate::engine::stats::EngineStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, watch};

pub(crate) struct Broadcaster {
    pub(crate) links: Vec<LinkHandle>,
    pub(crate) registrations: mpsc::UnboundedReceiver<LinkHandle>,
    pub(crate) outbound: mpsc::UnboundedReceiver<Outbound>,
    pub(crate) inbound: mpsc::Sender<Ingress>,
    pub(crate) write_timeout: Duration,
    pub(crate) stats: Arc<EngineStats>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl Broadcaster {
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = async { self.shutdown.wait_for(|stop| *stop).await.is_ok() } => break,
                Some(link) = self.registrations.recv() => {
                    tracing::debug!("{}: joined broadcast set", link.id);
                    self.links.push(link);
                }
                Some(out) = self.outbound.recv() => self.broadcast(out).await,
                else => break,
            }
        }

        // Pick up links registered just before shutdown, then drain
        while let Ok(link) = self.registrations.try_recv() {
            self.links.push(link);
        }
        let mut drained = 0usize;
        while let Ok(mut out) = self.outbound.try_recv() {
            out.loopback = None;
            self.broadcast(out).await;
            drained += 1;
        }

        tracing::debug!(
            "broadcaster stopped, drained {drained} wires to {} links",
            self.links.len()
        );
        // Dropping the handles lets each link writer flush and close
    }

    async fn broadcast(&mut self, out: Outbound) {
        EngineStats::incr(&self.stats.broadcasts);

        let links = std::mem::take(&mut self.links);
        for link in links {
            match link
                .tx
                .send_timeout(Arc::clone(&out.frame), self.write_timeout)
                .await
            {
                Ok(()) => self.links.push(link),
                Err(SendTimeoutError::Timeout(_)) => {
                    EngineStats::incr(&self.stats.links_stalled);
                    tracing::warn!(
                        "{}: write queue full for {:?}, closing link",
                        link.id,
                        self.write_timeout
                    );
                    link.evict.notify_one();
                }
                Err(SendTimeoutError::Closed(_)) => {
                    tracing::debug!("{}: left broadcast set", link.id);
                }
            }
        }

        if let Some(wire) = out.loopback {
            let ingress = Ingress {
                wire,
                frame: out.frame,
                origin: Origin::Loopback,
            };
            if self.inbound.send(ingress).await.is_err() {
                tracing::debug!("graph task gone, {} not looped back", out.hash);
            }
        }
    }
}
