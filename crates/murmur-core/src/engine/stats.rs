//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, shared by every engine task
#[derive(Debug, Default)]
pub(crate) struct EngineStats {
    pub(crate) wires_received: AtomicU64,
    pub(crate) duplicates_dropped: AtomicU64,
    pub(crate) forwarded: AtomicU64,
    pub(crate) originated: AtomicU64,
    pub(crate) broadcasts: AtomicU64,
    pub(crate) links_stalled: AtomicU64,
    pub(crate) delivered: AtomicU64,
    pub(crate) deliveries_dropped: AtomicU64,
    pub(crate) not_addressed: AtomicU64,
    pub(crate) malformed: AtomicU64,
    pub(crate) bad_signatures: AtomicU64,
    pub(crate) links_added: AtomicU64,
    pub(crate) links_closed: AtomicU64,
}

impl EngineStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            wires_received: load(&self.wires_received),
            duplicates_dropped: load(&self.duplicates_dropped),
            forwarded: load(&self.forwarded),
            originated: load(&self.originated),
            broadcasts: load(&self.broadcasts),
            links_stalled: load(&self.links_stalled),
            delivered: load(&self.delivered),
            deliveries_dropped: load(&self.deliveries_dropped),
            not_addressed: load(&self.not_addressed),
            malformed: load(&self.malformed),
            bad_signatures: load(&self.bad_signatures),
            links_added: load(&self.links_added),
            links_closed: load(&self.links_closed),
        }
    }
}

/// Point-in-time copy of the engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Wires that reached the graph task, from links or loopback
    pub wires_received: u64,
    /// Wires dropped because their hash was already seen
    pub duplicates_dropped: u64,
    /// Fresh wires from links queued for re-broadcast
    pub forwarded: u64,
    /// Wires created by this node
    pub originated: u64,
    /// Broadcast passes over the link set
    pub broadcasts: u64,
    /// Links closed because their write queue stayed full
    pub links_stalled: u64,
    /// Blocks handed to the application
    pub delivered: u64,
    /// Verified blocks dropped because the application was not reading
    pub deliveries_dropped: u64,
    /// Wires addressed to someone else, or that failed to unwrap
    pub not_addressed: u64,
    /// Frames or tails that failed to decode
    pub malformed: u64,
    /// Blocks that decrypted but failed signature verification
    pub bad_signatures: u64,
    /// Links attached since start
    pub links_added: u64,
    /// Links that have terminated
    pub links_closed: u64,
}

impl StatsSnapshot {
    /// Links currently attached
    #[must_use]
    pub fn active_links(&self) -> u64 {
        self.links_added.saturating_sub(self.links_closed)
    }
}
