//! Flood-routing engine
//!
//! The engine connects a set of links and floods every wire it has not seen
//! before to all of them, including the link it arrived on. Wires addressed
//! to this node are additionally decrypted, verified and handed to the
//! application.
//!
//! # Guarantees
//!
//! - A wire is re-broadcast at most once per node lifetime
//! - A delivered block always carries a valid signature of its sender
//! - Wires read from one link reach the graph task in arrival order
//!
//! Nothing else is ordered: two links, or two wires from different senders,
//! may be processed in any order.

mod broadcast;
pub mod config;
#[allow(clippy::module_inception)]
pub mod engine;
mod graph;
pub mod link;
pub mod sender;
pub mod stats;

pub use config::{DecodePolicy, EngineConfig};
pub use engine::{Deliveries, Engine};
pub use link::LinkId;
pub use sender::Sender;
pub use stats::StatsSnapshot;
