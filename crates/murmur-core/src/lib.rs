//! # murmur Core
//!
//! Core protocol implementation for the murmur flood overlay.
//!
//! This crate provides:
//! - Canonical binary encoding of every hashed or transmitted value
//! - The block model and its codec (sign, encrypt, decrypt, verify)
//! - The flood-routing engine: links, duplicate suppression, delivery
//! - Error types and handling
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Engine                                  │
//! │   (links, seen set, broadcast, decrypt-and-deliver)             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                          Blocks                                  │
//! │   (signed vaults, RSA-OAEP wrapped keys, AES-OFB tails)         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                      Canonical encoding                          │
//! │   (big-endian integers, length-prefixed fields)                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod block;
pub mod encoding;
pub mod engine;
pub mod error;

pub use block::{Block, Head, NodeId, Tail, Vault, Wire, WireHash, originate};
pub use encoding::{Decode, Encode};
pub use engine::{DecodePolicy, Deliveries, Engine, EngineConfig, LinkId, Sender, StatsSnapshot};
pub use error::{CodecError, Error, Result};
