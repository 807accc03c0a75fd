//! Engine configuration

use crate::encoding::DEFAULT_MAX_FIELD_LEN;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest accepted `max_field_len`; anything lower cannot carry a key
const MIN_FIELD_LEN: usize = 1024;

/// What a link reader does with a frame that is well delimited but does not
/// decode to a wire (for example an unusable embedded key)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Close the link
    #[default]
    Strict,
    /// Log, drop the frame and keep reading
    Permissive,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wires buffered between link readers and the graph task
    pub inbound_capacity: usize,

    /// Blocks buffered for the application before new ones are dropped
    pub delivery_capacity: usize,

    /// Encoded wires buffered per link writer
    pub link_queue_capacity: usize,

    /// How long the broadcaster waits on a full link queue before closing
    /// that link, in milliseconds
    pub link_write_timeout_ms: u64,

    /// Largest length prefix accepted from a link
    pub max_field_len: usize,

    /// Concurrent decrypt-and-verify jobs
    pub decrypt_workers: usize,

    /// Handling of frames that are delimited but undecodable
    pub decode_policy: DecodePolicy,

    /// Deliver wires this node sends to itself
    pub loopback_own: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 1024,
            delivery_capacity: 256,
            link_queue_capacity: 256,
            link_write_timeout_ms: 10_000,
            max_field_len: DEFAULT_MAX_FIELD_LEN,
            decrypt_workers: 4,
            decode_policy: DecodePolicy::Strict,
            loopback_own: true,
        }
    }
}

impl EngineConfig {
    /// Check that every capacity is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let capacities = [
            ("inbound_capacity", self.inbound_capacity),
            ("delivery_capacity", self.delivery_capacity),
            ("link_queue_capacity", self.link_queue_capacity),
            ("decrypt_workers", self.decrypt_workers),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(Error::invalid_config(format!("{name} must be non-zero")));
            }
        }

        if self.link_write_timeout_ms == 0 {
            return Err(Error::invalid_config("link_write_timeout_ms must be non-zero"));
        }

        if self.max_field_len < MIN_FIELD_LEN {
            return Err(Error::invalid_config(format!(
                "max_field_len must be at least {MIN_FIELD_LEN} bytes"
            )));
        }

        if self.max_field_len > u32::MAX as usize {
            return Err(Error::invalid_config(
                "max_field_len cannot exceed a u32 length prefix",
            ));
        }

        Ok(())
    }

    /// Write timeout as a [`Duration`]
    #[must_use]
    pub fn link_write_timeout(&self) -> Duration {
        Duration::from_millis(self.link_write_timeout_ms)
    }

    /// Largest payload that still yields a tail within `max_field_len`.
    ///
    /// `sender_key_len` is the encoded size of the sender's public key.
    #[must_use]
    pub fn max_payload_len(
        &self,
        sender_key_len: usize,
        parents: usize,
        signature_len: usize,
    ) -> usize {
        let overhead = sender_key_len
            + 4
            + parents.saturating_mul(murmur_crypto::HASH_SIZE)
            + 4
            + 4
            + signature_len;
        self.max_field_len.saturating_sub(overhead)
    }
}
