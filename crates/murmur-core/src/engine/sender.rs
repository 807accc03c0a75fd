//! Streaming payload builder.
//!
//! A [`Sender`] collects payload bytes through [`std::io::Write`] and turns
//! them into exactly one wire on [`Sender::finish`]. The payload is signed as
//! a whole, so nothing leaves the node before `finish`.

use crate::block::WireHash;
use crate::engine::Engine;
use crate::error::Result;
use murmur_crypto::PublicKey;
use std::io;

/// Accumulates one payload for a recipient
#[derive(Debug)]
pub struct Sender {
    engine: Engine,
    recipient: PublicKey,
    parents: Vec<WireHash>,
    payload: Vec<u8>,
}

impl Sender {
    pub(crate) fn new(engine: Engine, recipient: PublicKey) -> Self {
        Self {
            engine,
            recipient,
            parents: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Reference earlier wires from this block.
    #[must_use]
    pub fn with_parents(mut self, parents: Vec<WireHash>) -> Self {
        self.parents = parents;
        self
    }

    /// Recipient of the pending block
    #[must_use]
    pub fn recipient(&self) -> &PublicKey {
        &self.recipient
    }

    /// Bytes written so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether nothing has been written yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Sign, encrypt and broadcast the accumulated payload.
    ///
    /// # Errors
    ///
    /// Any error of [`Engine::send`].
    pub fn finish(self) -> Result<WireHash> {
        self.engine.send(&self.recipient, self.parents, self.payload)
    }
}

impl io::Write for Sender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.payload.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
