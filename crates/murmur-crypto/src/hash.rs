//! SHA-512 hashing.
//!
//! Every digest in the protocol is SHA-512: wire identifiers, parent
//! references, node ids and the message covered by block signatures.

use sha2::{Digest, Sha512};

/// SHA-512 output (64 bytes).
pub type Digest512 = [u8; 64];

/// Compute the SHA-512 hash of input data.
#[must_use]
pub fn sha512(data: &[u8]) -> Digest512 {
    Sha512::digest(data).into()
}

/// Render the first 8 bytes of a digest as hex, for logs.
#[must_use]
pub fn short_hex(digest: &[u8]) -> String {
    hex::encode(&digest[..digest.len().min(8)])
}
