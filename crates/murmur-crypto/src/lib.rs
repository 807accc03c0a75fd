//! # murmur Crypto
//!
//! Cryptographic primitives for the murmur flood overlay.
//!
//! This crate provides:
//! - RSA identities (a node's public key is its address)
//! - RSA-OAEP wrapping of per-block session keys
//! - AES-256 OFB keystream for block tails
//! - RSA PKCS#1 v1.5 signatures over SHA-512 digests
//! - SHA-512 hashing
//! - Secure random number generation
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Notes |
//! |----------|-----------|-------|
//! | Identity | RSA | key size chosen by the operator (4096-bit reference) |
//! | Key Wrapping | RSA-OAEP | SHA-512 digest and MGF1, empty label |
//! | Tail Encryption | AES-256-OFB | 16-byte zero IV, single-use key |
//! | Signatures | RSA PKCS#1 v1.5 | SHA-512 |
//! | Hash | SHA-512 | 64-byte digests |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod hash;
pub mod keys;
pub mod random;
pub mod session;
pub mod signatures;

pub use error::CryptoError;
pub use hash::{Digest512, sha512};
pub use keys::{PrivateKey, PublicKey};
pub use session::{SessionKey, unwrap_session_key};

/// SHA-512 output size
pub const HASH_SIZE: usize = 64;

/// AES-256 key size
pub const SESSION_KEY_SIZE: usize = 32;

/// AES block size, and so the OFB IV size
pub const AES_BLOCK_SIZE: usize = 16;

/// RSA modulus size used by reference deployments
pub const DEFAULT_KEY_BITS: usize = 4096;

/// Largest RSA modulus accepted from the network
pub const MAX_KEY_BITS: usize = 8192;

/// Smallest RSA modulus that can carry an OAEP-SHA512 wrapped session key
///
/// OAEP overhead is `2 * 64 + 2` bytes, plus the 32-byte session key.
pub const MIN_KEY_BITS: usize = (2 * HASH_SIZE + 2 + SESSION_KEY_SIZE) * 8;
