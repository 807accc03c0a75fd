//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,

    /// RSA key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// RSA-OAEP encryption failed (key too small, message too long)
    #[error("key wrapping failed: {0}")]
    KeyWrap(String),

    /// RSA-OAEP decryption failed: the wrapped key was not produced for this private key
    #[error("not addressed to this key")]
    NotAddressed,

    /// Unwrapped session key has the wrong size
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Symmetric cipher setup failed
    #[error("symmetric cipher setup failed")]
    CipherSetup,

    /// Signing failed
    #[error("signing failed: {0}")]
    Signing(String),

    /// Invalid signature
    #[error("invalid signature")]
    InvalidSignature,

    /// Public key components do not form a usable RSA key
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid key material (corrupted or wrong format)
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
}
