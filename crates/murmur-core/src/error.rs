//! Error types for the murmur core protocol.

use std::borrow::Cow;
use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, Error)]
pub enum Error {
    /// The OS entropy source failed; retry may succeed
    #[error("entropy source failed")]
    Entropy,

    /// An asymmetric key operation failed (wrap, sign, bad key material)
    #[error("key operation failed: {0}")]
    CryptoKey(String),

    /// The wire is not addressed to this node
    #[error("wire not addressed to this node")]
    NotAddressed,

    /// The symmetric cipher could not be initialised
    #[error("symmetric cipher failed")]
    CryptoSym,

    /// The block signature does not verify against the claimed sender
    #[error("bad signature")]
    BadSignature,

    /// A wire or tail could not be decoded
    #[error("malformed input: {0}")]
    Malformed(#[from] CodecError),

    /// Reading from or writing to a link failed
    #[error("link I/O error: {0}")]
    LinkIo(#[from] std::io::Error),

    /// Payload cannot be carried in a single wire
    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload length
        len: usize,
        /// Largest accepted payload length
        max: usize,
    },

    /// Invalid engine configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    /// The engine has been shut down
    #[error("engine is shut down")]
    Shutdown,
}

impl Error {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Check if this error is expected on the ingress path and only dropped
    ///
    /// Most wires a node sees are for somebody else, and corrupted or forged
    /// wires are simply discarded.
    pub fn is_ingress_tolerable(&self) -> bool {
        matches!(
            self,
            Self::NotAddressed
                | Self::CryptoKey(_)
                | Self::BadSignature
                | Self::Malformed(_)
                | Self::CryptoSym
        )
    }

    /// Check if retrying the same operation may succeed
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Entropy | Self::LinkIo(_))
    }
}

impl From<murmur_crypto::CryptoError> for Error {
    fn from(err: murmur_crypto::CryptoError) -> Self {
        use murmur_crypto::CryptoError;

        match err {
            CryptoError::RandomFailed => Self::Entropy,
            CryptoError::NotAddressed => Self::NotAddressed,
            CryptoError::CipherSetup => Self::CryptoSym,
            CryptoError::InvalidSignature => Self::BadSignature,
            other => Self::CryptoKey(other.to_string()),
        }
    }
}

/// Canonical decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input ended inside a field
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd {
        /// Bytes the field required
        needed: usize,
        /// Bytes left in the input
        remaining: usize,
    },

    /// A length prefix exceeds the configured field limit
    #[error("field length {len} exceeds limit {max}")]
    FieldTooLarge {
        /// Declared length
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// Input continues after a complete value
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    /// An encoding that decodes but would not re-encode to the same bytes
    #[error("non-canonical encoding: {0}")]
    NonCanonical(&'static str),

    /// An embedded public key is not a usable RSA key
    #[error("invalid public key: {0}")]
    InvalidKey(String),
}

impl CodecError {
    /// Structural errors desynchronise a byte stream; the link cannot continue
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::UnexpectedEnd { .. } | Self::FieldTooLarge { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_crypto::CryptoError;

    #[test]
    fn test_crypto_error_mapping() {
        assert!(matches!(Error::from(CryptoError::RandomFailed), Error::Entropy));
        assert!(matches!(
            Error::from(CryptoError::NotAddressed),
            Error::NotAddressed
        ));
        assert!(matches!(Error::from(CryptoError::CipherSetup), Error::CryptoSym));
        assert!(matches!(
            Error::from(CryptoError::InvalidSignature),
            Error::BadSignature
        ));
        assert!(matches!(
            Error::from(CryptoError::KeyWrap("too small".into())),
            Error::CryptoKey(_)
        ));
    }

    #[test]
    fn test_ingress_tolerable() {
        assert!(Error::NotAddressed.is_ingress_tolerable());
        assert!(Error::BadSignature.is_ingress_tolerable());
        assert!(Error::Malformed(CodecError::TrailingBytes(1)).is_ingress_tolerable());
        assert!(Error::CryptoKey("wrapped key too long".into()).is_ingress_tolerable());
        assert!(Error::CryptoSym.is_ingress_tolerable());
        assert!(!Error::Shutdown.is_ingress_tolerable());
        assert!(!Error::Entropy.is_ingress_tolerable());
    }

    #[test]
    fn test_should_retry() {
        assert!(Error::Entropy.should_retry());
        assert!(Error::LinkIo(std::io::Error::other("reset")).should_retry());
        assert!(!Error::BadSignature.should_retry());
        assert!(!Error::Shutdown.should_retry());
    }

    #[test]
    fn test_codec_error_structural() {
        assert!(
            CodecError::UnexpectedEnd {
                needed: 4,
                remaining: 1
            }
            .is_structural()
        );
        assert!(CodecError::FieldTooLarge { len: 10, max: 5 }.is_structural());
        assert!(!CodecError::InvalidKey("zero modulus".into()).is_structural());
        assert!(!CodecError::TrailingBytes(3).is_structural());
    }

    #[test]
    fn test_error_display() {
        let err = Error::PayloadTooLarge { len: 20, max: 10 };
        assert_eq!(err.to_string(), "payload too large: 20 bytes (max 10)");

        let err = Error::invalid_config("inbound_capacity must be non-zero");
        assert!(err.to_string().contains("inbound_capacity"));
    }
}
