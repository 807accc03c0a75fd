//! RSA PKCS#1 v1.5 signatures over SHA-512 digests.
//!
//! The signed message is always the SHA-512 digest of some canonical byte
//! string; the DigestInfo prefix for SHA-512 is applied by the padding.
//!
//! ## Security Properties
//!
//! - Signing uses RSA blinding (randomness from the OS CSPRNG)
//! - Verification is against the key the signer claims, so a forged
//!   sender identity fails verification
//!
//! ```ignore
//! let signature = key.sign_message(b"vault bytes")?;
//! key.public_key().verify_message(b"vault bytes", &signature)?;
//! ```

use crate::hash::{Digest512, sha512};
use crate::keys::{PrivateKey, PublicKey};
use crate::CryptoError;
use rand_core::OsRng;
use rsa::Pkcs1v15Sign;
use sha2::Sha512;

impl PrivateKey {
    /// Sign a precomputed SHA-512 digest.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Signing`] if the RSA operation fails.
    pub fn sign_digest(&self, digest: &Digest512) -> Result<Vec<u8>, CryptoError> {
        self.inner
            .sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<Sha512>(), digest)
            .map_err(|e| CryptoError::Signing(e.to_string()))
    }

    /// Hash `message` with SHA-512 and sign the digest.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Signing`] if the RSA operation fails.
    pub fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.sign_digest(&sha512(message))
    }
}

impl PublicKey {
    /// Verify a signature over a precomputed SHA-512 digest.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if the signature is invalid,
    /// malformed, or was made by a different key.
    pub fn verify_digest(&self, digest: &Digest512, signature: &[u8]) -> Result<(), CryptoError> {
        self.inner
            .verify(Pkcs1v15Sign::new::<Sha512>(), digest, signature)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// Hash `message` with SHA-512 and verify the signature over the digest.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if verification fails.
    pub fn verify_message(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        self.verify_digest(&sha512(message), signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn keys() -> &'static (PrivateKey, PrivateKey) {
        static KEYS: OnceLock<(PrivateKey, PrivateKey)> = OnceLock::new();
        KEYS.get_or_init(|| {
            (
                PrivateKey::generate(2048).unwrap(),
                PrivateKey::generate(2048).unwrap(),
            )
        })
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let (key, _) = keys();
        let message = b"authenticate this message";
        let signature = key.sign_message(message).unwrap();

        assert_eq!(signature.len(), key.public_key().size());
        assert!(key.public_key().verify_message(message, &signature).is_ok());
    }

    #[test]
    fn test_wrong_message_fails_verification() {
        let (key, _) = keys();
        let signature = key.sign_message(b"original message").unwrap();

        assert!(matches!(
            key.public_key().verify_message(b"tampered message", &signature),
            Err(CryptoError::InvalidSignature)
        ));
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let (key1, key2) = keys();
        let signature = key1.sign_message(b"test").unwrap();

        assert!(key2.public_key().verify_message(b"test", &signature).is_err());
    }

    #[test]
    fn test_pkcs1v15_is_deterministic() {
        let (key, _) = keys();

        // Blinding does not change the PKCS#1 v1.5 output
        let sig1 = key.sign_message(b"deterministic").unwrap();
        let sig2 = key.sign_message(b"deterministic").unwrap();
        assert_eq!(sig1, sig2);
    }

    #[test]
    fn test_tampered_signature_fails() {
        let (key, _) = keys();
        let mut signature = key.sign_message(b"test message").unwrap();
        signature[10] ^= 0x01;

        assert!(key.public_key().verify_message(b"test message", &signature).is_err());
    }

    #[test]
    fn test_truncated_signature_fails() {
        let (key, _) = keys();
        let signature = key.sign_message(b"x").unwrap();

        assert!(key.public_key().verify_message(b"x", &signature[1..]).is_err());
        assert!(key.public_key().verify_message(b"x", &[]).is_err());
    }

    #[test]
    fn test_sign_digest_matches_sign_message() {
        let (key, _) = keys();
        let digest = sha512(b"payload");

        let signature = key.sign_digest(&digest).unwrap();
        assert!(key.public_key().verify_message(b"payload", &signature).is_ok());
    }
}
