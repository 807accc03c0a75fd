//! RSA identities.
//!
//! A node is addressed by its RSA public key. Two keys denote the same node
//! iff their modulus and public exponent are equal.
//!
//! ```ignore
//! use murmur_crypto::PrivateKey;
//!
//! let key = PrivateKey::generate(4096)?;
//! let pem = key.public_key().to_pem()?;
//! ```

use crate::{CryptoError, MAX_KEY_BITS, MIN_KEY_BITS};
use rand_core::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use std::fmt;
use zeroize::Zeroizing;

/// RSA public key: a node's address.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub(crate) inner: RsaPublicKey,
}

impl PublicKey {
    /// Build a key from a big-endian modulus and a public exponent.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the modulus is outside
    /// [`MIN_KEY_BITS`]..=[`MAX_KEY_BITS`] or the exponent is out of range.
    pub fn from_components(modulus: &[u8], exponent: u64) -> Result<Self, CryptoError> {
        let n = BigUint::from_bytes_be(modulus);
        if (n.bits() as usize) < MIN_KEY_BITS {
            return Err(CryptoError::InvalidPublicKey(format!(
                "modulus of {} bits is below the {MIN_KEY_BITS}-bit minimum",
                n.bits()
            )));
        }
        let e = BigUint::from(exponent);
        let inner = RsaPublicKey::new_with_max_size(n, e, MAX_KEY_BITS)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Modulus, big-endian, without leading zero bytes.
    #[must_use]
    pub fn modulus_bytes(&self) -> Vec<u8> {
        self.inner.n().to_bytes_be()
    }

    /// Public exponent.
    #[must_use]
    pub fn exponent(&self) -> u64 {
        // RsaPublicKey caps the exponent well below 2^64
        self.inner
            .e()
            .to_bytes_be()
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
    }

    /// Modulus size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// Export as SPKI PEM.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] if encoding fails.
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        self.inner
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))
    }

    /// Import from SPKI PEM.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] if the PEM cannot be parsed.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let inner = RsaPublicKey::from_public_key_pem(pem.trim())
            .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modulus = self.modulus_bytes();
        f.debug_struct("PublicKey")
            .field("bits", &(self.size() * 8))
            .field("n", &crate::hash::short_hex(&modulus))
            .field("e", &self.exponent())
            .finish()
    }
}

impl From<RsaPublicKey> for PublicKey {
    fn from(inner: RsaPublicKey) -> Self {
        Self { inner }
    }
}

/// RSA private key with its embedded public key.
///
/// Long-lived per node. Secret parameters are zeroized on drop by `rsa`.
#[derive(Clone)]
pub struct PrivateKey {
    pub(crate) inner: RsaPrivateKey,
    public: PublicKey,
}

impl PrivateKey {
    /// Generate a fresh key pair from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyGeneration`] if `bits` is below
    /// [`MIN_KEY_BITS`] or above [`MAX_KEY_BITS`], or if generation fails.
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&bits) {
            return Err(CryptoError::KeyGeneration(format!(
                "key size {bits} outside {MIN_KEY_BITS}..={MAX_KEY_BITS} bits"
            )));
        }
        let inner = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(Self::from(inner))
    }

    /// The public half.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Export as PKCS#8 PEM.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] if encoding fails.
    pub fn to_pem(&self) -> Result<Zeroizing<String>, CryptoError> {
        self.inner
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))
    }

    /// Import from PKCS#8 PEM.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] if the PEM cannot be parsed
    /// or the key fails its consistency check.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let inner = RsaPrivateKey::from_pkcs8_pem(pem.trim())
            .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;
        inner
            .validate()
            .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self::from(inner))
    }
}

impl From<RsaPrivateKey> for PrivateKey {
    fn from(inner: RsaPrivateKey) -> Self {
        let public = PublicKey {
            inner: inner.to_public_key(),
        };
        Self { inner, public }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
