//! Per-block session keys.
//!
//! Each block tail is encrypted under a fresh 256-bit key with AES-256 in OFB
//! mode and an all-zero IV. The key is then wrapped for the recipient with
//! RSA-OAEP (SHA-512, empty label).
//!
//! A zero IV is only sound while every key encrypts exactly one tail, so a
//! [`SessionKey`] can only be created by [`SessionKey::generate`] or by
//! unwrapping, is not `Clone`, and is consumed by the call that uses it.
//!
//! ```ignore
//! let key = SessionKey::generate()?;
//! let wrapped = key.seal(&recipient, &mut tail_bytes)?;
//!
//! let key = unwrap_session_key(&private_key, &wrapped)?;
//! key.open(&mut tail_bytes)?;
//! ```

use crate::keys::{PrivateKey, PublicKey};
use crate::random::fill_random;
use crate::{AES_BLOCK_SIZE, CryptoError, SESSION_KEY_SIZE};
use ofb::cipher::{KeyIvInit, StreamCipher};
use rand_core::OsRng;
use rsa::Oaep;
use sha2::Sha512;
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes256Ofb = ofb::Ofb<aes::Aes256>;

const ZERO_IV: [u8; AES_BLOCK_SIZE] = [0u8; AES_BLOCK_SIZE];

/// Single-use AES-256 key for one block tail.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    /// Draw a fresh key from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if the CSPRNG fails.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut key = [0u8; SESSION_KEY_SIZE];
        fill_random(&mut key)?;
        Ok(Self(key))
    }

    /// Encrypt `buf` in place and wrap this key for `recipient`.
    ///
    /// Returns the RSA-OAEP ciphertext of the key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyWrap`] if the recipient key cannot carry an
    /// OAEP-SHA512 payload, or [`CryptoError::CipherSetup`] if the stream
    /// cipher cannot be initialised.
    pub fn seal(self, recipient: &PublicKey, buf: &mut [u8]) -> Result<Vec<u8>, CryptoError> {
        let wrapped = recipient
            .inner
            .encrypt(&mut OsRng, Oaep::new::<Sha512>(), &self.0)
            .map_err(|e| CryptoError::KeyWrap(e.to_string()))?;
        apply_ofb(&self.0, &ZERO_IV, buf)?;
        Ok(wrapped)
    }

    /// Decrypt `buf` in place.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::CipherSetup`] if the stream cipher cannot be
    /// initialised.
    pub fn open(self, buf: &mut [u8]) -> Result<(), CryptoError> {
        apply_ofb(&self.0, &ZERO_IV, buf)
    }
}

/// Recover the session key wrapped for `private_key`.
///
/// # Errors
///
/// Returns [`CryptoError::NotAddressed`] when OAEP decoding fails, which is
/// the expected outcome for wires addressed to someone else, and
/// [`CryptoError::InvalidKeyLength`] if the unwrapped key is not 32 bytes.
pub fn unwrap_session_key(
    private_key: &PrivateKey,
    wrapped: &[u8],
) -> Result<SessionKey, CryptoError> {
    let mut plain = private_key
        .inner
        .decrypt_blinded(&mut OsRng, Oaep::new::<Sha512>(), wrapped)
        .map_err(|e| match e {
            rsa::Error::Decryption => CryptoError::NotAddressed,
            other => CryptoError::KeyWrap(other.to_string()),
        })?;

    if plain.len() != SESSION_KEY_SIZE {
        let actual = plain.len();
        plain.zeroize();
        return Err(CryptoError::InvalidKeyLength {
            expected: SESSION_KEY_SIZE,
            actual,
        });
    }

    let mut key = [0u8; SESSION_KEY_SIZE];
    key.copy_from_slice(&plain);
    plain.zeroize();
    Ok(SessionKey(key))
}

fn apply_ofb(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), CryptoError> {
    let mut cipher =
        Aes256Ofb::new_from_slices(key, iv).map_err(|_| CryptoError::CipherSetup)?;
    cipher.apply_keystream(buf);
    Ok(())
}
