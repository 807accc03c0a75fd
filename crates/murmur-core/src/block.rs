//! Blocks and wires.
//!
//! A [`Block`] is the plaintext unit an application sends: a head naming the
//! recipient and a signed tail carrying the sender, parent references and
//! payload. A [`Wire`] is what travels between nodes: the same head, the
//! tail's session key wrapped for the recipient, and the encrypted tail.
//!
//! ```text
//! Wire = pubkey(to) || bytes(encrypted_key) || bytes(encrypted_tail)
//! Tail = pubkey(from) || digests(parents) || bytes(payload) || bytes(signature)
//! ```
//!
//! The recipient's key is visible to every relay. The sender and payload are
//! visible only to the recipient.

use crate::encoding::{Decode, Encode, Reader, Segment, put_bytes, put_digests};
use crate::error::{CodecError, Error, Result};
use murmur_crypto::{
    Digest512, HASH_SIZE, PrivateKey, PublicKey, SessionKey, hash::short_hex, sha512,
    unwrap_session_key,
};
use std::fmt;

/// Identifier of a wire: SHA-512 of its canonical encoding
///
/// Also used as a parent reference inside a vault. Parents are opaque; they
/// need not refer to any wire this node has seen.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WireHash([u8; HASH_SIZE]);

impl WireHash {
    /// Wrap raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Hash an already-encoded wire.
    #[must_use]
    pub fn of_encoded(encoded: &[u8]) -> Self {
        Self(sha512(encoded))
    }

    /// Raw digest bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Full lowercase hex
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for WireHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&short_hex(&self.0))
    }
}

impl fmt::Debug for WireHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WireHash({})", short_hex(&self.0))
    }
}

impl From<Digest512> for WireHash {
    fn from(bytes: Digest512) -> Self {
        Self(bytes)
    }
}

/// Short, stable identifier of a node: SHA-512 of its canonical public key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId([u8; HASH_SIZE]);

impl NodeId {
    /// Node id of the holder of `key`.
    #[must_use]
    pub fn of(key: &PublicKey) -> Self {
        Self(sha512(&key.to_canonical_bytes()))
    }

    /// Raw digest bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&short_hex(&self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", short_hex(&self.0))
    }
}

/// Cleartext routing part of a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head {
    /// Recipient
    pub to: PublicKey,
}

impl Head {
    /// Whether this head addresses the holder of `key`.
    #[must_use]
    pub fn is_to(&self, key: &PublicKey) -> bool {
        &self.to == key
    }
}

/// Signed content of a block
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Vault {
    /// Digests of earlier wires this block refers to
    pub parents: Vec<WireHash>,
    /// Opaque application payload
    pub payload: Vec<u8>,
}

impl Vault {
    /// SHA-512 of the canonical vault: the message covered by the signature
    #[must_use]
    pub fn digest(&self) -> Digest512 {
        sha512(&self.to_canonical_bytes())
    }

    /// Sign this vault with `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CryptoKey`] if the RSA operation fails.
    pub fn sign(&self, key: &PrivateKey) -> Result<Vec<u8>> {
        Ok(key.sign_digest(&self.digest())?)
    }
}

impl Encode for Vault {
    fn encode_into(&self, out: &mut Vec<u8>) {
        put_digests(out, self.parents.iter().map(WireHash::as_bytes));
        put_bytes(out, &self.payload);
    }
}

impl Decode for Vault {
    fn decode_from(reader: &mut Reader<'_>) -> std::result::Result<Self, CodecError> {
        let parents = reader.digests()?.into_iter().map(WireHash).collect();
        let payload = reader.bytes()?.to_vec();
        Ok(Self { parents, payload })
    }
}

/// Encrypted part of a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tail {
    /// Sender
    pub from: PublicKey,
    /// Signed content
    pub vault: Vault,
    /// PKCS#1 v1.5 signature of `from` over the vault digest
    pub signature: Vec<u8>,
}

impl Tail {
    /// Whether this tail claims to come from the holder of `key`.
    #[must_use]
    pub fn is_from(&self, key: &PublicKey) -> bool {
        &self.from == key
    }
}

impl Encode for Tail {
    fn encode_into(&self, out: &mut Vec<u8>) {
        self.from.encode_into(out);
        self.vault.encode_into(out);
        put_bytes(out, &self.signature);
    }
}

impl Decode for Tail {
    fn decode_from(reader: &mut Reader<'_>) -> std::result::Result<Self, CodecError> {
        let from = PublicKey::decode_from(reader)?;
        let vault = Vault::decode_from(reader)?;
        let signature = reader.bytes()?.to_vec();
        Ok(Self {
            from,
            vault,
            signature,
        })
    }
}

/// Plaintext unit exchanged between applications
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Routing part
    pub head: Head,
    /// Sender, content and signature
    pub tail: Tail,
}

impl Block {
    /// Build and sign a block from `key` to `recipient`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] if the payload cannot be length
    /// prefixed, or [`Error::CryptoKey`] if signing fails.
    pub fn new_signed(
        key: &PrivateKey,
        recipient: &PublicKey,
        parents: Vec<WireHash>,
        payload: Vec<u8>,
    ) -> Result<Self> {
        let max = u32::MAX as usize;
        if payload.len() > max {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max,
            });
        }

        let vault = Vault { parents, payload };
        let signature = vault.sign(key)?;

        Ok(Self {
            head: Head {
                to: recipient.clone(),
            },
            tail: Tail {
                from: key.public_key().clone(),
                vault,
                signature,
            },
        })
    }

    /// Encrypt this block into a wire for its recipient.
    ///
    /// A fresh session key encrypts the canonical tail and is wrapped with
    /// RSA-OAEP for `head.to`.
    ///
    /// # Errors
    ///
    /// - [`Error::Entropy`] if no session key could be drawn
    /// - [`Error::CryptoKey`] if the recipient key cannot wrap a session key
    /// - [`Error::CryptoSym`] if the stream cipher cannot be initialised
    pub fn encode(&self) -> Result<Wire> {
        let session_key = SessionKey::generate()?;
        let mut encrypted_tail = self.tail.to_canonical_bytes();
        let encrypted_key = session_key.seal(&self.head.to, &mut encrypted_tail)?;

        Ok(Wire {
            head: self.head.clone(),
            encrypted_key,
            encrypted_tail,
        })
    }

    /// Check the tail signature against the sender it claims.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadSignature`] if the signature does not verify.
    pub fn verify(&self) -> Result<()> {
        let digest = self.tail.vault.digest();
        self.tail
            .from
            .verify_digest(&digest, &self.tail.signature)
            .map_err(|_| Error::BadSignature)
    }

    /// Sender of this block
    #[must_use]
    pub fn sender(&self) -> &PublicKey {
        &self.tail.from
    }

    /// Application payload
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.tail.vault.payload
    }

    /// Parent references
    #[must_use]
    pub fn parents(&self) -> &[WireHash] {
        &self.tail.vault.parents
    }
}

/// Encrypted unit carried on links and flooded between nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wire {
    /// Cleartext routing part
    pub head: Head,
    /// Session key, RSA-OAEP encrypted for `head.to`
    pub encrypted_key: Vec<u8>,
    /// Canonical tail, AES-256-OFB encrypted under the session key
    pub encrypted_tail: Vec<u8>,
}

impl Wire {
    /// Top-level field layout of an encoded wire.
    ///
    /// Modulus, exponent, wrapped key, encrypted tail.
    pub const FRAME_LAYOUT: &'static [Segment] = &[
        Segment::Prefixed,
        Segment::Fixed(8),
        Segment::Prefixed,
        Segment::Prefixed,
    ];

    /// Identifier of this wire.
    #[must_use]
    pub fn hash(&self) -> WireHash {
        WireHash::of_encoded(&self.to_canonical_bytes())
    }

    /// Decrypt this wire with `key`.
    ///
    /// The signature is not checked; see [`Block::verify`].
    ///
    /// # Errors
    ///
    /// - [`Error::NotAddressed`] if the session key was not wrapped for `key`
    /// - [`Error::CryptoKey`] if unwrapping fails for another reason
    /// - [`Error::CryptoSym`] if the stream cipher cannot be initialised
    /// - [`Error::Malformed`] if the decrypted tail does not parse
    pub fn decode(&self, key: &PrivateKey) -> Result<Block> {
        let session_key = unwrap_session_key(key, &self.encrypted_key)?;

        let mut tail_bytes = self.encrypted_tail.clone();
        session_key.open(&mut tail_bytes)?;
        let tail = Tail::from_canonical_bytes(&tail_bytes)?;

        Ok(Block {
            head: self.head.clone(),
            tail,
        })
    }

    /// Decrypt and verify in one step, as the delivery path does.
    ///
    /// # Errors
    ///
    /// Any error of [`Wire::decode`] or [`Block::verify`].
    pub fn open(&self, key: &PrivateKey) -> Result<Block> {
        let block = self.decode(key)?;
        block.verify()?;
        Ok(block)
    }
}

impl Encode for Wire {
    fn encode_into(&self, out: &mut Vec<u8>) {
        self.head.to.encode_into(out);
        put_bytes(out, &self.encrypted_key);
        put_bytes(out, &self.encrypted_tail);
    }
}

impl Decode for Wire {
    fn decode_from(reader: &mut Reader<'_>) -> std::result::Result<Self, CodecError> {
        let to = PublicKey::decode_from(reader)?;
        let encrypted_key = reader.bytes()?.to_vec();
        let encrypted_tail = reader.bytes()?.to_vec();
        Ok(Self {
            head: Head { to },
            encrypted_key,
            encrypted_tail,
        })
    }
}

/// Build, sign and encrypt a block in one step.
///
/// # Errors
///
/// Any error of [`Block::new_signed`] or [`Block::encode`].
pub fn originate(
    key: &PrivateKey,
    recipient: &PublicKey,
    parents: Vec<WireHash>,
    payload: Vec<u8>,
) -> Result<Wire> {
    Block::new_signed(key, recipient, parents, payload)?.encode()
}
