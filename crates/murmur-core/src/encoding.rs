//! Canonical binary encoding.
//!
//! Every value that is hashed, signed, encrypted or sent over a link is
//! serialised through this module, so two nodes always agree on the bytes.
//!
//! ## Grammar
//!
//! ```text
//! u32      = 4 bytes, big-endian
//! u64      = 8 bytes, big-endian
//! bytes    = u32 length || raw
//! digests  = u32 count  || count * 64 raw bytes
//! pubkey   = bytes(modulus, big-endian, no leading zero) || u64 exponent
//! ```
//!
//! Decoding is strict: truncated input, trailing bytes and non-minimal
//! moduli are rejected, so `decode(encode(x)) == x` and every accepted
//! byte string has exactly one encoding.

use crate::error::CodecError;
use murmur_crypto::{HASH_SIZE, PublicKey};

/// Default upper bound for any single length-prefixed field (16 MiB)
pub const DEFAULT_MAX_FIELD_LEN: usize = 16 * 1024 * 1024;

/// Size of a length or count prefix
pub const LEN_PREFIX_SIZE: usize = 4;

/// A value with a canonical byte representation
pub trait Encode {
    /// Append the canonical encoding to `out`.
    fn encode_into(&self, out: &mut Vec<u8>);

    /// Canonical encoding as a fresh buffer.
    fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }
}

/// A value that can be parsed back from its canonical encoding
pub trait Decode: Sized {
    /// Parse one value from the front of `reader`.
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, CodecError>;

    /// Parse a complete buffer, rejecting trailing bytes.
    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes);
        let value = Self::decode_from(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

/// Append a big-endian u32.
pub fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Append a big-endian u64.
pub fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Append a length-prefixed byte string.
///
/// Fields longer than `u32::MAX` get a saturated prefix which no decoder
/// accepts; callers bound payload sizes long before that.
pub fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(out, u32::try_from(bytes.len()).unwrap_or(u32::MAX));
    out.extend_from_slice(bytes);
}

/// Append a count-prefixed sequence of 64-byte digests.
pub fn put_digests<'a, I>(out: &mut Vec<u8>, digests: I)
where
    I: ExactSizeIterator<Item = &'a [u8; HASH_SIZE]>,
{
    put_u32(out, u32::try_from(digests.len()).unwrap_or(u32::MAX));
    for digest in digests {
        out.extend_from_slice(digest);
    }
}

/// Forward-only cursor over a byte slice
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Start reading at the front of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Take the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(CodecError::UnexpectedEnd {
                needed: n,
                remaining,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a big-endian u32.
    pub fn u32(&mut self) -> Result<u32, CodecError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(raw))
    }

    /// Read a big-endian u64.
    pub fn u64(&mut self) -> Result<u64, CodecError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(raw))
    }

    /// Read a length-prefixed byte string.
    pub fn bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    /// Read a count-prefixed sequence of 64-byte digests.
    pub fn digests(&mut self) -> Result<Vec<[u8; HASH_SIZE]>, CodecError> {
        let count = self.u32()? as usize;
        let total = count
            .checked_mul(HASH_SIZE)
            .ok_or(CodecError::FieldTooLarge {
                len: count,
                max: usize::MAX / HASH_SIZE,
            })?;
        let raw = self.take(total)?;

        Ok(raw
            .chunks_exact(HASH_SIZE)
            .map(|chunk| {
                let mut digest = [0u8; HASH_SIZE];
                digest.copy_from_slice(chunk);
                digest
            })
            .collect())
    }

    /// Succeed only if the whole input has been consumed.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

impl Encode for PublicKey {
    fn encode_into(&self, out: &mut Vec<u8>) {
        put_bytes(out, &self.modulus_bytes());
        put_u64(out, self.exponent());
    }
}

impl Decode for PublicKey {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let modulus = reader.bytes()?;
        let exponent = reader.u64()?;

        if modulus.first() == Some(&0) {
            return Err(CodecError::NonCanonical("modulus has a leading zero byte"));
        }

        PublicKey::from_components(modulus, exponent)
            .map_err(|e| CodecError::InvalidKey(e.to_string()))
    }
}

/// Shape of one top-level field in a framed value
///
/// Stream readers use a layout to find where a value ends without parsing
/// its contents, so a length prefix can be checked against the field limit
/// before the body is buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// A u32 length followed by that many bytes
    Prefixed,
    /// A fixed number of bytes
    Fixed(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn key() -> &'static murmur_crypto::PrivateKey {
        static KEY: OnceLock<murmur_crypto::PrivateKey> = OnceLock::new();
        KEY.get_or_init(|| murmur_crypto::PrivateKey::generate(2048).unwrap())
    }

    #[test]
    fn test_primitives_are_big_endian() {
        let mut out = Vec::new();
        put_u32(&mut out, 0x0102_0304);
        put_u64(&mut out, 0x0A0B_0C0D_0E0F_1011);
        assert_eq!(
            out,
            [1, 2, 3, 4, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11]
        );

        let mut reader = Reader::new(&out);
        assert_eq!(reader.u32().unwrap(), 0x0102_0304);
        assert_eq!(reader.u64().unwrap(), 0x0A0B_0C0D_0E0F_1011);
        reader.finish().unwrap();
    }

    #[test]
    fn test_bytes_layout() {
        let mut out = Vec::new();
        put_bytes(&mut out, b"abc");
        assert_eq!(out, [0, 0, 0, 3, b'a', b'b', b'c']);

        let mut out = Vec::new();
        put_bytes(&mut out, b"");
        assert_eq!(out, [0, 0, 0, 0]);
    }

    #[test]
    fn test_digests_layout() {
        let digests = [[1u8; 64], [2u8; 64]];
        let mut out = Vec::new();
        put_digests(&mut out, digests.iter());

        assert_eq!(out.len(), 4 + 128);
        assert_eq!(&out[..4], &[0, 0, 0, 2]);

        let mut reader = Reader::new(&out);
        assert_eq!(reader.digests().unwrap(), digests.to_vec());
    }

    #[test]
    fn test_truncated_bytes() {
        let buf = [0, 0, 0, 10, 1, 2, 3];
        let mut reader = Reader::new(&buf);
        assert_eq!(
            reader.bytes(),
            Err(CodecError::UnexpectedEnd {
                needed: 10,
                remaining: 3
            })
        );
    }

    #[test]
    fn test_truncated_digests() {
        let mut buf = vec![0, 0, 0, 2];
        buf.extend_from_slice(&[0u8; 64]);
        let mut reader = Reader::new(&buf);
        assert!(matches!(
            reader.digests(),
            Err(CodecError::UnexpectedEnd { needed: 128, .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let reader = Reader::new(&[1, 2]);
        assert_eq!(reader.finish(), Err(CodecError::TrailingBytes(2)));
    }

    #[test]
    fn test_public_key_roundtrip() {
        let public = key().public_key();
        let bytes = public.to_canonical_bytes();

        // bytes(modulus) || u64(e)
        assert_eq!(bytes.len(), 4 + public.size() + 8);
        assert_eq!(&bytes[bytes.len() - 8..], &65537u64.to_be_bytes());

        let decoded = PublicKey::from_canonical_bytes(&bytes).unwrap();
        assert_eq!(&decoded, public);
    }

    #[test]
    fn test_public_key_leading_zero_rejected() {
        let public = key().public_key();
        let mut modulus = vec![0u8];
        modulus.extend_from_slice(&public.modulus_bytes());

        let mut bytes = Vec::new();
        put_bytes(&mut bytes, &modulus);
        put_u64(&mut bytes, public.exponent());

        assert!(matches!(
            PublicKey::from_canonical_bytes(&bytes),
            Err(CodecError::NonCanonical(_))
        ));
    }

    #[test]
    fn test_public_key_garbage_rejected() {
        let mut bytes = Vec::new();
        put_bytes(&mut bytes, &[0x01, 0x02]);
        put_u64(&mut bytes, 3);

        assert!(matches!(
            PublicKey::from_canonical_bytes(&bytes),
            Err(CodecError::InvalidKey(_))
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn bytes_roundtrip(fields in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..8)) {
                let mut out = Vec::new();
                for field in &fields {
                    put_bytes(&mut out, field);
                }

                let mut reader = Reader::new(&out);
                for field in &fields {
                    prop_assert_eq!(reader.bytes().unwrap(), field.as_slice());
                }
                prop_assert!(reader.finish().is_ok());
            }

            #[test]
            fn reader_never_overruns(input in prop::collection::vec(any::<u8>(), 0..256)) {
                let mut reader = Reader::new(&input);
                while reader.bytes().is_ok() {}
                prop_assert!(reader.remaining() <= input.len());

                let mut reader = Reader::new(&input);
                let _ = reader.digests();
                prop_assert!(reader.remaining() <= input.len());
            }
        }
    }
}
