//! Fuzz target for decrypted tail and vault decoding
//!
//! A tail is only parsed after decryption, but a sender controls its
//! plaintext completely.

#![no_main]

use libfuzzer_sys::fuzz_target;
use murmur_core::{Decode, Encode, Tail, Vault};

fuzz_target!(|data: &[u8]| {
    if let Ok(tail) = Tail::from_canonical_bytes(data) {
        assert_eq!(tail.to_canonical_bytes(), data);
        let _ = tail.vault.digest();
    }

    if let Ok(vault) = Vault::from_canonical_bytes(data) {
        assert_eq!(vault.to_canonical_bytes(), data);
    }
});
