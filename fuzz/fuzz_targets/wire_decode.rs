//! Fuzz target for wire decoding
//!
//! Every byte string a peer can send goes through this decoder. It must never
//! panic, and anything it accepts must re-encode to the same bytes, or two
//! nodes could disagree on a wire's hash.

#![no_main]

use libfuzzer_sys::fuzz_target;
use murmur_core::{Decode, Encode, Wire};

fuzz_target!(|data: &[u8]| {
    if let Ok(wire) = Wire::from_canonical_bytes(data) {
        assert_eq!(wire.to_canonical_bytes(), data);
        let _ = wire.hash();
    }
});
