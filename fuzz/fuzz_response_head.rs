//! Fuzz target for the HTTP response head decoder.
//!
//! Run with: cargo +nightly fuzz run fuzz_response_head
//!
//! Any input must either decode, ask for more bytes, or fail with an error;
//! a decoded head never claims more bytes than it was given.

#![no_main]

use dockhand_core::http::decode_response_head;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(Some((head, len))) = decode_response_head(data) {
        assert!(len <= data.len());
        let _ = head.framing();
    }
});
