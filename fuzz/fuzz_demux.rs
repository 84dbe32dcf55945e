//! Fuzz target for multiplexed-stream frame decoding.
//!
//! Run with: cargo +nightly fuzz run fuzz_demux
//!
//! Decoded frames re-encode to a prefix of the input.

#![no_main]

use dockhand_core::demux::{decode_frames, encode_frame};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frames) = decode_frames(data) {
        let encoded: Vec<u8> = frames
            .iter()
            .flat_map(|f| encode_frame(f.kind, &f.payload).unwrap())
            .collect();
        assert!(data.starts_with(&encoded));
    }
});
