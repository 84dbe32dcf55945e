//! Fuzz target for pull progress records.
//!
//! Run with: cargo +nightly fuzz run fuzz_pull_event

#![no_main]

use dockhand_core::pull::{PullEvent, PullObserver, PullProgress, PullSession};
use libfuzzer_sys::fuzz_target;

struct Discard;

impl PullObserver for Discard {
    fn on_progress(&mut self, _layer: &str, _progress: &PullProgress) {}
}

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let mut session = PullSession::new();
    for line in text.lines() {
        match PullEvent::parse(line) {
            Ok(event) => session.handle(event, &mut Discard),
            Err(_) => break,
        }
    }
});
