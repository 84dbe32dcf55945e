//! Fuzz target for the TOML configuration and credentials parsers.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = dockhand_config::AppConfig::parse(s);
        if let Ok(file) = dockhand_config::credentials::CredentialsFile::parse(s) {
            let _ = file.auth_for("docker.io");
        }
    }
});
