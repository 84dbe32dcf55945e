#![deny(unsafe_code)]

//! Shared test utilities for the Dockhand workspace.
//!
//! Provides a scripted fake engine, config builders, and tracing helpers so
//! that individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! dockhand-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod engine;
pub mod tracing_setup;

pub use engine::{FakeEngine, RecordedRequest, Reply};
