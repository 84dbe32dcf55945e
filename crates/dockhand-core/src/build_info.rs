//! Build-time metadata embedded by the build script.
//!
//! Feeds the `User-Agent` header sent to the engine and the CLI's
//! `--version` flag and `version` command.

/// Short git commit hash, `unknown` outside a checkout.
pub const GIT_HASH: &str = env!("DOCKHAND_GIT_HASH");

/// Cargo profile the crate was built with (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("DOCKHAND_BUILD_PROFILE");

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version with commit and profile, e.g. `0.1.0 (abc1234, debug)`.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("DOCKHAND_GIT_HASH"),
    ", ",
    env!("DOCKHAND_BUILD_PROFILE"),
    ")"
);

/// Client identifier sent as `User-Agent` on every request.
pub fn user_agent() -> String {
    format!("dockhand/{VERSION}")
}
