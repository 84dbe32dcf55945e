//! Tracing for tests.
//!
//! [`init_test_tracing`] installs one subscriber per process that writes
//! through the test harness, so output only shows for failing tests (or
//! with `--nocapture`). Repeated calls are no-ops.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset: request-level detail from the
/// client crates, warnings from everything else.
pub const DEFAULT_TEST_FILTER: &str = "warn,dockhand_core=debug,dockhand_test_utils=debug";

/// Install the test subscriber, honouring `RUST_LOG` when set.
///
/// ```ignore
/// #[tokio::test]
/// async fn test_something() {
///     dockhand_test_utils::tracing_setup::init_test_tracing();
///     // ...
/// }
/// ```
pub fn init_test_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(true)
        .try_init();
}
