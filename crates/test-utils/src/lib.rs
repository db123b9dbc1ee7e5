//! Shared helpers for convoy's integration tests.

pub mod builders;
pub mod fake_executor;
pub mod recording_logger;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use convoy::logging::LOG_ENV_VAR;
use tracing_subscriber::{fmt, EnvFilter};

/// Long enough for every scenario in the suite, short enough that a stalled
/// runner fails the test instead of hanging CI.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Output is captured per test and only shown for failures. Set
/// `CONVOY_LOG=debug` (or any filter directive) to see more.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, panicking after [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    with_timeout_of(TEST_TIMEOUT, f).await
}

pub async fn with_timeout_of<F, T>(limit: Duration, f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(limit, f).await {
        Ok(value) => value,
        Err(_) => panic!("test did not finish within {limit:?}"),
    }
}
