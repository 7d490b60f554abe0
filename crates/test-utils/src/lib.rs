pub mod builders;
pub mod fake_executor;
pub mod pipeline;
pub mod scripted_builder;

use std::sync::Once;

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use assetpipe::logging::{default_filter, LOG_ENV_VAR};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Filters come from `RUST_LOG`, then `ASSETPIPE_LOG`, then the same
/// defaults the binary uses, e.g.
/// `ASSETPIPE_LOG=assetpipe::engine=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_from_env(LOG_ENV_VAR))
            .or_else(|_| default_filter(Level::INFO))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}
