use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Poll `condition` every `interval` until it holds or `timeout` elapses.
///
/// Returns whether the condition was met.
pub async fn wait_for<F>(mut condition: F, timeout: Duration, interval: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if condition() {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        sleep(interval).await;
    }
}

/// Route `tracing` output to the test harness. Controlled by `RUST_LOG`.
#[cfg(test)]
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
