//! Bootstrap utilities.
//!
//! Shared initialization code for applications hosting switchyard.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Initialize tracing with the SWITCHYARD_LOG environment variable.
///
/// Defaults to "info" level if SWITCHYARD_LOG is not set. Panics if a
/// global subscriber is already installed; see `try_init_tracing`.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Like `init_tracing`, but returns false instead of panicking when a
/// global subscriber is already installed.
pub fn try_init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

/// Backoff settings for `connect_with_retry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Connect with exponential backoff retry.
///
/// # Arguments
/// * `target` - Human-readable name for logging (e.g., the broker name)
/// * `policy` - Attempt limit and delay bounds
/// * `connect` - Async function that attempts to establish a connection
///
/// # Returns
/// The connection result on success, or the last error after max attempts.
pub async fn connect_with_retry<T, E, F, Fut>(
    target: &str,
    policy: RetryPolicy,
    connect: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match connect().await {
            Ok(connection) => {
                info!(target_name = %target, attempt, "Connected");
                return Ok(connection);
            }
            Err(e) if attempt < max_attempts => {
                warn!(
                    target_name = %target,
                    attempt,
                    max_attempts,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, policy.max_delay);
            }
            Err(e) => {
                error!(
                    target_name = %target,
                    attempts = max_attempts,
                    error = %e,
                    "Connection failed"
                );
                return Err(e);
            }
        }
    }
}
