//! Bounded retry with a fixed delay for transient network failures

use crate::metrics::METRICS;
use std::error::Error as StdError;
use std::fmt::Display;
use std::future::Future;
use std::io;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Pause between two attempts
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    pub fn should_retry(&self, attempt: u32, class: ErrorClass) -> bool {
        class == ErrorClass::Transient && attempt < self.max_attempts
    }
}

/// Whether repeating a failed request can change the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connection reset, timeout and similar: worth another attempt
    Transient,
    /// Malformed URL, DNS failure, protocol errors: retrying will not help
    Permanent,
}

/// Error returned once the policy gives up
#[derive(Debug)]
pub struct RetryError<E> {
    pub error: E,
    pub attempts: u32,
}

/// Classifies a reqwest failure.
pub fn classify(error: &reqwest::Error) -> ErrorClass {
    if error.is_builder() || error.is_redirect() || error.is_decode() {
        return ErrorClass::Permanent;
    }
    if error.is_timeout() {
        return ErrorClass::Transient;
    }
    classify_source_chain(error)
}

/// Classifies by the first `io::Error` in the source chain, falling back to
/// the messages hyper uses for dropped connections.
pub fn classify_source_chain(error: &(dyn StdError + 'static)) -> ErrorClass {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(io_error) = err.downcast_ref::<io::Error>() {
            return match io_error.kind() {
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
                | io::ErrorKind::TimedOut
                | io::ErrorKind::Interrupted => ErrorClass::Transient,
                _ => ErrorClass::Permanent,
            };
        }
        let message = err.to_string().to_lowercase();
        if message.contains("connection closed before message completed")
            || message.contains("connection reset")
            || message.contains("broken pipe")
        {
            return ErrorClass::Transient;
        }
        current = err.source();
    }
    ErrorClass::Permanent
}

/// Runs `operation` until it succeeds, fails permanently or runs out of attempts.
pub async fn retry_async<T, E, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    classify: impl Fn(&E) -> ErrorClass,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if config.should_retry(attempt, classify(&err)) {
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        delay_ms = config.delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    METRICS.record_retry();
                    tokio::time::sleep(config.delay).await;
                } else {
                    return Err(RetryError {
                        error: err,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}
