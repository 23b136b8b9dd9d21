//! Bounded, blocking retry loop.
//!
//! The operation decides for itself whether a failure is worth another attempt by
//! returning [`Attempt::Retry`] or [`Attempt::Fatal`]. Attempts never overlap: the
//! loop sleeps on the calling thread between them.

use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, instrument, warn};

/// How a failed attempt should be treated.
#[derive(Debug)]
pub enum Attempt<E> {
    /// Known transient failure; try again if attempts remain.
    Retry(E),
    /// Stop now, whatever the remaining budget.
    Fatal(E),
}

#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    #[error("{description} failed")]
    Fatal {
        description: String,
        #[source]
        source: E,
    },

    #[error("{description} still failing after {attempts} attempts")]
    Exhausted {
        description: String,
        attempts: u32,
        #[source]
        source: E,
    },
}

/// Run `op` until it succeeds, fails fatally, or `max_attempts` attempts have failed.
///
/// `max_attempts` of 0 or 1 both mean a single attempt.
#[instrument(skip_all, fields(description = %description, max_attempts = max_attempts, delay = ?delay))]
pub fn do_with_retry<T, E, F>(
    description: &str,
    max_attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Result<T, Attempt<E>>,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        info!(attempt, "{description}");
        match op() {
            Ok(value) => return Ok(value),
            Err(Attempt::Fatal(source)) => {
                return Err(RetryError::Fatal {
                    description: description.to_string(),
                    source,
                });
            }
            Err(Attempt::Retry(source)) => {
                if attempt >= attempts {
                    return Err(RetryError::Exhausted {
                        description: description.to_string(),
                        attempts,
                        source,
                    });
                }
                warn!(
                    attempt,
                    err = %source,
                    "{description} returned an error; sleeping {delay:?} before retrying"
                );
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}
