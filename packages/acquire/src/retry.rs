//! Retry loop shared by listing calls and file transfers.
//!
//! Both apply the same [`RetryPolicy`]: up to `max_attempts` tries, with
//! a wait of `base * n²` after failed attempt `n`. With the default 3s
//! base that is 3s, 12s, 27s, 48s between the five listing attempts.
//!
//! ```ignore
//! let entries = retry::run(&policy, "listing /Dados", |_| dav.propfind(path)).await?;
//! ```

use std::future::Future;

use cnpj_getter_acquire_models::RetryPolicy;

use crate::AttemptError;

/// The last error of a call whose retry budget ran out.
#[derive(Debug)]
pub struct Exhausted {
    /// Attempts made before giving up.
    pub attempts: u32,
    /// Error of the final attempt.
    pub error: AttemptError,
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempt ceiling is reached.
///
/// `op` receives the 1-based attempt number. A policy with
/// `max_attempts == 0` still makes one attempt.
///
/// # Errors
///
/// Returns [`Exhausted`] carrying the final [`AttemptError`] and the
/// number of attempts made.
pub async fn run<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, Exhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let wait = policy.backoff(attempt);
                log::warn!(
                    "{label}: attempt {attempt}/{max_attempts} failed ({error}), retrying in {wait:?}"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(error) => {
                return Err(Exhausted {
                    attempts: attempt,
                    error,
                });
            }
        }
    }
}
