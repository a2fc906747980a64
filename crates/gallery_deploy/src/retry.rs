use std::future::Future;

use gallery_core::retry::RetryPolicy;

use crate::error::DeployError;

/// Runs `operation` until it succeeds or the policy's attempt budget is spent,
/// sleeping the fixed backoff between failures.
pub async fn retry_with_policy<T, F, Fut>(
    policy: RetryPolicy,
    step: &'static str,
    operation: F,
) -> Result<T, DeployError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DeployError>>,
{
    retry_when(policy, step, operation, |_| true, |error| error).await
}

/// Like [`retry_with_policy`], but only errors accepted by `is_transient` are
/// retried. Any other error is returned at once.
pub async fn retry_when<T, E, F, Fut>(
    policy: RetryPolicy,
    step: &'static str,
    mut operation: F,
    is_transient: impl Fn(&E) -> bool,
    into_error: impl Fn(E) -> DeployError,
) -> Result<T, DeployError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        let error = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(step, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let transient = is_transient(&error);
        let error = into_error(error);
        if !transient {
            return Err(error);
        }
        match policy.delay_after(attempt) {
            Some(delay) => {
                tracing::warn!(
                    step,
                    attempt,
                    max_attempts = policy.max_attempts(),
                    backoff_secs = delay.as_secs(),
                    error = %error,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            None => {
                return Err(DeployError::RetriesExhausted {
                    step,
                    attempts: attempt,
                    last_error: Box::new(error),
                });
            }
        }
    }
}

/// Polls `check` until it yields a value. `Ok(None)` means "not yet"; an
/// error aborts immediately.
pub async fn poll_until<T, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut check: F,
) -> Result<T, DeployError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, DeployError>>,
{
    let mut attempt = 1;
    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }
        match policy.delay_after(attempt) {
            Some(delay) => {
                tracing::debug!(what, attempt, "Not ready yet");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            None => {
                return Err(DeployError::Timeout {
                    what: what.to_string(),
                    attempts: attempt,
                });
            }
        }
    }
}
