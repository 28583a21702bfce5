use std::future::Future;
use std::time::Duration;

use tracing::warn;

use rally_types::error::Result;

pub const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(25);

/// Run `attempt` until it succeeds, fails with a non-transient error, or
/// [`MAX_ATTEMPTS`] transient failures have been seen.
pub async fn with_backoff<T, F, Fut>(op: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = INITIAL_BACKOFF;
    let mut tries = 1;

    loop {
        match attempt().await {
            Err(e) if e.is_transient() && tries < MAX_ATTEMPTS => {
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    op, tries, MAX_ATTEMPTS, delay, e
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                tries += 1;
            }
            other => return other,
        }
    }
}
