use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::warn;

use crate::error::FavoritesError;

/// Bounded retry with a doubling delay. Only failures marked recoverable are
/// re-attempted; the rest surface on the first try.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, FavoritesError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FavoritesError>>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 1u32;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.recoverable() && attempt < self.max_attempts => {
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying recoverable failure"
                    );
                    sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
