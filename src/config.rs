use std::{env, path::PathBuf, time::Duration};

use crate::retry::RetryPolicy;

pub struct Config {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub storage_path: PathBuf,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            api_base_url: env::var("FAVORITES_API_URL")?,
            api_token: env::var("FAVORITES_API_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            storage_path: env::var("FAVORITES_STORE_PATH")
                .unwrap_or_else(|_| "favorites.json".to_string())
                .into(),
            retry_max_attempts: env::var("FAVORITES_RETRY_ATTEMPTS")
                .map(|v| v.parse::<u32>())
                .unwrap_or(Ok(3))?,
            retry_base_delay_ms: env::var("FAVORITES_RETRY_BASE_DELAY_MS")
                .map(|v| v.parse::<u64>())
                .unwrap_or(Ok(500))?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}
