use async_trait::async_trait;

use crate::{error::FavoritesError, models::SavedProperty};

pub mod client;
pub mod models;

pub use client::ApiClient;

/// External credential store. The token is opaque to this subsystem and is
/// looked up per call; refreshing it is someone else's job.
pub trait CredentialProvider: Send + Sync {
    fn current(&self) -> Option<String>;
}

/// Fixed credential handed in at session start.
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl CredentialProvider for StaticCredentials {
    fn current(&self) -> Option<String> {
        self.token.clone()
    }
}

/// The remote saved-properties endpoints as the sync service sees them.
#[async_trait]
pub trait FavoritesApi: Send + Sync {
    async fn list(&self) -> Result<Vec<SavedProperty>, FavoritesError>;

    async fn save(&self, id: &str, saved_at: &str) -> Result<(), FavoritesError>;

    async fn remove(&self, id: &str) -> Result<(), FavoritesError>;

    async fn clear(&self) -> Result<(), FavoritesError>;

    async fn migrate(&self, records: &[SavedProperty]) -> Result<(), FavoritesError>;
}
