use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};

use crate::{
    error::{classify_status, FavoritesError},
    models::SavedProperty,
    retry::RetryPolicy,
};

use super::{
    models::{MigrateRequest, RemoveRequest, SaveRequest, SavedPropertiesResponse},
    CredentialProvider, FavoritesApi,
};

pub fn build_client() -> Client {
    Client::builder()
        .user_agent("property-favorites/0.1")
        .build()
        .expect("failed to build http client")
}

/// Reqwest-backed client for the saved-properties endpoints. The bearer
/// credential is looked up per call; a missing credential fails before any
/// network I/O.
pub struct ApiClient {
    http: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http: build_client(),
            base_url: base_url.into(),
            credentials,
            retry,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn bearer(&self) -> Result<String, FavoritesError> {
        self.credentials
            .current()
            .ok_or_else(|| FavoritesError::Auth("no credential for saved-properties call".into()))
    }
}

async fn ensure_success(response: Response) -> Result<Response, FavoritesError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

#[async_trait]
impl FavoritesApi for ApiClient {
    async fn list(&self) -> Result<Vec<SavedProperty>, FavoritesError> {
        let token = self.bearer()?;
        let url = self.endpoint("/saved-properties");

        self.retry
            .run(|| {
                let request = self.http.get(url.as_str()).bearer_auth(&token);
                async move {
                    let response = ensure_success(request.send().await?).await?;
                    let body: SavedPropertiesResponse = response.json().await.map_err(|err| {
                        FavoritesError::Server(format!("unreadable saved-properties body: {err}"))
                    })?;
                    Ok(body
                        .saved_properties
                        .into_iter()
                        .map(|item| item.into_record())
                        .collect())
                }
            })
            .await
    }

    async fn save(&self, id: &str, saved_at: &str) -> Result<(), FavoritesError> {
        let token = self.bearer()?;
        let url = self.endpoint("/saved-properties");
        let body = SaveRequest {
            property_id: id.to_string(),
            saved_at: saved_at.to_string(),
        };

        self.retry
            .run(|| {
                let request = self.http.post(url.as_str()).bearer_auth(&token).json(&body);
                async move {
                    ensure_success(request.send().await?).await?;
                    Ok(())
                }
            })
            .await
    }

    async fn remove(&self, id: &str) -> Result<(), FavoritesError> {
        let token = self.bearer()?;
        let url = self.endpoint("/saved-properties");
        let body = RemoveRequest {
            property_id: id.to_string(),
        };

        self.retry
            .run(|| {
                let request = self
                    .http
                    .delete(url.as_str())
                    .bearer_auth(&token)
                    .json(&body);
                async move {
                    let response = request.send().await?;
                    // already absent on the server still counts as removed
                    if response.status() == StatusCode::NOT_FOUND {
                        return Ok(());
                    }
                    ensure_success(response).await?;
                    Ok(())
                }
            })
            .await
    }

    async fn clear(&self) -> Result<(), FavoritesError> {
        let token = self.bearer()?;
        let url = self.endpoint("/saved-properties/clear");

        self.retry
            .run(|| {
                let request = self.http.delete(url.as_str()).bearer_auth(&token);
                async move {
                    ensure_success(request.send().await?).await?;
                    Ok(())
                }
            })
            .await
    }

    async fn migrate(&self, records: &[SavedProperty]) -> Result<(), FavoritesError> {
        let token = self.bearer()?;
        let url = self.endpoint("/saved-properties/migrate");
        let body = MigrateRequest {
            properties: records.iter().map(SaveRequest::from_record).collect(),
        };

        self.retry
            .run(|| {
                let request = self.http.post(url.as_str()).bearer_auth(&token).json(&body);
                async move {
                    ensure_success(request.send().await?).await?;
                    Ok(())
                }
            })
            .await
    }
}
