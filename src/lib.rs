//! Saved-properties synchronization for the listings site: a durable local
//! favorites envelope, the remote saved-properties client, and the
//! session-scoped service that reconciles them across the
//! anonymous-to-authenticated transition. The comparison tray rides along as
//! an independent, purely in-memory selection.

pub mod api;
pub mod compare;
pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod storage;
pub mod sync;

pub use api::{ApiClient, CredentialProvider, FavoritesApi, StaticCredentials};
pub use compare::{ComparisonEntry, ComparisonTray};
pub use config::Config;
pub use error::FavoritesError;
pub use models::{PropertyDetails, SavedProperty};
pub use retry::RetryPolicy;
pub use storage::{LocalStore, SavedPropertiesUpdate};
pub use sync::{SyncService, SyncState};
