pub mod service;

pub use service::{SyncService, SyncState};
