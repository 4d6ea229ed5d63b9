use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    error::FavoritesError,
    models::{RawEnvelope, SavedProperty, StorageEnvelope, ENVELOPE_VERSION},
};

/// Payload of the change channel. Carries the full accepted record list so
/// listeners can replace their view wholesale.
#[derive(Debug, Clone)]
pub struct SavedPropertiesUpdate {
    pub properties: Vec<SavedProperty>,
}

/// Durable store for the favorites envelope. The envelope is owned by this
/// subsystem; nothing else writes the file.
pub struct LocalStore {
    path: PathBuf,
    events: broadcast::Sender<SavedPropertiesUpdate>,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            path: path.into(),
            events,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SavedPropertiesUpdate> {
        self.events.subscribe()
    }

    /// Loads the envelope. A missing file is an empty list; a damaged file is
    /// repaired in place and the surviving records returned. Never an error.
    pub fn read(&self) -> Vec<SavedProperty> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read favorites envelope");
                return Vec::new();
            }
        };

        let envelope: RawEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "malformed favorites envelope, resetting");
                if let Err(err) = self.persist(&[]) {
                    warn!(error = %err, "failed to reset favorites envelope");
                }
                return Vec::new();
            }
        };

        let total = envelope.saved_properties.len();
        let mut records: Vec<SavedProperty> = Vec::with_capacity(total);
        for value in envelope.saved_properties {
            match serde_json::from_value::<SavedProperty>(value) {
                Ok(record) if record.is_valid() => records.push(record),
                Ok(record) => warn!(id = %record.id, "dropping saved property with invalid shape"),
                Err(err) => warn!(error = %err, "dropping unreadable saved property"),
            }
        }

        let version_ok = envelope.version.as_deref() == Some(ENVELOPE_VERSION);
        if !version_ok || records.len() != total {
            warn!(
                path = %self.path.display(),
                kept = records.len(),
                total,
                version_ok,
                "rewriting cleaned favorites envelope"
            );
            if let Err(err) = self.persist(&records) {
                warn!(error = %err, "failed to rewrite cleaned envelope");
            }
        }

        records
    }

    /// Persists the given records, dropping any that fail the shape contract,
    /// and broadcasts the accepted list. Returns the accepted records.
    pub fn write(&self, records: &[SavedProperty]) -> Result<Vec<SavedProperty>, FavoritesError> {
        let mut accepted: Vec<SavedProperty> = Vec::with_capacity(records.len());
        for record in records {
            if !record.is_valid() {
                warn!(id = %record.id, "dropping saved property with invalid shape");
                continue;
            }
            match accepted.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => accepted.push(record.clone()),
            }
        }

        self.persist(&accepted)?;
        self.notify(accepted.clone());
        Ok(accepted)
    }

    /// Upsert by id: an already-saved listing is replaced, not duplicated.
    pub fn add(&self, record: SavedProperty) -> Result<(), FavoritesError> {
        let mut records = self.read();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.write(&records).map(|_| ())
    }

    /// Removing an id that is not present is a no-op, not an error.
    pub fn remove(&self, id: &str) -> Result<(), FavoritesError> {
        let mut records = self.read();
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Ok(());
        }
        self.write(&records).map(|_| ())
    }

    /// Deletes the envelope entirely and broadcasts an empty list.
    pub fn clear(&self) -> Result<(), FavoritesError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(FavoritesError::Storage(format!(
                    "failed to clear favorites envelope: {err}"
                )))
            }
        }
        self.notify(Vec::new());
        Ok(())
    }

    /// Probes whether the backing path is writable. Quota and permission
    /// problems show up here instead of on the first real write.
    pub fn is_available(&self) -> bool {
        let probe = self.path.with_extension("probe");
        match fs::write(&probe, b"probe") {
            Ok(()) => {
                let _ = fs::remove_file(&probe);
                true
            }
            Err(err) => {
                debug!(path = %probe.display(), error = %err, "local storage unavailable");
                false
            }
        }
    }

    fn persist(&self, records: &[SavedProperty]) -> Result<(), FavoritesError> {
        let envelope = StorageEnvelope {
            saved_properties: records.to_vec(),
            version: ENVELOPE_VERSION.to_string(),
            last_updated: Utc::now(),
        };
        let body = serde_json::to_string_pretty(&envelope)
            .map_err(|err| FavoritesError::Storage(format!("failed to encode envelope: {err}")))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    FavoritesError::Storage(format!("failed to create envelope directory: {err}"))
                })?;
            }
        }

        fs::write(&self.path, body)
            .map_err(|err| FavoritesError::Storage(format!("failed to write envelope: {err}")))
    }

    fn notify(&self, properties: Vec<SavedProperty>) {
        let _ = self.events.send(SavedPropertiesUpdate { properties });
    }
}
