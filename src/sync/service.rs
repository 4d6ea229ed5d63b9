use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    api::{CredentialProvider, FavoritesApi},
    error::FavoritesError,
    models::{normalize_id, PropertyDetails, SavedProperty},
    storage::local::{LocalStore, SavedPropertiesUpdate},
};

/// Where reads and writes go for the rest of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Anonymous: the local envelope is the only backing store. A pending
    /// migration means an authenticated upload failed and will be retried on
    /// the next mutation.
    LocalOnly { pending_migration: bool },
    /// One-shot upload of anonymous local data is in flight.
    Migrating,
    /// Authenticated, with the server as the backing store.
    RemoteSynced,
    /// The last remote mutation failed recoverably. The optimistic mirror
    /// state is kept and the operation can be re-attempted.
    Degraded,
}

/// The most recent failed mutation, kept for `retry_last_operation`.
#[derive(Debug, Clone)]
enum PendingOp {
    Save(SavedProperty),
    Remove(String),
    Clear,
    Refresh,
}

/// Session-scoped reconciliation between the local envelope and the remote
/// saved-properties store. Owns the in-memory mirror that serves all
/// synchronous queries; UI code never touches storage or HTTP directly.
pub struct SyncService<A: FavoritesApi> {
    local: LocalStore,
    remote: A,
    credentials: Arc<dyn CredentialProvider>,
    mirror: Vec<SavedProperty>,
    state: SyncState,
    pending: Option<PendingOp>,
    last_error: Option<FavoritesError>,
    memory_only: bool,
}

impl<A: FavoritesApi> SyncService<A> {
    pub fn new(local: LocalStore, remote: A, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            local,
            remote,
            credentials,
            mirror: Vec::new(),
            state: SyncState::LocalOnly {
                pending_migration: false,
            },
            pending: None,
            last_error: None,
            memory_only: false,
        }
    }

    /// Resolves the session's backing store and loads the mirror. Anonymous
    /// local data is migrated into the account exactly once on the
    /// anonymous-to-authenticated transition.
    pub async fn initialize(&mut self) {
        if !self.local.is_available() {
            warn!("local storage unavailable, running memory-only");
            self.memory_only = true;
        }

        if self.credentials.current().is_none() {
            self.mirror = self.read_local();
            self.state = SyncState::LocalOnly {
                pending_migration: false,
            };
            info!(saved = self.mirror.len(), "favorites session is local-only");
            return;
        }

        let local_records = self.read_local();
        if local_records.is_empty() {
            self.refresh_remote().await;
            return;
        }

        self.mirror = local_records.clone();
        self.migrate(local_records).await;
    }

    pub fn is_saved(&self, id: &str) -> bool {
        match normalize_id(id) {
            Some(id) => self.mirror.iter().any(|r| r.id == id),
            None => false,
        }
    }

    pub fn saved_count(&self) -> usize {
        self.mirror.len()
    }

    pub fn saved_properties(&self) -> &[SavedProperty] {
        &self.mirror
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn last_error(&self) -> Option<&FavoritesError> {
        self.last_error.as_ref()
    }

    /// Receiver for local envelope changes made by other sessions over the
    /// same store handle; feed the payloads back through `apply_update`.
    pub fn subscribe_local_changes(&self) -> broadcast::Receiver<SavedPropertiesUpdate> {
        self.local.subscribe()
    }

    /// Folds a change event from another session into the mirror. Only
    /// meaningful while the local envelope is the backing store; last writer
    /// wins, per the envelope's cross-session contract.
    pub fn apply_update(&mut self, update: SavedPropertiesUpdate) {
        if matches!(self.state, SyncState::LocalOnly { .. }) {
            self.mirror = update.properties;
        }
    }

    /// Optimistically upserts into the mirror, then persists to the active
    /// backing store. Failures are reported via the returned flag and
    /// `last_error`; the call itself never panics.
    pub async fn save_property(&mut self, id: &str, details: Option<PropertyDetails>) -> bool {
        let Some(id) = normalize_id(id) else {
            warn!("ignoring save of empty property id");
            return false;
        };
        self.ensure_migrated().await;

        let mut record = SavedProperty::new(id);
        if let Some(details) = details {
            record = record.with_details(details);
        }

        // rapid-toggle coalescing: an identical snapshot is already saved
        if self.mirror.iter().any(|r| r.same_snapshot(&record)) {
            return true;
        }

        let snapshot = self.mirror.clone();
        upsert(&mut self.mirror, record.clone());

        let result = if self.uses_remote() {
            self.remote.save(&record.id, &record.saved_at).await
        } else {
            self.local_add(record.clone())
        };

        match result {
            Ok(()) => true,
            Err(err) => self.on_mutation_failure(err, snapshot, PendingOp::Save(record)),
        }
    }

    /// Idempotent removal; an id that is not mirrored is an immediate
    /// success with no round-trip.
    pub async fn unsave_property(&mut self, id: &str) -> bool {
        let Some(id) = normalize_id(id) else {
            return true;
        };
        self.ensure_migrated().await;

        if !self.mirror.iter().any(|r| r.id == id) {
            return true;
        }

        let snapshot = self.mirror.clone();
        self.mirror.retain(|r| r.id != id);

        let result = if self.uses_remote() {
            self.remote.remove(&id).await
        } else {
            self.local_remove(&id)
        };

        match result {
            Ok(()) => true,
            Err(err) => self.on_mutation_failure(err, snapshot, PendingOp::Remove(id)),
        }
    }

    /// Clears the mirror and the active backing store.
    pub async fn clear_all_saved(&mut self) -> bool {
        self.ensure_migrated().await;

        let snapshot = self.mirror.clone();
        self.mirror.clear();

        let result = if self.uses_remote() {
            self.remote.clear().await
        } else {
            self.local_clear()
        };

        match result {
            Ok(()) => true,
            Err(err) => self.on_mutation_failure(err, snapshot, PendingOp::Clear),
        }
    }

    /// Re-attempts exactly the most recent failed mutation.
    pub async fn retry_last_operation(&mut self) -> bool {
        let Some(op) = self.pending.take() else {
            return true;
        };

        let result = match &op {
            PendingOp::Save(record) => self.remote.save(&record.id, &record.saved_at).await,
            PendingOp::Remove(id) => self.remote.remove(id).await,
            PendingOp::Clear => self.remote.clear().await,
            PendingOp::Refresh => match self.remote.list().await {
                Ok(records) => {
                    self.mirror = records;
                    Ok(())
                }
                Err(err) => Err(err),
            },
        };

        match result {
            Ok(()) => {
                self.last_error = None;
                if self.state == SyncState::Degraded {
                    self.state = SyncState::RemoteSynced;
                }
                true
            }
            Err(err) => {
                warn!(error = %err, "retry of pending favorites operation failed");
                if err.recoverable() {
                    self.pending = Some(op);
                }
                self.last_error = Some(err);
                false
            }
        }
    }

    /// Re-reads the active backing store into the mirror.
    pub async fn refresh(&mut self) -> bool {
        if self.uses_remote() {
            match self.remote.list().await {
                Ok(records) => {
                    self.mirror = records;
                    true
                }
                Err(err) => {
                    warn!(error = %err, "could not refresh remote favorites");
                    self.last_error = Some(err);
                    false
                }
            }
        } else {
            self.mirror = self.read_local();
            true
        }
    }

    fn uses_remote(&self) -> bool {
        matches!(self.state, SyncState::RemoteSynced | SyncState::Degraded)
    }

    fn read_local(&self) -> Vec<SavedProperty> {
        if self.memory_only {
            Vec::new()
        } else {
            self.local.read()
        }
    }

    fn local_add(&self, record: SavedProperty) -> Result<(), FavoritesError> {
        if self.memory_only {
            return Ok(());
        }
        self.local.add(record)
    }

    fn local_remove(&self, id: &str) -> Result<(), FavoritesError> {
        if self.memory_only {
            return Ok(());
        }
        self.local.remove(id)
    }

    fn local_clear(&self) -> Result<(), FavoritesError> {
        if self.memory_only {
            return Ok(());
        }
        self.local.clear()
    }

    /// A failed one-shot migration is re-attempted on the next mutation;
    /// pending local data is never dropped.
    async fn ensure_migrated(&mut self) {
        let pending = matches!(
            self.state,
            SyncState::LocalOnly {
                pending_migration: true
            }
        );
        if pending && self.credentials.current().is_some() {
            let records = self.mirror.clone();
            self.migrate(records).await;
        }
    }

    async fn migrate(&mut self, records: Vec<SavedProperty>) {
        self.state = SyncState::Migrating;
        info!(count = records.len(), "migrating anonymous favorites into account");

        match self.remote.migrate(&records).await {
            Ok(()) => {
                if let Err(err) = self.local_clear() {
                    warn!(error = %err, "failed to clear local envelope after migration");
                }
                self.refresh_remote().await;
            }
            Err(err) => {
                warn!(error = %err, "favorites migration failed, keeping local data");
                self.last_error = Some(err);
                self.state = SyncState::LocalOnly {
                    pending_migration: true,
                };
            }
        }
    }

    /// Replaces the mirror from the server. On failure the previous mirror is
    /// kept, so synchronous queries keep reflecting user intent.
    async fn refresh_remote(&mut self) {
        match self.remote.list().await {
            Ok(records) => {
                self.mirror = records;
                self.state = SyncState::RemoteSynced;
                info!(saved = self.mirror.len(), "favorites session is remote-synced");
            }
            Err(err) => {
                warn!(error = %err, "could not fetch remote favorites");
                self.last_error = Some(err);
                self.pending = Some(PendingOp::Refresh);
                self.state = SyncState::Degraded;
            }
        }
    }

    fn on_mutation_failure(
        &mut self,
        err: FavoritesError,
        snapshot: Vec<SavedProperty>,
        op: PendingOp,
    ) -> bool {
        let is_storage = matches!(err, FavoritesError::Storage(_));

        if is_storage {
            // keep the in-memory effect, stop touching the disk
            warn!(error = %err, "local persistence failed, degrading to memory-only");
            self.memory_only = true;
            self.last_error = Some(err);
        } else if err.recoverable() {
            // user intent stays in the mirror, flagged for retry
            warn!(error = %err, "remote favorites mutation failed, keeping optimistic state");
            self.pending = Some(op);
            self.state = SyncState::Degraded;
            self.last_error = Some(err);
        } else {
            warn!(error = %err, "remote favorites mutation rejected, rolling back");
            self.mirror = snapshot;
            self.last_error = Some(err);
        }

        false
    }
}

fn upsert(records: &mut Vec<SavedProperty>, record: SavedProperty) {
    match records.iter_mut().find(|r| r.id == record.id) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::Path,
        sync::{
            atomic::{AtomicU32, Ordering},
            Mutex,
        },
    };

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::api::StaticCredentials;

    use super::*;

    #[derive(Clone, Default)]
    struct FakeApi {
        records: Arc<Mutex<Vec<SavedProperty>>>,
        migrate_calls: Arc<Mutex<Vec<Vec<SavedProperty>>>>,
        save_calls: Arc<AtomicU32>,
        remove_calls: Arc<AtomicU32>,
        fail_next_save: Arc<Mutex<Option<FavoritesError>>>,
        fail_next_migrate: Arc<Mutex<Option<FavoritesError>>>,
    }

    #[async_trait]
    impl FavoritesApi for FakeApi {
        async fn list(&self) -> Result<Vec<SavedProperty>, FavoritesError> {
            Ok(self.records.lock().unwrap().clone())
        }

        async fn save(&self, id: &str, saved_at: &str) -> Result<(), FavoritesError> {
            self.save_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.fail_next_save.lock().unwrap().take() {
                return Err(err);
            }
            let record = SavedProperty::new(id).with_saved_at(saved_at);
            upsert(&mut self.records.lock().unwrap(), record);
            Ok(())
        }

        async fn remove(&self, id: &str) -> Result<(), FavoritesError> {
            self.remove_calls.fetch_add(1, Ordering::SeqCst);
            self.records.lock().unwrap().retain(|r| r.id != id);
            Ok(())
        }

        async fn clear(&self) -> Result<(), FavoritesError> {
            self.records.lock().unwrap().clear();
            Ok(())
        }

        async fn migrate(&self, records: &[SavedProperty]) -> Result<(), FavoritesError> {
            if let Some(err) = self.fail_next_migrate.lock().unwrap().take() {
                return Err(err);
            }
            self.migrate_calls.lock().unwrap().push(records.to_vec());
            let mut remote = self.records.lock().unwrap();
            for record in records {
                upsert(&mut remote, record.clone());
            }
            Ok(())
        }
    }

    fn record(id: &str) -> SavedProperty {
        SavedProperty::new(id).with_saved_at("2024-01-01T00:00:00Z")
    }

    fn envelope_path(dir: &TempDir) -> std::path::PathBuf {
        dir.path().join("favorites.json")
    }

    fn service_at(path: &Path, token: Option<&str>, fake: FakeApi) -> SyncService<FakeApi> {
        SyncService::new(
            LocalStore::new(path),
            fake,
            Arc::new(StaticCredentials::new(token.map(str::to_string))),
        )
    }

    #[tokio::test]
    async fn anonymous_session_reads_the_local_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let path = envelope_path(&dir);
        LocalStore::new(&path)
            .write(&[record("a"), record("b")])
            .unwrap();

        let mut session = service_at(&path, None, FakeApi::default());
        session.initialize().await;

        assert_eq!(
            session.state(),
            SyncState::LocalOnly {
                pending_migration: false
            }
        );
        assert_eq!(session.saved_count(), 2);
        assert!(session.is_saved("a"));
        assert!(!session.is_saved("ghost"));
    }

    #[tokio::test]
    async fn local_only_saves_persist_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = envelope_path(&dir);

        let mut session = service_at(&path, None, FakeApi::default());
        session.initialize().await;

        let details = PropertyDetails {
            title: Some("Prinsengracht 263".into()),
            ..Default::default()
        };
        assert!(session.save_property("woon-1", Some(details)).await);
        assert!(session.is_saved("woon-1"));

        let on_disk = LocalStore::new(&path).read();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].title.as_deref(), Some("Prinsengracht 263"));

        assert!(session.unsave_property("woon-1").await);
        assert!(LocalStore::new(&path).read().is_empty());
    }

    #[tokio::test]
    async fn migration_uploads_local_records_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = envelope_path(&dir);
        LocalStore::new(&path)
            .write(&[record("a"), record("b"), record("c")])
            .unwrap();

        let fake = FakeApi::default();
        let mut session = service_at(&path, Some("token"), fake.clone());
        session.initialize().await;

        let calls = fake.migrate_calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 3);

        assert!(LocalStore::new(&path).read().is_empty());
        assert_eq!(session.state(), SyncState::RemoteSynced);
        for id in ["a", "b", "c"] {
            assert!(session.is_saved(id));
        }
    }

    #[tokio::test]
    async fn failed_migration_keeps_local_data_and_retries_on_next_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = envelope_path(&dir);
        LocalStore::new(&path)
            .write(&[record("a"), record("b")])
            .unwrap();

        let fake = FakeApi::default();
        *fake.fail_next_migrate.lock().unwrap() =
            Some(FavoritesError::Network("offline".into()));

        let mut session = service_at(&path, Some("token"), fake.clone());
        session.initialize().await;

        assert_eq!(
            session.state(),
            SyncState::LocalOnly {
                pending_migration: true
            }
        );
        assert!(session.is_saved("a"));
        assert!(!LocalStore::new(&path).read().is_empty());

        // the next mutation re-attempts the upload before proceeding
        assert!(session.save_property("c", None).await);

        assert_eq!(fake.migrate_calls.lock().unwrap().len(), 1);
        assert_eq!(session.state(), SyncState::RemoteSynced);
        assert_eq!(session.saved_count(), 3);
        assert!(LocalStore::new(&path).read().is_empty());
        assert_eq!(fake.records.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn validation_failure_rolls_back_the_optimistic_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = envelope_path(&dir);

        let fake = FakeApi::default();
        let mut session = service_at(&path, Some("token"), fake.clone());
        session.initialize().await;
        assert_eq!(session.state(), SyncState::RemoteSynced);

        *fake.fail_next_save.lock().unwrap() =
            Some(FavoritesError::Validation("unknown listing".into()));

        assert!(!session.save_property("X", None).await);
        assert!(!session.is_saved("X"));
        assert!(matches!(
            session.last_error(),
            Some(FavoritesError::Validation(_))
        ));
        assert_eq!(session.state(), SyncState::RemoteSynced);
    }

    #[tokio::test]
    async fn recoverable_failure_keeps_intent_and_retry_lands_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = envelope_path(&dir);

        let fake = FakeApi::default();
        let mut session = service_at(&path, Some("token"), fake.clone());
        session.initialize().await;

        *fake.fail_next_save.lock().unwrap() = Some(FavoritesError::Network("offline".into()));

        assert!(!session.save_property("woon-1", None).await);
        // user intent is preserved while the write is pending
        assert!(session.is_saved("woon-1"));
        assert_eq!(session.state(), SyncState::Degraded);
        assert!(fake.records.lock().unwrap().is_empty());

        assert!(session.retry_last_operation().await);
        assert_eq!(session.state(), SyncState::RemoteSynced);
        assert!(session.last_error().is_none());
        assert_eq!(fake.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn anonymous_save_then_authenticated_session_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let path = envelope_path(&dir);
        let fake = FakeApi::default();

        let saved_at;
        {
            let mut session = service_at(&path, None, fake.clone());
            session.initialize().await;

            assert!(session.save_property("p1", None).await);
            assert_eq!(session.saved_count(), 1);
            assert!(session.is_saved("p1"));
            saved_at = session.saved_properties()[0].saved_at.clone();
        }

        // the user signs in; the next session sees a credential
        let mut session = service_at(&path, Some("token"), fake.clone());
        session.initialize().await;

        let calls = fake.migrate_calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 1);
        assert_eq!(calls[0][0].id, "p1");
        assert_eq!(calls[0][0].saved_at, saved_at);

        assert!(LocalStore::new(&path).read().is_empty());
        assert!(session.is_saved("p1"));
        assert_eq!(session.state(), SyncState::RemoteSynced);
    }

    #[tokio::test]
    async fn unsave_of_an_absent_id_skips_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = envelope_path(&dir);

        let fake = FakeApi::default();
        let mut session = service_at(&path, Some("token"), fake.clone());
        session.initialize().await;

        assert!(session.unsave_property("ghost").await);
        assert_eq!(fake.remove_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn saving_an_identical_snapshot_is_coalesced() {
        let dir = tempfile::tempdir().unwrap();
        let path = envelope_path(&dir);

        let fake = FakeApi::default();
        let mut session = service_at(&path, Some("token"), fake.clone());
        session.initialize().await;

        assert!(session.save_property("woon-1", None).await);
        assert!(session.save_property("woon-1", None).await);

        assert_eq!(fake.save_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.saved_count(), 1);
    }

    #[tokio::test]
    async fn clear_all_clears_mirror_and_remote_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = envelope_path(&dir);

        let fake = FakeApi::default();
        fake.records
            .lock()
            .unwrap()
            .extend([record("a"), record("b")]);

        let mut session = service_at(&path, Some("token"), fake.clone());
        session.initialize().await;
        assert_eq!(session.saved_count(), 2);

        assert!(session.clear_all_saved().await);
        assert_eq!(session.saved_count(), 0);
        assert!(fake.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cross_session_updates_apply_only_while_local() {
        let dir = tempfile::tempdir().unwrap();
        let path = envelope_path(&dir);

        let mut session = service_at(&path, None, FakeApi::default());
        session.initialize().await;
        session.apply_update(SavedPropertiesUpdate {
            properties: vec![record("x")],
        });
        assert!(session.is_saved("x"));

        let mut session = service_at(&path, Some("token"), FakeApi::default());
        session.initialize().await;
        session.apply_update(SavedPropertiesUpdate {
            properties: vec![record("y")],
        });
        assert!(!session.is_saved("y"));
    }
}
