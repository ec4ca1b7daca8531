use super::{
    EnrichmentCollection, EnrichmentStore, LockOutcome, RepositoryError, WorkItemCollection,
    WorkItemStore,
};
use crate::workflows::evaluation::domain::{AddressKey, EnrichmentRecord};
use crate::workflows::pipeline::phase::WorkItem;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn poisoned(store: &str) -> RepositoryError {
    RepositoryError::Unavailable(format!("{store} mutex poisoned"))
}

#[derive(Debug, Clone)]
pub struct InMemoryWorkItemStore {
    collection: Arc<Mutex<WorkItemCollection>>,
    stale_lock: Duration,
}

impl Default for InMemoryWorkItemStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(3_600))
    }
}

impl InMemoryWorkItemStore {
    pub fn new(stale_lock: Duration) -> Self {
        Self {
            collection: Arc::new(Mutex::new(WorkItemCollection::default())),
            stale_lock,
        }
    }

    fn guard(&self) -> Result<MutexGuard<'_, WorkItemCollection>, RepositoryError> {
        self.collection
            .lock()
            .map_err(|_| poisoned("work item store"))
    }
}

impl WorkItemStore for InMemoryWorkItemStore {
    fn load_all(&self) -> Result<WorkItemCollection, RepositoryError> {
        Ok(self.guard()?.clone())
    }

    fn fetch(&self, key: &AddressKey) -> Result<Option<WorkItem>, RepositoryError> {
        Ok(self.guard()?.get(key).cloned())
    }

    fn save(&self, item: &WorkItem) -> Result<(), RepositoryError> {
        self.guard()?.upsert(item, Utc::now(), self.stale_lock)
    }

    fn acquire_lock(
        &self,
        key: &AddressKey,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<LockOutcome, RepositoryError> {
        self.guard()?
            .acquire_lock(key, holder, now, self.stale_lock)
    }

    fn release_lock(&self, key: &AddressKey, holder: &str) -> Result<(), RepositoryError> {
        self.guard()?.release_lock(key, holder, Utc::now());
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryEnrichmentStore {
    collection: Arc<Mutex<EnrichmentCollection>>,
}

impl InMemoryEnrichmentStore {
    fn guard(&self) -> Result<MutexGuard<'_, EnrichmentCollection>, RepositoryError> {
        self.collection
            .lock()
            .map_err(|_| poisoned("enrichment store"))
    }
}

impl EnrichmentStore for InMemoryEnrichmentStore {
    fn load_all(&self) -> Result<Vec<EnrichmentRecord>, RepositoryError> {
        Ok(self.guard()?.records.clone())
    }

    fn fetch(&self, key: &AddressKey) -> Result<Option<EnrichmentRecord>, RepositoryError> {
        Ok(self.guard()?.get(key).cloned())
    }

    fn save(&self, record: &EnrichmentRecord) -> Result<(), RepositoryError> {
        self.guard()?.upsert(record);
        Ok(())
    }
}
