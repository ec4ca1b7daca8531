mod file;
mod memory;

pub use file::{Backup, Change, FileEnrichmentStore, FileWorkItemStore, JsonFile};
pub use memory::{InMemoryEnrichmentStore, InMemoryWorkItemStore};

use super::phase::{LockInfo, Phase, PhaseStatus, WorkItem};
use crate::workflows::evaluation::domain::{AddressKey, EnrichmentRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Storage abstraction for work items so the coordinator can run against a fake.
pub trait WorkItemStore: Send + Sync {
    fn load_all(&self) -> Result<WorkItemCollection, RepositoryError>;
    fn fetch(&self, key: &AddressKey) -> Result<Option<WorkItem>, RepositoryError>;
    /// Insert or replace. Refuses to overwrite an entry locked by another live holder.
    fn save(&self, item: &WorkItem) -> Result<(), RepositoryError>;
    fn acquire_lock(
        &self,
        key: &AddressKey,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<LockOutcome, RepositoryError>;
    /// Clears the lock only while `holder` owns it. Idempotent; releasing an
    /// unlocked, foreign-held, or unknown entry is not an error.
    fn release_lock(&self, key: &AddressKey, holder: &str) -> Result<(), RepositoryError>;
}

pub trait EnrichmentStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<EnrichmentRecord>, RepositoryError>;
    fn fetch(&self, key: &AddressKey) -> Result<Option<EnrichmentRecord>, RepositoryError>;
    fn save(&self, record: &EnrichmentRecord) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("work item {0} not found")]
    NotFound(AddressKey),
    #[error("{key} is locked by {holder}")]
    LockHeld { key: AddressKey, holder: String },
    #[error("store file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("store io failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no backups available in {0}")]
    NoBackup(PathBuf),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    /// Already held by the same holder.
    Reentered,
    /// Taken over from a holder whose lock outlived the stale timeout.
    Reclaimed { previous_holder: String },
    Held { holder: String, acquired_at: DateTime<Utc> },
}

impl LockOutcome {
    pub fn is_acquired(&self) -> bool {
        !matches!(self, LockOutcome::Held { .. })
    }
}

/// Number of phases currently in each status, across every work item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub complete: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatusCounts {
    fn record(&mut self, status: PhaseStatus) {
        match status {
            PhaseStatus::Pending => self.pending += 1,
            PhaseStatus::InProgress => self.in_progress += 1,
            PhaseStatus::Complete => self.complete += 1,
            PhaseStatus::Failed => self.failed += 1,
            PhaseStatus::Skipped => self.skipped += 1,
        }
    }
}

/// Persisted shape of the work-item store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemCollection {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: BTreeMap<AddressKey, WorkItem>,
    #[serde(default)]
    pub counts: StatusCounts,
}

impl Default for WorkItemCollection {
    fn default() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            updated_at: None,
            items: BTreeMap::new(),
            counts: StatusCounts::default(),
        }
    }
}

impl WorkItemCollection {
    pub fn get(&self, key: &AddressKey) -> Option<&WorkItem> {
        self.items.get(key)
    }

    pub fn upsert(
        &mut self,
        item: &WorkItem,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<(), RepositoryError> {
        if let Some(lock) = self.items.get(&item.key).and_then(|stored| stored.lock.as_ref()) {
            let ours = item
                .lock
                .as_ref()
                .is_some_and(|incoming| incoming.holder == lock.holder);
            if !ours && !lock.is_stale(now, stale_after) {
                return Err(RepositoryError::LockHeld {
                    key: item.key.clone(),
                    holder: lock.holder.clone(),
                });
            }
        }

        self.items.insert(item.key.clone(), item.clone());
        self.touch(now);
        Ok(())
    }

    pub fn acquire_lock(
        &mut self,
        key: &AddressKey,
        holder: &str,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<LockOutcome, RepositoryError> {
        let item = self
            .items
            .get_mut(key)
            .ok_or_else(|| RepositoryError::NotFound(key.clone()))?;

        let outcome = match &item.lock {
            None => LockOutcome::Acquired,
            Some(lock) if lock.holder == holder => LockOutcome::Reentered,
            Some(lock) if lock.is_stale(now, stale_after) => {
                warn!(
                    address = %key,
                    previous_holder = %lock.holder,
                    acquired_at = %lock.acquired_at,
                    "reclaiming stale lock"
                );
                LockOutcome::Reclaimed {
                    previous_holder: lock.holder.clone(),
                }
            }
            Some(lock) => {
                return Ok(LockOutcome::Held {
                    holder: lock.holder.clone(),
                    acquired_at: lock.acquired_at,
                })
            }
        };

        item.lock = Some(LockInfo {
            holder: holder.to_string(),
            acquired_at: now,
        });
        self.touch(now);
        Ok(outcome)
    }

    /// Returns true when a lock owned by `holder` was cleared.
    pub fn release_lock(&mut self, key: &AddressKey, holder: &str, now: DateTime<Utc>) -> bool {
        let Some(item) = self.items.get_mut(key) else {
            return false;
        };
        match &item.lock {
            Some(lock) if lock.holder == holder => {
                item.lock = None;
                self.touch(now);
                true
            }
            Some(lock) => {
                warn!(
                    address = %key,
                    holder = %holder,
                    owner = %lock.holder,
                    "lock now owned by another holder; leaving it in place"
                );
                false
            }
            None => false,
        }
    }

    pub fn refresh_counts(&mut self) {
        let mut counts = StatusCounts::default();
        for item in self.items.values() {
            for phase in Phase::ordered() {
                counts.record(item.status(phase));
            }
        }
        self.counts = counts;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
        self.refresh_counts();
    }
}

/// Persisted shape of the enrichment store: records in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrichmentCollection {
    pub records: Vec<EnrichmentRecord>,
}

impl EnrichmentCollection {
    pub fn get(&self, key: &AddressKey) -> Option<&EnrichmentRecord> {
        self.records.iter().find(|record| &record.key == key)
    }

    pub fn upsert(&mut self, record: &EnrichmentRecord) {
        match self.records.iter_mut().find(|stored| stored.key == record.key) {
            Some(stored) => *stored = record.clone(),
            None => self.records.push(record.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::evaluation::domain::Address;
    use chrono::TimeZone;

    const HOUR: Duration = Duration::from_secs(3_600);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 6, 7, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn collection_with_item() -> (WorkItemCollection, WorkItem) {
        let item = WorkItem::new(Address::new("9 Oak Ave", "Chandler", "AZ", "85225"), now());
        let mut collection = WorkItemCollection::default();
        collection.upsert(&item, now(), HOUR).expect("insert");
        (collection, item)
    }

    #[test]
    fn lock_is_exclusive_until_stale() {
        let (mut collection, item) = collection_with_item();

        let first = collection
            .acquire_lock(&item.key, "worker-a", now(), HOUR)
            .expect("lock");
        assert_eq!(first, LockOutcome::Acquired);

        let again = collection
            .acquire_lock(&item.key, "worker-a", now(), HOUR)
            .expect("lock");
        assert_eq!(again, LockOutcome::Reentered);

        let contended = collection
            .acquire_lock(&item.key, "worker-b", now() + chrono::Duration::minutes(5), HOUR)
            .expect("lock");
        assert!(!contended.is_acquired());

        let reclaimed = collection
            .acquire_lock(&item.key, "worker-b", now() + chrono::Duration::hours(2), HOUR)
            .expect("lock");
        assert_eq!(
            reclaimed,
            LockOutcome::Reclaimed {
                previous_holder: "worker-a".to_string()
            }
        );
    }

    #[test]
    fn upsert_refuses_entries_locked_by_someone_else() {
        let (mut collection, item) = collection_with_item();
        collection
            .acquire_lock(&item.key, "worker-a", now(), HOUR)
            .expect("lock");

        let err = collection
            .upsert(&item, now(), HOUR)
            .expect_err("unlocked copy must not overwrite");
        assert!(matches!(
            err,
            RepositoryError::LockHeld { ref holder, .. } if holder == "worker-a"
        ));

        let owned = collection.get(&item.key).cloned().expect("stored");
        collection.upsert(&owned, now(), HOUR).expect("holder may save");
    }

    #[test]
    fn release_is_idempotent() {
        let (mut collection, item) = collection_with_item();
        collection
            .acquire_lock(&item.key, "worker-a", now(), HOUR)
            .expect("lock");
        assert!(collection.release_lock(&item.key, "worker-a", now()));
        assert!(!collection.release_lock(&item.key, "worker-a", now()));
        assert!(!collection.release_lock(&AddressKey("unknown".to_string()), "worker-a", now()));
    }

    #[test]
    fn release_leaves_a_reclaimed_lock_alone() {
        let (mut collection, item) = collection_with_item();
        collection
            .acquire_lock(&item.key, "worker-a", now(), HOUR)
            .expect("lock");
        let later = now() + chrono::Duration::hours(2);
        collection
            .acquire_lock(&item.key, "worker-b", later, HOUR)
            .expect("reclaim");

        assert!(!collection.release_lock(&item.key, "worker-a", later));
        let lock = collection
            .get(&item.key)
            .and_then(|stored| stored.lock.clone())
            .expect("still locked");
        assert_eq!(lock.holder, "worker-b");
    }

    #[test]
    fn counts_track_every_phase() {
        let (mut collection, mut item) = collection_with_item();
        assert_eq!(collection.counts.pending, 6);

        item.complete(Phase::CountyData, 0, now());
        item.start(Phase::Listing, now());
        collection.upsert(&item, now(), HOUR).expect("update");
        assert_eq!(collection.counts.pending, 4);
        assert_eq!(collection.counts.complete, 1);
        assert_eq!(collection.counts.in_progress, 1);
    }
}
