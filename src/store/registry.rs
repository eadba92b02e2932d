use std::collections::HashMap;
use std::fs::File;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::Result;
use crate::model::ClaimRecord;
use crate::scheduler::TaskHandle;
use crate::store::claims::ClaimStore;
use crate::store::lock;

#[derive(Debug)]
struct ClaimEntry {
    record: ClaimRecord,
    erase: Option<TaskHandle>,
}

/// Held while a claim for one group is checked and committed.
/// Dropping it releases the group's lock file.
#[derive(Debug)]
pub struct GroupLock {
    _file: Option<File>,
}

/// Which groups have used their zone. Reads come from memory; every write
/// goes through to the backing [`ClaimStore`].
pub struct ClaimRegistry {
    store: ClaimStore,
    claims: HashMap<String, ClaimEntry>,
}

impl ClaimRegistry {
    /// Load every persisted claim from `store`.
    pub fn open(store: ClaimStore) -> Result<Self> {
        let claims = store
            .load_all()?
            .into_iter()
            .map(|record| {
                (
                    record.group.clone(),
                    ClaimEntry {
                        record,
                        erase: None,
                    },
                )
            })
            .collect();
        Ok(Self { store, claims })
    }

    /// Registry backed by an in-memory store.
    pub fn in_memory() -> Result<Self> {
        Self::open(ClaimStore::open_memory()?)
    }

    pub fn is_claimed(&self, group: &str) -> bool {
        self.claims.contains_key(group)
    }

    pub fn get(&self, group: &str) -> Option<&ClaimRecord> {
        self.claims.get(group).map(|entry| &entry.record)
    }

    /// All claims, ordered by claim time.
    pub fn records(&self) -> Vec<&ClaimRecord> {
        let mut records: Vec<&ClaimRecord> = self.claims.values().map(|e| &e.record).collect();
        records.sort_by(|a, b| {
            a.claimed_at
                .cmp(&b.claimed_at)
                .then_with(|| a.group.cmp(&b.group))
        });
        records
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Exclusive section for `group` across processes sharing the store.
    /// In-memory stores have no other writers, so the lock is empty.
    pub fn lock_group(&self, group: &str) -> Result<GroupLock> {
        let file = match self.store.lock_dir() {
            Some(dir) => Some(lock::acquire_lock(&lock::group_lock_path(dir, group))?),
            None => None,
        };
        Ok(GroupLock { _file: file })
    }

    /// Pick up a claim another process may have written for `group`.
    pub fn refresh(&mut self, group: &str) -> Result<()> {
        if self.claims.contains_key(group) {
            return Ok(());
        }
        if let Some(record) = self.store.get(group)? {
            self.claims.insert(
                group.to_string(),
                ClaimEntry {
                    record,
                    erase: None,
                },
            );
        }
        Ok(())
    }

    /// Mark a group as claimed. The in-memory mark is made first, so the
    /// claim stays consumed for this process even if persisting fails.
    /// Returns `false` when the store already held a claim for the group.
    pub fn commit(&mut self, record: ClaimRecord) -> Result<bool> {
        let group = record.group.clone();
        self.claims.insert(
            group,
            ClaimEntry {
                record: record.clone(),
                erase: None,
            },
        );
        let inserted = self.store.insert(&record)?;
        if !inserted {
            warn!(
                group = record.group.as_str(),
                zone_id = record.zone_id.as_str(),
                "claim store already held a claim for this group; kept the stored one"
            );
        }
        Ok(inserted)
    }

    pub fn set_erase_handle(&mut self, group: &str, handle: TaskHandle) {
        if let Some(entry) = self.claims.get_mut(group) {
            entry.erase = Some(handle);
        }
    }

    pub fn erase_handle(&self, group: &str) -> Option<TaskHandle> {
        self.claims.get(group).and_then(|entry| entry.erase)
    }

    pub fn mark_erased(&mut self, group: &str) -> Result<()> {
        if let Some(entry) = self.claims.get_mut(group) {
            entry.erase = None;
            entry.record.zone_erased = true;
            self.store.mark_erased(group)?;
        }
        Ok(())
    }

    /// Drop a claim entirely, returning it with its pending erase handle.
    pub fn forget(&mut self, group: &str) -> Result<Option<(ClaimRecord, Option<TaskHandle>)>> {
        let Some(entry) = self.claims.remove(group) else {
            return Ok(None);
        };
        self.store.remove(group)?;
        Ok(Some((entry.record, entry.erase)))
    }

    /// Claims whose zone has not been erased yet.
    pub fn pending_erasures(&self) -> Vec<&ClaimRecord> {
        self.records()
            .into_iter()
            .filter(|record| !record.zone_erased)
            .collect()
    }

    pub fn reference_start_or_init(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.store.reference_start_or_init(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SafeZoneError;
    use crate::model::{ActorId, Position};
    use crate::scheduler::Scheduler;
    use tempfile::tempdir;

    fn claim(group: &str) -> ClaimRecord {
        ClaimRecord {
            group: group.into(),
            zone_id: format!("clansafezone_{group}"),
            claimed_by: ActorId(1),
            position: Position::default(),
            radius: 50.0,
            claimed_at: Utc::now(),
            expires_at: None,
            zone_erased: false,
        }
    }

    #[test]
    fn commit_marks_group_and_persists() {
        let dir = tempdir().unwrap();
        let mut registry = ClaimRegistry::open(ClaimStore::from_root(dir.path()).unwrap()).unwrap();
        assert!(!registry.is_claimed("Alpha"));

        registry.commit(claim("Alpha")).unwrap();
        assert!(registry.is_claimed("Alpha"));
        drop(registry);

        let reopened = ClaimRegistry::open(ClaimStore::from_root(dir.path()).unwrap()).unwrap();
        assert!(reopened.is_claimed("Alpha"));
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn refresh_sees_claims_from_another_writer() {
        let dir = tempdir().unwrap();
        let mut first = ClaimRegistry::open(ClaimStore::from_root(dir.path()).unwrap()).unwrap();
        let mut second = ClaimRegistry::open(ClaimStore::from_root(dir.path()).unwrap()).unwrap();

        second.commit(claim("Alpha")).unwrap();
        assert!(!first.is_claimed("Alpha"));
        first.refresh("Alpha").unwrap();
        assert!(first.is_claimed("Alpha"));
    }

    #[test]
    fn commit_reports_claim_already_in_store() {
        let dir = tempdir().unwrap();
        let mut first = ClaimRegistry::open(ClaimStore::from_root(dir.path()).unwrap()).unwrap();
        let mut second = ClaimRegistry::open(ClaimStore::from_root(dir.path()).unwrap()).unwrap();

        assert!(first.commit(claim("Alpha")).unwrap());
        assert!(!second.commit(claim("Alpha")).unwrap());
        assert!(second.is_claimed("Alpha"));
        assert_eq!(ClaimStore::from_root(dir.path()).unwrap().load_all().unwrap().len(), 1);
    }

    #[test]
    fn group_lock_excludes_second_holder() {
        let dir = tempdir().unwrap();
        let registry = ClaimRegistry::open(ClaimStore::from_root(dir.path()).unwrap()).unwrap();

        let held = registry.lock_group("Alpha").unwrap();
        assert!(matches!(
            registry.lock_group("Alpha"),
            Err(SafeZoneError::Locked(_))
        ));
        let _other = registry.lock_group("Beta").unwrap();
        drop(held);
        registry.lock_group("Alpha").unwrap();
    }

    #[test]
    fn in_memory_lock_never_conflicts() {
        let registry = ClaimRegistry::in_memory().unwrap();
        let _a = registry.lock_group("Alpha").unwrap();
        let _b = registry.lock_group("Alpha").unwrap();
    }

    #[test]
    fn forget_returns_erase_handle() {
        let mut registry = ClaimRegistry::in_memory().unwrap();
        let mut sched = Scheduler::new();
        registry.commit(claim("Alpha")).unwrap();
        let handle = sched.schedule_at(Utc::now(), ());
        registry.set_erase_handle("Alpha", handle);
        assert_eq!(registry.erase_handle("Alpha"), Some(handle));

        let (record, erase) = registry.forget("Alpha").unwrap().unwrap();
        assert_eq!(record.group, "Alpha");
        assert_eq!(erase, Some(handle));
        assert!(!registry.is_claimed("Alpha"));
        assert!(registry.forget("Alpha").unwrap().is_none());
    }

    #[test]
    fn mark_erased_clears_pending_erasure() {
        let mut registry = ClaimRegistry::in_memory().unwrap();
        registry.commit(claim("Alpha")).unwrap();
        registry.commit(claim("Beta")).unwrap();

        registry.mark_erased("Alpha").unwrap();
        let pending: Vec<&str> = registry
            .pending_erasures()
            .iter()
            .map(|r| r.group.as_str())
            .collect();
        assert_eq!(pending, vec!["Beta"]);
        assert!(registry.get("Alpha").unwrap().zone_erased);
    }
}
