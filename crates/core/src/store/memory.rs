//! In-memory backend.

use super::locks::LockTable;
use super::{
    append_logged, guarded_next_entry, next_entry, Commit, EhrRecord, EhrRegistry, NewResource,
    ResourceSnapshot, VersionStore,
};
use crate::revision::{RevisionEntry, RevisionHistory};
use crate::{CoreError, CoreResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use vrs_identifiers::{ObjectId, ObjectVersionId, OriginId};

struct Resource<T> {
    owner_id: ObjectId,
    history: RevisionHistory,
    /// `versions[n - 1]` is the content of ordinal `n`.
    versions: Vec<Arc<T>>,
}

/// Histories and snapshots held in process memory.
///
/// The outer map is only write-locked to insert new resources; each resource has its own mutex
/// serialising its commits.
pub struct MemoryStore<T> {
    origin: OriginId,
    resources: RwLock<HashMap<ObjectId, Arc<Mutex<Resource<T>>>>>,
}

impl<T> MemoryStore<T> {
    pub fn new(origin: OriginId) -> Self {
        Self {
            origin,
            resources: RwLock::new(HashMap::new()),
        }
    }

    fn resource(&self, object_id: &ObjectId) -> CoreResult<Option<Arc<Mutex<Resource<T>>>>> {
        let resources = self.resources.read().map_err(|_| CoreError::LockPoisoned)?;
        Ok(resources.get(object_id).cloned())
    }
}

impl<T: Send + Sync> VersionStore<T> for MemoryStore<T> {
    fn create(&self, resource: NewResource<T>) -> CoreResult<RevisionEntry> {
        let mut resources = self.resources.write().map_err(|_| CoreError::LockPoisoned)?;
        if resources.contains_key(&resource.object_id) {
            return Err(CoreError::DuplicateResource(resource.object_id));
        }

        let mut history = RevisionHistory::new(resource.object_id);
        let entry = next_entry(&history, &self.origin, resource.audit)?;
        append_logged(&mut history, entry.clone())?;

        resources.insert(
            resource.object_id,
            Arc::new(Mutex::new(Resource {
                owner_id: resource.owner_id,
                history,
                versions: vec![Arc::new(resource.content)],
            })),
        );
        Ok(entry)
    }

    fn append(&self, object_id: &ObjectId, commit: Commit<'_, T>) -> CoreResult<RevisionEntry> {
        let resource = self
            .resource(object_id)?
            .ok_or_else(|| CoreError::ResourceNotFound(object_id.to_string()))?;
        let mut resource = resource.lock().map_err(|_| CoreError::LockPoisoned)?;

        let entry = guarded_next_entry(&resource.history, &self.origin, &commit)?;
        append_logged(&mut resource.history, entry.clone())?;
        resource.versions.push(Arc::new(commit.content));
        Ok(entry)
    }

    fn history(&self, object_id: &ObjectId) -> CoreResult<Option<RevisionHistory>> {
        let Some(resource) = self.resource(object_id)? else {
            return Ok(None);
        };
        let resource = resource.lock().map_err(|_| CoreError::LockPoisoned)?;
        Ok(Some(resource.history.clone()))
    }

    fn snapshot(&self, version: &ObjectVersionId) -> CoreResult<Option<ResourceSnapshot<T>>> {
        let Some(resource) = self.resource(&version.object_id())? else {
            return Ok(None);
        };
        let resource = resource.lock().map_err(|_| CoreError::LockPoisoned)?;

        let Some(entry) = resource
            .history
            .get(version.ordinal())
            .filter(|e| e.version == *version)
        else {
            return Ok(None);
        };
        let content = resource.versions.get(version.ordinal().get() as usize - 1);

        Ok(content.map(|content| ResourceSnapshot {
            version: entry.version.clone(),
            committed_at: entry.committed_at,
            owner_id: resource.owner_id,
            content: Arc::clone(content),
        }))
    }

    fn object_ids(&self) -> CoreResult<Vec<ObjectId>> {
        let resources = self.resources.read().map_err(|_| CoreError::LockPoisoned)?;
        let mut ids: Vec<ObjectId> = resources.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    fn discard(&self, object_id: &ObjectId) -> CoreResult<()> {
        let mut resources = self.resources.write().map_err(|_| CoreError::LockPoisoned)?;
        resources.remove(object_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryEhrRegistry {
    records: RwLock<HashMap<ObjectId, EhrRecord>>,
    locks: LockTable,
}

impl EhrRegistry for MemoryEhrRegistry {
    fn insert(&self, record: EhrRecord) -> CoreResult<()> {
        let mut records = self.records.write().map_err(|_| CoreError::LockPoisoned)?;
        if records.contains_key(&record.ehr_id) {
            return Err(CoreError::DuplicateEhr(record.ehr_id));
        }
        records.insert(record.ehr_id, record);
        Ok(())
    }

    fn get(&self, ehr_id: &ObjectId) -> CoreResult<Option<EhrRecord>> {
        let records = self.records.read().map_err(|_| CoreError::LockPoisoned)?;
        Ok(records.get(ehr_id).cloned())
    }

    fn list(&self) -> CoreResult<Vec<EhrRecord>> {
        let records = self.records.read().map_err(|_| CoreError::LockPoisoned)?;
        let mut list: Vec<EhrRecord> = records.values().cloned().collect();
        list.sort_by_key(|r| (r.time_created, r.ehr_id));
        Ok(list)
    }

    fn with_record(
        &self,
        ehr_id: &ObjectId,
        f: &mut dyn FnMut(&mut EhrRecord) -> CoreResult<()>,
    ) -> CoreResult<EhrRecord> {
        self.locks.with_lock(ehr_id, || {
            let original = self.get(ehr_id)?.ok_or(CoreError::EhrNotFound(*ehr_id))?;
            let mut record = original.clone();
            f(&mut record)?;

            if record != original {
                let mut records = self.records.write().map_err(|_| CoreError::LockPoisoned)?;
                records.insert(*ehr_id, record.clone());
            }
            Ok(record)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::ResourceLocator;
    use crate::revision::tests::audit;
    use vrs_identifiers::VersionIdentifier;

    fn store() -> MemoryStore<String> {
        MemoryStore::new(OriginId::parse("node").expect("origin"))
    }

    fn create(store: &MemoryStore<String>, content: &str) -> RevisionEntry {
        store
            .create(NewResource {
                object_id: ObjectId::new(),
                owner_id: ObjectId::new(),
                content: content.to_owned(),
                audit: audit(),
            })
            .expect("create")
    }

    #[test]
    fn create_then_append_keeps_every_snapshot() {
        let store = store();
        let v1 = create(&store, "first");
        let object_id = v1.version.object_id();
        let expected = VersionIdentifier::from(v1.version.clone());

        let v2 = store
            .append(
                &object_id,
                Commit {
                    locator: &ResourceLocator::Composition,
                    expected: Some(&expected),
                    content: "second".to_owned(),
                    audit: audit(),
                },
            )
            .expect("append");

        assert_eq!(v2.ordinal().get(), 2);
        assert_eq!(v2.preceding_version.as_ref(), Some(&v1.version));
        assert!(v2.committed_at > v1.committed_at);

        let first = store.snapshot(&v1.version).expect("read").expect("v1");
        let second = store.snapshot(&v2.version).expect("read").expect("v2");
        assert_eq!(first.content.as_str(), "first");
        assert_eq!(second.content.as_str(), "second");
    }

    #[test]
    fn stale_append_writes_nothing() {
        let store = store();
        let v1 = create(&store, "first");
        let object_id = v1.version.object_id();
        let stale = VersionIdentifier::Bare(object_id);

        let err = store
            .append(
                &object_id,
                Commit {
                    locator: &ResourceLocator::Composition,
                    expected: Some(&stale),
                    content: "second".to_owned(),
                    audit: audit(),
                },
            )
            .expect_err("stale");
        assert!(matches!(err, CoreError::VersionConflict(_)));
        assert_eq!(store.history(&object_id).expect("read").expect("exists").len(), 1);
    }

    #[test]
    fn snapshot_requires_matching_origin() {
        let store = store();
        let v1 = create(&store, "first");
        let other_origin = ObjectVersionId::new(
            v1.version.object_id(),
            OriginId::parse("elsewhere").expect("origin"),
            v1.version.ordinal(),
        );
        assert!(store.snapshot(&other_origin).expect("read").is_none());
    }

    #[test]
    fn discard_forgets_the_whole_history() {
        let store = store();
        let kept = create(&store, "kept");
        let dropped = create(&store, "dropped");

        store
            .discard(&dropped.version.object_id())
            .expect("discard");
        store
            .discard(&dropped.version.object_id())
            .expect("discarding twice is fine");

        assert_eq!(
            store.object_ids().expect("ids"),
            vec![kept.version.object_id()]
        );
        assert!(store.snapshot(&dropped.version).expect("read").is_none());
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let store = store();
        let v1 = create(&store, "first");
        let err = store
            .create(NewResource {
                object_id: v1.version.object_id(),
                owner_id: ObjectId::new(),
                content: "again".to_owned(),
                audit: audit(),
            })
            .expect_err("duplicate");
        assert!(matches!(err, CoreError::DuplicateResource(_)));
    }
}
