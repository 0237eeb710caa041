//! File-backed backend.
//!
//! Layout for a store rooted at `root` (one root per resource kind):
//!
//! ```text
//! root/<s1>/<s2>/<id>/history.yaml      owner id + revision history
//! root/<s1>/<s2>/<id>/versions/<n>.yaml content of ordinal n
//! ```
//!
//! and for the EHR registry:
//!
//! ```text
//! root/<s1>/<s2>/<ehr_id>/ehr.yaml
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so a reader sees either
//! the previous or the new content. A version file is always written before the history that
//! references it. Commits are serialised per object id within this process; running two writer
//! processes against one data directory is not supported.

use super::locks::LockTable;
use super::{
    append_logged, guarded_next_entry, next_entry, Commit, EhrRecord, EhrRegistry, NewResource,
    ResourceSnapshot, VersionStore,
};
use crate::constants::{EHR_RECORD_FILE_NAME, HISTORY_FILE_NAME, VERSIONS_DIR_NAME};
use crate::revision::{RevisionEntry, RevisionHistory};
use crate::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vrs_identifiers::{ObjectId, ObjectVersionId, Ordinal, OriginId};

#[derive(Serialize, Deserialize)]
struct StoredHistory {
    owner_id: ObjectId,
    history: RevisionHistory,
}

pub struct FileStore<T> {
    root: PathBuf,
    origin: OriginId,
    locks: LockTable,
    _content: PhantomData<fn() -> T>,
}

impl<T> FileStore<T> {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: PathBuf, origin: OriginId) -> CoreResult<Self> {
        fs::create_dir_all(&root).map_err(CoreError::StorageDirCreation)?;
        Ok(Self {
            root,
            origin,
            locks: LockTable::default(),
            _content: PhantomData,
        })
    }

    fn resource_dir(&self, object_id: &ObjectId) -> PathBuf {
        object_id.sharded_dir(&self.root)
    }

    fn version_path(dir: &Path, ordinal: Ordinal) -> PathBuf {
        dir.join(VERSIONS_DIR_NAME).join(format!("{ordinal}.yaml"))
    }

    fn read_history(&self, object_id: &ObjectId) -> CoreResult<Option<StoredHistory>> {
        read_yaml(&self.resource_dir(object_id).join(HISTORY_FILE_NAME))
    }
}

impl<T> VersionStore<T> for FileStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn create(&self, resource: NewResource<T>) -> CoreResult<RevisionEntry> {
        self.locks.with_lock(&resource.object_id, || {
            let dir = self.resource_dir(&resource.object_id);
            if dir.join(HISTORY_FILE_NAME).exists() {
                return Err(CoreError::DuplicateResource(resource.object_id));
            }
            fs::create_dir_all(dir.join(VERSIONS_DIR_NAME))
                .map_err(CoreError::StorageDirCreation)?;

            let result: CoreResult<RevisionEntry> = (|| {
                let mut history = RevisionHistory::new(resource.object_id);
                let entry = next_entry(&history, &self.origin, resource.audit.clone())?;
                append_logged(&mut history, entry.clone())?;

                write_yaml(&Self::version_path(&dir, entry.ordinal()), &resource.content)?;
                write_yaml(
                    &dir.join(HISTORY_FILE_NAME),
                    &StoredHistory {
                        owner_id: resource.owner_id,
                        history,
                    },
                )?;
                Ok(entry)
            })();

            match result {
                Ok(entry) => Ok(entry),
                Err(create_error) => match fs::remove_dir_all(&dir) {
                    Ok(()) => Err(create_error),
                    Err(cleanup_error) => Err(CoreError::CleanupAfterCreateFailed {
                        path: dir,
                        create_error: Box::new(create_error),
                        cleanup_error,
                    }),
                },
            }
        })
    }

    fn append(&self, object_id: &ObjectId, commit: Commit<'_, T>) -> CoreResult<RevisionEntry> {
        self.locks.with_lock(object_id, || {
            let mut stored = self
                .read_history(object_id)?
                .ok_or_else(|| CoreError::ResourceNotFound(object_id.to_string()))?;

            let entry = guarded_next_entry(&stored.history, &self.origin, &commit)?;
            append_logged(&mut stored.history, entry.clone())?;

            let dir = self.resource_dir(object_id);
            write_yaml(&Self::version_path(&dir, entry.ordinal()), &commit.content)?;
            write_yaml(&dir.join(HISTORY_FILE_NAME), &stored)?;
            Ok(entry)
        })
    }

    fn history(&self, object_id: &ObjectId) -> CoreResult<Option<RevisionHistory>> {
        Ok(self.read_history(object_id)?.map(|stored| stored.history))
    }

    fn snapshot(&self, version: &ObjectVersionId) -> CoreResult<Option<ResourceSnapshot<T>>> {
        let object_id = version.object_id();
        let Some(stored) = self.read_history(&object_id)? else {
            return Ok(None);
        };
        let Some(entry) = stored
            .history
            .get(version.ordinal())
            .filter(|e| e.version == *version)
        else {
            return Ok(None);
        };

        let path = Self::version_path(&self.resource_dir(&object_id), version.ordinal());
        let content: T = read_yaml(&path)?.ok_or_else(|| {
            CoreError::FileRead(std::io::Error::new(
                ErrorKind::NotFound,
                format!("missing version file {}", path.display()),
            ))
        })?;

        Ok(Some(ResourceSnapshot {
            version: entry.version.clone(),
            committed_at: entry.committed_at,
            owner_id: stored.owner_id,
            content: Arc::new(content),
        }))
    }

    fn object_ids(&self) -> CoreResult<Vec<ObjectId>> {
        sharded_ids(&self.root, HISTORY_FILE_NAME)
    }

    fn discard(&self, object_id: &ObjectId) -> CoreResult<()> {
        self.locks
            .with_lock(object_id, || match fs::remove_dir_all(self.resource_dir(object_id)) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(CoreError::FileWrite(err)),
            })
    }
}

pub struct FileEhrRegistry {
    root: PathBuf,
    locks: LockTable,
}

impl FileEhrRegistry {
    pub fn open(root: PathBuf) -> CoreResult<Self> {
        fs::create_dir_all(&root).map_err(CoreError::StorageDirCreation)?;
        Ok(Self {
            root,
            locks: LockTable::default(),
        })
    }

    fn record_path(&self, ehr_id: &ObjectId) -> PathBuf {
        ehr_id.sharded_dir(&self.root).join(EHR_RECORD_FILE_NAME)
    }
}

impl EhrRegistry for FileEhrRegistry {
    fn insert(&self, record: EhrRecord) -> CoreResult<()> {
        self.locks.with_lock(&record.ehr_id, || {
            let path = self.record_path(&record.ehr_id);
            if path.exists() {
                return Err(CoreError::DuplicateEhr(record.ehr_id));
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(CoreError::StorageDirCreation)?;
            }
            write_yaml(&path, &record)
        })
    }

    fn get(&self, ehr_id: &ObjectId) -> CoreResult<Option<EhrRecord>> {
        read_yaml(&self.record_path(ehr_id))
    }

    fn list(&self) -> CoreResult<Vec<EhrRecord>> {
        let mut records = Vec::new();
        for ehr_id in sharded_ids(&self.root, EHR_RECORD_FILE_NAME)? {
            match self.get(&ehr_id) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => tracing::warn!(%ehr_id, "skipping unreadable EHR record: {err}"),
            }
        }
        records.sort_by_key(|r| (r.time_created, r.ehr_id));
        Ok(records)
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
                write_yaml(&self.record_path(ehr_id), &record)?;
            }
            Ok(record)
        })
    }
}

fn read_yaml<D: DeserializeOwned>(path: &Path) -> CoreResult<Option<D>> {
    match fs::read_to_string(path) {
        Ok(text) => serde_yaml::from_str(&text)
            .map(Some)
            .map_err(CoreError::YamlDeserialization),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(CoreError::FileRead(err)),
    }
}

fn write_yaml<S: Serialize + ?Sized>(path: &Path, value: &S) -> CoreResult<()> {
    let text = serde_yaml::to_string(value).map_err(CoreError::YamlSerialization)?;
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, text).map_err(CoreError::FileWrite)?;
    fs::rename(&tmp, path).map_err(CoreError::FileWrite)
}

/// Object ids of every `root/<s1>/<s2>/<id>/` directory containing `marker`.
fn sharded_ids(root: &Path, marker: &str) -> CoreResult<Vec<ObjectId>> {
    let mut ids = Vec::new();

    let s1_iter = match fs::read_dir(root) {
        Ok(it) => it,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(ids),
        Err(err) => return Err(CoreError::FileRead(err)),
    };

    for s1 in s1_iter.flatten() {
        let s1_path = s1.path();
        if !s1_path.is_dir() {
            continue;
        }
        let Ok(s2_iter) = fs::read_dir(&s1_path) else {
            continue;
        };

        for s2 in s2_iter.flatten() {
            let s2_path = s2.path();
            if !s2_path.is_dir() {
                continue;
            }
            let Ok(leaf_iter) = fs::read_dir(&s2_path) else {
                continue;
            };

            for leaf in leaf_iter.flatten() {
                let leaf_path = leaf.path();
                if !leaf_path.join(marker).is_file() {
                    continue;
                }
                let name = leaf.file_name();
                match name.to_str().map(ObjectId::parse) {
                    Some(Ok(id)) => ids.push(id),
                    _ => tracing::warn!(path = %leaf_path.display(), "skipping unexpected directory"),
                }
            }
        }
    }

    ids.sort();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::ResourceLocator;
    use crate::revision::tests::audit;
    use tempfile::TempDir;
    use vrs_identifiers::VersionIdentifier;

    fn origin() -> OriginId {
        OriginId::parse("node").expect("origin")
    }

    #[test]
    fn versions_survive_reopening_the_store() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let object_id = ObjectId::new();
        let owner_id = ObjectId::new();

        let (v1, v2) = {
            let store: FileStore<Vec<String>> =
                FileStore::open(temp_dir.path().join("things"), origin()).expect("open");
            let v1 = store
                .create(NewResource {
                    object_id,
                    owner_id,
                    content: vec!["a".into()],
                    audit: audit(),
                })
                .expect("create");
            let expected = VersionIdentifier::from(v1.version.clone());
            let v2 = store
                .append(
                    &object_id,
                    Commit {
                        locator: &ResourceLocator::Composition,
                        expected: Some(&expected),
                        content: vec!["a".into(), "b".into()],
                        audit: audit(),
                    },
                )
                .expect("append");
            (v1, v2)
        };

        let reopened: FileStore<Vec<String>> =
            FileStore::open(temp_dir.path().join("things"), origin()).expect("reopen");
        let history = reopened.history(&object_id).expect("read").expect("exists");
        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().expect("latest").version, v2.version);

        let first = reopened.snapshot(&v1.version).expect("read").expect("v1");
        assert_eq!(*first.content, vec!["a".to_string()]);
        assert_eq!(first.owner_id, owner_id);
        assert_eq!(reopened.object_ids().expect("ids"), vec![object_id]);
    }

    #[test]
    fn files_land_in_sharded_directories() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("things");
        let store: FileStore<String> = FileStore::open(root.clone(), origin()).expect("open");
        let object_id = ObjectId::parse("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").expect("id");

        store
            .create(NewResource {
                object_id,
                owner_id: ObjectId::new(),
                content: "x".into(),
                audit: audit(),
            })
            .expect("create");

        let dir = root
            .join("aa")
            .join("aa")
            .join("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        assert!(dir.join(HISTORY_FILE_NAME).is_file());
        assert!(dir.join(VERSIONS_DIR_NAME).join("1.yaml").is_file());
        assert!(!dir.join("history.yaml.tmp").exists());
    }

    #[test]
    fn discard_removes_the_resource_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("things");
        let store: FileStore<String> = FileStore::open(root, origin()).expect("open");
        let object_id = ObjectId::new();
        store
            .create(NewResource {
                object_id,
                owner_id: ObjectId::new(),
                content: "x".into(),
                audit: audit(),
            })
            .expect("create");

        store.discard(&object_id).expect("discard");
        store.discard(&object_id).expect("already gone");

        assert!(!store.resource_dir(&object_id).exists());
        assert!(store.history(&object_id).expect("read").is_none());
        assert!(store.object_ids().expect("ids").is_empty());
    }

    #[test]
    fn registry_with_record_persists_changes_only_on_success() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let registry = FileEhrRegistry::open(temp_dir.path().join("ehr")).expect("open");
        let record = EhrRecord {
            ehr_id: ObjectId::new(),
            system_id: origin(),
            time_created: chrono::Utc::now(),
            ehr_status_id: ObjectId::new(),
            directory_id: None,
        };
        registry.insert(record.clone()).expect("insert");
        assert!(matches!(
            registry.insert(record.clone()),
            Err(CoreError::DuplicateEhr(_))
        ));

        let failed = registry.with_record(&record.ehr_id, &mut |r| {
            r.directory_id = Some(ObjectId::new());
            Err(CoreError::InvalidInput("abort".into()))
        });
        assert!(failed.is_err());
        let unchanged = registry.get(&record.ehr_id).expect("read").expect("exists");
        assert_eq!(unchanged.directory_id, None);

        let directory_id = ObjectId::new();
        registry
            .with_record(&record.ehr_id, &mut |r| {
                r.directory_id = Some(directory_id);
                Ok(())
            })
            .expect("update");
        let list = registry.list().expect("list");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].directory_id, Some(directory_id));
    }

    #[test]
    fn unknown_ehr_is_not_found() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let registry = FileEhrRegistry::open(temp_dir.path().join("ehr")).expect("open");
        let err = registry
            .with_record(&ObjectId::new(), &mut |_| Ok(()))
            .expect_err("unknown");
        assert!(matches!(err, CoreError::EhrNotFound(_)));
    }
}
