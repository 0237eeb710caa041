//! Storage boundary for versioned resources.
//!
//! A [`VersionStore`] keeps, per object id, the [`RevisionHistory`] and one immutable snapshot
//! per committed version. Histories grow through [`VersionStore::create`] and
//! [`VersionStore::append`]; `append` performs read-latest, precondition check and append as one
//! atomic step under a per-object lock, so two writers naming the same expected version can never
//! both succeed. [`VersionStore::discard`] only undoes a create that was never linked to an EHR.
//!
//! The [`EhrRegistry`] holds one [`EhrRecord`] per EHR, including the link from an EHR to its
//! directory. [`EhrRegistry::with_record`] runs a closure under the per-EHR lock; directory
//! mutations run inside it so that everything touching one EHR's directory is serialised.
//!
//! Two backends are provided:
//! - [`memory`]: process-local maps, used by tests and when no data directory is configured.
//! - [`file`]: YAML files under sharded directories (`<data>/<kind>/<s1>/<s2>/<id>/`).

pub mod file;
mod locks;
pub mod memory;

use crate::composition::Composition;
use crate::concurrency::{ConcurrencyGuard, ResourceLocator};
use crate::config::CoreConfig;
use crate::directory::FolderNode;
use crate::revision::{AuditDetails, RevisionEntry, RevisionHistory};
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use openehr::EhrStatus;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;
use vrs_identifiers::{
    next_commit_time, ObjectId, ObjectVersionId, Ordinal, OriginId, VersionIdentifier,
};

/// One committed version of a resource.
#[derive(Debug)]
pub struct ResourceSnapshot<T> {
    pub version: ObjectVersionId,
    pub committed_at: DateTime<Utc>,
    /// The EHR this resource belongs to.
    pub owner_id: ObjectId,
    pub content: Arc<T>,
}

impl<T> Clone for ResourceSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version.clone(),
            committed_at: self.committed_at,
            owner_id: self.owner_id,
            content: Arc::clone(&self.content),
        }
    }
}

/// First version of a new resource.
#[derive(Debug)]
pub struct NewResource<T> {
    pub object_id: ObjectId,
    pub owner_id: ObjectId,
    pub content: T,
    pub audit: AuditDetails,
}

/// A follow-up version of an existing resource, guarded by the caller's precondition.
#[derive(Debug)]
pub struct Commit<'a, T> {
    pub locator: &'a ResourceLocator,
    pub expected: Option<&'a VersionIdentifier>,
    pub content: T,
    pub audit: AuditDetails,
}

pub trait VersionStore<T>: Send + Sync {
    /// Commits version 1.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateResource`] if the object id already has a history.
    fn create(&self, resource: NewResource<T>) -> CoreResult<RevisionEntry>;

    /// Atomically checks `commit.expected` against the latest version and appends.
    ///
    /// # Errors
    ///
    /// [`CoreError::ResourceNotFound`], [`CoreError::MissingPrecondition`] or
    /// [`CoreError::VersionConflict`]; nothing is written on error.
    fn append(&self, object_id: &ObjectId, commit: Commit<'_, T>) -> CoreResult<RevisionEntry>;

    /// A consistent copy of the history, or `None` for an unknown object.
    fn history(&self, object_id: &ObjectId) -> CoreResult<Option<RevisionHistory>>;

    /// The snapshot of exactly `version` (object, origin and ordinal must all match).
    fn snapshot(&self, version: &ObjectVersionId) -> CoreResult<Option<ResourceSnapshot<T>>>;

    /// All object ids with a history, in ascending order.
    fn object_ids(&self) -> CoreResult<Vec<ObjectId>>;

    /// Removes a history that was created but never linked from an [`EhrRecord`].
    ///
    /// Only for rolling back a create whose registry write failed; unknown ids are ignored.
    fn discard(&self, object_id: &ObjectId) -> CoreResult<()>;
}

/// Registry entry for one EHR.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EhrRecord {
    pub ehr_id: ObjectId,
    pub system_id: OriginId,
    pub time_created: DateTime<Utc>,
    pub ehr_status_id: ObjectId,
    /// Current directory; cleared on delete while the folder history is kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_id: Option<ObjectId>,
}

pub trait EhrRegistry: Send + Sync {
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateEhr`] if the id is taken.
    fn insert(&self, record: EhrRecord) -> CoreResult<()>;

    fn get(&self, ehr_id: &ObjectId) -> CoreResult<Option<EhrRecord>>;

    fn list(&self) -> CoreResult<Vec<EhrRecord>>;

    /// Runs `f` on a copy of the record while holding the per-EHR lock and persists the copy if
    /// `f` succeeded and changed it. Returns the resulting record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EhrNotFound`] for an unknown EHR, or whatever `f` returned.
    fn with_record(
        &self,
        ehr_id: &ObjectId,
        f: &mut dyn FnMut(&mut EhrRecord) -> CoreResult<()>,
    ) -> CoreResult<EhrRecord>;
}

/// All stores used by the services, sharing one backend.
#[derive(Clone)]
pub struct Storage {
    pub folders: Arc<dyn VersionStore<FolderNode>>,
    pub ehr_statuses: Arc<dyn VersionStore<EhrStatus>>,
    pub compositions: Arc<dyn VersionStore<Composition>>,
    pub ehrs: Arc<dyn EhrRegistry>,
}

impl Storage {
    pub fn in_memory(origin: OriginId) -> Self {
        Self {
            folders: Arc::new(memory::MemoryStore::<FolderNode>::new(origin.clone())),
            ehr_statuses: Arc::new(memory::MemoryStore::<EhrStatus>::new(origin.clone())),
            compositions: Arc::new(memory::MemoryStore::<Composition>::new(origin)),
            ehrs: Arc::new(memory::MemoryEhrRegistry::default()),
        }
    }

    /// File-backed storage rooted at `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageDirCreation`] if the kind directories cannot be created.
    pub fn open_dir(data_dir: &Path, origin: OriginId) -> CoreResult<Self> {
        use crate::constants::{
            COMPOSITION_DIR_NAME, EHR_DIR_NAME, EHR_STATUS_DIR_NAME, FOLDER_DIR_NAME,
        };

        Ok(Self {
            folders: Arc::new(file::FileStore::<FolderNode>::open(
                data_dir.join(FOLDER_DIR_NAME),
                origin.clone(),
            )?),
            ehr_statuses: Arc::new(file::FileStore::<EhrStatus>::open(
                data_dir.join(EHR_STATUS_DIR_NAME),
                origin.clone(),
            )?),
            compositions: Arc::new(file::FileStore::<Composition>::open(
                data_dir.join(COMPOSITION_DIR_NAME),
                origin,
            )?),
            ehrs: Arc::new(file::FileEhrRegistry::open(data_dir.join(EHR_DIR_NAME))?),
        })
    }

    /// In-memory or file-backed, depending on [`CoreConfig::data_dir`].
    pub fn from_config(cfg: &CoreConfig) -> CoreResult<Self> {
        match cfg.data_dir() {
            Some(dir) => {
                tracing::info!(data_dir = %dir.display(), "using file-backed storage");
                Self::open_dir(dir, cfg.node_name().clone())
            }
            None => {
                tracing::info!("using in-memory storage");
                Ok(Self::in_memory(cfg.node_name().clone()))
            }
        }
    }
}

/// Builds the next entry of `history`.
///
/// Must be called while holding the resource's lock.
pub(crate) fn next_entry(
    history: &RevisionHistory,
    origin: &OriginId,
    audit: AuditDetails,
) -> CoreResult<RevisionEntry> {
    let last = history.entries().last();
    let ordinal = match last {
        Some(entry) => entry.ordinal().next()?,
        None => Ordinal::FIRST,
    };

    Ok(RevisionEntry {
        version: ObjectVersionId::new(history.object_id(), origin.clone(), ordinal),
        committed_at: next_commit_time(last.map(|e| e.committed_at)),
        preceding_version: last.map(|e| e.version.clone()),
        audit,
        contribution_id: Uuid::new_v4(),
    })
}

/// Checks the caller's precondition against `history` and builds the entry to append.
///
/// Must be called while holding the resource's lock.
pub(crate) fn guarded_next_entry<T>(
    history: &RevisionHistory,
    origin: &OriginId,
    commit: &Commit<'_, T>,
) -> CoreResult<RevisionEntry> {
    let latest = history.latest()?;
    ConcurrencyGuard::check(commit.locator, commit.expected, &latest.version)?;
    next_entry(history, origin, commit.audit.clone())
}

/// Appends to `history`, logging ordering violations (which indicate a store bug).
pub(crate) fn append_logged(history: &mut RevisionHistory, entry: RevisionEntry) -> CoreResult<()> {
    let object_id = history.object_id();
    history.append(entry).inspect_err(|err| {
        tracing::error!(%object_id, "rejected history append: {err}");
    })
}
