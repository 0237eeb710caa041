//! Directory operations for one EHR.
//!
//! An EHR owns at most one directory. The link from EHR to directory lives on the
//! [`EhrRecord`](crate::store::EhrRecord); every mutation runs inside
//! [`EhrRegistry::with_record`](crate::store::EhrRegistry::with_record), which serialises all
//! directory writes for the same EHR. Deleting a directory only clears the link; the folder's
//! versions stay readable by explicit version id.

use super::{FolderNode, FolderPath};
use crate::concurrency::{ConcurrencyGuard, ResourceLocator};
use crate::config::CoreConfig;
use crate::outcome::Lookup;
use crate::revision::{AuditDetails, ChangeType, RevisionEntry, RevisionHistory};
use crate::store::{Commit, EhrRecord, NewResource, ResourceSnapshot, Storage};
use crate::temporal::TemporalResolver;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use vrs_identifiers::{ObjectId, ObjectVersionId, VersionIdentifier};

/// A folder (the whole tree or a sub-folder) as of one directory version.
#[derive(Clone, Debug)]
pub struct DirectoryView {
    /// Version of the directory the folder was read from.
    pub version: ObjectVersionId,
    pub committed_at: DateTime<Utc>,
    pub folder: Arc<FolderNode>,
}

#[derive(Clone)]
pub struct DirectoryService {
    cfg: Arc<CoreConfig>,
    storage: Storage,
}

impl DirectoryService {
    pub fn new(cfg: Arc<CoreConfig>, storage: Storage) -> Self {
        Self { cfg, storage }
    }

    /// Creates the directory of `ehr_id` with `tree` as version 1.
    ///
    /// # Errors
    ///
    /// - [`CoreError::EhrNotFound`] if the EHR does not exist.
    /// - [`CoreError::DuplicateContainer`] if the EHR already has a directory.
    pub fn create(
        &self,
        ehr_id: &ObjectId,
        tree: FolderNode,
        audit: AuditDetails,
    ) -> CoreResult<RevisionEntry> {
        let audit = audit.with_change_type(ChangeType::Creation);
        let mut created = None;

        let linked = self.storage.ehrs.with_record(ehr_id, &mut |record| {
            if record.directory_id.is_some() {
                return Err(CoreError::DuplicateContainer(*ehr_id));
            }
            let directory_id = ObjectId::new();
            let entry = self.storage.folders.create(NewResource {
                object_id: directory_id,
                owner_id: *ehr_id,
                content: tree.clone(),
                audit: audit.clone(),
            })?;
            record.directory_id = Some(directory_id);
            created = Some(entry);
            Ok(())
        });

        if let Err(err) = linked {
            // The folder history exists but the record pointing at it was never persisted.
            if let Some(entry) = created.take() {
                let directory_id = entry.version.object_id();
                if let Err(cleanup) = self.storage.folders.discard(&directory_id) {
                    tracing::error!(
                        %ehr_id,
                        %directory_id,
                        "failed to discard unlinked directory: {cleanup}"
                    );
                }
            }
            return Err(err);
        }

        // SAFETY: with_record only returns Ok after the closure has set `created`
        let entry = created.expect("directory entry recorded");
        tracing::info!(
            %ehr_id,
            version = %entry.version,
            node = %self.cfg.node_name(),
            "directory created"
        );
        Ok(entry)
    }

    /// The folder at `path` within directory version `version`.
    ///
    /// Returns [`Lookup::NotFound`] when the path does not exist in that version.
    ///
    /// # Errors
    ///
    /// - [`CoreError::MalformedPath`] for an invalid path (checked before any lookup).
    /// - [`CoreError::EhrNotFound`] if the EHR does not exist.
    /// - [`CoreError::ContainerNotFound`] if `version` is not a directory version of this EHR.
    pub fn get(
        &self,
        ehr_id: &ObjectId,
        version: &ObjectVersionId,
        path: Option<&str>,
    ) -> CoreResult<Lookup<DirectoryView>> {
        let path = FolderPath::parse_optional(path)?;
        self.record(ehr_id)?;

        let snapshot = self
            .storage
            .folders
            .snapshot(version)?
            .filter(|s| s.owner_id == *ehr_id)
            .ok_or(CoreError::ContainerNotFound(*ehr_id))?;
        Ok(view_at(snapshot, &path))
    }

    /// The folder at `path` as of `at` (latest when `None`).
    ///
    /// # Errors
    ///
    /// As [`Self::get`]; [`CoreError::ContainerNotFound`] when the EHR has no current directory
    /// and [`CoreError::NoVersionBeforeInstant`] when `at` predates it.
    pub fn get_at_time(
        &self,
        ehr_id: &ObjectId,
        at: Option<DateTime<Utc>>,
        path: Option<&str>,
    ) -> CoreResult<Lookup<DirectoryView>> {
        let path = FolderPath::parse_optional(path)?;
        let directory_id = self.directory_id(ehr_id)?;

        let snapshot = TemporalResolver::new(self.storage.folders.as_ref())
            .resolve(&directory_id, at)?;
        Ok(view_at(snapshot, &path))
    }

    /// Replaces the whole tree.
    pub fn update(
        &self,
        ehr_id: &ObjectId,
        expected: Option<&VersionIdentifier>,
        tree: FolderNode,
        audit: AuditDetails,
    ) -> CoreResult<RevisionEntry> {
        self.update_at_path(ehr_id, expected, &FolderPath::root(), tree, audit)
    }

    /// Replaces the sub-folder at `path`, committing a new version of the whole directory.
    ///
    /// The precondition is checked before the edit is applied, so a stale caller always gets
    /// [`CoreError::VersionConflict`] rather than an error about the tree.
    ///
    /// # Errors
    ///
    /// - [`CoreError::MissingPrecondition`] or [`CoreError::VersionConflict`].
    /// - [`CoreError::ContainerNotFound`] if the EHR has no directory.
    /// - [`CoreError::ResourceNotFound`] if `path` does not exist in the latest version.
    pub fn update_at_path(
        &self,
        ehr_id: &ObjectId,
        expected: Option<&VersionIdentifier>,
        path: &FolderPath,
        subtree: FolderNode,
        audit: AuditDetails,
    ) -> CoreResult<RevisionEntry> {
        let locator = ResourceLocator::Directory { ehr_id: *ehr_id };
        let audit = audit.with_change_type(ChangeType::Modification);
        let folders = &self.storage.folders;
        let mut committed = None;

        self.storage.ehrs.with_record(ehr_id, &mut |record| {
            let directory_id = linked_directory(record)?;
            let history = folders
                .history(&directory_id)?
                .ok_or(CoreError::ContainerNotFound(*ehr_id))?;
            let latest = history.latest()?;
            ConcurrencyGuard::check(&locator, expected, &latest.version)?;

            let current = folders
                .snapshot(&latest.version)?
                .ok_or_else(|| CoreError::VersionNotFound(latest.version.clone()))?;
            let new_root = current.content.replace_at(path, subtree.clone())?;

            let entry = folders.append(
                &directory_id,
                Commit {
                    locator: &locator,
                    expected,
                    content: Arc::unwrap_or_clone(new_root),
                    audit: audit.clone(),
                },
            )?;
            committed = Some(entry);
            Ok(())
        })?;

        // SAFETY: with_record only returns Ok after the closure has set `committed`
        let entry = committed.expect("directory entry recorded");
        tracing::info!(%ehr_id, version = %entry.version, %path, "directory updated");
        Ok(entry)
    }

    /// Detaches the directory from the EHR after checking the precondition.
    ///
    /// Returns the version that was current when the directory was deleted.
    ///
    /// # Errors
    ///
    /// - [`CoreError::MissingPrecondition`] or [`CoreError::VersionConflict`].
    /// - [`CoreError::ContainerNotFound`] if the EHR has no directory.
    pub fn delete(
        &self,
        ehr_id: &ObjectId,
        expected: Option<&VersionIdentifier>,
        audit: AuditDetails,
    ) -> CoreResult<ObjectVersionId> {
        let locator = ResourceLocator::Directory { ehr_id: *ehr_id };
        let mut deleted = None;

        self.storage.ehrs.with_record(ehr_id, &mut |record| {
            let directory_id = linked_directory(record)?;
            let history = self
                .storage
                .folders
                .history(&directory_id)?
                .ok_or(CoreError::ContainerNotFound(*ehr_id))?;
            let latest = history.latest()?;
            ConcurrencyGuard::check(&locator, expected, &latest.version)?;

            record.directory_id = None;
            deleted = Some(latest.version.clone());
            Ok(())
        })?;

        // SAFETY: with_record only returns Ok after the closure has set `deleted`
        let version = deleted.expect("deleted version recorded");
        tracing::info!(
            %ehr_id,
            %version,
            committer = %audit.committer(),
            "directory deleted"
        );
        Ok(version)
    }

    /// Full history of the EHR's current directory.
    pub fn history(&self, ehr_id: &ObjectId) -> CoreResult<RevisionHistory> {
        let directory_id = self.directory_id(ehr_id)?;
        self.storage
            .folders
            .history(&directory_id)?
            .ok_or(CoreError::ContainerNotFound(*ehr_id))
    }

    fn record(&self, ehr_id: &ObjectId) -> CoreResult<EhrRecord> {
        self.storage
            .ehrs
            .get(ehr_id)?
            .ok_or(CoreError::EhrNotFound(*ehr_id))
    }

    fn directory_id(&self, ehr_id: &ObjectId) -> CoreResult<ObjectId> {
        linked_directory(&self.record(ehr_id)?)
    }
}

fn linked_directory(record: &EhrRecord) -> CoreResult<ObjectId> {
    record
        .directory_id
        .ok_or(CoreError::ContainerNotFound(record.ehr_id))
}

fn view_at(snapshot: ResourceSnapshot<FolderNode>, path: &FolderPath) -> Lookup<DirectoryView> {
    snapshot
        .content
        .find(path)
        .map(|folder| DirectoryView {
            version: snapshot.version.clone(),
            committed_at: snapshot.committed_at,
            folder,
        })
        .into()
}
