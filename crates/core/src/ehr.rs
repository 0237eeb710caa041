//! EHR lifecycle and the versioned `EHR_STATUS` of each EHR.
//!
//! Creating an EHR commits version 1 of its status and then registers the EHR. If registering
//! fails, for example because a concurrent create took the id, the status is discarded again.
//! The status is the only part of an EHR record that changes over time; it is versioned like any
//! other resource and updated under optimistic concurrency.

use crate::concurrency::ResourceLocator;
use crate::config::CoreConfig;
use crate::revision::{AuditDetails, ChangeType, RevisionEntry, RevisionHistory};
use crate::store::{Commit, EhrRecord, NewResource, Storage};
use crate::temporal::{OriginalVersion, TemporalResolver};
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use openehr::{EhrStatus, HierObjectId};
use std::sync::Arc;
use vrs_identifiers::{ObjectId, ObjectVersionId, VersionIdentifier, VersionQuery};

/// Metadata of a versioned object, independent of any one version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedObjectSummary {
    pub uid: ObjectId,
    pub owner_id: ObjectId,
    pub time_created: DateTime<Utc>,
}

#[derive(Clone)]
pub struct EhrService {
    cfg: Arc<CoreConfig>,
    storage: Storage,
}

impl EhrService {
    pub fn new(cfg: Arc<CoreConfig>, storage: Storage) -> Self {
        Self { cfg, storage }
    }

    /// Creates an EHR with a generated id.
    ///
    /// `status` defaults to [`EhrStatus::default`] (queryable, modifiable, no subject).
    pub fn create_ehr(
        &self,
        status: Option<EhrStatus>,
        audit: AuditDetails,
    ) -> CoreResult<EhrRecord> {
        self.create(ObjectId::new(), status, audit)
    }

    /// Creates an EHR with a caller-chosen id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateEhr`] if the id is already in use.
    pub fn create_ehr_with_id(
        &self,
        ehr_id: ObjectId,
        status: Option<EhrStatus>,
        audit: AuditDetails,
    ) -> CoreResult<EhrRecord> {
        self.create(ehr_id, status, audit)
    }

    fn create(
        &self,
        ehr_id: ObjectId,
        status: Option<EhrStatus>,
        audit: AuditDetails,
    ) -> CoreResult<EhrRecord> {
        if self.has_ehr(&ehr_id)? {
            return Err(CoreError::DuplicateEhr(ehr_id));
        }

        let ehr_status_id = ObjectId::new();
        let entry = self.storage.ehr_statuses.create(NewResource {
            object_id: ehr_status_id,
            owner_id: ehr_id,
            content: unstamped(status.unwrap_or_default()),
            audit: audit.with_change_type(ChangeType::Creation),
        })?;

        let record = EhrRecord {
            ehr_id,
            system_id: self.cfg.node_name().clone(),
            time_created: entry.committed_at,
            ehr_status_id,
            directory_id: None,
        };
        if let Err(err) = self.storage.ehrs.insert(record.clone()) {
            // The status was committed but its EHR never registered.
            if let Err(cleanup) = self.storage.ehr_statuses.discard(&ehr_status_id) {
                tracing::error!(
                    %ehr_id,
                    %ehr_status_id,
                    "failed to discard unlinked EHR_STATUS: {cleanup}"
                );
            }
            return Err(err);
        }

        tracing::info!(%ehr_id, status = %entry.version, "EHR created");
        Ok(record)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::EhrNotFound`] for an unknown EHR.
    pub fn get_ehr(&self, ehr_id: &ObjectId) -> CoreResult<EhrRecord> {
        self.storage
            .ehrs
            .get(ehr_id)?
            .ok_or(CoreError::EhrNotFound(*ehr_id))
    }

    pub fn has_ehr(&self, ehr_id: &ObjectId) -> CoreResult<bool> {
        Ok(self.storage.ehrs.get(ehr_id)?.is_some())
    }

    pub fn list_ehrs(&self) -> CoreResult<Vec<EhrRecord>> {
        self.storage.ehrs.list()
    }

    pub fn versioned_ehr_status(&self, ehr_id: &ObjectId) -> CoreResult<VersionedObjectSummary> {
        let record = self.get_ehr(ehr_id)?;
        let history = self.revision_history(ehr_id)?;
        let first = history
            .first()
            .ok_or(CoreError::EmptyHistory(record.ehr_status_id))?;

        Ok(VersionedObjectSummary {
            uid: record.ehr_status_id,
            owner_id: record.ehr_id,
            time_created: first.committed_at,
        })
    }

    pub fn revision_history(&self, ehr_id: &ObjectId) -> CoreResult<RevisionHistory> {
        let record = self.get_ehr(ehr_id)?;
        self.storage
            .ehr_statuses
            .history(&record.ehr_status_id)?
            .ok_or_else(|| CoreError::ResourceNotFound(record.ehr_status_id.to_string()))
    }

    /// The status active at `at`, or the current one when `at` is `None`.
    ///
    /// # Errors
    ///
    /// [`CoreError::EhrNotFound`] or [`CoreError::NoVersionBeforeInstant`].
    pub fn ehr_status_at_time(
        &self,
        ehr_id: &ObjectId,
        at: Option<DateTime<Utc>>,
    ) -> CoreResult<OriginalVersion<EhrStatus>> {
        let record = self.get_ehr(ehr_id)?;
        TemporalResolver::new(self.storage.ehr_statuses.as_ref())
            .resolve_query(&record.ehr_status_id, &VersionQuery::at_time(at))
    }

    /// The status version named by `version_uid` (`uuid::origin::ordinal`).
    ///
    /// # Errors
    ///
    /// - [`CoreError::MalformedIdentifier`] if `version_uid` is not a full version id.
    /// - [`CoreError::ResourceNotFound`] if it names an object other than this EHR's status.
    /// - [`CoreError::VersionNotFound`] if the version does not exist.
    pub fn ehr_status_at_version(
        &self,
        ehr_id: &ObjectId,
        version_uid: &str,
    ) -> CoreResult<OriginalVersion<EhrStatus>> {
        let requested = &ObjectVersionId::parse(version_uid)?;

        let record = self.get_ehr(ehr_id)?;
        if requested.object_id() != record.ehr_status_id {
            return Err(CoreError::ResourceNotFound(format!(
                "EHR_STATUS {} in EHR {ehr_id}",
                requested.object_id()
            )));
        }

        let found = TemporalResolver::new(self.storage.ehr_statuses.as_ref()).resolve_query(
            &record.ehr_status_id,
            &VersionQuery::AtOrdinal(requested.ordinal()),
        )?;
        if found.entry.version != *requested {
            return Err(CoreError::VersionNotFound(requested.clone()));
        }
        Ok(found)
    }

    /// # Errors
    ///
    /// [`CoreError::EhrNotFound`], [`CoreError::MissingPrecondition`] or
    /// [`CoreError::VersionConflict`].
    pub fn update_ehr_status(
        &self,
        ehr_id: &ObjectId,
        expected: Option<&VersionIdentifier>,
        status: EhrStatus,
        audit: AuditDetails,
    ) -> CoreResult<RevisionEntry> {
        let record = self.get_ehr(ehr_id)?;
        let entry = self.storage.ehr_statuses.append(
            &record.ehr_status_id,
            Commit {
                locator: &ResourceLocator::EhrStatus { ehr_id: *ehr_id },
                expected,
                content: unstamped(status),
                audit: audit.with_change_type(ChangeType::Modification),
            },
        )?;
        tracing::info!(%ehr_id, version = %entry.version, "EHR_STATUS updated");
        Ok(entry)
    }
}

/// A copy of `status` whose `uid` names `version`, for output.
pub fn stamped(status: &EhrStatus, version: &ObjectVersionId) -> EhrStatus {
    EhrStatus {
        uid: Some(HierObjectId::object_version_id(version.to_string())),
        ..status.clone()
    }
}

/// Stored statuses never carry a uid; it is derived from the version on output.
fn unstamped(status: EhrStatus) -> EhrStatus {
    EhrStatus { uid: None, ..status }
}
