//! Versioned compositions.
//!
//! The composition body is stored as opaque JSON; only the template id is lifted out so queries
//! can report it. Deleting a composition commits a final version with change type
//! [`ChangeType::Deleted`]; earlier versions stay retrievable by explicit version id.

use crate::concurrency::ResourceLocator;
use crate::config::CoreConfig;
use crate::revision::{AuditDetails, ChangeType, RevisionEntry, RevisionHistory};
use crate::store::{Commit, NewResource, Storage};
use crate::temporal::{OriginalVersion, TemporalResolver};
use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vrs_identifiers::{ObjectId, VersionIdentifier};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub body: serde_json::Value,
}

impl Composition {
    /// Wraps a canonical JSON document, reading `archetype_details.template_id.value` if present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] unless `body` is a JSON object.
    pub fn from_document(body: serde_json::Value) -> CoreResult<Self> {
        if !body.is_object() {
            return Err(CoreError::InvalidInput(
                "composition must be a JSON object".into(),
            ));
        }
        let template_id = body
            .pointer("/archetype_details/template_id/value")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);
        Ok(Self { template_id, body })
    }
}

#[derive(Clone)]
pub struct CompositionService {
    cfg: Arc<CoreConfig>,
    storage: Storage,
}

impl CompositionService {
    pub fn new(cfg: Arc<CoreConfig>, storage: Storage) -> Self {
        Self { cfg, storage }
    }

    /// Commits a new composition for `ehr_id` as version 1.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EhrNotFound`] if the EHR does not exist.
    pub fn create(
        &self,
        ehr_id: &ObjectId,
        composition: Composition,
        audit: AuditDetails,
    ) -> CoreResult<RevisionEntry> {
        if self.storage.ehrs.get(ehr_id)?.is_none() {
            return Err(CoreError::EhrNotFound(*ehr_id));
        }

        let entry = self.storage.compositions.create(NewResource {
            object_id: ObjectId::new(),
            owner_id: *ehr_id,
            content: composition,
            audit: audit.with_change_type(ChangeType::Creation),
        })?;
        tracing::info!(
            %ehr_id,
            version = %entry.version,
            node = %self.cfg.node_name(),
            "composition created"
        );
        Ok(entry)
    }

    /// Retrieves by bare id (latest version) or by full version id.
    ///
    /// # Errors
    ///
    /// - [`CoreError::MalformedIdentifier`] for unparsable input.
    /// - [`CoreError::ResourceNotFound`] for an unknown or deleted composition.
    /// - [`CoreError::VersionNotFound`] if the named version does not exist.
    pub fn retrieve(&self, id: &str) -> CoreResult<OriginalVersion<Composition>> {
        let id = VersionIdentifier::parse(id)?;
        let found = TemporalResolver::new(self.storage.compositions.as_ref())
            .resolve_query(&id.object_id(), &id.version_query())?;

        if let Some(requested) = id.version() {
            if found.entry.version != *requested {
                return Err(CoreError::VersionNotFound(requested.clone()));
            }
        }
        if found.entry.audit.change_type() == ChangeType::Deleted {
            return Err(CoreError::ResourceNotFound(format!(
                "composition {} was deleted",
                id.object_id()
            )));
        }
        Ok(found)
    }

    /// # Errors
    ///
    /// [`CoreError::ResourceNotFound`] if the composition is unknown or deleted, otherwise as
    /// [`crate::store::VersionStore::append`].
    pub fn update(
        &self,
        object_id: &ObjectId,
        expected: Option<&VersionIdentifier>,
        composition: Composition,
        audit: AuditDetails,
    ) -> CoreResult<RevisionEntry> {
        self.ensure_live(object_id)?;
        let entry = self.storage.compositions.append(
            object_id,
            Commit {
                locator: &ResourceLocator::Composition,
                expected,
                content: composition,
                audit: audit.with_change_type(ChangeType::Modification),
            },
        )?;
        tracing::info!(version = %entry.version, "composition updated");
        Ok(entry)
    }

    /// Commits a deletion version carrying the last content.
    pub fn delete(
        &self,
        object_id: &ObjectId,
        expected: Option<&VersionIdentifier>,
        audit: AuditDetails,
    ) -> CoreResult<RevisionEntry> {
        let latest = self.ensure_live(object_id)?;
        let entry = self.storage.compositions.append(
            object_id,
            Commit {
                locator: &ResourceLocator::Composition,
                expected,
                content: (*latest.snapshot.content).clone(),
                audit: audit.with_change_type(ChangeType::Deleted),
            },
        )?;
        tracing::info!(version = %entry.version, "composition deleted");
        Ok(entry)
    }

    pub fn history(&self, object_id: &ObjectId) -> CoreResult<RevisionHistory> {
        self.storage
            .compositions
            .history(object_id)?
            .ok_or_else(|| CoreError::ResourceNotFound(object_id.to_string()))
    }

    fn ensure_live(&self, object_id: &ObjectId) -> CoreResult<OriginalVersion<Composition>> {
        self.retrieve(&object_id.to_string())
    }
}
