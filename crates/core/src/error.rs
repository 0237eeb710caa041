use chrono::{DateTime, Utc};
use vrs_identifiers::{IdError, ObjectId, ObjectVersionId};

/// Details carried by a failed optimistic-concurrency check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionConflict {
    /// The version the caller should have named.
    pub latest: ObjectVersionId,
    /// Relative location of `latest` (e.g. `ehr/<id>/directory/<version>`).
    pub location: String,
}

/// How an error should be reported to a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    ClientError,
    PreconditionFailed,
    NotFound,
    Conflict,
    QueryExecution,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(#[from] IdError),
    #[error("malformed path: '{0}'")]
    MalformedPath(String),
    #[error("openEHR error: {0}")]
    Openehr(#[from] openehr::OpenehrError),

    #[error("a version precondition (If-Match) is required")]
    MissingPrecondition,
    #[error("version conflict: latest version is {}", .0.latest)]
    VersionConflict(Box<VersionConflict>),

    #[error("out of order version for {object_id}: {reason}")]
    OutOfOrderVersion { object_id: ObjectId, reason: String },
    #[error("history of {0} is empty")]
    EmptyHistory(ObjectId),
    #[error("{object_id} has no version at or before {instant}")]
    NoVersionBeforeInstant {
        object_id: ObjectId,
        instant: DateTime<Utc>,
    },

    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    #[error("version not found: {0}")]
    VersionNotFound(ObjectVersionId),
    #[error("EHR not found: {0}")]
    EhrNotFound(ObjectId),
    #[error("directory not found for EHR {0}")]
    ContainerNotFound(ObjectId),
    #[error("could not retrieve query identified by: {name}/{version}")]
    QueryNotFound { name: String, version: String },

    #[error("EHR already exists: {0}")]
    DuplicateEhr(ObjectId),
    #[error("EHR {0} already has a directory")]
    DuplicateContainer(ObjectId),
    #[error("resource already exists: {0}")]
    DuplicateResource(ObjectId),

    #[error("query execution failed: {0}")]
    QueryExecution(String),

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error(
        "create failed and cleanup also failed (path: {path}): create={create_error}; cleanup={cleanup_error}",
        path = path.display()
    )]
    CleanupAfterCreateFailed {
        path: std::path::PathBuf,
        #[source]
        create_error: Box<CoreError>,
        cleanup_error: std::io::Error,
    },
    #[error("failed to write store file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read store file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl CoreError {
    pub(crate) fn version_conflict(latest: ObjectVersionId, location: String) -> Self {
        Self::VersionConflict(Box::new(VersionConflict { latest, location }))
    }

    /// Stable, machine-readable label for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::MalformedIdentifier(_) => "malformed_identifier",
            Self::MalformedPath(_) => "malformed_path",
            Self::Openehr(_) => "invalid_document",
            Self::MissingPrecondition => "missing_precondition",
            Self::VersionConflict(_) => "version_conflict",
            Self::OutOfOrderVersion { .. } => "out_of_order_version",
            Self::EmptyHistory(_) => "empty_history",
            Self::NoVersionBeforeInstant { .. } => "no_version_before_instant",
            Self::ResourceNotFound(_) => "resource_not_found",
            Self::VersionNotFound(_) => "version_not_found",
            Self::EhrNotFound(_) => "ehr_not_found",
            Self::ContainerNotFound(_) => "container_not_found",
            Self::QueryNotFound { .. } => "query_not_found",
            Self::DuplicateEhr(_) => "duplicate_ehr",
            Self::DuplicateContainer(_) => "duplicate_container",
            Self::DuplicateResource(_) => "duplicate_resource",
            Self::QueryExecution(_) => "query_execution",
            Self::StorageDirCreation(_)
            | Self::CleanupAfterCreateFailed { .. }
            | Self::FileWrite(_)
            | Self::FileRead(_)
            | Self::YamlSerialization(_)
            | Self::YamlDeserialization(_)
            | Self::LockPoisoned => "storage",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_)
            | Self::MalformedIdentifier(_)
            | Self::MalformedPath(_)
            | Self::Openehr(_)
            | Self::MissingPrecondition => ErrorCategory::ClientError,
            Self::VersionConflict(_) => ErrorCategory::PreconditionFailed,
            Self::NoVersionBeforeInstant { .. }
            | Self::ResourceNotFound(_)
            | Self::VersionNotFound(_)
            | Self::EhrNotFound(_)
            | Self::ContainerNotFound(_)
            | Self::QueryNotFound { .. } => ErrorCategory::NotFound,
            Self::DuplicateEhr(_) | Self::DuplicateContainer(_) | Self::DuplicateResource(_) => {
                ErrorCategory::Conflict
            }
            Self::QueryExecution(_) => ErrorCategory::QueryExecution,
            Self::OutOfOrderVersion { .. }
            | Self::EmptyHistory(_)
            | Self::StorageDirCreation(_)
            | Self::CleanupAfterCreateFailed { .. }
            | Self::FileWrite(_)
            | Self::FileRead(_)
            | Self::YamlSerialization(_)
            | Self::YamlDeserialization(_)
            | Self::LockPoisoned => ErrorCategory::Internal,
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use vrs_identifiers::VersionIdentifier;

    #[test]
    fn identifier_errors_are_client_errors() {
        let err: CoreError = VersionIdentifier::parse("abc::node::0")
            .expect_err("bad id")
            .into();
        assert_eq!(err.kind(), "malformed_identifier");
        assert_eq!(err.category(), ErrorCategory::ClientError);
    }

    #[test]
    fn conflict_message_names_latest_version() {
        let latest = vrs_identifiers::ObjectVersionId::parse(
            "8849182c-82ad-4088-a07f-48ead4180515::node::2",
        )
        .expect("valid version");
        let err = CoreError::version_conflict(latest, "x".into());
        assert_eq!(err.category(), ErrorCategory::PreconditionFailed);
        assert!(err
            .to_string()
            .ends_with("8849182c-82ad-4088-a07f-48ead4180515::node::2"));
    }
}
