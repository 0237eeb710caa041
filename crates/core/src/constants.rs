//! Constants used throughout the VRS core crate.
//!
//! Directory and file names for the file-backed store, default configuration values and
//! well-known tags live here so every module agrees on them.

/// Node name used when none is configured.
pub const DEFAULT_NODE_NAME: &str = "local.vrs.dev";

/// Base URL used for `Location` headers when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Directory holding the EHR registry records.
pub const EHR_DIR_NAME: &str = "ehr";

/// Directory holding folder (directory) histories.
pub const FOLDER_DIR_NAME: &str = "folders";

/// Directory holding EHR_STATUS histories.
pub const EHR_STATUS_DIR_NAME: &str = "ehr_status";

/// Directory holding composition histories.
pub const COMPOSITION_DIR_NAME: &str = "compositions";

/// Per-resource history file.
pub const HISTORY_FILE_NAME: &str = "history.yaml";

/// Per-resource directory holding one YAML file per version.
pub const VERSIONS_DIR_NAME: &str = "versions";

/// Per-EHR registry record file.
pub const EHR_RECORD_FILE_NAME: &str = "ehr.yaml";

/// Audit tag under which query dispatch records touched EHR ids.
pub const EHR_ID_TAG: &str = "ehr_id/value";

/// Stored query version selector meaning "highest registered version".
pub const LATEST_QUERY_VERSION: &str = "LATEST";

/// Committer recorded for system-initiated commits (e.g. the initial EHR_STATUS).
pub const SYSTEM_COMMITTER: &str = "vrs";
