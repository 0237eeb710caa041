//! openEHR wire/boundary support.
//!
//! This crate translates between the openEHR canonical JSON (and the equivalent YAML used by the
//! file store and CLI) and plain Rust structs. It knows nothing about versioning; `vrs-core`
//! converts these wire models into its own domain types.
//!
//! Supported RM classes:
//! - `FOLDER` (directory trees), see [`folder`].
//! - `EHR_STATUS`, see [`ehr_status`].

pub mod common;
pub mod ehr_status;
pub mod folder;

use thiserror::Error;

pub use common::{DvText, HierObjectId, ObjectRef, PartyRef};
pub use ehr_status::EhrStatus;
pub use folder::Folder;

/// Errors returned by the `openehr` boundary crate.
#[derive(Debug, Error)]
pub enum OpenehrError {
    #[error("invalid YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The document parsed but did not match the RM wire schema.
    #[error("{rm_type} schema mismatch at {path}: {message}")]
    SchemaMismatch {
        rm_type: &'static str,
        path: String,
        message: String,
    },

    #[error("expected _type {expected}, got {found}")]
    UnexpectedType {
        expected: &'static str,
        found: String,
    },
}

/// Read a `FOLDER` tree from canonical JSON text.
pub fn read_folder_json(json: &str) -> Result<Folder, OpenehrError> {
    let mut deserializer = serde_json::Deserializer::from_str(json);
    let folder: Folder = strict_parse("FOLDER", &mut deserializer)?;
    deserializer.end()?;
    folder.check_types()?;
    Ok(folder)
}

/// Read a `FOLDER` tree from an already parsed JSON value (request bodies).
pub fn read_folder_value(value: serde_json::Value) -> Result<Folder, OpenehrError> {
    let folder: Folder = strict_parse("FOLDER", value)?;
    folder.check_types()?;
    Ok(folder)
}

/// Read a `FOLDER` tree from YAML.
pub fn read_folder_yaml(yaml: &str) -> Result<Folder, OpenehrError> {
    let folder: Folder = strict_parse("FOLDER", serde_yaml::Deserializer::from_str(yaml))?;
    folder.check_types()?;
    Ok(folder)
}

/// Write a `FOLDER` tree to YAML.
pub fn write_folder_yaml(folder: &Folder) -> Result<String, OpenehrError> {
    Ok(serde_yaml::to_string(folder)?)
}

/// Read an `EHR_STATUS` from an already parsed JSON value.
pub fn read_ehr_status_value(value: serde_json::Value) -> Result<EhrStatus, OpenehrError> {
    let status: EhrStatus = strict_parse("EHR_STATUS", value)?;
    status.check_type()?;
    Ok(status)
}

/// Read an `EHR_STATUS` from YAML.
pub fn read_ehr_status_yaml(yaml: &str) -> Result<EhrStatus, OpenehrError> {
    let status: EhrStatus =
        strict_parse("EHR_STATUS", serde_yaml::Deserializer::from_str(yaml))?;
    status.check_type()?;
    Ok(status)
}

/// Write an `EHR_STATUS` to YAML.
pub fn write_ehr_status_yaml(status: &EhrStatus) -> Result<String, OpenehrError> {
    Ok(serde_yaml::to_string(status)?)
}

/// Deserialize with `serde_path_to_error` so failures name the offending field
/// (e.g. `folders[0].name.value`).
fn strict_parse<'de, D, T>(rm_type: &'static str, deserializer: D) -> Result<T, OpenehrError>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let path = if path.is_empty() || path == "." {
            "<root>".to_owned()
        } else {
            path
        };
        OpenehrError::SchemaMismatch {
            rm_type,
            path,
            message: err.into_inner().to_string(),
        }
    })
}
