//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into core services as
//! `Arc<CoreConfig>`. Nothing in this crate reads environment variables during request handling;
//! binaries read the environment and call the `*_from_env_value` helpers below.

use crate::constants::{DEFAULT_BASE_URL, DEFAULT_NODE_NAME};
use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};
use vrs_identifiers::OriginId;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: Option<PathBuf>,
    node_name: OriginId,
    base_url: String,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// `data_dir` of `None` selects the in-memory store. `base_url` is the public prefix used
    /// when building `Location` headers; a trailing `/` is removed.
    pub fn new(
        data_dir: Option<PathBuf>,
        node_name: OriginId,
        base_url: impl Into<String>,
    ) -> CoreResult<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(CoreError::InvalidInput("base_url cannot be empty".into()));
        }

        Ok(Self {
            data_dir,
            node_name,
            base_url,
        })
    }

    /// In-memory configuration with default node name and base URL.
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            node_name: default_node_name(),
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn node_name(&self) -> &OriginId {
        &self.node_name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a location relative to the base URL.
    pub fn absolute_location(&self, relative: &str) -> String {
        format!("{}/{}", self.base_url, relative.trim_start_matches('/'))
    }
}

fn default_node_name() -> OriginId {
    // SAFETY: DEFAULT_NODE_NAME is a constant made of allowed characters
    OriginId::parse(DEFAULT_NODE_NAME).expect("default node name is valid")
}

/// Parse the node name from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default node name.
pub fn node_name_from_env_value(value: Option<String>) -> CoreResult<OriginId> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    match value {
        Some(v) => Ok(OriginId::parse(&v)?),
        None => Ok(default_node_name()),
    }
}

/// Resolve the data directory from an optional string value.
///
/// `None` or blank selects the in-memory store. A non-blank value is created if missing and
/// must be a directory.
pub fn data_dir_from_env_value(value: Option<String>) -> CoreResult<Option<PathBuf>> {
    let Some(value) = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    else {
        return Ok(None);
    };

    let path = PathBuf::from(value);
    std::fs::create_dir_all(&path).map_err(CoreError::StorageDirCreation)?;
    if !path.is_dir() {
        return Err(CoreError::InvalidInput(format!(
            "data directory is not a directory: {}",
            path.display()
        )));
    }
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn blank_node_name_uses_default() {
        let node = node_name_from_env_value(Some("  ".into())).expect("default node");
        assert_eq!(node.as_str(), DEFAULT_NODE_NAME);
    }

    #[test]
    fn invalid_node_name_is_rejected() {
        let err = node_name_from_env_value(Some("bad::node".into())).expect_err("invalid");
        assert!(matches!(err, CoreError::MalformedIdentifier(_)));
    }

    #[test]
    fn data_dir_is_created() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let target = temp_dir.path().join("store");
        let resolved = data_dir_from_env_value(Some(target.display().to_string()))
            .expect("resolve data dir")
            .expect("some dir");
        assert!(resolved.is_dir());
        assert_eq!(data_dir_from_env_value(None).expect("none"), None);
    }

    #[test]
    fn absolute_location_joins_with_single_slash() {
        let cfg = CoreConfig::new(None, default_node_name(), "http://host/api/").expect("cfg");
        assert_eq!(
            cfg.absolute_location("/ehr/1/directory/x"),
            "http://host/api/ehr/1/directory/x"
        );
    }
}
