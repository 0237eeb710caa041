//! Stored query registry.
//!
//! Stored queries are identified by a qualified name and a semantic version
//! (`major.minor.patch`). Callers select a version with `LATEST` or a prefix: `1` matches the
//! highest `1.x.y`, `1.2` the highest `1.2.y`, and `1.2.3` only itself.

use crate::{CoreError, CoreResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::RwLock;
use vrs_types::NonEmptyText;

use crate::constants::LATEST_QUERY_VERSION;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl QueryVersion {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] unless `input` is `major.minor.patch`.
    pub fn parse(input: &str) -> CoreResult<Self> {
        let parts = parse_numeric_parts(input)?;
        match parts.as_slice() {
            [major, minor, patch] => Ok(Self {
                major: *major,
                minor: *minor,
                patch: *patch,
            }),
            _ => Err(CoreError::InvalidInput(format!(
                "query version must be major.minor.patch, got '{input}'"
            ))),
        }
    }
}

impl fmt::Display for QueryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum QueryVersionSelector {
    #[default]
    Latest,
    Prefix {
        major: u32,
        minor: Option<u32>,
        patch: Option<u32>,
    },
}

impl QueryVersionSelector {
    /// Parses `LATEST` (any case), `1`, `1.2` or `1.2.3`. `None` and blank input mean latest.
    pub fn parse(input: Option<&str>) -> CoreResult<Self> {
        let Some(text) = input.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(Self::Latest);
        };
        if text.eq_ignore_ascii_case(LATEST_QUERY_VERSION) {
            return Ok(Self::Latest);
        }

        let parts = parse_numeric_parts(text)?;
        match parts.as_slice() {
            [major] => Ok(Self::Prefix {
                major: *major,
                minor: None,
                patch: None,
            }),
            [major, minor] => Ok(Self::Prefix {
                major: *major,
                minor: Some(*minor),
                patch: None,
            }),
            [major, minor, patch] => Ok(Self::Prefix {
                major: *major,
                minor: Some(*minor),
                patch: Some(*patch),
            }),
            _ => Err(CoreError::InvalidInput(format!(
                "invalid query version selector '{text}'"
            ))),
        }
    }

    pub fn matches(&self, version: &QueryVersion) -> bool {
        match self {
            Self::Latest => true,
            Self::Prefix {
                major,
                minor,
                patch,
            } => {
                version.major == *major
                    && minor.is_none_or(|m| version.minor == m)
                    && patch.is_none_or(|p| version.patch == p)
            }
        }
    }
}

impl fmt::Display for QueryVersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str(LATEST_QUERY_VERSION),
            Self::Prefix {
                major,
                minor,
                patch,
            } => {
                write!(f, "{major}")?;
                if let Some(minor) = minor {
                    write!(f, ".{minor}")?;
                }
                if let Some(patch) = patch {
                    write!(f, ".{patch}")?;
                }
                Ok(())
            }
        }
    }
}

fn parse_numeric_parts(input: &str) -> CoreResult<Vec<u32>> {
    input
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(CoreError::InvalidInput(format!(
                    "invalid query version '{input}'"
                )));
            }
            part.parse::<u32>()
                .map_err(|_| CoreError::InvalidInput(format!("invalid query version '{input}'")))
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredQuery {
    pub qualified_name: String,
    pub version: QueryVersion,
    pub text: String,
}

pub trait StoredQueryRegistry: Send + Sync {
    /// The highest version of `qualified_name` matching `selector`, if any.
    fn resolve(
        &self,
        qualified_name: &str,
        selector: &QueryVersionSelector,
    ) -> CoreResult<Option<StoredQuery>>;
}

/// One entry of a stored query YAML file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredQueryDefinition {
    name: String,
    version: String,
    query: String,
}

#[derive(Debug, Default)]
pub struct MemoryQueryRegistry {
    queries: RwLock<BTreeMap<String, BTreeMap<QueryVersion, String>>>,
}

impl MemoryQueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a blank name or text, or if that name and version
    /// are already registered.
    pub fn register(
        &self,
        qualified_name: &str,
        version: QueryVersion,
        text: &str,
    ) -> CoreResult<()> {
        let name = NonEmptyText::new(qualified_name)
            .map_err(|_| CoreError::InvalidInput("query name cannot be empty".into()))?;
        let text = NonEmptyText::new(text)
            .map_err(|_| CoreError::InvalidInput(format!("query {name} has no text")))?;

        let mut queries = self.queries.write().map_err(|_| CoreError::LockPoisoned)?;
        let versions = queries.entry(name.as_str().to_owned()).or_default();
        if versions.contains_key(&version) {
            return Err(CoreError::InvalidInput(format!(
                "query {name} version {version} is already registered"
            )));
        }
        versions.insert(version, text.as_str().to_owned());
        Ok(())
    }

    /// Builds a registry from a YAML list of `{ name, version, query }` entries.
    pub fn from_yaml(yaml: &str) -> CoreResult<Self> {
        let definitions: Vec<StoredQueryDefinition> =
            serde_yaml::from_str(yaml).map_err(CoreError::YamlDeserialization)?;
        let registry = Self::new();
        for definition in definitions {
            registry.register(
                &definition.name,
                QueryVersion::parse(&definition.version)?,
                &definition.query,
            )?;
        }
        Ok(registry)
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(CoreError::FileRead)?;
        let registry = Self::from_yaml(&yaml)?;
        tracing::info!(path = %path.display(), "loaded stored queries");
        Ok(registry)
    }
}

impl StoredQueryRegistry for MemoryQueryRegistry {
    fn resolve(
        &self,
        qualified_name: &str,
        selector: &QueryVersionSelector,
    ) -> CoreResult<Option<StoredQuery>> {
        let queries = self.queries.read().map_err(|_| CoreError::LockPoisoned)?;
        let found = queries.get(qualified_name).and_then(|versions| {
            versions
                .iter()
                .rev()
                .find(|(version, _)| selector.matches(version))
        });

        Ok(found.map(|(version, text)| StoredQuery {
            qualified_name: qualified_name.to_owned(),
            version: *version,
            text: text.clone(),
        }))
    }
}
