//! Object and origin identifiers.

use crate::{IdError, IdResult};
use std::path::{Path, PathBuf};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

/// Identity of a versioned resource, shared by all of its versions.
///
/// # Accepted forms
/// [`ObjectId::parse`] accepts the hyphenated form (`8849182c-82ad-4088-a07f-48ead4180515`) and
/// the 32-hex simple form (`8849182c82ad4088a07f48ead4180515`), in either case. Other UUID
/// spellings (braced, URN) are rejected.
///
/// # Display format
/// Always lowercase hyphenated, which is the form used inside version identifiers and URLs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(Uuid);

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectId {
    /// Generates a fresh random object id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses an externally supplied object id.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidObjectId`] if `input` is not a hyphenated or simple UUID.
    pub fn parse(input: &str) -> IdResult<Self> {
        if !matches!(input.len(), 32 | 36) {
            return Err(IdError::InvalidObjectId(input.to_owned()));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|_| IdError::InvalidObjectId(input.to_owned()))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// The 32-hex form used for on-disk directory names.
    pub fn simple(&self) -> String {
        self.0.simple().to_string()
    }

    /// Returns `parent_dir/<s1>/<s2>/<id>/` where `s1`/`s2` are the first two hex pairs.
    pub fn sharded_dir(&self, parent_dir: &Path) -> PathBuf {
        let canonical = self.simple();
        let s1 = &canonical[0..2];
        let s2 = &canonical[2..4];
        parent_dir.join(s1).join(s2).join(&canonical)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ObjectId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectId::parse(s)
    }
}

/// Name of the system that created a version (`creating_system_id` in openEHR terms).
///
/// A non-empty token made of ASCII letters, digits, `.`, `-` and `_`. The restricted alphabet
/// guarantees the `::` separator can never appear inside an origin.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OriginId(String);

impl OriginId {
    /// # Errors
    ///
    /// Returns [`IdError::InvalidOrigin`] when `input` is empty or contains other characters.
    pub fn parse(input: &str) -> IdResult<Self> {
        let valid = !input.is_empty()
            && input
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'));
        if valid {
            Ok(Self(input.to_owned()))
        } else {
            Err(IdError::InvalidOrigin(input.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OriginId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OriginId::parse(s)
    }
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::{ObjectId, OriginId};

    macro_rules! string_serde {
        ($ty:ty) => {
            impl serde::Serialize for $ty {
                fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where
                    S: serde::Serializer,
                {
                    serializer.collect_str(self)
                }
            }

            impl<'de> serde::Deserialize<'de> for $ty {
                fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
                where
                    D: serde::Deserializer<'de>,
                {
                    let s = String::deserialize(deserializer)?;
                    s.parse().map_err(serde::de::Error::custom)
                }
            }
        };
    }

    string_serde!(ObjectId);
    string_serde!(OriginId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_hyphenated_and_simple_forms() {
        let hyphenated = ObjectId::parse("550e8400-e29b-41d4-a716-446655440000").expect("hyphenated");
        let simple = ObjectId::parse("550e8400e29b41d4a716446655440000").expect("simple");
        assert_eq!(hyphenated, simple);
        assert_eq!(simple.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn test_parse_normalises_uppercase() {
        let id = ObjectId::parse("550E8400-E29B-41D4-A716-446655440000").expect("uppercase");
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn test_parse_rejects_braced_and_short_forms() {
        assert!(ObjectId::parse("{550e8400-e29b-41d4-a716-446655440000}").is_err());
        assert!(ObjectId::parse("550e8400e29b41d4a71644665544000").is_err());
        assert!(ObjectId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_sharded_dir() {
        let id = ObjectId::parse("550e8400e29b41d4a716446655440000").expect("valid id");
        let dir = id.sharded_dir(Path::new("/data/folders"));
        assert_eq!(
            dir,
            PathBuf::from("/data/folders/55/0e/550e8400e29b41d4a716446655440000")
        );
    }

    #[test]
    fn test_sharded_dir_with_tempdir() {
        let temp_dir = tempfile::TempDir::new().expect("temp dir");
        let id = ObjectId::new();
        let sharded = id.sharded_dir(temp_dir.path());
        assert!(sharded.starts_with(temp_dir.path()));
        assert!(sharded.ends_with(id.simple()));
    }

    #[test]
    fn test_origin_rejects_separator_and_blank() {
        assert!(OriginId::parse("local.vrs.dev").is_ok());
        assert!(OriginId::parse("").is_err());
        assert!(OriginId::parse("a::b").is_err());
        assert!(OriginId::parse("has space").is_err());
    }

    #[test]
    fn test_serde_uses_display_form() {
        let id = ObjectId::parse("550e8400e29b41d4a716446655440000").expect("valid id");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
        let back: ObjectId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }
}
