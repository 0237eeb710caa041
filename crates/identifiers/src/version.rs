//! Version identifiers and version selectors.

use crate::{IdError, IdResult, ObjectId, OriginId};
use chrono::{DateTime, Utc};
use std::num::NonZeroU32;
use std::{fmt, str::FromStr};

const SEPARATOR: &str = "::";

/// 1-based position of a version within a resource's history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ordinal(NonZeroU32);

impl Ordinal {
    pub const FIRST: Ordinal = Ordinal(NonZeroU32::MIN);

    /// Returns `None` for zero.
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    /// Parses a positive base-10 integer. Signs, whitespace and zero are rejected.
    pub fn parse(input: &str) -> IdResult<Self> {
        if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdError::InvalidOrdinal(input.to_owned()));
        }
        input
            .parse::<u32>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| IdError::InvalidOrdinal(input.to_owned()))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// The following ordinal.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidOrdinal`] on `u32` overflow.
    pub fn next(self) -> IdResult<Self> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or_else(|| IdError::InvalidOrdinal(format!("{} + 1", self.0)))
    }
}

impl fmt::Display for Ordinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Ordinal {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ordinal::parse(s)
    }
}

/// A fully qualified version: `object_id::origin_id::ordinal`.
///
/// This is the form returned by every successful commit and used as the `ETag` of a version.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectVersionId {
    object_id: ObjectId,
    origin: OriginId,
    ordinal: Ordinal,
}

impl ObjectVersionId {
    pub fn new(object_id: ObjectId, origin: OriginId, ordinal: Ordinal) -> Self {
        Self {
            object_id,
            origin,
            ordinal,
        }
    }

    /// Parses the three-part form. Bare object ids are rejected.
    pub fn parse(input: &str) -> IdResult<Self> {
        match VersionIdentifier::parse(input)? {
            VersionIdentifier::Versioned(version) => Ok(version),
            VersionIdentifier::Bare(_) => Err(IdError::Malformed(input.to_owned())),
        }
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn origin(&self) -> &OriginId {
        &self.origin
    }

    pub fn ordinal(&self) -> Ordinal {
        self.ordinal
    }

    /// Same object and origin, different ordinal.
    pub fn with_ordinal(&self, ordinal: Ordinal) -> Self {
        Self {
            object_id: self.object_id,
            origin: self.origin.clone(),
            ordinal,
        }
    }
}

impl fmt::Display for ObjectVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.object_id, self.origin, self.ordinal
        )
    }
}

impl FromStr for ObjectVersionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectVersionId::parse(s)
    }
}

/// How a client refers to a resource: by bare object id or by a specific version.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VersionIdentifier {
    Bare(ObjectId),
    Versioned(ObjectVersionId),
}

impl VersionIdentifier {
    /// Parses either form.
    ///
    /// Text without `::` is a bare object id. Otherwise it must split into exactly three
    /// `::`-separated parts, each of which must be valid.
    ///
    /// # Errors
    ///
    /// Returns an [`IdError`] naming the part that failed.
    pub fn parse(input: &str) -> IdResult<Self> {
        if !input.contains(SEPARATOR) {
            return ObjectId::parse(input).map(Self::Bare);
        }

        let parts: Vec<&str> = input.split(SEPARATOR).collect();
        let [object_id, origin, ordinal] = parts.as_slice() else {
            return Err(IdError::Malformed(input.to_owned()));
        };

        Ok(Self::Versioned(ObjectVersionId::new(
            ObjectId::parse(object_id)?,
            OriginId::parse(origin)?,
            Ordinal::parse(ordinal)?,
        )))
    }

    pub fn object_id(&self) -> ObjectId {
        match self {
            Self::Bare(id) => *id,
            Self::Versioned(version) => version.object_id(),
        }
    }

    /// The explicit version, if any.
    pub fn version(&self) -> Option<&ObjectVersionId> {
        match self {
            Self::Bare(_) => None,
            Self::Versioned(version) => Some(version),
        }
    }

    /// Bare ids select the latest version, versioned ids select their ordinal.
    pub fn version_query(&self) -> VersionQuery {
        match self {
            Self::Bare(_) => VersionQuery::Latest,
            Self::Versioned(version) => VersionQuery::AtOrdinal(version.ordinal()),
        }
    }

    /// Historical default: a bare id counts as ordinal 1.
    pub fn ordinal_or_first(&self) -> Ordinal {
        self.version()
            .map(ObjectVersionId::ordinal)
            .unwrap_or(Ordinal::FIRST)
    }
}

impl fmt::Display for VersionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bare(id) => id.fmt(f),
            Self::Versioned(version) => version.fmt(f),
        }
    }
}

impl FromStr for VersionIdentifier {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionIdentifier::parse(s)
    }
}

impl From<ObjectVersionId> for VersionIdentifier {
    fn from(version: ObjectVersionId) -> Self {
        Self::Versioned(version)
    }
}

/// Selects one version out of a resource's history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionQuery {
    Latest,
    AtOrdinal(Ordinal),
    AtTime(DateTime<Utc>),
}

impl VersionQuery {
    /// `Latest` when no instant is given.
    pub fn at_time(instant: Option<DateTime<Utc>>) -> Self {
        instant.map_or(Self::Latest, Self::AtTime)
    }
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::{ObjectVersionId, Ordinal, VersionIdentifier};

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

    string_serde!(ObjectVersionId);
    string_serde!(VersionIdentifier);

    impl serde::Serialize for Ordinal {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            serializer.serialize_u32(self.get())
        }
    }

    impl<'de> serde::Deserialize<'de> for Ordinal {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let value = u32::deserialize(deserializer)?;
            Ordinal::new(value).ok_or_else(|| serde::de::Error::custom("ordinal must be >= 1"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "8849182c-82ad-4088-a07f-48ead4180515";

    #[test]
    fn parses_full_version_identifier() {
        let text = format!("{ID}::local.vrs.dev::3");
        let parsed = VersionIdentifier::parse(&text).expect("valid identifier");
        let version = parsed.version().expect("versioned");
        assert_eq!(version.object_id().to_string(), ID);
        assert_eq!(version.origin().as_str(), "local.vrs.dev");
        assert_eq!(version.ordinal().get(), 3);
        assert_eq!(parsed.to_string(), text);
    }

    #[test]
    fn bare_identifier_selects_latest_and_defaults_to_first() {
        let parsed = VersionIdentifier::parse(ID).expect("bare id");
        assert!(matches!(parsed, VersionIdentifier::Bare(_)));
        assert_eq!(parsed.version_query(), VersionQuery::Latest);
        assert_eq!(parsed.ordinal_or_first(), Ordinal::FIRST);
        assert_eq!(parsed.to_string(), ID);
    }

    #[test]
    fn parse_of_display_gives_back_the_same_identifier() {
        let object_id = ObjectId::parse(ID).expect("valid id");
        let mut identifiers = vec![
            VersionIdentifier::Bare(
                ObjectId::parse("8849182C82AD4088A07F48EAD4180515").expect("simple form"),
            ),
            VersionIdentifier::Bare(object_id),
        ];
        for origin in ["node", "local.vrs.dev", "a-b_c.d", "_", "-.-"] {
            for ordinal in [1, 2, 10, u32::MAX] {
                identifiers.push(VersionIdentifier::Versioned(ObjectVersionId::new(
                    object_id,
                    OriginId::parse(origin).expect("valid origin"),
                    Ordinal::new(ordinal).expect("non-zero"),
                )));
            }
        }

        for identifier in identifiers {
            let text = identifier.to_string();
            let reparsed = VersionIdentifier::parse(&text).expect("formatted id parses");
            assert_eq!(reparsed, identifier, "{text}");
            assert_eq!(reparsed.to_string(), text);
        }
    }

    #[test]
    fn rejects_zero_and_signed_ordinals() {
        for bad in ["0", "-1", "+1", "", "1.2", " 1"] {
            let text = format!("{ID}::node::{bad}");
            let err = VersionIdentifier::parse(&text).expect_err("bad ordinal");
            assert!(matches!(err, IdError::InvalidOrdinal(_)), "{bad}: {err:?}");
        }
    }

    #[test]
    fn rejects_wrong_part_count() {
        assert!(matches!(
            VersionIdentifier::parse(&format!("{ID}::1")),
            Err(IdError::Malformed(_))
        ));
        assert!(matches!(
            VersionIdentifier::parse(&format!("{ID}::a::b::1")),
            Err(IdError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_bad_object_and_origin() {
        assert!(matches!(
            VersionIdentifier::parse("nope::node::1"),
            Err(IdError::InvalidObjectId(_))
        ));
        assert!(matches!(
            VersionIdentifier::parse(&format!("{ID}::::1")),
            Err(IdError::InvalidOrigin(_))
        ));
    }

    #[test]
    fn with_ordinal_keeps_object_and_origin() {
        let v1 = ObjectVersionId::parse(&format!("{ID}::node::1")).expect("valid");
        let v4 = v1.with_ordinal(Ordinal::new(4).expect("non-zero"));
        assert_eq!(v4.to_string(), format!("{ID}::node::4"));
        assert_eq!(v4.object_id(), v1.object_id());
    }

    #[test]
    fn object_version_id_rejects_bare_form() {
        assert!(ObjectVersionId::parse(ID).is_err());
    }

    #[test]
    fn ordinal_next_overflows_cleanly() {
        let max = Ordinal::new(u32::MAX).expect("non-zero");
        assert!(max.next().is_err());
        assert_eq!(Ordinal::FIRST.next().expect("next").get(), 2);
    }
}
