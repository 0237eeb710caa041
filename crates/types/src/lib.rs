//! Validated text primitives shared across the VRS crates.
//!
//! - [`NonEmptyText`]: trimmed text with at least one non-whitespace character (committer names,
//!   change descriptions, stored query names).
//! - [`SegmentName`]: the name of one node in a folder tree. It is addressed by path, so it can
//!   never contain the `/` separator.

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input contained the path separator `/`
    #[error("Text cannot contain '/': '{0}'")]
    ContainsSeparator(String),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for NonEmptyText {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// The name of a single node in a folder tree.
///
/// Names are compared exactly (case-sensitive) when resolving paths. Leading and trailing
/// whitespace is trimmed, the result must be non-empty and must not contain `/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentName(NonEmptyText);

impl SegmentName {
    /// Creates a new `SegmentName`.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] for blank input and [`TextError::ContainsSeparator`] if the
    /// trimmed input contains `/`.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let text = NonEmptyText::new(input)?;
        if text.as_str().contains('/') {
            return Err(TextError::ContainsSeparator(text.0));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for SegmentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for SegmentName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl serde::Serialize for SegmentName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for SegmentName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SegmentName::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  Dr Smith  ").expect("valid text");
        assert_eq!(text.as_str(), "Dr Smith");
    }

    #[test]
    fn non_empty_text_rejects_whitespace() {
        assert_eq!(NonEmptyText::new(" \t\n"), Err(TextError::Empty));
    }

    #[test]
    fn segment_name_rejects_separator() {
        let err = SegmentName::new("episodes/2024").expect_err("should reject '/'");
        assert_eq!(err, TextError::ContainsSeparator("episodes/2024".into()));
    }

    #[test]
    fn segment_name_keeps_inner_spaces_and_hyphens() {
        let name = SegmentName::new(" hospital episodes-1 ").expect("valid name");
        assert_eq!(name.as_str(), "hospital episodes-1");
    }

    #[test]
    fn deserialize_rejects_blank_segment_name() {
        let result: Result<SegmentName, _> = serde_json::from_str("\"   \"");
        assert!(result.is_err());
    }
}
