use crate::{CoreError, CoreResult};
use std::fmt;

/// A parsed, `/`-separated folder path.
///
/// Segments may contain ASCII letters, digits, `_`, `-` and ASCII whitespace (including vertical
/// tab, `\x0B`). Leading, trailing and repeated slashes are ignored, so `""`, `"/"` and `"//"`
/// all denote the root. Surrounding whitespace is trimmed from each segment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FolderPath {
    segments: Vec<String>,
}

impl FolderPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns [`CoreError::MalformedPath`] if any segment contains a disallowed character.
    pub fn parse(input: &str) -> CoreResult<Self> {
        let mut segments = Vec::new();
        for raw in input.split('/') {
            if !raw.chars().all(is_segment_char) {
                return Err(CoreError::MalformedPath(input.to_owned()));
            }
            let segment = raw.trim();
            if !segment.is_empty() {
                segments.push(segment.to_owned());
            }
        }
        Ok(Self { segments })
    }

    /// Parses an optional path, treating `None` as the root.
    pub fn parse_optional(input: Option<&str>) -> CoreResult<Self> {
        input.map_or_else(|| Ok(Self::root()), Self::parse)
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

fn is_segment_char(c: char) -> bool {
    // is_ascii_whitespace leaves out vertical tab
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c.is_ascii_whitespace() || c == '\x0B'
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_forms() {
        for input in ["", "/", "//", " / "] {
            let path = FolderPath::parse(input).expect("root");
            assert!(path.is_root(), "{input:?} should be the root");
        }
    }

    #[test]
    fn trailing_and_repeated_slashes_are_ignored() {
        let path = FolderPath::parse("/episodes//2024 visits/").expect("valid");
        assert_eq!(path.segments(), ["episodes", "2024 visits"]);
        assert_eq!(path.to_string(), "/episodes/2024 visits");
    }

    #[test]
    fn every_ascii_whitespace_is_allowed_inside_segments() {
        for ws in [' ', '\t', '\n', '\x0B', '\x0C', '\r'] {
            let input = format!("episodes/2024{ws}visits");
            let path = FolderPath::parse(&input).expect("whitespace is allowed");
            assert_eq!(path.segments()[1], format!("2024{ws}visits"), "{ws:?}");
        }
        assert_eq!(
            FolderPath::parse("\x0Bepisodes\x0B").expect("trimmed").segments(),
            ["episodes"]
        );
    }

    #[test]
    fn rejects_disallowed_characters() {
        for input in ["a.b", "episodes/../x", "x?y", "naïve"] {
            let err = FolderPath::parse(input).expect_err("malformed");
            assert!(matches!(err, CoreError::MalformedPath(p) if p == input));
        }
    }

    #[test]
    fn parse_optional_defaults_to_root() {
        assert!(FolderPath::parse_optional(None).expect("root").is_root());
        assert_eq!(
            FolderPath::parse_optional(Some("a-b/c_d"))
                .expect("valid")
                .segments(),
            ["a-b", "c_d"]
        );
    }
}
