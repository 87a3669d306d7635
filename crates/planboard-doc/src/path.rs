//! Document paths for addressing within planning documents
//!
//! Provides [`DocPath`] for addressing a single location inside a nested
//! document using dotted keys and bracketed sequence indices.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One step of a [`DocPath`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    /// Descend into a mapping by key
    Key(String),
    /// Descend into a sequence by position
    Index(usize),
}

impl Segment {
    /// True for [`Segment::Index`]
    #[inline]
    #[must_use]
    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index(_))
    }

    /// Key name, if this is a key segment
    #[inline]
    #[must_use]
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Key(key) => Some(key),
            Self::Index(_) => None,
        }
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Path within a planning document
///
/// Parsed once from strings like `metas.trimestral[2].valor` and reused
/// for every access. Key segments may carry any number of trailing indices
/// (`grade[1][0]`).
///
/// # Examples
/// - `a.b[2].c` → `[Key(a), Key(b), Index(2), Key(c)]`
/// - `riscos` → `[Key(riscos)]`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocPath(Vec<Segment>);

impl DocPath {
    /// Create path from segments
    #[inline]
    #[must_use]
    pub fn new(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    /// Path addressing a single top-level key
    #[inline]
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self(vec![Segment::Key(key.into())])
    }

    /// Empty path (the document root)
    ///
    /// Only useful as a starting point for [`DocPath::child_key`]; the
    /// resolver rejects it as a write target.
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a path string
    ///
    /// # Errors
    /// Returns error if the string is empty or malformed
    #[inline]
    pub fn parse(s: &str) -> Result<Self, PathError> {
        s.parse()
    }

    /// Get path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Get number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if path is empty (root)
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get parent path (if not root)
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Final segment, the mutation target
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    /// Append a key segment, returning new path
    #[inline]
    #[must_use]
    pub fn child_key(&self, key: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.0.push(Segment::Key(key.into()));
        new
    }

    /// Append an index segment, returning new path
    #[inline]
    #[must_use]
    pub fn child_index(&self, index: usize) -> Self {
        let mut new = self.clone();
        new.0.push(Segment::Index(index));
        new
    }

    /// Check if this path is a prefix of another
    #[inline]
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        if self.0.len() > other.0.len() {
            return false;
        }
        self.0 == other.0[..self.0.len()]
    }

    /// Check if paths overlap (one is prefix of other)
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }

    /// Render the first `len` segments, used in error messages
    #[must_use]
    pub(crate) fn prefix_string(&self, len: usize) -> String {
        if len == 0 {
            return "<root>".to_string();
        }
        Self(self.0[..len.min(self.0.len())].to_vec()).to_string()
    }

    /// Iterator over segments from root to leaf
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.0.iter()
    }
}

impl Display for DocPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 && !segment.is_index() {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for DocPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }

        let mut segments = Vec::new();
        for raw in s.split('.') {
            if raw.is_empty() {
                return Err(PathError::EmptySegment(s.to_string()));
            }

            let (name, mut rest) = match raw.find('[') {
                Some(pos) => raw.split_at(pos),
                None => (raw, ""),
            };
            if name.is_empty() {
                return Err(PathError::MissingKey(raw.to_string()));
            }
            if name.contains(']') {
                return Err(PathError::InvalidSegment(raw.to_string()));
            }
            segments.push(Segment::Key(name.to_string()));

            while !rest.is_empty() {
                let inner = rest
                    .strip_prefix('[')
                    .ok_or_else(|| PathError::InvalidSegment(raw.to_string()))?;
                let close = inner
                    .find(']')
                    .ok_or_else(|| PathError::UnclosedBracket(raw.to_string()))?;
                segments.push(Segment::Index(parse_index(&inner[..close], raw)?));
                rest = &inner[close + 1..];
            }
        }

        Ok(Self(segments))
    }
}

fn parse_index(digits: &str, segment: &str) -> Result<usize, PathError> {
    let invalid = || PathError::InvalidIndex {
        segment: segment.to_string(),
        index: digits.to_string(),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    digits.parse().map_err(|_| invalid())
}

impl TryFrom<String> for DocPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocPath> for String {
    fn from(path: DocPath) -> Self {
        path.to_string()
    }
}

impl From<Vec<Segment>> for DocPath {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

/// Errors related to document paths
///
/// Parse variants come from [`DocPath::from_str`]; the rest from
/// resolving a path against a concrete document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Path string is empty
    #[error("path is empty")]
    Empty,

    /// Two dots in a row, or a leading/trailing dot
    #[error("path '{0}' contains an empty segment")]
    EmptySegment(String),

    /// Segment starts with a bracket instead of a key
    #[error("segment '{0}' has no key before its index")]
    MissingKey(String),

    /// Stray characters around brackets
    #[error("invalid segment: {0}")]
    InvalidSegment(String),

    /// `[` without matching `]`
    #[error("unclosed bracket in segment '{0}'")]
    UnclosedBracket(String),

    /// Bracket content is not a non-negative integer
    #[error("invalid index '{index}' in segment '{segment}'")]
    InvalidIndex { segment: String, index: String },

    /// Sequence index past the end
    #[error("index {index} out of range at '{path}' (length {len})")]
    OutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    /// An index was applied to a key that holds no sequence
    #[error("no sequence at '{path}'; sequences are never created by a write")]
    MissingSequence { path: String },

    /// Traversal reached a value of the wrong shape
    #[error("'{path}' is a {found}, expected a {expected}")]
    NotAContainer {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl PathError {
    /// True for errors raised while parsing, as opposed to resolving
    #[inline]
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Empty
                | Self::EmptySegment(_)
                | Self::MissingKey(_)
                | Self::InvalidSegment(_)
                | Self::UnclosedBracket(_)
                | Self::InvalidIndex { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> Segment {
        Segment::Key(k.to_string())
    }

    #[test]
    fn parse_dotted_keys() {
        let path: DocPath = "a.b.c".parse().unwrap();
        assert_eq!(path.segments(), &[key("a"), key("b"), key("c")]);
    }

    #[test]
    fn parse_bracket_index() {
        let path: DocPath = "a.b[2].c".parse().unwrap();
        assert_eq!(
            path.segments(),
            &[key("a"), key("b"), Segment::Index(2), key("c")]
        );
    }

    #[test]
    fn parse_chained_indices() {
        let path: DocPath = "grade[1][0]".parse().unwrap();
        assert_eq!(
            path.segments(),
            &[key("grade"), Segment::Index(1), Segment::Index(0)]
        );
    }

    #[test]
    fn parse_single_segment() {
        let path: DocPath = "riscos".parse().unwrap();
        assert_eq!(path, DocPath::key("riscos"));
    }

    #[test]
    fn parse_keeps_non_ascii_keys() {
        let path: DocPath = "remuneração.variável".parse().unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path.to_string(), "remuneração.variável");
    }

    #[test]
    fn parse_empty_fails() {
        assert_eq!("".parse::<DocPath>(), Err(PathError::Empty));
    }

    #[test]
    fn parse_empty_segment_fails() {
        assert!(matches!(
            "a..b".parse::<DocPath>(),
            Err(PathError::EmptySegment(_))
        ));
        assert!(matches!(
            "a.".parse::<DocPath>(),
            Err(PathError::EmptySegment(_))
        ));
    }

    #[test]
    fn parse_index_without_key_fails() {
        assert!(matches!(
            "a.[0]".parse::<DocPath>(),
            Err(PathError::MissingKey(_))
        ));
    }

    #[test]
    fn parse_unclosed_bracket_fails() {
        assert!(matches!(
            "a[1".parse::<DocPath>(),
            Err(PathError::UnclosedBracket(_))
        ));
    }

    #[test]
    fn parse_bad_index_fails() {
        for bad in ["a[-1]", "a[]", "a[x]", "a[+1]"] {
            assert!(
                matches!(bad.parse::<DocPath>(), Err(PathError::InvalidIndex { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn parse_trailing_garbage_fails() {
        assert!(matches!(
            "a[0]b".parse::<DocPath>(),
            Err(PathError::InvalidSegment(_))
        ));
        assert!(matches!(
            "a]b".parse::<DocPath>(),
            Err(PathError::InvalidSegment(_))
        ));
    }

    #[test]
    fn display_matches_input() {
        for input in ["a", "a.b", "a[0]", "a.b[2].c", "m[1][2].x"] {
            let path: DocPath = input.parse().unwrap();
            assert_eq!(path.to_string(), input);
        }
    }

    #[test]
    fn parent_and_last() {
        let path: DocPath = "a.b[2]".parse().unwrap();
        assert_eq!(path.last(), Some(&Segment::Index(2)));
        assert_eq!(path.parent().unwrap().to_string(), "a.b");
        assert!(DocPath::root().parent().is_none());
    }

    #[test]
    fn child_builders() {
        let path = DocPath::key("itens").child_index(3).child_key("nome");
        assert_eq!(path.to_string(), "itens[3].nome");
    }

    #[test]
    fn prefix_relations() {
        let a: DocPath = "a.b".parse().unwrap();
        let b: DocPath = "a.b[0].c".parse().unwrap();
        let c: DocPath = "a.x".parse().unwrap();
        assert!(a.is_prefix_of(&b));
        assert!(!b.is_prefix_of(&a));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn serde_as_string() {
        let path: DocPath = "cenarios[0].id".parse().unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"cenarios[0].id\"");
        let back: DocPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
        assert!(serde_json::from_str::<DocPath>("\"a..b\"").is_err());
    }

    #[test]
    fn malformed_classification() {
        assert!(PathError::Empty.is_malformed());
        assert!(!PathError::MissingSequence { path: "a".into() }.is_malformed());
    }
}
