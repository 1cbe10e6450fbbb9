//! # Property Key Paths
//!
//! Structured, hierarchical property keys and their flat string form.
//!
//! A key path is an ordered list of segments:
//!
//! | Segment                   | Flat form    | Matches                          |
//! |---------------------------|--------------|----------------------------------|
//! | `Name("Relations")`       | `Relations`  | exactly that name                |
//! | `AnyName`                 | `*`          | any single plain name            |
//! | `Selection{"2112", 3}`    | `2112.[3]`   | that name at that index          |
//! | `AnySelection{"2112"}`    | `2112.[*]`   | that name at any index           |
//!
//! Flat names join segments with `.`; a selection index is written as its
//! own `[n]` element directly after the name it selects.
//!
//! Matching is done on decoded paths, segment by segment, never on the flat
//! text. Names containing `.`, `[`, `]` or consisting of `*` cannot be
//! flattened and are rejected by [`path_to_name`].

use crate::RelataError;
use std::fmt;

// =============================================================================
// SEGMENTS
// =============================================================================

/// One element of a [`PropertyKeyPath`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathSegment {
    /// A literal name.
    Name(String),
    /// Wildcard matching any single literal name.
    AnyName,
    /// A literal name selecting one indexed element.
    Selection { name: String, index: usize },
    /// A literal name selecting any indexed element.
    AnySelection { name: String },
}

impl PathSegment {
    /// Whether this segment contains a wildcard.
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        matches!(self, Self::AnyName | Self::AnySelection { .. })
    }
}

/// A value bound by a wildcard segment during matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    /// The name matched by [`PathSegment::AnyName`].
    Name(String),
    /// The index matched by [`PathSegment::AnySelection`].
    Index(usize),
}

impl Capture {
    /// The captured name, if this capture came from an `AnyName` segment.
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(n) => Some(n),
            Self::Index(_) => None,
        }
    }

    /// The captured index, if this capture came from an `AnySelection` segment.
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Name(_) => None,
        }
    }
}

// =============================================================================
// KEY PATH
// =============================================================================

/// A structured property key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PropertyKeyPath {
    segments: Vec<PathSegment>,
}

impl PropertyKeyPath {
    /// Create an empty path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a path from segments.
    #[must_use]
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Append a literal name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Name(name.into()));
        self
    }

    /// Append a wildcard name.
    #[must_use]
    pub fn any_name(mut self) -> Self {
        self.segments.push(PathSegment::AnyName);
        self
    }

    /// Append an indexed selection.
    #[must_use]
    pub fn selection(mut self, name: impl Into<String>, index: usize) -> Self {
        self.segments.push(PathSegment::Selection {
            name: name.into(),
            index,
        });
        self
    }

    /// Append a wildcard selection.
    #[must_use]
    pub fn any_selection(mut self, name: impl Into<String>) -> Self {
        self.segments
            .push(PathSegment::AnySelection { name: name.into() });
        self
    }

    /// Append all segments of another path.
    #[must_use]
    pub fn join(mut self, other: &Self) -> Self {
        self.segments.extend(other.segments.iter().cloned());
        self
    }

    /// The segments in order.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the path has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether any segment is a wildcard.
    #[must_use]
    pub fn is_pattern(&self) -> bool {
        self.segments.iter().any(PathSegment::is_wildcard)
    }

    /// Return a copy whose selection at segment `position` uses `index`.
    ///
    /// Returns `None` if that segment is not a selection.
    #[must_use]
    pub fn with_selection_index(&self, position: usize, index: usize) -> Option<Self> {
        let mut copy = self.clone();
        let segment = copy.segments.get_mut(position)?;
        let replacement = match segment {
            PathSegment::Selection { name, .. } | PathSegment::AnySelection { name } => {
                PathSegment::Selection {
                    name: std::mem::take(name),
                    index,
                }
            }
            _ => return None,
        };
        *segment = replacement;
        Some(copy)
    }
}

impl fmt::Display for PropertyKeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                f.write_str(".")?;
            }
            first = false;
            match segment {
                PathSegment::Name(n) => f.write_str(n)?,
                PathSegment::AnyName => f.write_str("*")?,
                PathSegment::Selection { name, index } => write!(f, "{}.[{}]", name, index)?,
                PathSegment::AnySelection { name } => write!(f, "{}.[*]", name)?,
            }
        }
        Ok(())
    }
}

// =============================================================================
// CODEC
// =============================================================================

fn validate_literal(path: &PropertyKeyPath, name: &str) -> Result<(), RelataError> {
    let reason = if name.is_empty() {
        Some("empty name segment")
    } else if name == "*" {
        Some("literal name '*' is reserved for wildcards")
    } else if name.contains(['.', '[', ']']) {
        Some("name segment contains '.', '[' or ']'")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(RelataError::InvalidPath {
            path: format!("{:?}", path.segments),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Flatten a key path into a property name.
///
/// Wildcard segments are written as `*` / `[*]`, so a pattern path flattens
/// to a readable description of what it matches.
pub fn path_to_name(path: &PropertyKeyPath) -> Result<String, RelataError> {
    if path.is_empty() {
        return Err(RelataError::InvalidPath {
            path: String::new(),
            reason: "empty path".to_string(),
        });
    }
    for segment in &path.segments {
        match segment {
            PathSegment::Name(n)
            | PathSegment::Selection { name: n, .. }
            | PathSegment::AnySelection { name: n } => validate_literal(path, n)?,
            PathSegment::AnyName => {}
        }
    }
    Ok(path.to_string())
}

/// Decode a flat property name into a key path.
///
/// `*` decodes to a wildcard name and `[*]` to a wildcard selection, so the
/// output of [`path_to_name`] always decodes to the original path.
pub fn name_to_path(name: &str) -> Result<PropertyKeyPath, RelataError> {
    let invalid = |reason: &str| RelataError::InvalidPath {
        path: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("empty property name"));
    }

    let mut segments: Vec<PathSegment> = Vec::new();
    for token in name.split('.') {
        if token.is_empty() {
            return Err(invalid("empty segment"));
        }
        if let Some(inner) = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            let base = match segments.pop() {
                Some(PathSegment::Name(n)) => n,
                Some(_) => return Err(invalid("selection must follow a plain name")),
                None => return Err(invalid("selection without a preceding name")),
            };
            if inner == "*" {
                segments.push(PathSegment::AnySelection { name: base });
            } else {
                if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid("selection index is not a decimal number"));
                }
                let index = inner
                    .parse::<usize>()
                    .map_err(|_| invalid("selection index out of range"))?;
                segments.push(PathSegment::Selection { name: base, index });
            }
        } else if token == "*" {
            segments.push(PathSegment::AnyName);
        } else if token.contains(['[', ']']) {
            return Err(invalid("unbalanced selection brackets"));
        } else {
            segments.push(PathSegment::Name(token.to_string()));
        }
    }

    Ok(PropertyKeyPath { segments })
}

/// Build a match pattern from a (possibly wildcarded) key path.
#[must_use]
pub fn path_to_match_pattern(path: &PropertyKeyPath) -> KeyPattern {
    KeyPattern { path: path.clone() }
}

// =============================================================================
// MATCHING
// =============================================================================

/// A structured matcher over key paths.
///
/// Candidates are compared segment by segment; wildcards bind
/// [`Capture`]s in path order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    path: PropertyKeyPath,
}

impl KeyPattern {
    /// The pattern's path.
    #[must_use]
    pub fn path(&self) -> &PropertyKeyPath {
        &self.path
    }

    fn match_segments(&self, candidate: &[PathSegment]) -> Option<Vec<Capture>> {
        let mut captures = Vec::new();
        for (pattern, actual) in self.path.segments.iter().zip(candidate) {
            match (pattern, actual) {
                (PathSegment::Name(p), PathSegment::Name(a)) if p == a => {}
                (PathSegment::AnyName, PathSegment::Name(a)) => {
                    captures.push(Capture::Name(a.clone()));
                }
                (
                    PathSegment::Selection { name: p, index: pi },
                    PathSegment::Selection { name: a, index: ai },
                ) if p == a && pi == ai => {}
                (PathSegment::AnySelection { name: p }, PathSegment::Selection { name: a, index })
                    if p == a =>
                {
                    captures.push(Capture::Index(*index));
                }
                _ => return None,
            }
        }
        Some(captures)
    }

    /// Match a candidate of exactly the pattern's length.
    #[must_use]
    pub fn captures(&self, candidate: &PropertyKeyPath) -> Option<Vec<Capture>> {
        if candidate.len() != self.path.len() {
            return None;
        }
        self.match_segments(&candidate.segments)
    }

    /// Match a candidate whose leading segments match the pattern.
    #[must_use]
    pub fn prefix_captures(&self, candidate: &PropertyKeyPath) -> Option<Vec<Capture>> {
        if candidate.len() < self.path.len() {
            return None;
        }
        self.match_segments(&candidate.segments[..self.path.len()])
    }

    /// Whether the candidate matches exactly.
    #[must_use]
    pub fn matches(&self, candidate: &PropertyKeyPath) -> bool {
        self.captures(candidate).is_some()
    }

    /// Whether the candidate starts with a match of this pattern.
    #[must_use]
    pub fn matches_prefix(&self, candidate: &PropertyKeyPath) -> bool {
        self.prefix_captures(candidate).is_some()
    }

    /// Decode a property name and match it exactly.
    ///
    /// Names that do not decode never match.
    #[must_use]
    pub fn captures_name(&self, name: &str) -> Option<Vec<Capture>> {
        name_to_path(name).ok().and_then(|p| self.captures(&p))
    }

    /// Decode a property name and match its leading segments.
    #[must_use]
    pub fn prefix_captures_name(&self, name: &str) -> Option<Vec<Capture>> {
        name_to_path(name)
            .ok()
            .and_then(|p| self.prefix_captures(&p))
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.path.fmt(f)
    }
}

// =============================================================================
// TESTS
// =============================================================================
