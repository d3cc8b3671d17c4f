use std::fmt;
use thiserror::Error;

/// Raised when a string does not parse as a valid virtual path segment.
///
/// A redundant separator (`//`) or a `.`/`..` segment is a validation
/// failure, not something to be silently collapsed away.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path segment must start with '/': {0:?}")]
    MissingLeadingSlash(String),

    #[error("invalid path segment {0:?}")]
    InvalidSegment(String),
}

/// A type-safe wrapper for bundle paths that ensures consistent path handling.
///
/// BundlePath provides a safe interface for working with file paths in ZIP bundles,
/// automatically handling path normalization and component parsing.
///
/// # Examples
///
/// ```
/// # use tonk_core::bundle::path::BundlePath;
/// let path = BundlePath::from_str("/documents/readme.txt").unwrap();
/// assert_eq!(path.filename(), Some("readme.txt"));
/// assert_eq!(path.parent().unwrap().to_string(), "documents");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundlePath(Vec<String>);

/// A segment matches `[A-Za-z0-9._-]+` and is neither `.` nor `..`.
fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl BundlePath {
    /// Create a new bundle path from already-split, trusted components.
    ///
    /// Used internally for archive entry names and other values that are
    /// known-good by construction; it does not validate segments. Prefer
    /// [`BundlePath::from_str`] for anything derived from user or manifest
    /// input.
    pub fn new(components: Vec<String>) -> Self {
        Self(components)
    }

    /// Parse an absolute virtual path per the manifest path grammar:
    /// non-empty, starts with `/`, segments separated by a single `/`, each
    /// segment matching `[A-Za-z0-9._-]+`, no `.`/`..` segment, no redundant
    /// `//`. Fails rather than silently collapsing malformed input.
    pub fn from_str(path: &str) -> Result<Self, PathError> {
        if path.is_empty() || path == "/" {
            return Ok(Self::root());
        }

        if !path.starts_with('/') {
            return Err(PathError::MissingLeadingSlash(path.to_string()));
        }

        let mut components = Vec::new();
        for segment in path[1..].split('/') {
            if !is_valid_segment(segment) {
                return Err(PathError::InvalidSegment(segment.to_string()));
            }
            components.push(segment.to_string());
        }

        Ok(Self(components))
    }

    /// Build a path from a raw ZIP archive entry name (always relative, no
    /// leading `/`). Archive entry names are produced by the ZIP library
    /// itself, not user input, so this is infallible and simply drops empty
    /// components (e.g. a trailing `/` on a directory entry).
    pub fn from_archive_path(path: &str) -> Self {
        let components: Vec<String> = path
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        Self(components)
    }

    /// Create a root path (empty components)
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Get the components as a slice
    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// Convert to a slash-separated string
    pub fn to_string(&self) -> String {
        if self.0.is_empty() {
            String::new()
        } else {
            self.0.join("/")
        }
    }

    /// Convert to an absolute virtual path string (leading `/`, or `/` for root).
    pub fn to_absolute_string(&self) -> String {
        format!("/{}", self.to_string())
    }

    /// Check if this is the root path
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the number of path components
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the path is empty (same as is_root)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the last component (filename)
    pub fn filename(&self) -> Option<&str> {
        self.0.last().map(|s| s.as_str())
    }

    /// Get the parent path
    pub fn parent(&self) -> Option<BundlePath> {
        if self.0.is_empty() {
            None
        } else if self.0.len() == 1 {
            Some(Self::root())
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Check if this path starts with another path
    pub fn starts_with(&self, prefix: &BundlePath) -> bool {
        if prefix.0.len() > self.0.len() {
            return false;
        }

        self.0[..prefix.0.len()] == prefix.0
    }

    /// Create a child path by appending a component
    pub fn child(&self, component: &str) -> BundlePath {
        let mut components = self.0.clone();
        components.push(component.to_string());
        Self(components)
    }
}

impl fmt::Display for BundlePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string())
    }
}

impl From<Vec<String>> for BundlePath {
    fn from(components: Vec<String>) -> Self {
        Self::new(components)
    }
}

impl From<&[String]> for BundlePath {
    fn from(components: &[String]) -> Self {
        Self::new(components.to_vec())
    }
}

impl TryFrom<&str> for BundlePath {
    type Error = PathError;

    fn try_from(path: &str) -> Result<Self, PathError> {
        Self::from_str(path)
    }
}

impl Into<Vec<String>> for BundlePath {
    fn into(self) -> Vec<String> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_path_creation() {
        let path = BundlePath::from_str("/foo/bar/baz").unwrap();
        assert_eq!(path.components(), &["foo", "bar", "baz"]);
        assert_eq!(path.to_string(), "foo/bar/baz");
    }

    #[test]
    fn test_root_path() {
        let root1 = BundlePath::root();
        let root2 = BundlePath::from_str("/").unwrap();
        let root3 = BundlePath::from_str("").unwrap();

        assert!(root1.is_root());
        assert!(root2.is_root());
        assert!(root3.is_root());
        assert_eq!(root1, root2);
        assert_eq!(root2, root3);
    }

    #[test]
    fn test_path_operations() {
        let path = BundlePath::from_str("/docs/readme.txt").unwrap();

        assert_eq!(path.filename(), Some("readme.txt"));
        assert_eq!(path.parent(), Some(BundlePath::from_str("/docs").unwrap()));
        assert_eq!(path.len(), 2);

        let child = path.child("backup");
        assert_eq!(child.to_string(), "docs/readme.txt/backup");
    }

    #[test]
    fn test_path_prefix() {
        let path = BundlePath::from_str("/docs/readme.txt").unwrap();
        let prefix = BundlePath::from_str("/docs").unwrap();
        let non_prefix = BundlePath::from_str("/src").unwrap();

        assert!(path.starts_with(&prefix));
        assert!(!path.starts_with(&non_prefix));
        assert!(path.starts_with(&BundlePath::root()));
    }

    #[test]
    fn test_redundant_separator_is_rejected() {
        assert_eq!(
            BundlePath::from_str("/a//b"),
            Err(PathError::InvalidSegment(String::new()))
        );
    }

    #[test]
    fn test_dot_segments_are_rejected() {
        assert!(BundlePath::from_str("/a/./b").is_err());
        assert!(BundlePath::from_str("/a/../b").is_err());
    }

    #[test]
    fn test_invalid_characters_are_rejected() {
        assert!(BundlePath::from_str("/a b").is_err());
        assert!(BundlePath::from_str("/a/b?").is_err());
    }

    #[test]
    fn test_archive_path_is_lenient() {
        let path = BundlePath::from_archive_path("documents/readme.txt");
        assert_eq!(path.to_string(), "documents/readme.txt");
    }
}
