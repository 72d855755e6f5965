//! Path confinement for tenant trees
//!
//! Every operation on a tenant's tree first turns a logical path into a
//! [`CanonicalPath`] through this module. A canonical path is root-relative,
//! slash-separated, and contains no `.`, `..` or empty segments, so it can
//! never address anything outside its [`TenantRoot`].

mod resolve;

pub use resolve::{resolve, resolve_contained, validate_name};

use crate::PathError;
use std::fmt;

/// Names one tenant's isolated namespace
///
/// The empty root is the default (global) namespace. Roots are compared as
/// opaque identifiers and are never joined with paths, so two roots can not
/// address each other's trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TenantRoot(String);

impl TenantRoot {
    /// The default namespace, for single-tenant deployments
    pub const DEFAULT: TenantRoot = TenantRoot(String::new());

    /// Validates and wraps a tenant identifier
    ///
    /// Accepts the empty string or a run of ASCII letters, digits, `.`, `_`
    /// and `-` that is not made of dots only.
    pub fn new(name: impl Into<String>) -> Result<Self, PathError> {
        let name = name.into();
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        let only_dots = !name.is_empty() && name.chars().all(|c| c == '.');

        if !valid_chars || only_dots || name.len() > 128 {
            return Err(PathError::InvalidTenant(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TenantRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<default>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A normalized, root-relative tree coordinate
///
/// The empty path is the tenant's implicit root folder. Instances are only
/// produced by the resolver or by joining validated names, so they always
/// satisfy the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CanonicalPath(String);

impl CanonicalPath {
    /// The tenant's root folder
    pub fn root() -> Self {
        Self(String::new())
    }

    pub(crate) fn from_segments<S: AsRef<str>>(segments: &[S]) -> Self {
        let joined = segments
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join("/");
        Self(joined)
    }

    /// Wraps a path read back from a backend, which only ever stores canonical paths
    pub(crate) fn from_stored(path: &str) -> Self {
        Self(path.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Last segment, empty for the root
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Parent folder, `None` for the root
    pub fn parent(&self) -> Option<CanonicalPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Appends one already-validated segment
    pub fn join(&self, name: &str) -> Result<CanonicalPath, PathError> {
        validate_name(name)?;
        if self.is_root() {
            Ok(Self(name.to_string()))
        } else {
            Ok(Self(format!("{}/{}", self.0, name)))
        }
    }

    /// Appends a slash-separated run of validated segments
    pub fn join_path(&self, relative: &str) -> Result<CanonicalPath, PathError> {
        relative
            .split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self.clone(), |path, segment| path.join(segment))
    }

    /// Returns true if `self` equals `ancestor` or lies beneath it
    pub fn starts_with(&self, ancestor: &CanonicalPath) -> bool {
        if ancestor.is_root() || self == ancestor {
            return true;
        }
        self.0.len() > ancestor.0.len()
            && self.0.starts_with(&ancestor.0)
            && self.0.as_bytes()[ancestor.0.len()] == b'/'
    }

    /// Path of `self` relative to `ancestor`, if it lies beneath it
    pub fn strip_prefix(&self, ancestor: &CanonicalPath) -> Option<&str> {
        if !self.starts_with(ancestor) {
            return None;
        }
        if ancestor.is_root() {
            Some(&self.0)
        } else if self == ancestor {
            Some("")
        } else {
            Some(&self.0[ancestor.0.len() + 1..])
        }
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}
