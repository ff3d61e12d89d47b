//! Policy Store - Allowed and Denied Roots
//!
//! Built once at startup and never mutated. An empty allow-list denies
//! everything; a denied root overrides any allowed root that contains it.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Which list a policy entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyList {
    Allow,
    Deny,
}

impl fmt::Display for PolicyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyList::Allow => write!(f, "allow"),
            PolicyList::Deny => write!(f, "deny"),
        }
    }
}

/// Startup validation failures for the policy lists
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("{list} entry {} is not an absolute path", path.display())]
    NotAbsolute { list: PolicyList, path: PathBuf },

    #[error("{list} entry {} does not exist", path.display())]
    DoesNotExist { list: PolicyList, path: PathBuf },

    #[error("{list} entry {} is not a directory", path.display())]
    NotADirectory { list: PolicyList, path: PathBuf },

    #[error("{list} entry {} is listed more than once", path.display())]
    Duplicate { list: PolicyList, path: PathBuf },
}

/// Allow/deny root directories
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    allowed: Vec<PathBuf>,
    denied: Vec<PathBuf>,
}

impl PolicyStore {
    /// Validate and build the policy.
    ///
    /// Entries must be absolute paths to existing directories. Two entries in
    /// the same list that resolve to the same directory are a duplicate.
    pub fn new(allowed: Vec<PathBuf>, denied: Vec<PathBuf>) -> Result<Self, PolicyError> {
        validate_list(PolicyList::Allow, &allowed)?;
        validate_list(PolicyList::Deny, &denied)?;

        debug!(
            allowed = allowed.len(),
            denied = denied.len(),
            "Policy store initialized"
        );

        Ok(Self { allowed, denied })
    }

    /// A policy with no roots: every operation is denied
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// Allowed roots, as configured
    pub fn allowed(&self) -> &[PathBuf] {
        &self.allowed
    }

    /// Denied roots, as configured
    pub fn denied(&self) -> &[PathBuf] {
        &self.denied
    }
}

fn validate_list(list: PolicyList, entries: &[PathBuf]) -> Result<(), PolicyError> {
    let mut seen = HashSet::new();

    for path in entries {
        if !path.is_absolute() {
            return Err(PolicyError::NotAbsolute {
                list,
                path: path.clone(),
            });
        }

        let canonical = resolve_entry(list, path)?;
        if !seen.insert(canonical) {
            return Err(PolicyError::Duplicate {
                list,
                path: path.clone(),
            });
        }
    }

    Ok(())
}

fn resolve_entry(list: PolicyList, path: &Path) -> Result<PathBuf, PolicyError> {
    let canonical = dunce::canonicalize(path).map_err(|_| PolicyError::DoesNotExist {
        list,
        path: path.to_path_buf(),
    })?;

    if !canonical.is_dir() {
        return Err(PolicyError::NotADirectory {
            list,
            path: path.to_path_buf(),
        });
    }

    Ok(canonical)
}
