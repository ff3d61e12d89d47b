//! Security Subsystem - Path Authorization Core
//!
//! Every tool handler trusts this module to turn an adversarial path string
//! into one canonical, symlink-free path that is inside the allow-list and
//! outside the deny-list.
//!
//! # Pipeline
//!
//! ```text
//! raw path ──► PathCanonicalizer ──► Authorizer ──► ContentSniffer (file reads)
//!               sanitize + resolve     allow/deny      UTF-8 first, then magic
//! ```
//!
//! The policy is read-only after startup and shared via `Arc`; every check is
//! recomputed from fresh filesystem state.
//!
//! # Check-then-use
//!
//! Between `Authorizer::authorize` returning and the handler opening the file,
//! the filesystem can change (file swapped, symlink retargeted). This is an
//! application-level policy check, not a kernel sandbox, and that window is
//! accepted. Handlers must use the returned canonical path and never resolve
//! the raw string a second time.

mod audit;
mod authorize;
mod canonicalize;
mod policy;
mod result_guard;
mod sniff;

pub use audit::AuditLog;
pub use authorize::{is_subpath, AccessKind, AuthorizationDecision, AuthorizedPath, Authorizer, NewFileTarget};
pub use canonicalize::{CanonicalPath, EntryKind, PathCanonicalizer, PathGrammar, PathLimits};
pub use policy::{PolicyError, PolicyList, PolicyStore};
pub use result_guard::{ResultGuard, MAX_RESULT_BYTES};
pub use sniff::{classify, read_file_bounded, ContentClass, ContentSniffer, SniffResult, DEFAULT_IO_TIMEOUT};
pub(crate) use sniff::bounded;

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Reasons an authorization (or a bounded read behind it) can fail.
///
/// Every variant is recoverable: the server turns it into a text reply.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("Malformed path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },

    #[error("Path {path} does not exist")]
    NotFound { path: String },

    #[error("Path {} is not a file", path.display())]
    NotAFile { path: PathBuf },

    #[error("Path {} is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("Path {} is not within allowed paths", path.display())]
    OutsideAllowed { path: PathBuf },

    #[error("Path {} is within denied path {}", path.display(), root.display())]
    InsideDenied { path: PathBuf, root: PathBuf },

    #[error("{reason}: {} ({mime_type})", path.display())]
    DisallowedType {
        path: PathBuf,
        mime_type: String,
        reason: String,
    },

    #[error("Timed out after {}s reading {}", timeout.as_secs(), path.display())]
    Timeout { path: PathBuf, timeout: Duration },

    #[error("Configured root {} is unavailable: {reason}", root.display())]
    PolicyRootUnavailable { root: PathBuf, reason: String },

    #[error("Failed to read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Audit log error: {0}")]
    AuditError(String),
}

impl SecurityError {
    /// Machine-readable code for logs and the audit trail.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedPath { .. } => "MALFORMED_PATH",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::NotAFile { .. } => "NOT_A_FILE",
            Self::NotADirectory { .. } => "NOT_A_DIRECTORY",
            Self::OutsideAllowed { .. } => "OUTSIDE_ALLOWED",
            Self::InsideDenied { .. } => "INSIDE_DENIED",
            Self::DisallowedType { .. } => "DISALLOWED_TYPE",
            Self::Timeout { .. } => "TIMEOUT",
            Self::PolicyRootUnavailable { .. } => "POLICY_ROOT_UNAVAILABLE",
            Self::Unreadable { .. } => "UNREADABLE",
            Self::AuditError(_) => "AUDIT_ERROR",
        }
    }

    pub(crate) fn malformed(path: &str, reason: impl Into<String>) -> Self {
        Self::MalformedPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        let err = SecurityError::InsideDenied {
            path: PathBuf::from("/data/secret/a.txt"),
            root: PathBuf::from("/data/secret"),
        };
        assert_eq!(err.code(), "INSIDE_DENIED");
        assert_eq!(
            err.to_string(),
            "Path /data/secret/a.txt is within denied path /data/secret"
        );

        let err = SecurityError::malformed("", "path is empty");
        assert_eq!(err.code(), "MALFORMED_PATH");
    }

    #[test]
    fn test_timeout_message() {
        let err = SecurityError::Timeout {
            path: PathBuf::from("/data/big.bin"),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "Timed out after 10s reading /data/big.bin");
    }
}
