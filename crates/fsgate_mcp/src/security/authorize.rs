//! Authorization Engine - Allow/Deny Decisions
//!
//! Composes the policy store, the canonicalizer and the content sniffer.
//! Every check resolves the configured roots again, so a root that was
//! replaced by a symlink after startup is judged by where it points now, and
//! a root that disappeared fails the whole check.

use super::{
    CanonicalPath, ContentSniffer, PathCanonicalizer, PolicyStore, SecurityError, SniffResult,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// The kind of entry an operation expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    File,
    Directory,
}

/// A path that passed every check
#[derive(Debug, Clone)]
pub struct AuthorizedPath {
    pub path: CanonicalPath,
    /// Present for `AccessKind::File`
    pub sniff: Option<SniffResult>,
}

pub type AuthorizationDecision = Result<AuthorizedPath, SecurityError>;

/// A not-yet-existing file inside an authorized directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileTarget {
    pub path: PathBuf,
}

/// Roots as they resolve right now
struct ResolvedRoots {
    allowed: Vec<PathBuf>,
    denied: Vec<PathBuf>,
}

/// Decides whether an operation on a raw path string may proceed
#[derive(Debug, Clone)]
pub struct Authorizer {
    policy: Arc<PolicyStore>,
    canonicalizer: PathCanonicalizer,
    sniffer: ContentSniffer,
    case_insensitive: bool,
}

impl Authorizer {
    pub fn new(
        policy: Arc<PolicyStore>,
        canonicalizer: PathCanonicalizer,
        sniffer: ContentSniffer,
    ) -> Self {
        Self {
            policy,
            canonicalizer,
            sniffer,
            case_insensitive: cfg!(any(windows, target_os = "macos")),
        }
    }

    /// Compare path components ignoring ASCII case
    pub fn with_case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    pub fn policy(&self) -> &PolicyStore {
        &self.policy
    }

    pub fn canonicalizer(&self) -> &PathCanonicalizer {
        &self.canonicalizer
    }

    pub fn sniffer(&self) -> &ContentSniffer {
        &self.sniffer
    }

    /// Canonicalize `raw`, check its kind and policy scope, and for files
    /// check the content type.
    pub async fn authorize(&self, raw: &str, kind: AccessKind) -> AuthorizationDecision {
        let canonical = self.canonicalizer.canonicalize(raw).await?;

        match kind {
            AccessKind::File if !canonical.is_file() => {
                return Err(SecurityError::NotAFile {
                    path: canonical.into_path_buf(),
                })
            }
            AccessKind::Directory if !canonical.is_dir() => {
                return Err(SecurityError::NotADirectory {
                    path: canonical.into_path_buf(),
                })
            }
            _ => {}
        }

        self.check_scope(canonical.as_path()).await?;

        let sniff = match kind {
            AccessKind::Directory => None,
            AccessKind::File => {
                let result = self.sniffer.sniff(&canonical).await?;
                if !result.is_permitted() {
                    return Err(result.into_error(canonical.as_path()));
                }
                Some(result)
            }
        };

        debug!(raw = %raw, path = %canonical, ?kind, "Access authorized");
        Ok(AuthorizedPath {
            path: canonical,
            sniff,
        })
    }

    /// Authorize creating a file that does not exist yet.
    ///
    /// The parent directory must exist and be authorized; the final
    /// component must not exist in any form, including a dangling symlink.
    pub async fn authorize_new_file(&self, raw: &str) -> Result<NewFileTarget, SecurityError> {
        let absolute = self
            .canonicalizer
            .absolutize(self.canonicalizer.sanitize(raw)?);

        let (parent, file_name) = match (absolute.parent(), absolute.file_name()) {
            (Some(parent), Some(name)) => (parent.to_path_buf(), name.to_os_string()),
            _ => return Err(SecurityError::malformed(raw, "path has no file name")),
        };

        let target = absolute.clone();
        let exists = tokio::task::spawn_blocking(move || std::fs::symlink_metadata(&target).is_ok())
            .await
            .map_err(|e| SecurityError::Unreadable {
                path: absolute.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })?;
        if exists {
            return Err(SecurityError::malformed(
                raw,
                "target exists but cannot be resolved (dangling symlink?)",
            ));
        }

        let parent = self.canonicalizer.resolve(parent).await?;
        if !parent.is_dir() {
            return Err(SecurityError::NotADirectory {
                path: parent.into_path_buf(),
            });
        }
        self.check_scope(parent.as_path()).await?;

        let target = parent.as_path().join(&file_name);
        self.check_scope(&target).await?;

        debug!(raw = %raw, path = %target.display(), "New file authorized");
        Ok(NewFileTarget { path: target })
    }

    async fn check_scope(&self, path: &Path) -> Result<(), SecurityError> {
        let roots = self.resolve_roots().await?;

        if !roots
            .allowed
            .iter()
            .any(|root| is_subpath(path, root, self.case_insensitive))
        {
            warn!(path = %path.display(), "Path outside allowed roots");
            return Err(SecurityError::OutsideAllowed {
                path: path.to_path_buf(),
            });
        }

        if let Some(root) = roots
            .denied
            .iter()
            .find(|root| is_subpath(path, root, self.case_insensitive))
        {
            warn!(path = %path.display(), root = %root.display(), "Path inside denied root");
            return Err(SecurityError::InsideDenied {
                path: path.to_path_buf(),
                root: root.clone(),
            });
        }

        Ok(())
    }

    async fn resolve_roots(&self) -> Result<ResolvedRoots, SecurityError> {
        let allowed = self.policy.allowed().to_vec();
        let denied = self.policy.denied().to_vec();

        tokio::task::spawn_blocking(move || -> Result<ResolvedRoots, SecurityError> {
            Ok(ResolvedRoots {
                allowed: resolve_root_list(&allowed)?,
                denied: resolve_root_list(&denied)?,
            })
        })
        .await
        .map_err(|e| SecurityError::PolicyRootUnavailable {
            root: PathBuf::new(),
            reason: e.to_string(),
        })?
    }
}

fn resolve_root_list(roots: &[PathBuf]) -> Result<Vec<PathBuf>, SecurityError> {
    roots
        .iter()
        .map(|root| {
            let canonical =
                dunce::canonicalize(root).map_err(|e| SecurityError::PolicyRootUnavailable {
                    root: root.clone(),
                    reason: e.to_string(),
                })?;
            if !canonical.is_dir() {
                return Err(SecurityError::PolicyRootUnavailable {
                    root: root.clone(),
                    reason: "no longer a directory".to_string(),
                });
            }
            Ok(canonical)
        })
        .collect()
}

/// True when `path` equals `root` or lies beneath it, compared whole
/// component by whole component (`/data` does not contain `/database`).
pub fn is_subpath(path: &Path, root: &Path, case_insensitive: bool) -> bool {
    if !case_insensitive {
        return path.starts_with(root);
    }

    let mut path_components = path.components();
    root.components().all(|root_part| {
        path_components.next().is_some_and(|part| {
            eq_ignore_ascii_case(part.as_os_str(), root_part.as_os_str())
        })
    })
}

fn eq_ignore_ascii_case(a: &OsStr, b: &OsStr) -> bool {
    a.as_encoded_bytes().eq_ignore_ascii_case(b.as_encoded_bytes())
}
