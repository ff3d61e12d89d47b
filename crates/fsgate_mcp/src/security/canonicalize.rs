//! Path Canonicalizer - Raw String to Canonical Path
//!
//! Two steps, in order:
//!
//! 1. **Sanitize** against the target path grammar. Control characters,
//!    over-long paths and (on Windows) reserved device names, illegal
//!    punctuation and drive-relative forms are rejected. Trailing dots and
//!    spaces on Windows components are stripped, since Win32 drops them anyway.
//! 2. **Resolve** strictly: relative input is joined onto a fixed base
//!    directory, symlinks are followed to the final entry, and a missing
//!    target (including a dangling link) is `NotFound`.
//!
//! The entry kind is read from the resolved path in the same blocking call
//! that resolved it.

use super::SecurityError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};
use tracing::{debug, warn};

const WINDOWS_ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Which filesystem path grammar raw paths are validated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathGrammar {
    Windows,
    Posix,
}

impl PathGrammar {
    /// Grammar of the host the server runs on
    pub fn host() -> Self {
        if cfg!(windows) {
            PathGrammar::Windows
        } else {
            PathGrammar::Posix
        }
    }
}

impl Default for PathGrammar {
    fn default() -> Self {
        Self::host()
    }
}

/// Length limits (platform policy, configurable)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathLimits {
    pub max_path_len: usize,
    pub max_component_len: usize,
}

impl Default for PathLimits {
    fn default() -> Self {
        Self {
            max_path_len: 4096,
            max_component_len: 255,
        }
    }
}

/// What a canonical path pointed at when it was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

impl From<&Metadata> for EntryKind {
    fn from(meta: &Metadata) -> Self {
        if meta.is_file() {
            EntryKind::File
        } else if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::Other
        }
    }
}

/// A fully resolved, absolute, symlink-free path.
///
/// Only `PathCanonicalizer` creates these. Existence and kind are a snapshot
/// taken at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPath {
    path: PathBuf,
    kind: EntryKind,
}

impl CanonicalPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }
}

impl AsRef<Path> for CanonicalPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Turns raw path strings into `CanonicalPath`s
#[derive(Debug, Clone)]
pub struct PathCanonicalizer {
    base_dir: PathBuf,
    grammar: PathGrammar,
    limits: PathLimits,
}

impl PathCanonicalizer {
    /// Create a canonicalizer resolving relative paths against `base_dir`
    pub fn new(base_dir: PathBuf, grammar: PathGrammar, limits: PathLimits) -> Self {
        Self {
            base_dir,
            grammar,
            limits,
        }
    }

    /// Create a canonicalizer anchored at the process working directory,
    /// captured once here.
    pub fn from_current_dir(grammar: PathGrammar, limits: PathLimits) -> io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?, grammar, limits))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn grammar(&self) -> PathGrammar {
        self.grammar
    }

    /// Validate `raw` against the path grammar and return the sanitized path.
    ///
    /// No filesystem access.
    pub fn sanitize(&self, raw: &str) -> Result<PathBuf, SecurityError> {
        if raw.trim().is_empty() {
            return Err(SecurityError::malformed(raw, "path is empty"));
        }

        if raw.len() > self.limits.max_path_len {
            return Err(SecurityError::malformed(
                raw,
                format!("path exceeds {} bytes", self.limits.max_path_len),
            ));
        }

        if raw.chars().any(|c| c.is_ascii_control()) {
            return Err(SecurityError::malformed(
                &raw.replace('\0', "\\0"),
                "path contains control characters",
            ));
        }

        match self.grammar {
            PathGrammar::Posix => self.sanitize_posix(raw),
            PathGrammar::Windows => self.sanitize_windows(raw),
        }
    }

    fn sanitize_posix(&self, raw: &str) -> Result<PathBuf, SecurityError> {
        let path = PathBuf::from(raw);
        for component in path.components() {
            if let Component::Normal(part) = component {
                if part.len() > self.limits.max_component_len {
                    return Err(SecurityError::malformed(
                        raw,
                        format!(
                            "path component exceeds {} bytes",
                            self.limits.max_component_len
                        ),
                    ));
                }
            }
        }
        Ok(path)
    }

    fn sanitize_windows(&self, raw: &str) -> Result<PathBuf, SecurityError> {
        let (prefix, rest) = split_windows_prefix(raw)?;

        let mut parts: Vec<String> = Vec::new();
        for part in rest.split(['\\', '/']) {
            if part.is_empty() || part == "." || part == ".." {
                if !part.is_empty() {
                    parts.push(part.to_string());
                }
                continue;
            }

            let stripped = part.trim_end_matches(['.', ' ']);
            if stripped.is_empty() {
                return Err(SecurityError::malformed(
                    raw,
                    format!("component '{}' is empty after stripping dots and spaces", part),
                ));
            }

            if let Some(c) = stripped.chars().find(|c| WINDOWS_ILLEGAL_CHARS.contains(c)) {
                return Err(SecurityError::malformed(
                    raw,
                    format!("component '{}' contains illegal character '{}'", stripped, c),
                ));
            }

            if is_reserved_device_name(stripped) {
                return Err(SecurityError::malformed(
                    raw,
                    format!("component '{}' is a reserved device name", stripped),
                ));
            }

            if stripped.len() > self.limits.max_component_len {
                return Err(SecurityError::malformed(
                    raw,
                    format!(
                        "path component exceeds {} bytes",
                        self.limits.max_component_len
                    ),
                ));
            }

            parts.push(stripped.to_string());
        }

        let separator = MAIN_SEPARATOR.to_string();
        let mut sanitized = prefix;
        sanitized.push_str(&parts.join(&separator));
        Ok(PathBuf::from(sanitized))
    }

    /// Make a sanitized path absolute against the base directory
    pub(crate) fn absolutize(&self, sanitized: PathBuf) -> PathBuf {
        if sanitized.is_absolute() {
            sanitized
        } else {
            self.base_dir.join(sanitized)
        }
    }

    /// Sanitize and strictly resolve `raw`.
    pub async fn canonicalize(&self, raw: &str) -> Result<CanonicalPath, SecurityError> {
        let sanitized = self.sanitize(raw)?;
        let canonical = self.resolve(self.absolutize(sanitized)).await?;
        debug!(raw = %raw, canonical = %canonical, "Path resolved");
        Ok(canonical)
    }

    /// Strictly resolve an already sanitized, absolute path.
    pub(crate) async fn resolve(&self, absolute: PathBuf) -> Result<CanonicalPath, SecurityError> {
        let target = absolute.clone();
        let resolved = tokio::task::spawn_blocking(move || resolve_strict(&target))
            .await
            .map_err(|e| SecurityError::Unreadable {
                path: absolute.clone(),
                source: io::Error::new(io::ErrorKind::Other, e.to_string()),
            })?;

        match resolved {
            Ok(canonical) => Ok(canonical),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SecurityError::NotFound {
                path: absolute.display().to_string(),
            }),
            Err(e) => {
                warn!(path = %absolute.display(), error = %e, "Path resolution failed");
                Err(SecurityError::malformed(
                    &absolute.display().to_string(),
                    e.to_string(),
                ))
            }
        }
    }
}

/// Resolve every symlink and record the kind of the final entry.
fn resolve_strict(path: &Path) -> io::Result<CanonicalPath> {
    let canonical = dunce::canonicalize(path)?;
    let meta = std::fs::metadata(&canonical)?;
    Ok(CanonicalPath {
        kind: EntryKind::from(&meta),
        path: canonical,
    })
}

/// Split a Windows path into its prefix (`C:\`, `\\server\share\`, `\`) and the rest.
fn split_windows_prefix(raw: &str) -> Result<(String, &str), SecurityError> {
    if raw.starts_with(r"\\?\") || raw.starts_with(r"\\.\") || raw.starts_with("//?/") || raw.starts_with("//./") {
        return Err(SecurityError::malformed(
            raw,
            "device and verbatim path prefixes are not supported",
        ));
    }

    let bytes = raw.as_bytes();
    let is_sep = |b: u8| b == b'\\' || b == b'/';

    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        if bytes.len() == 2 || !is_sep(bytes[2]) {
            return Err(SecurityError::malformed(
                raw,
                "drive-relative paths are not supported",
            ));
        }
        let drive = raw[..1].to_ascii_uppercase();
        return Ok((format!("{}:{}", drive, MAIN_SEPARATOR), &raw[3..]));
    }

    if bytes.len() >= 2 && is_sep(bytes[0]) && is_sep(bytes[1]) {
        let mut pieces = raw[2..].splitn(3, ['\\', '/']);
        let server = pieces.next().unwrap_or_default();
        let share = pieces.next().unwrap_or_default();
        if server.is_empty() || share.is_empty() {
            return Err(SecurityError::malformed(raw, "incomplete UNC path"));
        }
        let rest = pieces.next().unwrap_or_default();
        let sep = MAIN_SEPARATOR;
        return Ok((format!("{sep}{sep}{server}{sep}{share}{sep}"), rest));
    }

    if bytes.first().copied().is_some_and(is_sep) {
        return Ok((MAIN_SEPARATOR.to_string(), &raw[1..]));
    }

    Ok((String::new(), raw))
}

/// `CON`, `nul.txt`, `Com1.tar.gz`, ... (the stem before the first dot)
fn is_reserved_device_name(component: &str) -> bool {
    let stem = component
        .split('.')
        .next()
        .unwrap_or(component)
        .trim_end_matches(' ');
    WINDOWS_RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
}
