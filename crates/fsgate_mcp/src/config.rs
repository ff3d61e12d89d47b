//! Server configuration
//!
//! A TOML file, optionally merged with command-line roots, becomes the
//! policy store and the authorizer.
//!
//! ```toml
//! allowed = ["/home/me/projects", "/srv/shared"]
//! denied = ["/home/me/projects/secrets"]
//! read_timeout_secs = 10
//! path_grammar = "posix"
//! ```

use crate::security::{
    Authorizer, ContentSniffer, PathCanonicalizer, PathGrammar, PathLimits, PolicyError,
    PolicyStore,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("Cannot determine base directory: {0}")]
    BaseDir(std::io::Error),
}

/// Everything needed to build the authorization core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Allowed root directories
    pub allowed: Vec<PathBuf>,

    /// Denied root directories (override `allowed`)
    pub denied: Vec<PathBuf>,

    /// Directory relative tool paths resolve against (default: working directory)
    pub base_dir: Option<PathBuf>,

    pub sniff_timeout_secs: u64,

    pub read_timeout_secs: u64,

    pub max_path_len: usize,

    pub max_component_len: usize,

    /// Compare paths ignoring ASCII case (default: on for Windows and macOS)
    pub case_insensitive: Option<bool>,

    /// Path grammar raw paths are validated against (default: host)
    pub path_grammar: Option<PathGrammar>,

    /// NDJSON audit log of requests and tool calls
    pub audit_log_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let limits = PathLimits::default();
        Self {
            allowed: Vec::new(),
            denied: Vec::new(),
            base_dir: None,
            sniff_timeout_secs: 10,
            read_timeout_secs: 10,
            max_path_len: limits.max_path_len,
            max_component_len: limits.max_component_len,
            case_insensitive: None,
            path_grammar: None,
            audit_log_path: None,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), "Config file loaded");
        Ok(config)
    }

    /// Base directory, captured once
    pub fn resolve_base_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.base_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().map_err(ConfigError::BaseDir),
        }
    }

    /// Validate the roots into a policy store.
    ///
    /// Relative roots are taken relative to the base directory, so a config
    /// file can say `allowed = ["."]`.
    pub fn build_policy(&self) -> Result<PolicyStore, ConfigError> {
        let base = self.resolve_base_dir()?;
        let absolutize = |paths: &[PathBuf]| -> Vec<PathBuf> {
            paths
                .iter()
                .map(|p| if p.is_absolute() { p.clone() } else { base.join(p) })
                .collect()
        };
        Ok(PolicyStore::new(
            absolutize(&self.allowed),
            absolutize(&self.denied),
        )?)
    }

    pub fn build_authorizer(&self) -> Result<Authorizer, ConfigError> {
        let policy = self.build_policy()?;
        let canonicalizer = PathCanonicalizer::new(
            self.resolve_base_dir()?,
            self.path_grammar.unwrap_or_default(),
            PathLimits {
                max_path_len: self.max_path_len,
                max_component_len: self.max_component_len,
            },
        );
        let authorizer = Authorizer::new(
            Arc::new(policy),
            canonicalizer,
            ContentSniffer::new(self.sniff_timeout()),
        );

        Ok(match self.case_insensitive {
            Some(flag) => authorizer.with_case_insensitive(flag),
            None => authorizer,
        })
    }

    pub fn sniff_timeout(&self) -> Duration {
        Duration::from_secs(self.sniff_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.read_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_component_len, 255);
    }

    #[test]
    fn test_full_file() {
        let config = ServerConfig::from_toml_str(
            r#"
            allowed = ["/data"]
            denied = ["/data/private"]
            read_timeout_secs = 3
            case_insensitive = true
            path_grammar = "windows"
            audit_log_path = "/var/log/fsgate.ndjson"
            "#,
        )
        .unwrap();

        assert_eq!(config.allowed, vec![PathBuf::from("/data")]);
        assert_eq!(config.denied, vec![PathBuf::from("/data/private")]);
        assert_eq!(config.read_timeout(), Duration::from_secs(3));
        assert_eq!(config.case_insensitive, Some(true));
        assert_eq!(config.path_grammar, Some(PathGrammar::Windows));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ServerConfig::from_toml_str("allow = [\"/data\"]");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_relative_roots_use_base_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("shared")).unwrap();

        let config = ServerConfig {
            allowed: vec![PathBuf::from("shared")],
            base_dir: Some(temp.path().to_path_buf()),
            ..ServerConfig::default()
        };
        let policy = config.build_policy().unwrap();
        assert_eq!(policy.allowed(), &[temp.path().join("shared")]);
    }

    #[test]
    fn test_missing_root_is_policy_error() {
        let temp = TempDir::new().unwrap();
        let config = ServerConfig {
            allowed: vec![temp.path().join("missing")],
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.build_authorizer(),
            Err(ConfigError::Policy(PolicyError::DoesNotExist { .. }))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = ServerConfig::load(&temp.path().join("fsgate.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
