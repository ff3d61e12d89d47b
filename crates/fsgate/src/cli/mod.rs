//! CLI module for fsgate
//!
//! `serve` runs the MCP server; `check` validates the same policy inputs
//! without serving, so a client configuration can be tested up front.

pub mod check;
pub mod error;
pub mod serve;

pub use error::HelpfulError;

use anyhow::Result;
use clap::Args;
use fsgate_mcp::{ConfigError, ServerConfig};
use std::path::PathBuf;

/// Policy inputs shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct PolicyArgs {
    /// TOML config file
    #[arg(short, long, env = "FSGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory the client may access (repeatable)
    #[arg(long, env = "FSGATE_ALLOW", value_delimiter = ',')]
    pub allow: Vec<PathBuf>,

    /// Directory the client may never access, even inside an allowed one (repeatable)
    #[arg(long, env = "FSGATE_DENY", value_delimiter = ',')]
    pub deny: Vec<PathBuf>,

    /// Directory relative tool paths resolve against (default: current directory)
    #[arg(long)]
    pub base_dir: Option<PathBuf>,
}

impl PolicyArgs {
    /// Config file (if any) with command-line roots appended
    pub fn load_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path).map_err(|e| config_error(path, e))?,
            None => ServerConfig::default(),
        };

        config.allowed.extend(self.allow.iter().cloned());
        config.denied.extend(self.deny.iter().cloned());
        if let Some(dir) = &self.base_dir {
            config.base_dir = Some(dir.clone());
        }

        if config.allowed.is_empty() {
            return Err(HelpfulError::no_allowed_roots().into());
        }

        Ok(config)
    }
}

fn config_error(path: &std::path::Path, err: ConfigError) -> anyhow::Error {
    match err {
        ConfigError::Io { .. } => HelpfulError::file_not_found(path).into(),
        ConfigError::Parse(e) => HelpfulError::invalid_config(path, &e.to_string()).into(),
        other => other.into(),
    }
}

/// Map policy validation failures to actionable messages
pub(crate) fn policy_error(err: ConfigError) -> anyhow::Error {
    match err {
        ConfigError::Policy(e) => HelpfulError::invalid_policy(&e.to_string()).into(),
        other => anyhow::Error::new(other).context("Failed to build policy"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_roots_appended_to_file_roots() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("fsgate.toml");
        std::fs::write(&config_path, "allowed = [\"/from-file\"]\nread_timeout_secs = 2\n").unwrap();

        let args = PolicyArgs {
            config: Some(config_path),
            allow: vec![PathBuf::from("/from-cli")],
            deny: vec![PathBuf::from("/from-cli/private")],
            base_dir: None,
        };
        let config = args.load_config().unwrap();

        assert_eq!(
            config.allowed,
            vec![PathBuf::from("/from-file"), PathBuf::from("/from-cli")]
        );
        assert_eq!(config.denied, vec![PathBuf::from("/from-cli/private")]);
        assert_eq!(config.read_timeout_secs, 2);
    }

    #[test]
    fn test_no_roots_is_helpful_error() {
        let err = PolicyArgs::default().load_config().unwrap_err();
        let helpful = err.downcast_ref::<HelpfulError>().unwrap();
        assert!(helpful.message.contains("No allowed directories"));
    }

    #[test]
    fn test_bad_config_file() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("fsgate.toml");
        std::fs::write(&config_path, "allowed = 3").unwrap();

        let args = PolicyArgs {
            config: Some(config_path),
            ..PolicyArgs::default()
        };
        let err = args.load_config().unwrap_err();
        assert!(err.downcast_ref::<HelpfulError>().is_some());
    }
}
