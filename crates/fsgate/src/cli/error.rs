//! Helpful error types for CLI commands
//!
//! Every error says what went wrong, where, and what to try next.

use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// Nothing to serve
    pub fn no_allowed_roots() -> Self {
        Self::new("No allowed directories configured")
            .with_context("With an empty allow-list every tool call would be refused")
            .with_suggestions([
                "TRY: Pass a directory: fsgate serve --allow ~/projects",
                "TRY: Set FSGATE_ALLOW=/path/one,/path/two",
                "TRY: Add `allowed = [\"/path\"]` to the config file",
            ])
    }

    /// Config file does not exist or cannot be read
    pub fn file_not_found(path: &Path) -> Self {
        Self::new(format!("Cannot read config file: {}", path.display()))
            .with_context("The config file given with --config could not be opened")
            .with_suggestions([
                format!("TRY: Check that the file exists: ls -la {}", path.display()),
                "TRY: Verify you have read permissions for this path".to_string(),
            ])
    }

    /// Config file is not valid TOML for this schema
    pub fn invalid_config(path: &Path, details: &str) -> Self {
        Self::new(format!("Invalid config file: {}", path.display()))
            .with_context(details.to_string())
            .with_suggestions([
                "TRY: Known keys: allowed, denied, base_dir, sniff_timeout_secs, read_timeout_secs, \
                 max_path_len, max_component_len, case_insensitive, path_grammar, audit_log_path",
                "TRY: Paths are TOML strings in arrays: allowed = [\"/data\"]",
            ])
    }

    /// A root failed validation
    pub fn invalid_policy(details: &str) -> Self {
        Self::new(format!("Invalid policy: {}", details))
            .with_context("Every allowed and denied root must be an existing directory, listed once")
            .with_suggestions([
                "TRY: Create the directory or remove it from the list",
                "TRY: Run `fsgate check` to validate the policy without serving",
            ])
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
