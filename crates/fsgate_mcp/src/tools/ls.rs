//! ls - Paginated Directory Listing

use super::{optional_page, require_str, ToolContext};
use crate::security::{bounded, AccessKind, SecurityError};
use crate::types::{Tool, ToolContent, ToolError, ToolInputSchema, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, MAIN_SEPARATOR};
use std::time::Duration;
use tracing::debug;

/// Entries per page
pub const LS_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    is_dir: bool,
}

impl Entry {
    fn display(&self) -> String {
        if self.is_dir {
            format!("{}{}", self.name, MAIN_SEPARATOR)
        } else {
            self.name.clone()
        }
    }
}

pub struct LsTool {
    ctx: ToolContext,
}

impl LsTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "List the contents of a directory, directories first. \
         Results are paginated with 50 entries per page."
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::with_properties(
            json!({
                "path": {
                    "type": "string",
                    "description": "Directory to list"
                },
                "page": {
                    "type": "integer",
                    "minimum": 1,
                    "default": 1,
                    "description": "1-based page number"
                }
            }),
            vec!["path".to_string()],
        )
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let raw = require_str(&args, "path")?;
        let page = optional_page(&args)?;

        let authorized = self.ctx.authorizer.authorize(raw, AccessKind::Directory).await?;
        let mut entries = read_entries(authorized.path.as_path(), self.ctx.read_timeout).await?;
        sort_entries(&mut entries);

        let total = entries.len();
        let total_pages = total.div_ceil(LS_PAGE_SIZE).max(1);
        debug!(path = %authorized.path, total, page, "Directory listed");

        let mut content = vec![ToolContent::text(format!(
            "Total items: {} (Page {} of {})",
            total, page, total_pages
        ))];
        content.extend(
            entries
                .iter()
                .skip((page - 1).saturating_mul(LS_PAGE_SIZE))
                .take(LS_PAGE_SIZE)
                .map(|entry| ToolContent::text(entry.display())),
        );

        Ok(ToolResult::new(content))
    }
}

async fn read_entries(dir: &Path, timeout: Duration) -> Result<Vec<Entry>, SecurityError> {
    let unreadable = |source: std::io::Error| SecurityError::Unreadable {
        path: dir.to_path_buf(),
        source,
    };

    let listing = async {
        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(dir).await.map_err(unreadable)?;
        while let Some(entry) = reader.next_entry().await.map_err(unreadable)? {
            let file_type = entry.file_type().await.map_err(unreadable)?;
            let is_dir = if file_type.is_symlink() {
                // Listing only; a broken link shows up as a plain entry
                tokio::fs::metadata(entry.path())
                    .await
                    .map(|meta| meta.is_dir())
                    .unwrap_or(false)
            } else {
                file_type.is_dir()
            };
            entries.push(Entry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }
        Ok::<_, SecurityError>(entries)
    };

    bounded(dir, timeout, listing).await
}

/// Directories first, then case-insensitive name, then exact name
fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.name.cmp(&b.name))
    });
}
