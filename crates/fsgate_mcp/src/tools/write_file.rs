//! write-file - Atomic Text Writes
//!
//! Content goes to a temp file in the target directory, is synced, and is
//! then renamed over the target. A dropped call leaves the target untouched.

use super::{require_str, ToolContext};
use crate::security::{classify, AccessKind, SecurityError};
use crate::types::{Tool, ToolError, ToolInputSchema, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub struct WriteFileTool {
    ctx: ToolContext,
}

impl WriteFileTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    /// Existing files must pass the full file check; anything missing falls
    /// back to the new-file check on its parent directory.
    async fn resolve_target(&self, raw: &str) -> Result<PathBuf, SecurityError> {
        match self.ctx.authorizer.authorize(raw, AccessKind::File).await {
            Ok(authorized) => Ok(authorized.path.into_path_buf()),
            Err(SecurityError::NotFound { .. }) => self
                .ctx
                .authorizer
                .authorize_new_file(raw)
                .await
                .map(|target| target.path),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write-file"
    }

    fn description(&self) -> &str {
        "Create a new file or overwrite an existing one with text content. \
         The parent directory must already exist."
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::with_properties(
            json!({
                "path": {
                    "type": "string",
                    "description": "File to write"
                },
                "content": {
                    "type": "string",
                    "description": "Text to write"
                }
            }),
            vec!["path".to_string(), "content".to_string()],
        )
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let raw = require_str(&args, "path")?;
        let content = require_str(&args, "content")?;

        let sniff = classify(content.as_bytes());
        if !sniff.is_permitted() {
            return Err(sniff.into_error(Path::new(raw)).into());
        }

        let target = self.resolve_target(raw).await?;
        let data = content.to_owned();
        let dest = target.clone();
        tokio::task::spawn_blocking(move || write_atomic(&dest, data.as_bytes()))
            .await
            .map_err(|e| ToolError::Internal(format!("write task failed: {}", e)))??;

        let chars = content.chars().count();
        info!(path = %target.display(), bytes = content.len(), "File written");
        Ok(ToolResult::text(format!(
            "Successfully wrote {} characters ({} bytes) to {}",
            chars,
            content.len(),
            raw
        )))
    }
}

fn write_atomic(target: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = target.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "target has no parent directory")
    })?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;

    if let Ok(meta) = std::fs::metadata(target) {
        temp.as_file().set_permissions(meta.permissions())?;
    }

    temp.persist(target).map_err(|e| e.error)?;
    debug!(path = %target.display(), "Temp file persisted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces_content() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("a.txt");
        std::fs::write(&target, "old content that is longer").unwrap();

        write_atomic(&target, b"new").unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
        let leftovers = std::fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let target = temp.path().join("script.sh");
        std::fs::write(&target, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o750)).unwrap();

        write_atomic(&target, b"#!/bin/sh\necho hi\n").unwrap();

        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }
}
