//! read-file - Text, Image and PDF Reads
//!
//! The bytes returned are classified again after the read, so the content
//! always matches a class that passed the sniffer even if the file changed
//! after authorization. Text and image reads whose payload would exceed the
//! result cap are refused from metadata alone, before the second read.

use super::{require_str, ToolContext};
use crate::pdf::pdf_to_contents;
use crate::security::{
    bounded, classify, read_file_bounded, AccessKind, ContentClass, SecurityError,
    MAX_RESULT_BYTES,
};
use crate::types::{Tool, ToolContent, ToolError, ToolInputSchema, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const OPEN_TAG: &str = "<fileContent>";
const CLOSE_TAG: &str = "</fileContent>";

pub struct ReadFileTool {
    ctx: ToolContext,
}

impl ReadFileTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read-file"
    }

    fn description(&self) -> &str {
        "Read a file. Text is returned inside <fileContent> tags, images as \
         image content, and PDFs as one image plus extracted text per page \
         (text only for PDFs over 100 pages)."
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::with_properties(
            json!({
                "path": {
                    "type": "string",
                    "description": "File to read"
                }
            }),
            vec!["path".to_string()],
        )
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let raw = require_str(&args, "path")?;

        let authorized = self.ctx.authorizer.authorize(raw, AccessKind::File).await?;
        let path = authorized.path.as_path();

        if let Some(class) = authorized.sniff.as_ref().map(|sniff| sniff.class) {
            let size = payload_size(path, class, self.ctx.read_timeout).await?;
            if size > MAX_RESULT_BYTES {
                debug!(path = %path.display(), size, "Read refused before loading");
                return Err(ToolError::ResultTooLarge(size));
            }
        }

        let bytes = read_file_bounded(path, self.ctx.read_timeout).await?;

        let sniff = classify(&bytes);
        if !sniff.is_permitted() {
            return Err(sniff.into_error(path).into());
        }
        debug!(path = %path.display(), mime_type = %sniff.mime_type, bytes = bytes.len(), "File read");

        match sniff.class {
            ContentClass::Text if bytes.is_empty() => Ok(ToolResult::text("File is empty")),
            ContentClass::Text => {
                let text = String::from_utf8(bytes)
                    .map_err(|e| ToolError::Internal(format!("text changed class: {}", e)))?;
                Ok(ToolResult::text(format!("{}{}{}", OPEN_TAG, text, CLOSE_TAG)))
            }
            ContentClass::Image => Ok(ToolResult::new(vec![ToolContent::image(
                &bytes,
                sniff.mime_type,
            )])),
            ContentClass::Pdf => {
                let contents = pdf_to_contents(Arc::clone(&self.ctx.pdf_backend), bytes).await?;
                Ok(ToolResult::new(contents))
            }
            ContentClass::Other => Err(sniff.into_error(path).into()),
        }
    }
}

/// Bytes a text or image read would put in the result. PDFs render to a
/// size the file length says nothing about, so they count as zero.
async fn payload_size(
    path: &Path,
    class: ContentClass,
    timeout: Duration,
) -> Result<usize, SecurityError> {
    if !matches!(class, ContentClass::Text | ContentClass::Image) {
        return Ok(0);
    }

    let meta = bounded(path, timeout, async {
        tokio::fs::metadata(path)
            .await
            .map_err(|source| SecurityError::Unreadable {
                path: path.to_path_buf(),
                source,
            })
    })
    .await?;

    let len = meta.len() as usize;
    Ok(match class {
        ContentClass::Text if len > 0 => len + OPEN_TAG.len() + CLOSE_TAG.len(),
        _ => len,
    })
}
