//! MCP Tool Implementations
//!
//! Each tool is a thin handler over the `Authorizer`: it names the access
//! kind it needs, acts only on the canonical path it gets back, and turns the
//! bytes into content blocks. Tools are registered in the `ToolRegistry` and
//! dispatched by name.
//!
//! # Tools
//!
//! - **Policy**: list-allowed-directories, list-denied-directories
//! - **Read**: ls, read-file
//! - **Write**: write-file

mod directories;
mod ls;
mod read_file;
mod registry;
mod write_file;

pub use directories::{ListAllowedDirectoriesTool, ListDeniedDirectoriesTool};
pub use ls::{LsTool, LS_PAGE_SIZE};
pub use read_file::ReadFileTool;
pub use registry::ToolRegistry;
pub use write_file::WriteFileTool;

use crate::pdf::PdfBackend;
use crate::security::Authorizer;
use crate::types::ToolError;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Shared state every tool handler runs against
#[derive(Clone)]
pub struct ToolContext {
    pub authorizer: Arc<Authorizer>,
    /// Bound on a single read of file or directory contents
    pub read_timeout: Duration,
    pub pdf_backend: Arc<dyn PdfBackend>,
}

/// Registry with the five filesystem tools
pub fn create_default_registry(ctx: ToolContext) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ListAllowedDirectoriesTool::new(ctx.clone())));
    registry.register(Arc::new(ListDeniedDirectoriesTool::new(ctx.clone())));
    registry.register(Arc::new(LsTool::new(ctx.clone())));
    registry.register(Arc::new(ReadFileTool::new(ctx.clone())));
    registry.register(Arc::new(WriteFileTool::new(ctx)));
    registry
}

/// Required, non-empty string argument
pub(crate) fn require_str<'a>(args: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    match args.get(name) {
        None | Some(Value::Null) => Err(ToolError::MissingArgument(name.to_string())),
        Some(Value::String(s)) if s.is_empty() => Err(ToolError::MissingArgument(name.to_string())),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ToolError::InvalidParams(format!(
            "'{}' must be a string, got {}",
            name, other
        ))),
    }
}

/// Optional 1-based page number, default 1
pub(crate) fn optional_page(args: &Value) -> Result<usize, ToolError> {
    match args.get("page") {
        None | Some(Value::Null) => Ok(1),
        Some(value) => value
            .as_u64()
            .filter(|page| *page >= 1)
            .and_then(|page| usize::try_from(page).ok())
            .ok_or_else(|| {
                ToolError::InvalidParams(format!("'page' must be an integer >= 1, got {}", value))
            }),
    }
}
