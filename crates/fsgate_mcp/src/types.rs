//! Core types for the MCP server
//!
//! The Tool trait, its result/content types and the tool error taxonomy.

use crate::pdf::CodecError;
use crate::security::SecurityError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Tool Error Types
// =============================================================================

/// Errors that can occur during tool execution
#[derive(Debug, Error)]
pub enum ToolError {
    /// A required argument was absent or empty
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    /// Argument present but of the wrong shape
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Path authorization or bounded read failed
    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// PDF decode, render or encode failed
    #[error("PDF conversion failed: {0}")]
    Codec(#[from] CodecError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Payload would exceed the result cap; carries its size in bytes
    #[error("Result too large: {0} bytes")]
    ResultTooLarge(usize),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Stable string code for logs and the audit trail
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::MissingArgument(_) => "MISSING_ARGUMENT",
            ToolError::InvalidParams(_) => "INVALID_PARAMS",
            ToolError::Security(e) => e.code(),
            ToolError::UnknownTool(_) => "UNKNOWN_TOOL",
            ToolError::Codec(_) => "CODEC_ERROR",
            ToolError::Internal(_) => "INTERNAL",
            ToolError::ResultTooLarge(_) => "SIZE_EXCEEDED",
            ToolError::Io(_) => "IO",
        }
    }
}

// =============================================================================
// Tool Trait
// =============================================================================

/// JSON Schema for tool input parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    /// Schema type (always "object" for MCP tools)
    #[serde(rename = "type")]
    pub schema_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl ToolInputSchema {
    /// Schema for a tool that takes no arguments
    pub fn new() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: Some(serde_json::json!({})),
            required: None,
        }
    }

    /// Create a schema with properties
    pub fn with_properties(properties: serde_json::Value, required: Vec<String>) -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: Some(properties),
            required: if required.is_empty() {
                None
            } else {
                Some(required)
            },
        }
    }
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Content blocks returned by the tool
    pub content: Vec<ToolContent>,

    /// Whether this result indicates an error
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result from several content blocks
    pub fn new(content: Vec<ToolContent>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Create a successful text result
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![ToolContent::text(text)])
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(message)],
            is_error: true,
        }
    }
}

/// Content types that can be returned by tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content
    Text { text: String },

    /// Image content (base64 encoded)
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        ToolContent::Text { text: text.into() }
    }

    /// Base64-encode raw image bytes
    pub fn image(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        ToolContent::Image {
            data: STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Text of a text block, `None` for images
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolContent::Text { text } => Some(text),
            ToolContent::Image { .. } => None,
        }
    }
}

/// Trait for implementing MCP tools
///
/// Each tool must provide:
/// - A unique name
/// - A description the client shows to the model
/// - An input schema defining expected parameters
/// - An async execute method that performs the tool's action
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of the tool
    fn name(&self) -> &str;

    /// Human-readable description of what the tool does
    fn description(&self) -> &str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> ToolInputSchema;

    /// Execute the tool with the given arguments
    ///
    /// # Arguments
    /// * `args` - JSON object containing tool parameters
    ///
    /// # Returns
    /// * `Ok(ToolResult)` - Tool execution result
    /// * `Err(ToolError)` - Error during execution
    async fn execute(&self, args: serde_json::Value) -> Result<ToolResult, ToolError>;
}

// =============================================================================
// Tests
// =============================================================================
