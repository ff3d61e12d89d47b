//! Audit Logging - Tool Invocation Recording
//!
//! Records MCP requests, responses and tool calls for later review.
//! Logs are written to a file in append-only mode.
//!
//! # Log Format
//!
//! Each line is a JSON object:
//! ```json
//! {"type":"request","ts":"2026-01-21T10:30:00Z","method":"tools/call","id":"7","params_summary":"{keys: [name, arguments]}"}
//! {"type":"tool_call","ts":"2026-01-21T10:30:01Z","tool":"read-file","success":false,"duration_ms":3,"error_code":"INSIDE_DENIED"}
//! ```
//!
//! Parameter values (paths, file content) are never recorded.

use super::SecurityError;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, RequestId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Audit log for recording MCP operations
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl AuditLog {
    /// Open (or create) the audit log at `path`
    pub fn new(path: PathBuf) -> Result<Self, SecurityError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SecurityError::AuditError(format!("Failed to create audit log directory: {}", e))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SecurityError::AuditError(format!("Failed to open audit log: {}", e)))?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn log_request(&self, request: &JsonRpcRequest) -> Result<(), SecurityError> {
        self.write_entry(&AuditEntry::Request {
            ts: Utc::now(),
            method: request.method.clone(),
            id: request.id.as_ref().map(|id| id.to_string()),
            params_summary: request.params.as_ref().map(summarize_params),
        })
    }

    pub fn log_response(&self, response: &JsonRpcResponse) -> Result<(), SecurityError> {
        self.write_entry(&AuditEntry::Response {
            ts: Utc::now(),
            id: match &response.id {
                RequestId::Null => None,
                id => Some(id.to_string()),
            },
            success: response.error.is_none(),
            error_code: response.error.as_ref().map(|e| e.code),
        })
    }

    /// Log a finished tool call. `error_code` is the tool error's string code.
    pub fn log_tool_call(
        &self,
        tool_name: &str,
        success: bool,
        duration_ms: u64,
        error_code: Option<&str>,
    ) -> Result<(), SecurityError> {
        self.write_entry(&AuditEntry::ToolCall {
            ts: Utc::now(),
            tool: tool_name.to_string(),
            success,
            duration_ms,
            error_code: error_code.map(str::to_string),
        })
    }

    fn write_entry(&self, entry: &AuditEntry) -> Result<(), SecurityError> {
        let json = serde_json::to_string(entry).map_err(|e| {
            SecurityError::AuditError(format!("Failed to serialize audit entry: {}", e))
        })?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SecurityError::AuditError(format!("Failed to lock audit log: {}", e)))?;

        writeln!(writer, "{}", json).map_err(|e| {
            SecurityError::AuditError(format!("Failed to write audit entry: {}", e))
        })?;

        writer
            .flush()
            .map_err(|e| SecurityError::AuditError(format!("Failed to flush audit log: {}", e)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AuditEntry {
    Request {
        ts: DateTime<Utc>,
        method: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        params_summary: Option<String>,
    },
    Response {
        ts: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<i32>,
    },
    ToolCall {
        ts: DateTime<Utc>,
        tool: String,
        success: bool,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
    },
}

/// Keys only; values may hold paths or file content
fn summarize_params(params: &serde_json::Value) -> String {
    match params {
        serde_json::Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
            format!("{{keys: [{}]}}", keys.join(", "))
        }
        serde_json::Value::Array(arr) => format!("[{} items]", arr.len()),
        _ => "[value]".to_string(),
    }
}
