//! MCP (Model Context Protocol) Server for a Policy-Constrained Filesystem
//!
//! Exposes directory listing, file reads (text, images, PDFs rendered to
//! images) and file writes to an AI assistant, restricted to an allow-list
//! of directories minus a deny-list.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        MCP client                                │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               │ MCP Protocol (JSON-RPC over stdio)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    crates/fsgate_mcp/                            │
//! │                                                                  │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │  Server       │ JSON-RPC stdio, concurrent tool dispatch │   │
//! │  │  Tools        │ ls, read-file, write-file, list-*        │   │
//! │  │  PDF          │ page rasterization, WebP encoding        │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! │                               │                                  │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │  Security     │ canonicalizer, authorizer, sniffer,      │   │
//! │  │               │ result guard, audit log                  │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! 1. **Resolve once:** a raw path string is canonicalized exactly once per
//!    call; handlers act on the canonical path the authorizer returns.
//!
//! 2. **Deny wins:** a path under any denied root is refused regardless of
//!    which allowed root also contains it.
//!
//! 3. **Fail closed:** missing targets, vanished roots, unknown content and
//!    timeouts are all refusals.
//!
//! 4. **Errors are replies:** tool failures become `isError` results; the
//!    server loop never stops on one.

pub mod config;
pub mod pdf;
pub mod protocol;
pub mod security;
pub mod server;
pub mod tools;
pub mod types;

// Re-exports for convenience
pub use config::{ConfigError, ServerConfig};
pub use pdf::{PdfBackend, PdfiumBackend};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use security::{AccessKind, Authorizer, PolicyStore, SecurityError};
pub use server::{McpServer, McpServerConfig};
pub use tools::{create_default_registry, ToolContext, ToolRegistry};
pub use types::{Tool, ToolContent, ToolError, ToolResult};
