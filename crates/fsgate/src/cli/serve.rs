//! MCP server launcher
//!
//! Builds the authorizer from the policy inputs, registers the filesystem
//! tools and serves JSON-RPC on stdio until the client closes stdin.

use super::{policy_error, PolicyArgs};
use anyhow::{Context, Result};
use clap::Args;
use fsgate_mcp::{
    create_default_registry, security::AuditLog, McpServer, McpServerConfig, PdfiumBackend,
    ToolContext,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Append an NDJSON audit record for every request, response and tool call
    #[arg(long, env = "FSGATE_AUDIT_LOG")]
    pub audit_log: Option<PathBuf>,

    /// Directory for the rolling log file (default: ~/.fsgate/logs)
    #[arg(long, conflicts_with = "no_log_file")]
    pub log_dir: Option<PathBuf>,

    /// Log to stderr only
    #[arg(long)]
    pub no_log_file: bool,
}

impl ServeArgs {
    /// Where the rolling log file goes, if anywhere
    pub fn log_dir(&self) -> Option<PathBuf> {
        if self.no_log_file {
            return None;
        }
        self.log_dir
            .clone()
            .or_else(|| fsgate_logging::logs_dir().ok())
    }
}

/// Run the MCP server
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = args.policy.load_config()?;
    if let Some(path) = args.audit_log {
        config.audit_log_path = Some(path);
    }

    let authorizer = config.build_authorizer().map_err(policy_error)?;
    info!(
        allowed = authorizer.policy().allowed().len(),
        denied = authorizer.policy().denied().len(),
        base_dir = %authorizer.canonicalizer().base_dir().display(),
        "Policy loaded"
    );

    let registry = create_default_registry(ToolContext {
        authorizer: Arc::new(authorizer),
        read_timeout: config.read_timeout(),
        pdf_backend: Arc::new(PdfiumBackend),
    });

    let mut server = McpServer::new(McpServerConfig::default(), registry);
    if let Some(path) = &config.audit_log_path {
        let audit = AuditLog::new(path.clone())
            .with_context(|| format!("Failed to open audit log: {}", path.display()))?;
        server = server.with_audit_log(audit);
    }

    info!(
        "MCP server starting via stdio ({} tools registered)",
        server.registry().len()
    );

    server.run().await
}
