//! MCP Server Implementation
//!
//! JSON-RPC 2.0 server over stdio for the Model Context Protocol.
//!
//! # Architecture
//!
//! One reader loop parses requests in arrival order. Protocol methods are
//! answered inline; each `tools/call` runs as its own task so a slow read
//! never blocks the loop. Every response goes through a single writer task,
//! which keeps output lines whole.
//!
//! ```text
//! stdin ─► reader loop ─┬─► inline (initialize, ping, tools/list) ──┐
//!                       └─► JoinSet: tool call ─► result guard ─────┴─► mpsc ─► writer ─► stdout
//! ```
//!
//! A `notifications/cancelled` for an in-flight call fires its
//! `CancellationToken`; the call future is dropped and no response is sent.
//!
//! # Example
//!
//! ```ignore
//! let registry = create_default_registry(ctx);
//! McpServer::new(McpServerConfig::default(), registry).run().await?;
//! ```

use crate::protocol::{
    self, methods, CancelledParams, Inbound, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, McpReader, McpWriter, RequestId, ServerCapabilities,
    ServerInfo, ToolsCallParams, ToolsCapability, ToolsListResult, MCP_PROTOCOL_VERSION,
};
use crate::security::{AuditLog, ResultGuard};
use crate::tools::ToolRegistry;
use crate::types::{ToolError, ToolResult};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

const JSONRPC_VERSION: &str = "2.0";

/// Responses queued for the writer task
const OUTBOUND_QUEUE_DEPTH: usize = 64;

type InFlight = Arc<Mutex<HashMap<RequestId, CancellationToken>>>;

/// MCP Server configuration
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Server name (reported in initialize)
    pub server_name: String,

    /// Server version (reported in initialize)
    pub server_version: String,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            server_name: "fsgate".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// MCP Server
pub struct McpServer {
    config: McpServerConfig,
    registry: Arc<ToolRegistry>,
    guard: ResultGuard,
    audit: Option<Arc<AuditLog>>,
    initialized: bool,
}

impl McpServer {
    pub fn new(config: McpServerConfig, registry: ToolRegistry) -> Self {
        info!(tools = registry.len(), "MCP server created");
        Self {
            config,
            registry: Arc::new(registry),
            guard: ResultGuard::new(),
            audit: None,
            initialized: false,
        }
    }

    /// Record requests, responses and tool calls to `audit`
    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        info!(path = %audit.path().display(), "Audit log enabled");
        self.audit = Some(Arc::new(audit));
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Serve on stdin/stdout until stdin closes
    pub async fn run(self) -> Result<()> {
        let (reader, writer) = protocol::stdio();
        self.serve(reader, writer).await
    }

    /// Serve on any line-oriented reader/writer pair until the reader hits EOF.
    ///
    /// In-flight tool calls are allowed to finish and their responses are
    /// flushed before this returns.
    pub async fn serve<R, W>(mut self, mut reader: McpReader<R>, writer: McpWriter<W>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let writer_task = tokio::spawn(write_loop(writer, rx, self.audit.clone()));
        let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));
        let mut calls = JoinSet::new();

        info!("MCP server starting");

        while let Some(inbound) = reader.next().await.context("Failed to read request")? {
            while let Some(finished) = calls.try_join_next() {
                log_join_error(finished);
            }

            let request = match inbound {
                Inbound::Request(request) => request,
                Inbound::Invalid(reason) => {
                    let response = JsonRpcResponse::error(
                        RequestId::Null,
                        JsonRpcError::parse_error(format!("Invalid JSON: {}", reason)),
                    );
                    send(&tx, response).await?;
                    continue;
                }
            };

            if let Some(audit) = &self.audit {
                if let Err(e) = audit.log_request(&request) {
                    warn!(error = %e, "Failed to audit request");
                }
            }

            match request.method.as_str() {
                methods::TOOLS_CALL
                    if self.initialized
                        && request.id.is_some()
                        && request.jsonrpc == JSONRPC_VERSION =>
                {
                    self.spawn_tool_call(request, &mut calls, &in_flight, &tx)
                        .await?;
                }
                methods::CANCELLED => cancel_call(request, &in_flight).await,
                _ => {
                    if let Some(response) = self.handle_request(request) {
                        send(&tx, response).await?;
                    }
                }
            }
        }

        info!(in_flight = calls.len(), "Input closed, draining tool calls");
        while let Some(finished) = calls.join_next().await {
            log_join_error(finished);
        }

        drop(tx);
        writer_task
            .await
            .context("Writer task panicked")?
            .context("Failed to write response")?;

        info!("MCP server shutting down");
        Ok(())
    }

    /// Answer a request inline. `None` for notifications.
    fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone();

        let response = if request.jsonrpc != JSONRPC_VERSION {
            JsonRpcResponse::error(
                id.clone().unwrap_or_default(),
                JsonRpcError::invalid_request(format!(
                    "Invalid JSON-RPC version: {}",
                    request.jsonrpc
                )),
            )
        } else {
            match request.method.as_str() {
                methods::INITIALIZE => self.handle_initialize(request),
                methods::INITIALIZED => {
                    debug!("Client initialized");
                    JsonRpcResponse::success(request.id.unwrap_or_default(), Value::Null)
                }
                methods::PING => JsonRpcResponse::success(
                    request.id.unwrap_or_default(),
                    Value::Object(Default::default()),
                ),
                methods::TOOLS_LIST => self.handle_tools_list(request),
                methods::TOOLS_CALL if request.id.is_none() => {
                    warn!("Ignoring tools/call sent as a notification");
                    JsonRpcResponse::error(RequestId::Null, JsonRpcError::invalid_request("missing id"))
                }
                methods::TOOLS_CALL => {
                    warn!("tools/call before initialize");
                    JsonRpcResponse::error(
                        request.id.unwrap_or_default(),
                        JsonRpcError::not_initialized(),
                    )
                }
                _ => {
                    warn!(method = %request.method, "Unknown method");
                    JsonRpcResponse::error(
                        request.id.unwrap_or_default(),
                        JsonRpcError::method_not_found(&request.method),
                    )
                }
            }
        };

        // Notifications never get a reply
        id.map(|_| response)
    }

    fn handle_initialize(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.unwrap_or_default();

        if let Some(params) = request.params {
            match serde_json::from_value::<InitializeParams>(params) {
                Ok(params) => {
                    let client = params
                        .client_info
                        .map(|c| format!("{} v{}", c.name, c.version))
                        .unwrap_or_else(|| "unknown client".to_string());
                    info!(
                        "Initialize from {} (protocol {})",
                        client, params.protocol_version
                    );
                }
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_params(format!("Invalid initialize params: {}", e)),
                    )
                }
            }
        }

        self.initialized = true;

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: self.config.server_name.clone(),
                version: self.config.server_version.clone(),
            },
        };

        to_response(id, &result)
    }

    fn handle_tools_list(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = ToolsListResult {
            tools: self.registry.definitions(),
        };
        to_response(request.id.unwrap_or_default(), &result)
    }

    async fn spawn_tool_call(
        &self,
        request: JsonRpcRequest,
        calls: &mut JoinSet<()>,
        in_flight: &InFlight,
        tx: &mpsc::Sender<JsonRpcResponse>,
    ) -> Result<()> {
        let id = request.id.unwrap_or_default();

        let params = match request.params.map(serde_json::from_value::<ToolsCallParams>) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                let error =
                    JsonRpcError::invalid_params(format!("Invalid tool call params: {}", e));
                return send(tx, JsonRpcResponse::error(id, error)).await;
            }
            None => {
                let error = JsonRpcError::invalid_params("Missing tool call params");
                return send(tx, JsonRpcResponse::error(id, error)).await;
            }
        };

        let token = CancellationToken::new();
        in_flight.lock().await.insert(id.clone(), token.clone());

        let registry = Arc::clone(&self.registry);
        let guard = self.guard.clone();
        let audit = self.audit.clone();
        let in_flight = Arc::clone(in_flight);
        let tx = tx.clone();

        calls.spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => None,
                result = dispatch_tool_call(&registry, &guard, audit.as_deref(), params) => Some(result),
            };
            in_flight.lock().await.remove(&id);

            match outcome {
                Some(result) => {
                    if tx.send(to_response(id, &result)).await.is_err() {
                        warn!("Output closed before tool result was sent");
                    }
                }
                None => info!(id = %id, "Tool call cancelled"),
            }
        });

        Ok(())
    }
}

/// Run one tool call: execute, cap the result, log and audit it.
///
/// Tool errors become `isError` text results; this never fails.
async fn dispatch_tool_call(
    registry: &ToolRegistry,
    guard: &ResultGuard,
    audit: Option<&AuditLog>,
    params: ToolsCallParams,
) -> ToolResult {
    let span = info_span!("tool_call", tool = %params.name);

    async move {
        let start = Instant::now();
        info!("Tool call started");

        let (result, mut error_code) = match registry.call(&params.name, params.arguments.clone()).await {
            Ok(result) => (result, None),
            Err(ToolError::ResultTooLarge(size)) => {
                warn!(size, max = guard.max_bytes(), "Tool result too large");
                let notice = guard.notice(&params.name, &params.arguments, size);
                (ToolResult::error(notice), Some("SIZE_EXCEEDED"))
            }
            Err(e) => {
                match &e {
                    ToolError::Io(_) | ToolError::Internal(_) | ToolError::Codec(_) => {
                        error!(error = %e, code = e.code(), "Tool call failed")
                    }
                    _ => warn!(error = %e, code = e.code(), "Tool call rejected"),
                }
                (ToolResult::error(format!("Error: {}", e)), Some(e.code()))
            }
        };

        let (content, replaced) = guard.guard(&params.name, &params.arguments, result.content);
        if replaced {
            error_code = Some("SIZE_EXCEEDED");
        }
        let result = ToolResult {
            content,
            is_error: result.is_error || replaced,
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(duration_ms, success = !result.is_error, "Tool call finished");

        if let Some(audit) = audit {
            if let Err(e) = audit.log_tool_call(&params.name, !result.is_error, duration_ms, error_code) {
                warn!(error = %e, "Failed to audit tool call");
            }
        }

        result
    }
    .instrument(span)
    .await
}

async fn cancel_call(request: JsonRpcRequest, in_flight: &InFlight) {
    let params = match request.params.map(serde_json::from_value::<CancelledParams>) {
        Some(Ok(params)) => params,
        _ => {
            warn!("Ignoring malformed cancellation");
            return;
        }
    };

    match in_flight.lock().await.get(&params.request_id) {
        Some(token) => {
            info!(
                id = %params.request_id,
                reason = params.reason.as_deref().unwrap_or("none"),
                "Cancelling tool call"
            );
            token.cancel();
        }
        None => debug!(id = %params.request_id, "Cancellation for unknown or finished request"),
    }
}

async fn write_loop<W>(
    mut writer: McpWriter<W>,
    mut rx: mpsc::Receiver<JsonRpcResponse>,
    audit: Option<Arc<AuditLog>>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        if let Some(audit) = &audit {
            if let Err(e) = audit.log_response(&response) {
                warn!(error = %e, "Failed to audit response");
            }
        }
        writer.write_response(&response).await?;
    }
    Ok(())
}

async fn send(tx: &mpsc::Sender<JsonRpcResponse>, response: JsonRpcResponse) -> Result<()> {
    tx.send(response)
        .await
        .map_err(|_| anyhow!("Output closed, response dropped"))
}

fn to_response<T: serde::Serialize>(id: RequestId, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            JsonRpcResponse::error(
                id,
                JsonRpcError::internal_error("Failed to serialize response"),
            )
        }
    }
}

fn log_join_error(finished: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = finished {
        error!(error = %e, "Tool call task panicked");
    }
}
