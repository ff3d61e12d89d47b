//! list-allowed-directories / list-denied-directories
//!
//! Report the configured roots as written in the configuration. Neither tool
//! takes arguments and neither can fail.

use super::ToolContext;
use crate::types::{Tool, ToolContent, ToolError, ToolInputSchema, ToolResult};
use async_trait::async_trait;
use serde_json::Value;

pub struct ListAllowedDirectoriesTool {
    ctx: ToolContext,
}

impl ListAllowedDirectoriesTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ListAllowedDirectoriesTool {
    fn name(&self) -> &str {
        "list-allowed-directories"
    }

    fn description(&self) -> &str {
        "List the directories this server is allowed to access. \
         Paths inside denied directories remain inaccessible."
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::new()
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult, ToolError> {
        let content = self
            .ctx
            .authorizer
            .policy()
            .allowed()
            .iter()
            .map(|root| ToolContent::text(format!("Allowed path: {}", root.display())))
            .collect();
        Ok(ToolResult::new(content))
    }
}

pub struct ListDeniedDirectoriesTool {
    ctx: ToolContext,
}

impl ListDeniedDirectoriesTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ListDeniedDirectoriesTool {
    fn name(&self) -> &str {
        "list-denied-directories"
    }

    fn description(&self) -> &str {
        "List the directories this server may never access, even when they \
         sit inside an allowed directory."
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::new()
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult, ToolError> {
        let denied = self.ctx.authorizer.policy().denied();
        if denied.is_empty() {
            return Ok(ToolResult::text("No denied paths."));
        }

        let content = denied
            .iter()
            .map(|root| ToolContent::text(format!("Denied path: {}", root.display())))
            .collect();
        Ok(ToolResult::new(content))
    }
}
