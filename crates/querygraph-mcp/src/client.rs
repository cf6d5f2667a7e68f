use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use rmcp::model::{CallToolRequestParams, CallToolResult, Tool as McpTool};
use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use rmcp::{RoleClient, ServiceExt};

use querygraph_core::config::{McpServerConfig, McpTransport};
use querygraph_core::error::{QueryGraphError, Result};
use querygraph_core::traits::{ToolInvoker, ToolRegistry};
use querygraph_core::types::ToolDescriptor;

use crate::handler::QueryGraphClientHandler;

type McpConnection = RunningService<RoleClient, QueryGraphClientHandler>;

/// One MCP server exposed as a tool registry and invoker.
///
/// No connection is kept between calls: every `list_tools` or `call`
/// connects, performs one request and closes the session again.
pub struct McpToolSource {
    server_name: String,
    config: McpServerConfig,
}

impl McpToolSource {
    pub fn new(server_name: &str, config: McpServerConfig) -> Self {
        Self {
            server_name: server_name.to_string(),
            config,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    async fn connect(&self) -> Result<McpConnection> {
        let name = &self.server_name;
        let handler = QueryGraphClientHandler::new(name);

        let client = match &self.config.transport {
            McpTransport::Stdio { command, args, env } => {
                let mut cmd = tokio::process::Command::new(command);
                cmd.args(args);
                for (k, v) in env {
                    cmd.env(k, v);
                }

                let transport = rmcp::transport::TokioChildProcess::new(cmd).map_err(|e| {
                    QueryGraphError::Mcp(format!("Failed to spawn {}: {}", command, e))
                })?;

                handler.serve(transport).await.map_err(|e| {
                    QueryGraphError::Mcp(format!(
                        "Failed to initialize MCP client for {}: {}",
                        name, e
                    ))
                })?
            }
            McpTransport::Http { url } => {
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());

                <QueryGraphClientHandler as ServiceExt<RoleClient>>::serve(handler, transport)
                    .await
                    .map_err(|e| {
                        QueryGraphError::Mcp(format!("MCP init for '{}' failed: {}", name, e))
                    })?
            }
        };

        debug!(server = %name, "MCP session opened");
        Ok(client)
    }

    /// Open a session, bounded by the server timeout.
    async fn open(&self) -> Result<McpConnection> {
        tokio::time::timeout(self.timeout(), self.connect())
            .await
            .map_err(|_| {
                QueryGraphError::Mcp(format!(
                    "Connecting to '{}' timed out after {}s",
                    self.server_name, self.config.timeout_secs
                ))
            })?
    }

    /// Await one request, bounded by the server timeout.
    async fn bounded<T>(&self, what: &str, request: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout(), request).await {
            Ok(result) => result,
            Err(_) => Err(QueryGraphError::Mcp(format!(
                "{} on '{}' timed out after {}s",
                what, self.server_name, self.config.timeout_secs
            ))),
        }
    }

    async fn close(&self, mut client: McpConnection) {
        if let Err(e) = client.close().await {
            warn!(server = %self.server_name, error = %e, "Failed to close MCP session");
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }
}

impl ToolRegistry for McpToolSource {
    fn list_tools(&self) -> BoxFuture<'_, Result<Vec<ToolDescriptor>>> {
        Box::pin(async move {
            let client = self.open().await?;
            let tools = self
                .bounded("tools/list", async {
                    client.list_all_tools().await.map_err(|e| {
                        QueryGraphError::Mcp(format!(
                            "Failed to list tools from '{}': {}",
                            self.server_name, e
                        ))
                    })
                })
                .await;
            self.close(client).await;
            let tools = tools?;

            info!(server = %self.server_name, count = tools.len(), "Listed MCP tools");
            Ok(tools.iter().map(tool_descriptor).collect())
        })
    }
}

impl ToolInvoker for McpToolSource {
    fn call(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        let tool_name = name.to_string();
        Box::pin(async move {
            let params = CallToolRequestParams {
                name: tool_name.clone().into(),
                arguments: Some(arguments),
                meta: None,
                task: None,
            };

            let client = self.open().await?;
            let result = self
                .bounded("tools/call", async {
                    client.call_tool(params).await.map_err(|e| {
                        QueryGraphError::Mcp(format!(
                            "Tool call '{}.{}' failed: {}",
                            self.server_name, tool_name, e
                        ))
                    })
                })
                .await;
            self.close(client).await;
            let result = result?;

            debug!(server = %self.server_name, tool = %tool_name, "MCP tool call returned");
            tool_result_value(&tool_name, &result)
        })
    }
}

/// Convert an MCP tool listing entry into a descriptor.
pub fn tool_descriptor(tool: &McpTool) -> ToolDescriptor {
    let raw = serde_json::to_value(tool).unwrap_or_default();
    let name = raw.get("name").and_then(|v| v.as_str()).unwrap_or("Unknown");
    let description = raw
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("No description");
    let schema = raw
        .get("inputSchema")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    ToolDescriptor::from_input_schema(name, description, &schema)
}

/// Flatten a tool result to a string value. A result flagged as an error
/// becomes a `ToolExecution` error carrying the same text.
pub fn tool_result_value(tool: &str, result: &CallToolResult) -> Result<serde_json::Value> {
    let content: Vec<String> = result
        .content
        .iter()
        .map(|c| match c.raw {
            rmcp::model::RawContent::Text(ref t) => t.text.to_string(),
            _ => format!("{:?}", c.raw),
        })
        .collect();
    let text = content.join("\n");

    if result.is_error == Some(true) {
        return Err(QueryGraphError::ToolExecution {
            tool: tool.to_string(),
            message: text,
        });
    }
    Ok(serde_json::Value::String(text))
}
