mod client;
mod handler;

pub use client::{tool_descriptor, tool_result_value, McpToolSource};
pub use handler::QueryGraphClientHandler;

use querygraph_core::config::AppConfig;
use querygraph_core::error::Result;

/// Build the tool source for the server named by `[agent].tool_server`.
pub fn tool_source_from_config(config: &AppConfig) -> Result<McpToolSource> {
    let server = config.tool_server_config()?;
    Ok(McpToolSource::new(&config.agent.tool_server, server))
}
