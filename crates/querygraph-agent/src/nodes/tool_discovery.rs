use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use querygraph_core::error::Result;
use querygraph_core::traits::ToolRegistry;
use querygraph_core::types::{ToolDescriptor, ToolParameter};

use crate::action::Action;
use crate::context::{render_tool_summary, QueryContext};
use crate::graph::{Label, Node};

/// The in-process SQL generation capability, offered next to the
/// registry's tools.
pub fn create_query_sql_tool() -> ToolDescriptor {
    ToolDescriptor::new(
        Action::CREATE_QUERY_SQL,
        "Create a SQL query to answer the question",
        vec![
            ToolParameter::new("question", "string", true),
            ToolParameter::new("databaseSchema", "object", true),
        ],
    )
}

/// Lists the available tools and renders the action space for the
/// decide prompt.
///
/// A failing registry is not fatal: the run continues with the built-in
/// SQL generation tool only.
pub struct ToolDiscoveryNode {
    registry: Arc<dyn ToolRegistry>,
    source: String,
}

impl ToolDiscoveryNode {
    pub fn new(registry: Arc<dyn ToolRegistry>, source: impl Into<String>) -> Self {
        Self {
            registry,
            source: source.into(),
        }
    }
}

impl Node<QueryContext> for ToolDiscoveryNode {
    type Prepared = String;
    type Output = Vec<ToolDescriptor>;

    fn name(&self) -> &str {
        super::TOOL_DISCOVERY
    }

    fn prepare(&self, _ctx: &QueryContext) -> String {
        self.source.clone()
    }

    fn execute<'a>(&'a self, source: &'a String) -> BoxFuture<'a, Result<Vec<ToolDescriptor>>> {
        Box::pin(async move {
            let mut tools = match self.registry.list_tools().await {
                Ok(tools) => {
                    info!(source = %source, count = tools.len(), "Discovered tools");
                    tools
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "Tool discovery failed, continuing with built-in tools");
                    Vec::new()
                }
            };
            tools.retain(|t| t.name != Action::CREATE_QUERY_SQL);
            tools.push(create_query_sql_tool());
            Ok(tools)
        })
    }

    fn finalize(&self, ctx: &mut QueryContext, _source: String, tools: Vec<ToolDescriptor>) -> Label {
        ctx.tool_summary = Some(render_tool_summary(&tools));
        ctx.available_tools = tools;
        Label::from(super::TO_DECIDE)
    }
}
