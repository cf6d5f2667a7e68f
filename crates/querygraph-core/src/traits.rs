use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::ToolDescriptor;

/// Language-model collaborator: prompt parts in, reply text out.
///
/// A returned error is a hard failure of the call (transport, auth, quota).
/// Replies that arrive but do not match the expected shape are the caller's
/// concern and must not be reported through this error.
pub trait Reasoner: Send + Sync + 'static {
    fn generate(&self, prompt_parts: Vec<String>) -> BoxFuture<'_, Result<String>>;
}

/// Capability discovery.
pub trait ToolRegistry: Send + Sync + 'static {
    /// Enumerate available tools. An empty list is a valid answer;
    /// errors are reserved for transport-level failures.
    fn list_tools(&self) -> BoxFuture<'_, Result<Vec<ToolDescriptor>>>;
}

/// Capability invocation.
pub trait ToolInvoker: Send + Sync + 'static {
    fn call(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'_, Result<serde_json::Value>>;
}
