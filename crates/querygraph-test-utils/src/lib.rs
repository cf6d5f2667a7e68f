//! Shared test fakes for querygraph crates.
//!
//! `ScriptedReasoner` answers prompts from a script keyed by a marker that
//! appears in the prompt text; `StubTools` is an in-memory tool registry and
//! invoker with per-tool canned results.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use futures::future::BoxFuture;

use querygraph_core::error::{QueryGraphError, Result};
use querygraph_core::traits::{Reasoner, ToolInvoker, ToolRegistry};
use querygraph_core::types::ToolDescriptor;

enum Reply {
    Text(String),
    Fail(String),
}

struct Rule {
    marker: String,
    replies: VecDeque<Reply>,
}

/// A `Reasoner` driven by a script.
///
/// Each rule matches prompts containing its marker. Replies of a rule are
/// served in order; the last one repeats once the queue is drained.
#[derive(Default)]
pub struct ScriptedReasoner {
    rules: Mutex<Vec<Rule>>,
    prompts: Mutex<Vec<Vec<String>>>,
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for prompts that contain `marker`.
    pub fn on(self, marker: impl Into<String>, reply: impl Into<String>) -> Self {
        self.push(marker.into(), Reply::Text(reply.into()));
        self
    }

    /// Queue a hard failure for prompts that contain `marker`.
    pub fn fail_on(self, marker: impl Into<String>, message: impl Into<String>) -> Self {
        self.push(marker.into(), Reply::Fail(message.into()));
        self
    }

    fn push(&self, marker: String, reply: Reply) {
        let mut rules = self.rules.lock().unwrap();
        match rules.iter_mut().find(|r| r.marker == marker) {
            Some(rule) => rule.replies.push_back(reply),
            None => rules.push(Rule {
                marker,
                replies: VecDeque::from([reply]),
            }),
        }
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<Vec<String>> {
        self.prompts.lock().unwrap().clone()
    }

    /// Prompts received that contain `marker`.
    pub fn prompts_with(&self, marker: &str) -> Vec<String> {
        self.prompts()
            .into_iter()
            .map(|parts| parts.join("\n"))
            .filter(|p| p.contains(marker))
            .collect()
    }

    fn next_reply(&self, prompt: &str) -> Result<String> {
        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .find(|r| prompt.contains(&r.marker))
            .ok_or_else(|| QueryGraphError::LlmRequest("no scripted reply for prompt".into()))?;

        let reply = if rule.replies.len() > 1 {
            rule.replies.pop_front()
        } else {
            None
        };
        let reply = reply.as_ref().or(rule.replies.front());

        match reply {
            Some(Reply::Text(text)) => Ok(text.clone()),
            Some(Reply::Fail(message)) => Err(QueryGraphError::LlmRequest(message.clone())),
            None => Err(QueryGraphError::LlmRequest("script exhausted".into())),
        }
    }
}

impl Reasoner for ScriptedReasoner {
    fn generate(&self, prompt_parts: Vec<String>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let prompt = prompt_parts.join("\n");
            self.prompts.lock().unwrap().push(prompt_parts);
            self.next_reply(&prompt)
        })
    }
}

/// In-memory tool registry and invoker.
#[derive(Default)]
pub struct StubTools {
    tools: Vec<ToolDescriptor>,
    discovery_error: Option<String>,
    results: HashMap<String, std::result::Result<serde_json::Value, String>>,
    calls: Mutex<Vec<(String, serde_json::Map<String, serde_json::Value>)>>,
}

impl StubTools {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self {
            tools,
            ..Self::default()
        }
    }

    /// Make `list_tools` fail with a transport error.
    pub fn failing_discovery(mut self, message: impl Into<String>) -> Self {
        self.discovery_error = Some(message.into());
        self
    }

    /// Canned successful result for a tool.
    pub fn respond(mut self, tool: impl Into<String>, result: serde_json::Value) -> Self {
        self.results.insert(tool.into(), Ok(result));
        self
    }

    /// Make calls to a tool fail.
    pub fn fail(mut self, tool: impl Into<String>, message: impl Into<String>) -> Self {
        self.results.insert(tool.into(), Err(message.into()));
        self
    }

    /// Calls received so far as `(name, arguments)`.
    pub fn calls(&self) -> Vec<(String, serde_json::Map<String, serde_json::Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ToolRegistry for StubTools {
    fn list_tools(&self) -> BoxFuture<'_, Result<Vec<ToolDescriptor>>> {
        Box::pin(async move {
            match self.discovery_error {
                Some(ref message) => Err(QueryGraphError::Mcp(message.clone())),
                None => Ok(self.tools.clone()),
            }
        })
    }
}

impl ToolInvoker for StubTools {
    fn call(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        let name = name.to_string();
        Box::pin(async move {
            self.calls.lock().unwrap().push((name.clone(), arguments));
            match self.results.get(&name) {
                Some(Ok(value)) => Ok(value.clone()),
                Some(Err(message)) => Err(QueryGraphError::ToolExecution {
                    tool: name,
                    message: message.clone(),
                }),
                None => Err(QueryGraphError::ToolExecution {
                    tool: name,
                    message: "no stubbed result".into(),
                }),
            }
        })
    }
}
