use tracing::debug;

use querygraph_core::error::Result;

use super::executor::FlowEngine;

/// A flow embedded in another flow's node.
///
/// The owning node builds a scoped context, runs the sub-flow to completion
/// and reads what it needs from the returned context. The parent context is
/// never visible to the sub-flow.
pub struct SubFlow<C> {
    name: String,
    engine: FlowEngine<C>,
}

impl<C: Send + 'static> SubFlow<C> {
    pub fn new(name: impl Into<String>, engine: FlowEngine<C>) -> Self {
        Self {
            name: name.into(),
            engine,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the embedded flow over `scoped` and hand the final context back.
    pub async fn run(&self, mut scoped: C) -> Result<C> {
        let result = self.engine.run(&mut scoped).await?;
        debug!(
            subflow = %self.name,
            steps = result.steps.len(),
            outcome = ?result.outcome,
            "Sub-flow finished"
        );
        Ok(scoped)
    }
}
