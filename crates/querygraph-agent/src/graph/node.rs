use futures::future::BoxFuture;

use querygraph_core::error::Result;

use super::edge::Label;

/// One unit of work in a flow over context `C`.
///
/// The engine runs the phases strictly in order for a single step:
/// `prepare` reads what it needs from the context, `execute` does the work
/// (usually a call to an external collaborator) without touching the
/// context, and `finalize` writes results back and picks the transition.
///
/// Nodes hold configuration only; all run state lives in the context.
pub trait Node<C>: Send + Sync + 'static {
    type Prepared: Send + Sync + 'static;
    type Output: Send + 'static;

    /// Stable name used for edge lookups and logs.
    fn name(&self) -> &str;

    /// Read inputs from the context. Missing values get defaults; this
    /// phase cannot fail.
    fn prepare(&self, ctx: &C) -> Self::Prepared;

    /// Do the work. An error here is a hard failure that aborts the run;
    /// recoverable problems must be encoded in `Output`.
    fn execute<'a>(&'a self, prepared: &'a Self::Prepared) -> BoxFuture<'a, Result<Self::Output>>;

    /// Write results into the context and return the transition label.
    fn finalize(&self, ctx: &mut C, prepared: Self::Prepared, output: Self::Output) -> Label;
}

/// Object-safe view of a node, as stored by the engine.
///
/// Implemented for every `Node`. The context is only written after
/// `execute` has completed, so dropping a step future early leaves the
/// context untouched.
pub trait Step<C>: Send + Sync {
    fn name(&self) -> &str;

    fn step<'a>(&'a self, ctx: &'a mut C) -> BoxFuture<'a, Result<Label>>;
}

impl<C, N> Step<C> for N
where
    C: Send,
    N: Node<C>,
{
    fn name(&self) -> &str {
        Node::name(self)
    }

    fn step<'a>(&'a self, ctx: &'a mut C) -> BoxFuture<'a, Result<Label>> {
        Box::pin(async move {
            let prepared = self.prepare(ctx);
            let output = self.execute(&prepared).await?;
            Ok(self.finalize(ctx, prepared, output))
        })
    }
}
