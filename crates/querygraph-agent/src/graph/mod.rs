//! Flow engine: labeled-transition graphs over a shared mutable context.
//!
//! A flow is a set of `Node`s connected through an `EdgeTable`. Every node
//! runs in three phases (prepare, execute, finalize); finalize writes into
//! the context and returns a `Label` that selects the successor.
//!
//! The `FlowEngine` walks the graph from an entry node until no successor
//! exists, a halt predicate fires, or one of its limits (step count, wall
//! clock, cancellation) is reached. `SubFlow` embeds a whole engine so it
//! can be invoked from inside another node over a scoped context.

pub mod edge;
pub mod executor;
pub mod node;
pub mod subflow;

pub use edge::{Edge, EdgeTable, Label, Route};
pub use executor::{ExecutionResult, FlowEngine, FlowLimits, RunOutcome, StepRecord};
pub use node::{Node, Step};
pub use subflow::SubFlow;
