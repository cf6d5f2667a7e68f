//! The data-query agent: a reasoner-driven loop that discovers tools,
//! decides on actions, generates and runs SQL, and validates the results,
//! built on a generic labeled-transition flow engine.

pub mod action;
pub mod context;
pub mod graph;
pub mod nodes;
pub mod reply;
pub mod runner;

pub use action::Action;
pub use context::QueryContext;
pub use graph::{
    Edge, EdgeTable, ExecutionResult, FlowEngine, FlowLimits, Label, Node, RunOutcome, Step,
    StepRecord, SubFlow,
};
pub use reply::{Decision, ParseError, SqlGeneration, Validation};
pub use runner::{AgentReport, QueryAgent};
