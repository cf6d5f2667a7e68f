//! Nodes of the query agent graph.

pub mod decide;
pub mod execute;
pub mod generate_sql;
pub mod tool_discovery;
pub mod unknown_action;
pub mod validate;

pub use decide::DecideNode;
pub use execute::{Execution, ExecuteNode, Outcome, Payload};
pub use generate_sql::GenerateSqlNode;
pub use tool_discovery::ToolDiscoveryNode;
pub use unknown_action::UnknownActionNode;
pub use validate::ValidateNode;

// Node names.
pub const TOOL_DISCOVERY: &str = "tool_discovery";
pub const DECIDE: &str = "decide";
pub const EXECUTE: &str = "execute";
pub const GENERATE_SQL: &str = "generate_sql";
pub const VALIDATE: &str = "validate";
pub const UNKNOWN_ACTION: &str = "unknown_action";

// Labels emitted by nodes other than decide.
pub const TO_DECIDE: &str = "decide";
pub const TO_VALIDATE: &str = "validate";
