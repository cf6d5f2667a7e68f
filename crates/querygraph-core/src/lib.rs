pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{QueryGraphError, Result};
pub use traits::{Reasoner, ToolInvoker, ToolRegistry};
pub use types::*;
