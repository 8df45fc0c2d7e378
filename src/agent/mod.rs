//! Single-agent turn execution.

mod executor;
mod turn;

pub use executor::{AgentExecutor, AgentExecutorBuilder, DEFAULT_MAX_TOOL_STEPS};
pub use turn::{AgentTurn, TurnHandle, TurnOutcome};
