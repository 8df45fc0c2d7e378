//! Group conversations: supervisor decisions and the round loop that acts on them.

mod decision;
mod orchestrator;
mod supervisor;

pub use decision::{GroupDecision, decision_schema};
pub use orchestrator::{
    DEFAULT_MAX_ROUNDS, GroupChat, GroupOrchestrator, OrchestrationHandle, OrchestrationReport,
    RoundOutcome, RoundState, StopReason,
};
pub use supervisor::{MemberProfile, roster_prompt};
