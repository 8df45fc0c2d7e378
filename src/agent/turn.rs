//! Inputs and outputs of a single agent turn.

use tokio::task::JoinHandle;

use crate::operation::{OperationContext, OperationId, OperationStatus};

/// One request for an agent to respond in a conversation.
#[derive(Debug, Clone)]
pub struct AgentTurn {
    pub context: OperationContext,
    /// Supervisor instruction for group turns.
    pub instruction: Option<String>,
    pub parent_id: Option<OperationId>,
    pub label: Option<String>,
}

impl AgentTurn {
    pub fn new(context: OperationContext) -> Self {
        Self {
            context,
            instruction: None,
            parent_id: None,
            label: None,
        }
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into()).filter(|s: &String| !s.trim().is_empty());
        self
    }

    pub fn parent(mut self, parent_id: impl Into<OperationId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.context.agent_id
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub operation_id: OperationId,
    pub agent_id: String,
    pub status: OperationStatus,
    /// Last assistant message written by the turn.
    pub message_id: Option<String>,
    pub content: Option<String>,
    pub error: Option<String>,
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == OperationStatus::Completed
    }
}

/// A turn running on its own task.
#[derive(Debug)]
pub struct TurnHandle {
    pub operation_id: OperationId,
    pub handle: JoinHandle<TurnOutcome>,
}
