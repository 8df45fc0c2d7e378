//! Operation data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub type OperationId = String;

/// What a unit of work does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    AgentExecution,
    ToolInterpreter,
    ToolSearch,
    ToolLocalFiles,
    BuiltinToolCall,
    GroupOrchestration,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentExecution => "agentExecution",
            Self::ToolInterpreter => "toolInterpreter",
            Self::ToolSearch => "toolSearch",
            Self::ToolLocalFiles => "toolLocalFiles",
            Self::BuiltinToolCall => "builtinToolCall",
            Self::GroupOrchestration => "groupOrchestration",
        }
    }

    pub fn is_tool(&self) -> bool {
        matches!(
            self,
            Self::ToolInterpreter | Self::ToolSearch | Self::ToolLocalFiles | Self::BuiltinToolCall
        )
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Distinguishes a direct single-agent turn from a supervised group turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationScope {
    #[default]
    Agent,
    Group,
}

impl OperationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Group => "group",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationContext {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub scope: OperationScope,
}

impl OperationContext {
    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            ..Default::default()
        }
    }

    pub fn group(
        group_id: impl Into<String>,
        topic_id: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            group_id: Some(group_id.into()),
            topic_id: Some(topic_id.into()),
            thread_id: None,
            scope: OperationScope::Group,
        }
    }

    pub fn with_topic(mut self, topic_id: impl Into<String>) -> Self {
        self.topic_id = Some(topic_id.into());
        self
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Same conversation, different agent.
    pub fn for_agent(&self, agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            ..self.clone()
        }
    }
}

/// Parameters for [`OperationRegistry::start`](super::OperationRegistry::start).
#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub kind: OperationKind,
    pub context: OperationContext,
    pub label: String,
    pub parent_id: Option<OperationId>,
}

impl OperationSpec {
    pub fn new(kind: OperationKind, context: OperationContext) -> Self {
        Self {
            label: kind.as_str().to_string(),
            kind,
            context,
            parent_id: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn parent(mut self, parent_id: impl Into<OperationId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn parent_opt(mut self, parent_id: Option<OperationId>) -> Self {
        self.parent_id = parent_id;
        self
    }
}

/// Snapshot of a tracked unit of work.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub status: OperationStatus,
    pub context: OperationContext,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<OperationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub cancellation_token: CancellationToken,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Operation {
    pub fn is_running(&self) -> bool {
        self.status == OperationStatus::Running
    }
}

/// Returned by `start`: the new id and the token the body must observe.
#[derive(Debug, Clone)]
pub struct StartedOperation {
    pub operation_id: OperationId,
    pub cancellation_token: CancellationToken,
}
