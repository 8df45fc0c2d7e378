//! Persistence store seam.
//!
//! The engine only creates, updates and lists conversation records through
//! this trait; schema and storage engine are the implementor's concern.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ConversationMessage, Role, ToolCall};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Where a new message belongs and who authored it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl MessageContext {
    pub fn from_operation(context: &crate::operation::OperationContext) -> Self {
        Self {
            agent_id: Some(context.agent_id.clone()),
            group_id: context.group_id.clone(),
            topic_id: context.topic_id.clone(),
            thread_id: context.thread_id.clone(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn with_tool_call(mut self, tool_call_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.tool_call_id = Some(tool_call_id.into());
        self.name = Some(name.into());
        self
    }
}

/// Partial update of a stored message. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessagePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(tool_calls);
        self
    }
}

/// A topic's main line or one of its threads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationTarget {
    Topic(String),
    Thread(String),
}

impl ConversationTarget {
    /// Thread if set, otherwise topic.
    pub fn from_ids(topic_id: Option<&str>, thread_id: Option<&str>) -> Option<Self> {
        match (thread_id, topic_id) {
            (Some(thread), _) => Some(Self::Thread(thread.to_string())),
            (None, Some(topic)) => Some(Self::Topic(topic.to_string())),
            (None, None) => None,
        }
    }
}

/// Per-agent configuration the engine needs for a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub model: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_role: Option<String>,
    /// Requested tool ids.
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_template: Option<String>,
}

impl AgentConfig {
    pub fn new(model: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            provider: provider.into(),
            ..Default::default()
        }
    }

    pub fn with_system_role(mut self, role: impl Into<String>) -> Self {
        self.system_role = Some(role.into());
        self
    }

    pub fn with_plugins(mut self, plugins: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.plugins = plugins.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_history_count(mut self, count: usize) -> Self {
        self.history_count = Some(count);
        self
    }

    pub fn with_input_template(mut self, template: impl Into<String>) -> Self {
        self.input_template = Some(template.into());
        self
    }
}

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    fn name(&self) -> &str;

    async fn create_message(
        &self,
        role: Role,
        content: &str,
        context: &MessageContext,
    ) -> StoreResult<String>;

    async fn update_message(&self, message_id: &str, patch: MessagePatch) -> StoreResult<()>;

    async fn list_messages(&self, target: &ConversationTarget)
    -> StoreResult<Vec<ConversationMessage>>;

    async fn group_members(&self, group_id: &str) -> StoreResult<Vec<String>>;

    async fn agent_config(&self, agent_id: &str) -> StoreResult<AgentConfig>;

    /// Hand a topic to `agent_id` for subsequent turns.
    async fn assign_topic_owner(&self, _topic_id: &str, _agent_id: &str) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationContext;

    #[test]
    fn test_target_prefers_thread() {
        assert_eq!(
            ConversationTarget::from_ids(Some("t"), Some("th")),
            Some(ConversationTarget::Thread("th".into()))
        );
        assert_eq!(
            ConversationTarget::from_ids(Some("t"), None),
            Some(ConversationTarget::Topic("t".into()))
        );
        assert_eq!(ConversationTarget::from_ids(None, None), None);
    }

    #[test]
    fn test_message_context_from_operation() {
        let op = OperationContext::group("g", "t", "a");
        let ctx = MessageContext::from_operation(&op);
        assert_eq!(ctx.agent_id.as_deref(), Some("a"));
        assert_eq!(ctx.group_id.as_deref(), Some("g"));
        assert_eq!(ctx.topic_id.as_deref(), Some("t"));
    }

    #[test]
    fn test_agent_config_deserialize() {
        let config: AgentConfig = serde_json::from_value(serde_json::json!({
            "model": "gpt-4o",
            "provider": "openai",
            "systemRole": "be nice",
            "plugins": ["search"]
        }))
        .unwrap();
        assert_eq!(config.system_role.as_deref(), Some("be nice"));
        assert_eq!(config.plugins, vec!["search"]);
        assert!(config.history_count.is_none());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::not_found("agent", "a1");
        assert_eq!(err.to_string(), "agent not found: a1");
    }
}
