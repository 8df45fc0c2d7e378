//! In-memory persistence store (for testing and single-instance deployments).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    AgentConfig, ConversationTarget, MessageContext, MessagePatch, PersistenceStore, StoreError,
    StoreResult,
};
use crate::types::{ConversationMessage, Role};

#[derive(Debug, Default)]
struct MemoryState {
    messages: Vec<ConversationMessage>,
    agents: HashMap<String, AgentConfig>,
    groups: HashMap<String, Vec<String>>,
    topic_owners: HashMap<String, String>,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_agent(&self, agent_id: impl Into<String>, config: AgentConfig) {
        self.state.write().await.agents.insert(agent_id.into(), config);
    }

    pub async fn put_group(
        &self,
        group_id: impl Into<String>,
        members: impl IntoIterator<Item = impl Into<String>>,
    ) {
        let members = members.into_iter().map(Into::into).collect();
        self.state.write().await.groups.insert(group_id.into(), members);
    }

    /// Seed an already-built message, e.g. the user turn that starts a run.
    pub async fn insert_message(&self, message: ConversationMessage) {
        self.state.write().await.messages.push(message);
    }

    pub async fn message(&self, message_id: &str) -> Option<ConversationMessage> {
        let state = self.state.read().await;
        state.messages.iter().find(|m| m.id == message_id).cloned()
    }

    pub async fn messages(&self) -> Vec<ConversationMessage> {
        self.state.read().await.messages.clone()
    }

    pub async fn topic_owner(&self, topic_id: &str) -> Option<String> {
        self.state.read().await.topic_owners.get(topic_id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.messages.len()
    }

    pub async fn clear(&self) {
        self.state.write().await.messages.clear();
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_message(
        &self,
        role: Role,
        content: &str,
        context: &MessageContext,
    ) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut message = ConversationMessage::new(id.clone(), role, content);
        message.agent_id = context.agent_id.clone();
        message.group_id = context.group_id.clone();
        message.topic_id = context.topic_id.clone();
        message.thread_id = context.thread_id.clone();
        message.tool_call_id = context.tool_call_id.clone();
        message.name = context.name.clone();

        self.state.write().await.messages.push(message);
        Ok(id)
    }

    async fn update_message(&self, message_id: &str, patch: MessagePatch) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| StoreError::not_found("message", message_id))?;

        if let Some(content) = patch.content {
            message.content = content;
        }
        if let Some(tool_calls) = patch.tool_calls {
            message.tool_calls = tool_calls;
        }
        if let Some(error) = patch.error {
            message.error = Some(error);
        }
        message.updated_at = Utc::now();
        Ok(())
    }

    async fn list_messages(
        &self,
        target: &ConversationTarget,
    ) -> StoreResult<Vec<ConversationMessage>> {
        let state = self.state.read().await;
        let messages = state
            .messages
            .iter()
            .filter(|m| match target {
                ConversationTarget::Topic(topic) => {
                    m.topic_id.as_deref() == Some(topic.as_str()) && m.thread_id.is_none()
                }
                ConversationTarget::Thread(thread) => {
                    m.thread_id.as_deref() == Some(thread.as_str())
                }
            })
            .cloned()
            .collect();
        Ok(messages)
    }

    async fn group_members(&self, group_id: &str) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        state
            .groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("group", group_id))
    }

    async fn agent_config(&self, agent_id: &str) -> StoreResult<AgentConfig> {
        let state = self.state.read().await;
        state
            .agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("agent", agent_id))
    }

    async fn assign_topic_owner(&self, topic_id: &str, agent_id: &str) -> StoreResult<()> {
        self.state
            .write()
            .await
            .topic_owners
            .insert(topic_id.to_string(), agent_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic_ctx(topic: &str) -> MessageContext {
        MessageContext {
            topic_id: Some(topic.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_list_in_order() {
        let store = MemoryStore::new();
        store
            .create_message(Role::User, "first", &topic_ctx("t1"))
            .await
            .unwrap();
        store
            .create_message(Role::Assistant, "second", &topic_ctx("t1"))
            .await
            .unwrap();
        store
            .create_message(Role::User, "other", &topic_ctx("t2"))
            .await
            .unwrap();

        let listed = store
            .list_messages(&ConversationTarget::Topic("t1".into()))
            .await
            .unwrap();
        let contents: Vec<&str> = listed.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_thread_messages_separate_from_topic() {
        let store = MemoryStore::new();
        let mut ctx = topic_ctx("t1");
        ctx.thread_id = Some("th1".into());
        store.create_message(Role::User, "in thread", &ctx).await.unwrap();

        let topic = store
            .list_messages(&ConversationTarget::Topic("t1".into()))
            .await
            .unwrap();
        assert!(topic.is_empty());

        let thread = store
            .list_messages(&ConversationTarget::Thread("th1".into()))
            .await
            .unwrap();
        assert_eq!(thread.len(), 1);
    }

    #[tokio::test]
    async fn test_update_message() {
        let store = MemoryStore::new();
        let id = store
            .create_message(Role::Assistant, "", &topic_ctx("t1"))
            .await
            .unwrap();

        store
            .update_message(&id, MessagePatch::content("done"))
            .await
            .unwrap();
        store
            .update_message(&id, MessagePatch::error("boom"))
            .await
            .unwrap();

        let message = store.message(&id).await.unwrap();
        assert_eq!(message.content, "done");
        assert_eq!(message.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_missing_records() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.update_message("nope", MessagePatch::default()).await,
            Err(StoreError::NotFound { kind: "message", .. })
        ));
        assert!(store.agent_config("a").await.is_err());
        assert!(store.group_members("g").await.is_err());
    }

    #[tokio::test]
    async fn test_topic_owner() {
        let store = MemoryStore::new();
        store.assign_topic_owner("t1", "agent-b").await.unwrap();
        assert_eq!(store.topic_owner("t1").await.as_deref(), Some("agent-b"));
    }
}
