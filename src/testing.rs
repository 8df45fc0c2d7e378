//! Test doubles for the inference seam.
//!
//! [`MockInferenceProvider`] replays scripted replies per model, so agents
//! configured with different models can be driven independently in one test.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::provider::{InferenceError, InferenceProvider};
use crate::types::{AssistantMessage, Message, ToolCall, ToolSchema};

/// One scripted provider reply.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    Error(InferenceError),
    /// Never answers; resolves only when the call is cancelled.
    Pending,
}

impl MockResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::ToolCalls(vec![ToolCall::new(id, name, arguments.to_string())])
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(InferenceError::request(message))
    }
}

/// What the provider was called with.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub provider: String,
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolSchema>>,
}

impl RecordedCall {
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == crate::types::Role::System)
            .map(|m| m.content.as_str())
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools
            .iter()
            .flatten()
            .map(ToolSchema::name)
            .collect()
    }
}

#[derive(Debug)]
pub struct MockInferenceProvider {
    scripts: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
    default_reply: String,
    delay: Option<Duration>,
}

impl Default for MockInferenceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInferenceProvider {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            default_reply: "ok".to_string(),
            delay: None,
        }
    }

    /// Reply used once a model's script is exhausted.
    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Wait this long before every reply, honouring cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn script(
        mut self,
        model: impl Into<String>,
        responses: impl IntoIterator<Item = MockResponse>,
    ) -> Self {
        self.scripts
            .get_mut()
            .entry(model.into())
            .or_default()
            .extend(responses);
        self
    }

    pub async fn push(&self, model: impl Into<String>, response: MockResponse) {
        self.scripts
            .lock()
            .await
            .entry(model.into())
            .or_default()
            .push_back(response);
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn calls_for(&self, model: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| call.model == model)
            .cloned()
            .collect()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl InferenceProvider for MockInferenceProvider {
    async fn infer(
        &self,
        model: &str,
        provider: &str,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        token: CancellationToken,
    ) -> Result<AssistantMessage, InferenceError> {
        self.calls.lock().await.push(RecordedCall {
            model: model.to_string(),
            provider: provider.to_string(),
            messages: messages.to_vec(),
            tools: tools.map(<[ToolSchema]>::to_vec),
        });

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = token.cancelled() => return Err(InferenceError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let next = self
            .scripts
            .lock()
            .await
            .get_mut(model)
            .and_then(VecDeque::pop_front);

        match next {
            Some(MockResponse::Text(content)) => Ok(AssistantMessage::text(content)),
            Some(MockResponse::ToolCalls(calls)) => Ok(AssistantMessage::with_tool_calls(calls)),
            Some(MockResponse::Error(e)) => Err(e),
            Some(MockResponse::Pending) => {
                token.cancelled().await;
                Err(InferenceError::Cancelled)
            }
            None => Ok(AssistantMessage::text(self.default_reply.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_per_model() {
        let mock = MockInferenceProvider::new()
            .with_default_reply("fallback")
            .script("m1", [MockResponse::text("first"), MockResponse::error("boom")]);

        let token = CancellationToken::new();
        let messages = [Message::user("hi")];

        let reply = mock.infer("m1", "p", &messages, None, token.clone()).await;
        assert_eq!(reply.unwrap().content, "first");
        assert!(mock.infer("m1", "p", &messages, None, token.clone()).await.is_err());
        let reply = mock.infer("m1", "p", &messages, None, token.clone()).await;
        assert_eq!(reply.unwrap().content, "fallback");
        let reply = mock.infer("m2", "p", &messages, None, token).await;
        assert_eq!(reply.unwrap().content, "fallback");

        assert_eq!(mock.call_count().await, 4);
        assert_eq!(mock.calls_for("m2").await.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_resolves_on_cancel() {
        let mock = MockInferenceProvider::new().script("m", [MockResponse::Pending]);
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            child.cancel();
        });

        let result = mock.infer("m", "p", &[], None, token).await;
        assert_eq!(result, Err(InferenceError::Cancelled));
    }
}
