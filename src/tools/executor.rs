//! Builtin tool executors and their registration map.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use super::resolver::parse_tool_name;
use crate::operation::OperationId;

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    /// Successful result with content
    Success(String),
    /// Error result
    Error(String),
    /// Empty success (no content)
    Empty,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self::Success(content.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn empty() -> Self {
        Self::Empty
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Text stored as the tool message content.
    pub fn content(&self) -> &str {
        match self {
            Self::Success(content) | Self::Error(content) => content,
            Self::Empty => "",
        }
    }
}

/// What a builtin executor knows about the call it is serving.
#[derive(Debug, Clone)]
pub struct ToolExecutionContext {
    pub operation_id: OperationId,
    pub agent_id: String,
    pub topic_id: Option<String>,
    pub cancellation_token: CancellationToken,
}

impl ToolExecutionContext {
    pub fn new(operation_id: impl Into<OperationId>, agent_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            agent_id: agent_id.into(),
            topic_id: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_topic(mut self, topic_id: Option<String>) -> Self {
        self.topic_id = topic_id;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

/// An in-process tool, addressed by its manifest identifier.
#[async_trait]
pub trait BuiltinToolExecutor: Send + Sync {
    fn identifier(&self) -> &str;

    async fn execute(
        &self,
        api_name: &str,
        params: serde_json::Value,
        ctx: &ToolExecutionContext,
    ) -> ToolResult;
}

/// Executors registered at startup, keyed by identifier.
#[derive(Clone, Default)]
pub struct BuiltinToolRegistry {
    executors: Arc<DashMap<String, Arc<dyn BuiltinToolExecutor>>>,
}

impl std::fmt::Debug for BuiltinToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinToolRegistry")
            .field("identifiers", &self.identifiers())
            .finish()
    }
}

impl BuiltinToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any executor already registered under the same identifier.
    pub fn register(&self, executor: Arc<dyn BuiltinToolExecutor>) {
        self.executors
            .insert(executor.identifier().to_string(), executor);
    }

    pub fn with(self, executor: Arc<dyn BuiltinToolExecutor>) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<dyn BuiltinToolExecutor>> {
        self.executors
            .get(identifier)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.executors.contains_key(identifier)
    }

    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.executors.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    pub async fn execute(
        &self,
        identifier: &str,
        api_name: &str,
        params: serde_json::Value,
        ctx: &ToolExecutionContext,
    ) -> ToolResult {
        match self.get(identifier) {
            Some(executor) => executor.execute(api_name, params, ctx).await,
            None => ToolResult::error(format!("Unknown tool: {}", identifier)),
        }
    }

    /// Execute a model tool call given its generated schema name.
    pub async fn execute_call(
        &self,
        tool_name: &str,
        params: serde_json::Value,
        ctx: &ToolExecutionContext,
    ) -> ToolResult {
        let Some(parts) = parse_tool_name(tool_name) else {
            return ToolResult::error(format!("Malformed tool name: {}", tool_name));
        };
        self.execute(parts.identifier, parts.api_name, params, ctx)
            .await
    }
}
