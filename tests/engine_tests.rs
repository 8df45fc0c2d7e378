//! Engine tests: single agent turns, builtin tool calls, the operation
//! registry seen through the executor, and end-to-end context/tool scenarios.
//!
//! Run: cargo test --test engine_tests

use std::sync::Arc;

use agent_engine::store::{AgentConfig, MemoryStore};
use agent_engine::testing::{MockInferenceProvider, MockResponse};
use agent_engine::tools::{
    BuiltinToolExecutor, BuiltinToolRegistry, StaticManifestSource, ToolApi,
    ToolExecutionContext, ToolManifest, ToolResult,
};
use agent_engine::types::{ConversationMessage, Role};
use agent_engine::{AgentExecutor, AgentTurn, OperationContext, OperationRegistry};
use async_trait::async_trait;
use serde_json::json;

struct SearchTool;

#[async_trait]
impl BuiltinToolExecutor for SearchTool {
    fn identifier(&self) -> &str {
        "search"
    }

    async fn execute(
        &self,
        api_name: &str,
        params: serde_json::Value,
        ctx: &ToolExecutionContext,
    ) -> ToolResult {
        match params["q"].as_str() {
            Some(q) => ToolResult::success(format!("{} results for '{}' by {}", api_name, q, ctx.agent_id)),
            None => ToolResult::error("missing q"),
        }
    }
}

fn search_manifest() -> ToolManifest {
    ToolManifest::builtin("search")
        .with_api(ToolApi::new(
            "query",
            "Search the web",
            json!({"type": "object", "properties": {"q": {"type": "string"}}}),
        ))
        .with_system_role("Cite your sources.")
}

async fn store_with_agent(config: AgentConfig) -> MemoryStore {
    let store = MemoryStore::new();
    store.put_agent("helper", config).await;
    store
        .insert_message(ConversationMessage::user("m0", "Find rust news").with_topic("t1"))
        .await;
    store
}

fn turn() -> AgentTurn {
    AgentTurn::new(OperationContext::agent("helper").with_topic("t1"))
}

// =============================================================================
// Agent turns
// =============================================================================

mod turn_tests {
    use super::*;
    use agent_engine::OperationStatus;

    #[tokio::test]
    async fn test_text_reply_completes_turn() {
        let store = store_with_agent(
            AgentConfig::new("gpt-4o", "openai").with_system_role("You are helpful"),
        )
        .await;
        let provider = Arc::new(MockInferenceProvider::new().script("gpt-4o", [MockResponse::text("Here you go")]));
        let registry = OperationRegistry::new();
        let executor =
            AgentExecutor::builder(registry.clone(), Arc::new(store.clone()), provider.clone()).build();

        let outcome = executor.run_turn(turn()).await;

        assert!(outcome.is_completed());
        assert_eq!(outcome.content.as_deref(), Some("Here you go"));
        let message = store.message(outcome.message_id.as_deref().unwrap()).await.unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content, "Here you go");
        assert_eq!(message.agent_id.as_deref(), Some("helper"));

        assert_eq!(
            registry.operation_for_message(&message.id).await,
            Some(outcome.operation_id.clone())
        );
        assert!(!registry.is_running(|_| true, &message.id).await);

        let calls = provider.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system_prompt(), Some("You are helpful"));
        assert_eq!(calls[0].messages[1].content, "Find rust news");
    }

    #[tokio::test]
    async fn test_tool_call_runs_as_child_operation() {
        let store = store_with_agent(
            AgentConfig::new("gpt-4o", "openai").with_plugins(["search"]),
        )
        .await;
        let provider = Arc::new(MockInferenceProvider::new().script(
            "gpt-4o",
            [
                MockResponse::tool_call("call-1", "query____search____builtin", json!({"q": "rust"})),
                MockResponse::text("Rust 2024 shipped."),
            ],
        ));
        let registry = OperationRegistry::new();
        let executor =
            AgentExecutor::builder(registry.clone(), Arc::new(store.clone()), provider.clone())
                .manifests(Arc::new(StaticManifestSource::new([search_manifest()])))
                .builtins(BuiltinToolRegistry::new().with(Arc::new(SearchTool)))
                .build();

        let outcome = executor.run_turn(turn()).await;
        assert!(outcome.is_completed(), "{:?}", outcome.error);
        assert_eq!(outcome.content.as_deref(), Some("Rust 2024 shipped."));

        let calls = provider.calls().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].tool_names(), vec!["query____search____builtin"]);
        assert!(calls[0].system_prompt().unwrap().contains("Cite your sources."));

        let tool_result = calls[1].messages.last().unwrap();
        assert_eq!(tool_result.role, Role::Tool);
        assert_eq!(tool_result.tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(tool_result.content, "query results for 'rust' by helper");

        let messages = store.messages().await;
        let tool_message = messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_message.content, "query results for 'rust' by helper");

        let tool_op_id = registry.operation_for_message(&tool_message.id).await.unwrap();
        let tool_op = registry.get(&tool_op_id).await.unwrap();
        assert_eq!(tool_op.kind, agent_engine::OperationKind::BuiltinToolCall);
        assert_eq!(tool_op.status, OperationStatus::Completed);
        assert_eq!(tool_op.parent_id.as_deref(), Some(outcome.operation_id.as_str()));
    }

    #[tokio::test]
    async fn test_tool_error_result_fails_tool_not_turn() {
        let store = store_with_agent(
            AgentConfig::new("gpt-4o", "openai").with_plugins(["search"]),
        )
        .await;
        let provider = Arc::new(MockInferenceProvider::new().script(
            "gpt-4o",
            [
                MockResponse::tool_call("call-1", "query____search____builtin", json!({})),
                MockResponse::text("Search failed, sorry."),
            ],
        ));
        let registry = OperationRegistry::new();
        let executor =
            AgentExecutor::builder(registry.clone(), Arc::new(store.clone()), provider)
                .manifests(Arc::new(StaticManifestSource::new([search_manifest()])))
                .builtins(BuiltinToolRegistry::new().with(Arc::new(SearchTool)))
                .build();

        let outcome = executor.run_turn(turn()).await;
        assert!(outcome.is_completed());

        let messages = store.messages().await;
        let tool_message = messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_message.error.as_deref(), Some("missing q"));
        let tool_op_id = registry.operation_for_message(&tool_message.id).await.unwrap();
        assert_eq!(registry.status(&tool_op_id).await, Some(OperationStatus::Failed));
    }

    #[tokio::test]
    async fn test_inference_error_fails_turn_and_marks_message() {
        let store = store_with_agent(AgentConfig::new("gpt-4o", "openai")).await;
        let provider = Arc::new(
            MockInferenceProvider::new().script("gpt-4o", [MockResponse::error("upstream 500")]),
        );
        let registry = OperationRegistry::new();
        let executor =
            AgentExecutor::builder(registry.clone(), Arc::new(store.clone()), provider).build();

        let outcome = executor.run_turn(turn()).await;

        assert_eq!(outcome.status, OperationStatus::Failed);
        assert!(outcome.error.as_deref().unwrap().contains("upstream 500"));
        let message = store.message(outcome.message_id.as_deref().unwrap()).await.unwrap();
        assert!(message.error.is_some());

        let op = registry.get(&outcome.operation_id).await.unwrap();
        assert_eq!(op.status, OperationStatus::Failed);
        assert!(op.error.is_some());
    }

    #[tokio::test]
    async fn test_retry_after_failure_has_clean_history() {
        let store = store_with_agent(AgentConfig::new("gpt-4o", "openai")).await;
        let provider = Arc::new(
            MockInferenceProvider::new()
                .script("gpt-4o", [MockResponse::error("upstream 500"), MockResponse::text("done")]),
        );
        let executor = AgentExecutor::builder(
            OperationRegistry::new(),
            Arc::new(store.clone()),
            provider.clone(),
        )
        .build();

        assert_eq!(executor.run_turn(turn()).await.status, OperationStatus::Failed);
        assert!(executor.run_turn(turn()).await.is_completed());

        let calls = provider.calls().await;
        assert_eq!(calls.len(), 2);
        let roles: Vec<_> = calls[1].messages.iter().map(|m| (m.role, m.content.as_str())).collect();
        assert_eq!(roles, vec![(Role::User, "Find rust news")]);
    }

    #[tokio::test]
    async fn test_unknown_agent_fails_without_message() {
        let store = MemoryStore::new();
        let registry = OperationRegistry::new();
        let executor = AgentExecutor::builder(
            registry.clone(),
            Arc::new(store),
            Arc::new(MockInferenceProvider::new()),
        )
        .build();

        let outcome = executor.run_turn(turn()).await;
        assert_eq!(outcome.status, OperationStatus::Failed);
        assert!(outcome.message_id.is_none());
        assert_eq!(registry.running_count().await, 0);
    }

    #[tokio::test]
    async fn test_last_step_withholds_tools() {
        let store = store_with_agent(
            AgentConfig::new("gpt-4o", "openai").with_plugins(["search"]),
        )
        .await;
        let looping = MockResponse::tool_call("c", "query____search____builtin", json!({"q": "x"}));
        let provider = Arc::new(
            MockInferenceProvider::new().script("gpt-4o", [looping.clone(), looping]),
        );
        let executor =
            AgentExecutor::builder(OperationRegistry::new(), Arc::new(store), provider.clone())
                .manifests(Arc::new(StaticManifestSource::new([search_manifest()])))
                .builtins(BuiltinToolRegistry::new().with(Arc::new(SearchTool)))
                .max_tool_steps(1)
                .build();

        let outcome = executor.run_turn(turn()).await;

        assert_eq!(outcome.status, OperationStatus::Failed);
        let calls = provider.calls().await;
        assert_eq!(calls.len(), 2);
        assert!(calls[0].tools.is_some());
        assert!(calls[1].tools.is_none());
    }

    #[tokio::test]
    async fn test_cancel_spawned_turn() {
        let store = store_with_agent(AgentConfig::new("gpt-4o", "openai")).await;
        let provider =
            Arc::new(MockInferenceProvider::new().script("gpt-4o", [MockResponse::Pending]));
        let registry = OperationRegistry::new();
        let executor =
            AgentExecutor::builder(registry.clone(), Arc::new(store), provider.clone()).build();

        let handle = executor.spawn_turn(turn()).await;
        assert_eq!(
            registry.status(&handle.operation_id).await,
            Some(OperationStatus::Running)
        );

        assert!(registry.cancel(&handle.operation_id).await);
        let outcome = handle.handle.await.unwrap();

        assert_eq!(outcome.status, OperationStatus::Cancelled);
        assert_eq!(
            registry.wait(&handle.operation_id).await,
            Some(OperationStatus::Cancelled)
        );
        assert_eq!(registry.metrics().summary().operations_cancelled, 1);
    }

    #[tokio::test]
    async fn test_thread_history_preferred_over_topic() {
        let store = MemoryStore::new();
        store.put_agent("helper", AgentConfig::new("gpt-4o", "openai")).await;
        store
            .insert_message(ConversationMessage::user("m0", "topic message").with_topic("t1"))
            .await;
        store
            .insert_message(
                ConversationMessage::user("m1", "thread message")
                    .with_topic("t1")
                    .with_thread("th1"),
            )
            .await;
        let provider = Arc::new(MockInferenceProvider::new());
        let executor =
            AgentExecutor::builder(OperationRegistry::new(), Arc::new(store), provider.clone())
                .build();

        executor
            .run_turn(AgentTurn::new(
                OperationContext::agent("helper").with_topic("t1").with_thread("th1"),
            ))
            .await;

        let calls = provider.calls().await;
        let contents: Vec<&str> = calls[0].messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["thread message"]);
    }
}

// =============================================================================
// End-to-end context and tool scenarios
// =============================================================================

mod scenario_tests {
    use super::*;
    use agent_engine::tools::{Capabilities, ToolResolver};
    use agent_engine::types::Message;
    use agent_engine::ContextEngineer;

    #[test]
    fn test_engineered_output_for_plain_conversation() {
        let history = vec![ConversationMessage::user("m1", "Hello").with_topic("t1")];

        let output = ContextEngineer::new("gpt-4o", "openai")
            .system_role("You are helpful")
            .engineer(&history);

        assert_eq!(
            output.into_messages(),
            vec![Message::system("You are helpful"), Message::user("Hello")]
        );
    }

    #[test]
    fn test_input_template_applied() {
        let history = vec![ConversationMessage::user("m1", "hi")];

        let output = ContextEngineer::new("gpt-4o", "openai")
            .input_template("Respond to: {{text}}")
            .engineer(&history);

        assert_eq!(output.as_slice(), &[Message::user("Respond to: hi")]);
    }

    #[test]
    fn test_engineer_is_pure_and_strips_metadata() {
        let history = vec![
            ConversationMessage::user("m1", "Hello").with_metadata("ui", json!({"pinned": true})),
            ConversationMessage::assistant("m2", "Hi!").with_agent("helper"),
        ];
        let engineer = ContextEngineer::new("gpt-4o", "openai").system_role("sys");

        let first = engineer.engineer(&history);
        let second = engineer.engineer(&history);
        assert_eq!(first, second);

        let value = serde_json::to_value(&first).unwrap();
        let text = value.to_string();
        for forbidden in ["createdAt", "updatedAt", "m1", "m2", "pinned", "agentId"] {
            assert!(!text.contains(forbidden), "leaked {}", forbidden);
        }
    }

    #[test]
    fn test_search_manifest_resolves_single_tool() {
        let manifest = ToolManifest::builtin("search").with_api(ToolApi::new(
            "search",
            "Search",
            json!({"type": "object", "properties": {}}),
        ));

        let resolved = ToolResolver::bare().resolve(
            &["search".to_string()],
            "gpt-4o",
            "openai",
            &[manifest],
            &Capabilities::default(),
        );

        assert_eq!(resolved.enabled_tool_ids, vec!["search"]);
        let tools = resolved.tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), "search____search____builtin");
    }
}
