//! # agent-engine
//!
//! Execution core for conversational agents: tracks every agent and tool run
//! as a cancellable operation, resolves which tools a model may call, builds
//! the exact message list sent to inference, and runs supervised turn-taking
//! among the members of a group.
//!
//! The engine talks to the outside world through three traits:
//! [`PersistenceStore`], [`InferenceProvider`] and [`ManifestSource`].
//!
//! ## Single agent turn
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use agent_engine::store::{AgentConfig, MemoryStore};
//! use agent_engine::testing::MockInferenceProvider;
//! use agent_engine::{AgentExecutor, AgentTurn, OperationContext, OperationRegistry};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = MemoryStore::new();
//! store
//!     .put_agent("helper", AgentConfig::new("gpt-4o", "openai").with_system_role("You are helpful"))
//!     .await;
//!
//! let executor = AgentExecutor::builder(
//!     OperationRegistry::new(),
//!     Arc::new(store),
//!     Arc::new(MockInferenceProvider::new().with_default_reply("Hello!")),
//! )
//! .build();
//!
//! let outcome = executor
//!     .run_turn(AgentTurn::new(OperationContext::agent("helper").with_topic("t1")))
//!     .await;
//! assert!(outcome.is_completed());
//! assert_eq!(outcome.content.as_deref(), Some("Hello!"));
//! # }
//! ```
//!
//! ## Group orchestration
//!
//! ```rust,no_run
//! use agent_engine::{GroupDecision, GroupOrchestrator};
//!
//! # async fn example(orchestrator: GroupOrchestrator) {
//! let report = orchestrator
//!     .run(
//!         "group-1",
//!         "topic-1",
//!         "supervisor",
//!         Some(GroupDecision::broadcast(["a", "b"], "Introduce yourselves")),
//!     )
//!     .await;
//! println!("stopped after {} rounds: {:?}", report.rounds, report.stop_reason);
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod agent;
pub mod config;
pub mod context;
pub mod group;
pub mod observability;
pub mod operation;
pub mod prelude;
pub mod provider;
pub mod store;
pub mod testing;
pub mod tools;
pub mod types;

pub use agent::{AgentExecutor, AgentExecutorBuilder, AgentTurn, TurnHandle, TurnOutcome};
pub use config::{ConfigBuilder, ConfigError, EngineSettings};
pub use context::{ContextEngineer, ContextError, EngineeredMessageSet};
pub use group::{
    GroupChat, GroupDecision, GroupOrchestrator, OrchestrationHandle, OrchestrationReport,
    RoundOutcome, StopReason,
};
pub use observability::EngineMetrics;
pub use operation::{
    Operation, OperationContext, OperationId, OperationKind, OperationRegistry, OperationScope,
    OperationSpec, OperationStatus, RetentionPolicy, StartedOperation,
};
pub use provider::{InferenceError, InferenceProvider};
pub use store::{AgentConfig, MemoryStore, PersistenceStore, StoreError};
pub use tools::{
    BuiltinToolExecutor, BuiltinToolRegistry, Capabilities, ExecutionEnvironment, ManifestSource,
    ResolvedToolSet, ToolManifest, ToolResolver,
};
pub use types::{AssistantMessage, ConversationMessage, Message, Role, ToolCall, ToolSchema};

/// Error type for engine operations.
///
/// Operation bodies turn these into a `Failed` status on the owning
/// operation; they do not cross into the group orchestrator.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Inference provider call failed.
    #[error("Inference failed: {0}")]
    Inference(InferenceError),

    /// Persistence store call failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A context stage could not be prepared.
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    /// The operation's cancellation token fired.
    #[error("Operation cancelled")]
    Cancelled,

    /// Supervisor output was unusable or addressed unknown members.
    #[error("Invalid group decision: {0}")]
    InvalidDecision(String),

    #[error("Operation timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(std::time::Duration),

    /// Tool execution failed outside the tool's own error result.
    #[error("Tool execution failed: {0}")]
    Tool(String),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration, parsing, or setup errors
    Configuration,
    /// Provider or storage errors that may succeed on retry
    Transient,
    /// Cancellation requested by a caller
    Cancelled,
    /// Errors tied to conversation or orchestration state
    Stateful,
    /// Internal errors (IO, JSON, unexpected states)
    Internal,
    /// Resource limits (timeouts, step bounds)
    ResourceLimit,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::Env(_) | Error::Context(_) => ErrorCategory::Configuration,

            Error::Inference(e) if e.is_retryable() => ErrorCategory::Transient,
            Error::Store(StoreError::Storage { .. }) => ErrorCategory::Transient,

            Error::Cancelled => ErrorCategory::Cancelled,

            Error::InvalidDecision(_) | Error::Store(StoreError::NotFound { .. }) => {
                ErrorCategory::Stateful
            }

            Error::Timeout(_) => ErrorCategory::ResourceLimit,

            Error::Inference(_)
            | Error::Store(_)
            | Error::Json(_)
            | Error::Io(_)
            | Error::Tool(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    pub fn is_cancelled(&self) -> bool {
        self.category() == ErrorCategory::Cancelled
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

impl From<InferenceError> for Error {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Cancelled => Error::Cancelled,
            other => Error::Inference(other),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Serialization(e) => Error::Json(e),
            ConfigError::Io(e) => Error::Io(e),
            ConfigError::Env(e) => Error::Env(e),
            other => Error::Config(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_cancel_maps_to_cancelled() {
        let err: Error = InferenceError::Cancelled.into();
        assert!(matches!(err, Error::Cancelled));
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_error_is_retryable() {
        let rate_limited: Error = InferenceError::RateLimited {
            provider: "openai".into(),
        }
        .into();
        assert!(rate_limited.is_retryable());

        let invalid: Error = InferenceError::InvalidResponse {
            message: "truncated".into(),
        }
        .into();
        assert!(!invalid.is_retryable());
        assert_eq!(invalid.category(), ErrorCategory::Internal);

        let missing = Error::Store(StoreError::not_found("agent", "a1"));
        assert_eq!(missing.category(), ErrorCategory::Stateful);
    }

    #[test]
    fn test_config_error_conversion() {
        let err: Error = ConfigError::NotFound {
            key: "max_rounds".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.is_configuration_error());
        assert_eq!(err.to_string(), "Configuration error: Key not found: max_rounds");
    }

    #[test]
    fn test_decision_error_display() {
        let err = Error::InvalidDecision("speak targets unknown member 'z'".into());
        assert_eq!(
            err.to_string(),
            "Invalid group decision: speak targets unknown member 'z'"
        );
    }
}
