//! Prelude module for convenient imports.
//!
//! ```rust
//! use agent_engine::prelude::*;
//! ```

pub use crate::{Error, ErrorCategory, Result};

// Operations
pub use crate::operation::{
    OperationContext, OperationKind, OperationRegistry, OperationStatus, RetentionPolicy,
};

// Execution
pub use crate::agent::{AgentExecutor, AgentTurn, TurnOutcome};
pub use crate::group::{GroupChat, GroupDecision, GroupOrchestrator, StopReason};

// Context and tools
pub use crate::context::ContextEngineer;
pub use crate::tools::{Capabilities, ExecutionEnvironment, ToolManifest, ToolResolver};

// Collaborator seams
pub use crate::provider::{InferenceError, InferenceProvider};
pub use crate::store::{AgentConfig, PersistenceStore};
pub use crate::tools::{BuiltinToolExecutor, ManifestSource};

// Configuration
pub use crate::config::{ConfigBuilder, ConfigProvider, ConfigProviderExt, EngineSettings};

pub use crate::types::{ConversationMessage, Message, Role};
