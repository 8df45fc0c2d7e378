//! Context engineering: from stored conversation to inference input.

mod engineer;
mod extended;
mod knowledge;
mod memory;
mod template;

pub use engineer::{ContextEngineer, EngineeredMessageSet, SummaryFormatter, ToolsContext};
pub use extended::ExtendedContext;
pub use knowledge::{KnowledgeBase, KnowledgeContext, KnowledgeFile};
pub use memory::{MemoryEntry, USER_MEMORY_CLOSE, USER_MEMORY_OPEN, UserMemory};
pub use template::{apply_input_template, has_text_placeholder};

use thiserror::Error;

/// Errors raised while preparing an injection stage.
///
/// The pipeline never returns these; a failing stage is skipped and logged.
#[derive(Error, Debug)]
pub enum ContextError {
    /// Knowledge payload is malformed
    #[error("Invalid knowledge: {message}")]
    InvalidKnowledge {
        /// What is wrong with the payload
        message: String,
    },

    /// User memory payload is malformed
    #[error("Invalid user memory: {message}")]
    InvalidMemory {
        /// What is wrong with the payload
        message: String,
    },

    /// Extended context block cannot be rendered
    #[error("Invalid extended context: {message}")]
    InvalidExtendedContext {
        /// What is wrong with the block
        message: String,
    },

    /// JSON rendering failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for context operations
pub type ContextResult<T> = std::result::Result<T, ContextError>;
