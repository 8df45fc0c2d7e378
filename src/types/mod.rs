//! Core types for the agent engine.

mod message;
mod tool;

pub use message::{AssistantMessage, ConversationMessage, Message, Role};
pub use tool::{FunctionDefinition, ToolCall, ToolSchema, ToolSchemaType};
