//! Structured span definitions for tracing.

use tracing::{Level, Span, span};

use crate::operation::{OperationContext, OperationKind};

/// Span wrapping the body of one operation.
pub fn operation_span(operation_id: &str, kind: OperationKind, context: &OperationContext) -> Span {
    span!(
        Level::INFO,
        "operation.run",
        operation_id = operation_id,
        kind = kind.as_str(),
        agent_id = %context.agent_id,
        group_id = context.group_id.as_deref().unwrap_or(""),
        topic_id = context.topic_id.as_deref().unwrap_or(""),
        scope = context.scope.as_str(),
        otel.name = format!("operation.{}", kind.as_str()),
    )
}

/// Span around a single inference call.
pub fn inference_span(model: &str, provider: &str, message_count: usize, tool_count: usize) -> Span {
    span!(
        Level::DEBUG,
        "inference.call",
        model = model,
        provider = provider,
        message_count = message_count,
        tool_count = tool_count,
        otel.name = "inference.call",
    )
}

/// Span around one supervised group round.
pub fn round_span(group_id: &str, topic_id: &str, round: usize) -> Span {
    span!(
        Level::INFO,
        "group.round",
        group_id = group_id,
        topic_id = topic_id,
        round = round,
        otel.name = "group.round",
    )
}

/// Span around a builtin tool invocation.
pub fn tool_span(tool_name: &str, tool_call_id: &str) -> Span {
    span!(
        Level::INFO,
        "tool.execute",
        tool_name = tool_name,
        tool_call_id = tool_call_id,
        otel.name = format!("tool.{}", tool_name),
    )
}
