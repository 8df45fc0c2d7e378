//! Observability for the engine.
//!
//! Structured `tracing` spans for operations, inference calls, tool calls and
//! group rounds, plus atomic counters summarising operation lifecycle.

mod metrics;
mod spans;

pub use metrics::{Counter, EngineMetrics, Gauge, MetricsSummary};
pub use spans::{inference_span, operation_span, round_span, tool_span};
