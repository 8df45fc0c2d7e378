//! Inference provider seam.
//!
//! Wire protocols live behind this trait; the engine only hands over an
//! engineered message list and the resolved tool schemas.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::types::{AssistantMessage, Message, ToolSchema};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Inference request failed: {message}")]
    Request { message: String },

    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("Model unavailable: {provider}/{model}")]
    ModelUnavailable { model: String, provider: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Inference cancelled")]
    Cancelled,
}

impl InferenceError {
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Request { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A cancellable language-model call.
///
/// Implementations should observe `token` at their own suspension points
/// and return [`InferenceError::Cancelled`] once it fires.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn infer(
        &self,
        model: &str,
        provider: &str,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        token: CancellationToken,
    ) -> Result<AssistantMessage, InferenceError>;
}

/// Races `infer` against its token so a provider that ignores cancellation
/// still releases the caller.
pub async fn infer_cancellable(
    provider_impl: &dyn InferenceProvider,
    model: &str,
    provider: &str,
    messages: &[Message],
    tools: Option<&[ToolSchema]>,
    token: CancellationToken,
) -> Result<AssistantMessage, InferenceError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(InferenceError::Cancelled),
        result = provider_impl.infer(model, provider, messages, tools, token.clone()) => result,
    }
}
