//! Model client boundary
//!
//! The engine's only view of a language model provider. Adapters translate
//! this generic "generate text with tools" call into a vendor's wire format;
//! the engine only needs the normalized output and a retryability signal.

use crate::types::{Message, ToolCall, ToolDef};
use crate::usage::Usage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// One generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateTextRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolDef>,
    pub temperature: Option<f32>,
    /// Provider-level retry budget, applied inside the client
    pub max_retries: u32,
    /// Provider-specific configuration, opaque to the engine
    #[serde(default)]
    pub provider_config: Value,
}

/// Normalized model output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedMessage {
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub usage: Usage,
    /// The model's context window, when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window_size: Option<u64>,
}

/// Model call failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("model request failed: {reason}")]
    Request { reason: String, retryable: bool },

    #[error("model request timed out after {0:?}")]
    Timeout(Duration),
}

impl ModelError {
    /// Whether the engine's retry path should absorb this failure
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { retryable, .. } => *retryable,
            Self::Timeout(_) => true,
        }
    }

    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::Request {
            reason: reason.into(),
            retryable: true,
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Request {
            reason: reason.into(),
            retryable: false,
        }
    }
}

/// Abstraction over model providers
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate_text(
        &self,
        request: &GenerateTextRequest,
    ) -> Result<GeneratedMessage, ModelError>;

    /// Provider name, for logging
    fn provider(&self) -> &'static str;
}
