//! Chat provider abstraction for LLM inference
//!
//! The session only needs one non-streaming completion per turn. `ChatProvider` is the
//! seam; `openai::OpenAiCompatibleProvider` is the HTTP implementation.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

pub use openai::OpenAiCompatibleProvider;

/// Message role in a chat-completion request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters sent with every request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 1.0,
        }
    }
}

/// A complete chat-completion request
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
}

/// Token counts reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// The finished answer for one request
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    /// Model that actually served the request
    pub model: String,
    pub usage: Usage,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Run one chat completion to the end and return the full answer
    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ProviderError>;

    /// Get the provider name (e.g., "openai-compatible")
    fn provider_name(&self) -> &'static str;
}
