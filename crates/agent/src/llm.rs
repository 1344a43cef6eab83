use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// One completion request: ordered messages plus sampling bounds.
///
/// Temperature 0 keeps sampling deterministic; the token cap bounds the
/// reply size so a runaway completion cannot blow up parsing downstream.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub max_completion_tokens: u32,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages, max_completion_tokens: 400, temperature: 0.0 }
    }

    pub fn with_max_completion_tokens(mut self, max_completion_tokens: u32) -> Self {
        self.max_completion_tokens = max_completion_tokens;
        self
    }
}

#[derive(Clone, Debug, Error)]
pub enum ChatError {
    #[error("chat request timed out")]
    Timeout,
    #[error("chat endpoint rate limited the request")]
    RateLimited,
    #[error("could not reach chat endpoint: {0}")]
    Connect(String),
    #[error("chat endpoint returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("chat endpoint reply had no usable completion: {0}")]
    InvalidResponse(String),
}

impl ChatError {
    /// Transient faults are worth another attempt; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited | Self::Connect(_))
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send one completion request and return the raw reply text.
    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError>;
}
