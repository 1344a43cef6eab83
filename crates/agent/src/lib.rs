//! Outline generation - LLM-backed slide outline production
//!
//! This crate owns the only step of the pipeline that talks to a language
//! model. It is deliberately narrow:
//!
//! 1. **Client seam** (`llm`) - an object-safe `ChatClient` trait so the
//!    HTTP client is constructed once at bootstrap and substituted with a
//!    scripted double in tests.
//! 2. **Transport** (`openai`) - a reqwest client for OpenAI-compatible
//!    chat-completions endpoints (Azure and plain flavors).
//! 3. **Generator** (`generator`) - the prompt contract, the exponential
//!    backoff wrapper, and strict parsing of the reply into an `Outline`.
//!
//! # Retry principle
//!
//! Only transient transport faults (timeout, rate limit, connect failure)
//! are retried, under a hard elapsed-time budget. A reply that fails to
//! parse is a contract violation by the endpoint and is never retried.

pub mod generator;
pub mod llm;
pub mod openai;

pub use generator::{GenerateError, OutlineBrief, OutlineGenerator, RetryPolicy};
pub use llm::{ChatClient, ChatError, ChatMessage, ChatRequest, ChatRole};
pub use openai::{ClientBuildError, OpenAiChatClient};
