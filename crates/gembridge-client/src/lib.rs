//! gembridge-client: Gemini chat-completion adapter.
//!
//! Translates generic chat-completion requests into Google Gemini
//! `generateContent` calls, normalizes buffered and streaming responses
//! into a stable schema, and classifies provider failures into a closed
//! error taxonomy callers can branch on.

mod client;
mod error;
pub mod config;
pub mod sse;
pub mod types;

pub use client::GeminiClient;
pub use config::{GeminiConfig, SharedConfig, DEFAULT_BASE_URL};
pub use error::GeminiError;
pub use types::{
    ChatCompletion, ChatMessage, Choice, GenerationRequest, ModelInfo, Role, StreamEvent, Usage,
};
