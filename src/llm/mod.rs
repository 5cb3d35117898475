//! LLM integration module.
//!
//! Provides OpenAI-compatible clients for chat completions and
//! text embeddings.

mod client;
mod embeddings;

pub use client::{ChatClient, ChatOptions, LlmResponse, Message, Role, TokenUsage};
pub use embeddings::EmbeddingClient;
