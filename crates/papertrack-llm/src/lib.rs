//! LLM summarization over an OpenAI-compatible chat-completions endpoint.

pub mod client;
pub mod prompt;

pub use client::{parse_completion, ChatClient, ChatSettings, Completion};
pub use prompt::{build_prompt, truncate_content, TRUNCATION_MARKER};
