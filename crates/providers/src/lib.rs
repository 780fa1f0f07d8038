//! LLM provider implementations for Mnemos.
//!
//! The OpenAI-compatible client implements both `mnemos_core::ModelCall`
//! (chat completions) and `mnemos_core::Embedder` (embeddings).

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
