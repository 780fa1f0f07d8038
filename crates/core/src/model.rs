//! ModelCall trait: the abstraction over the hosted language model.
//!
//! The dispatch loop only ever needs "prompt in, completion out". Provider
//! crates implement this on top of their HTTP clients; wrappers (memory
//! recall, scripted test models) compose around it.

use async_trait::async_trait;
use std::sync::Arc;
use crate::error::ProviderError;
use crate::request_id::RequestId;

/// A single model invocation: the full context string in, raw text out.
#[async_trait]
pub trait ModelCall: Send + Sync {
    async fn call(&self, prompt: &str, request_id: &RequestId) -> Result<String, ProviderError>;
}

#[async_trait]
impl<T: ModelCall + ?Sized> ModelCall for Arc<T> {
    async fn call(&self, prompt: &str, request_id: &RequestId) -> Result<String, ProviderError> {
        (**self).call(prompt, request_id).await
    }
}

/// Truncate `text` at the first occurrence of any stop sequence.
pub fn apply_stop_sequences(text: &str, stop: &[String]) -> String {
    let cut = stop
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
        .unwrap_or(text.len());
    text[..cut].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_sequences_cut_at_earliest_match() {
        let stop = vec!["END".to_string(), "Observation:".to_string()];
        let text = "answer Observation: x END";
        assert_eq!(apply_stop_sequences(text, &stop), "answer ");
    }

    #[test]
    fn no_stop_sequences_keeps_text() {
        assert_eq!(apply_stop_sequences("hello", &[]), "hello");
        assert_eq!(apply_stop_sequences("hello", &[String::new()]), "hello");
    }
}
