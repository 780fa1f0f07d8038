//! OpenAI-compatible provider implementation.
//!
//! Works with DashScope's compatible mode, OpenAI, OpenRouter, Ollama, vLLM
//! and any other endpoint exposing `/chat/completions` and `/embeddings`.
//!
//! Supports:
//! - Single-message chat completions with client-side stop sequences
//! - Embeddings (used by the vector memory store)

use async_trait::async_trait;
use mnemos_config::ProviderConfig;
use mnemos_core::error::{MemoryError, ProviderError};
use mnemos_core::model::apply_stop_sequences;
use mnemos_core::{Embedder, ModelCall, RequestId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    embedding_model: String,
    extra_body: serde_json::Map<String, serde_json::Value>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
            embedding_model: String::new(),
            extra_body: serde_json::Map::new(),
            client,
        })
    }

    /// Build a provider from the `[provider]` config section.
    ///
    /// Fails with [`ProviderError::NotConfigured`] when no API key is set.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(
                "no API key: set MNEMOS_API_KEY, DASHSCOPE_API_KEY or OPENAI_API_KEY, \
                 or provider.api_key in ~/.mnemos/config.toml"
                    .into(),
            )
        })?;

        Ok(Self::new(
            &config.base_url,
            api_key,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )?
        .with_temperature(config.temperature)
        .with_embedding_model(&config.embedding_model))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Extra fields merged into every completion request body.
    pub fn with_extra_body(mut self, extra: serde_json::Map<String, serde_json::Value>) -> Self {
        self.extra_body = extra;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    fn completion_body(&self, prompt: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [ApiMessage { role: "user".into(), content: Some(prompt.to_string()) }],
            "temperature": self.temperature,
            "stream": false,
        });
        if let Some(obj) = body.as_object_mut() {
            for (k, v) in &self.extra_body {
                obj.insert(k.clone(), v.clone());
            }
        }
        body
    }

    /// Send one user message and return the completion text, truncated at
    /// the first occurrence of any `stop` string.
    pub async fn call(&self, prompt: &str, stop: &[String]) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.completion_body(prompt);

        debug!(model = %self.model, prompt_chars = prompt.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        check_status(status)?;
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let text = extract_content(api_response)?;
        Ok(apply_stop_sequences(&text, stop))
    }

    /// Embed a batch of texts with the configured embedding model.
    pub async fn embed_texts(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if self.embedding_model.is_empty() {
            return Err(ProviderError::NotConfigured("no embedding model configured".into()));
        }
        let url = format!("{}/embeddings", self.base_url);

        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": inputs,
            "encoding_format": "float",
        });

        debug!(
            model = %self.embedding_model,
            count = inputs.len(),
            "Sending embedding request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        check_status(status)?;
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let mut api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        if api_resp.data.len() != inputs.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                api_resp.data.len()
            )));
        }
        api_resp.data.sort_by_key(|d| d.index);
        Ok(api_resp.data.into_iter().map(|d| d.embedding).collect())
    }
}

fn check_status(status: u16) -> Result<(), ProviderError> {
    match status {
        429 => Err(ProviderError::RateLimited {
            retry_after_secs: 5,
        }),
        401 | 403 => Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        _ => Ok(()),
    }
}

/// Pull the text out of the first choice: `message.content`, else legacy `text`.
fn extract_content(response: ApiResponse) -> Result<String, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

    choice
        .message
        .and_then(|m| m.content)
        .or(choice.text)
        .ok_or_else(|| ProviderError::InvalidResponse("Choice carries no text content".into()))
}

#[async_trait]
impl ModelCall for OpenAiCompatProvider {
    async fn call(&self, prompt: &str, request_id: &RequestId) -> Result<String, ProviderError> {
        debug!(request_id = %request_id, "Model call");
        OpenAiCompatProvider::call(self, prompt, &[]).await
    }
}

#[async_trait]
impl Embedder for OpenAiCompatProvider {
    fn model(&self) -> &str {
        &self.embedding_model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
        self.embed_texts(texts)
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))
    }
}

// --- API wire types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    message: Option<ApiMessage>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn provider(base_url: &str) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(base_url, "sk-test", "qwen-plus", Duration::from_secs(5)).unwrap()
    }

    /// Serve exactly one HTTP request with a canned JSON body.
    async fn serve_once(status: u16, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let p = provider("https://example.com/v1/");
        assert_eq!(p.base_url, "https://example.com/v1");
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = ProviderConfig::default();
        let err = OpenAiCompatProvider::from_config(&config).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));

        let config = ProviderConfig {
            api_key: Some("sk-x".into()),
            embedding_model: "text-embedding-v2".into(),
            ..ProviderConfig::default()
        };
        let p = OpenAiCompatProvider::from_config(&config).unwrap();
        assert_eq!(p.model_name(), "qwen-plus");
        assert_eq!(p.embedding_model(), "text-embedding-v2");
    }

    #[test]
    fn completion_body_is_single_user_message() {
        let mut extra = serde_json::Map::new();
        extra.insert("enable_search".into(), serde_json::json!(true));
        let p = provider("http://localhost").with_extra_body(extra);
        let body = p.completion_body("hi there");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi there");
        assert_eq!(body["enable_search"], true);
    }

    #[test]
    fn content_falls_back_to_text() {
        let resp: ApiResponse =
            serde_json::from_str(r#"{"choices":[{"text":"legacy"}]}"#).unwrap();
        assert_eq!(extract_content(resp).unwrap(), "legacy");

        let resp: ApiResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            extract_content(resp),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn parse_embedding_response() {
        let data = r#"{
            "data": [
                {"embedding": [0.1, 0.2, 0.3], "index": 0},
                {"embedding": [0.4, 0.5, 0.6], "index": 1}
            ],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[1].embedding, vec![0.4, 0.5, 0.6]);
    }

    #[tokio::test]
    async fn call_truncates_at_stop_sequence() {
        let base = serve_once(
            200,
            r#"{"choices":[{"message":{"role":"assistant","content":"The answer is 4.\nObservation: junk"}}]}"#,
        )
        .await;
        let p = provider(&base);
        let out = p
            .call("2+2?", &["Observation:".to_string()])
            .await
            .unwrap();
        assert_eq!(out, "The answer is 4.\n");
    }

    #[tokio::test]
    async fn call_maps_auth_failure() {
        let base = serve_once(401, r#"{"error":"bad key"}"#).await;
        let err = provider(&base).call("hi", &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn embed_without_model_is_not_configured() {
        let p = provider("http://127.0.0.1:9");
        let err = p.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, MemoryError::EmbeddingFailed(_)));
    }
}
