// LLM backend adapters
// The orchestrator only ever hands these masked, shielded messages

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::LlmError;
use crate::llm::prompt_shield::ChatMessage;

/// Callback invoked with each streamed text fragment.
pub type ChunkSink<'a> = Box<dyn FnMut(&str) + Send + 'a>;

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Full completion for a conversation. Input messages are masked.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, LlmError>;

    /// Streaming completion; `on_chunk` sees each fragment, the full masked
    /// text is returned at the end.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
        on_chunk: ChunkSink<'_>,
    ) -> Result<String, LlmError>;
}

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai";

/// Groq adapter (OpenAI-compatible chat completions API).
pub struct GroqBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GroqBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
        stream: bool,
    ) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
            "stream": stream,
        })
    }
}

#[async_trait]
impl LlmBackend for GroqBackend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&self.build_body(messages, temperature, max_tokens, false))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider(format!("{}: {}", status, error_text)));
        }

        let payload: Value = response.json().await?;
        let content = payload["choices"]
            .as_array()
            .and_then(|c| c.first())
            .and_then(|c| c.pointer("/message/content"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| LlmError::Provider("no content in response".to_string()))?;

        debug!(chars = content.len(), "llm completion received");
        Ok(content.to_string())
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
        mut on_chunk: ChunkSink<'_>,
    ) -> Result<String, LlmError> {
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&self.build_body(messages, temperature, max_tokens, true))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LlmError::Provider(format!(
                "streaming request failed: {}",
                response.status()
            )));
        }

        let mut full_text = String::new();
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Process SSE line by line; hold incomplete lines in the buffer
            while let Some(newline_pos) = buffer.find('\n') {
                let line = buffer[..newline_pos].trim().to_string();
                buffer = buffer[newline_pos + 1..].to_string();

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    break;
                }
                if let Ok(payload) = serde_json::from_str::<Value>(data) {
                    if let Some(text) = payload
                        .pointer("/choices/0/delta/content")
                        .and_then(|t| t.as_str())
                    {
                        full_text.push_str(text);
                        on_chunk(text);
                    }
                }
            }
        }

        Ok(full_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url_built_once() {
        let backend = GroqBackend::with_base_url("key", "llama", "https://api.groq.com/openai/");
        assert_eq!(
            backend.completions_url(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_body_shape() {
        let backend = GroqBackend::new("key", "llama-3.3-70b-versatile");
        let body = backend.build_body(&[ChatMessage::user("hi")], 0.7, 1024, false);
        assert_eq!(body["model"], "llama-3.3-70b-versatile");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["stream"], false);
    }
}
