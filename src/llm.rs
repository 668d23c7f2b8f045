//! Chat-completion language models.
//!
//! The agents talk to a [`LanguageModel`]: one blocking call that returns the
//! whole completion and one streaming call that yields text deltas. The only
//! concrete provider is [`OpenAiCompatibleModel`], which speaks the
//! `/chat/completions` protocol shared by OpenAI, Ollama (`/v1`) and Gemini's
//! OpenAI-compatible endpoint.
//!
//! Streaming responses are Server-Sent Events: each `data: {...}` line
//! carries `choices[0].delta.content`, and `data: [DONE]` ends the stream.

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::http::{client_with_timeout, send_with_retry};

/// A stream of text deltas from a streamed completion.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One message of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A chat-completion model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run a completion and return the full text.
    async fn generate(&self, messages: &[PromptMessage], temperature: f32) -> Result<String>;

    /// Run a completion and return its text deltas as they arrive.
    async fn stream(&self, messages: &[PromptMessage], temperature: f32) -> Result<TextStream>;
}

/// Placeholder used when no model is configured.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    async fn generate(&self, _messages: &[PromptMessage], _temperature: f32) -> Result<String> {
        bail!("Language model provider is disabled")
    }

    async fn stream(&self, _messages: &[PromptMessage], _temperature: f32) -> Result<TextStream> {
        bail!("Language model provider is disabled")
    }
}

/// Client for any `/chat/completions` endpoint.
pub struct OpenAiCompatibleModel {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl OpenAiCompatibleModel {
    /// Build from config, reading the API key for the provider from the
    /// environment (`OPENAI_API_KEY` or `GEMINI_API_KEY`; Ollama needs none).
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = match config.provider.as_str() {
            "openai" => Some(
                std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?,
            ),
            "gemini" => Some(
                std::env::var("GEMINI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?,
            ),
            _ => None,
        };
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model must be specified"))?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(&config.provider).to_string());

        Ok(Self {
            client: client_with_timeout(config.timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            max_retries: config.max_retries,
        })
    }

    async fn send(
        &self,
        messages: &[PromptMessage],
        temperature: f32,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
            "stream": stream,
        });
        let url = format!("{}/chat/completions", self.base_url);

        send_with_retry(
            || {
                let request = self.client.post(&url).json(&body);
                match &self.api_key {
                    Some(key) => request.bearer_auth(key),
                    None => request,
                }
            },
            self.max_retries,
            "LLM",
        )
        .await
    }
}

fn default_base_url(provider: &str) -> &'static str {
    match provider {
        "ollama" => "http://localhost:11434/v1",
        "gemini" => "https://generativelanguage.googleapis.com/v1beta/openai",
        _ => "https://api.openai.com/v1",
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    async fn generate(&self, messages: &[PromptMessage], temperature: f32) -> Result<String> {
        let response = self.send(messages, temperature, false).await?;
        let completion: ChatCompletion = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("LLM response contained no message content"))
    }

    async fn stream(&self, messages: &[PromptMessage], temperature: f32) -> Result<TextStream> {
        let response = self.send(messages, temperature, true).await?;
        Ok(Box::pin(parse_sse_stream(response.bytes_stream())))
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Turn an SSE byte stream into the sequence of non-empty content deltas.
///
/// Bytes are buffered until a full line arrives, so a character split across
/// network chunks decodes intact. Lines that are not `data:` lines, or whose
/// payload is not a chunk, are skipped. A line that is not valid UTF-8 ends
/// the stream with an error. The stream ends at `[DONE]` or when the body
/// ends.
pub fn parse_sse_stream<S, B, E>(stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let body: BoxStream<'static, std::result::Result<B, E>> = stream.fuse().boxed();

    futures::stream::unfold(
        (body, Vec::<u8>::new(), false),
        |(mut body, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=newline).collect();
                    let line = match String::from_utf8(raw) {
                        Ok(line) => line,
                        Err(e) => {
                            return Some((
                                Err(anyhow::anyhow!("LLM stream is not valid UTF-8: {}", e)),
                                (body, buffer, true),
                            ));
                        }
                    };

                    let Some(data) = line.trim().strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        return None;
                    }
                    if let Some(text) = delta_text(data) {
                        return Some((Ok(text), (body, buffer, false)));
                    }
                    continue;
                }

                match body.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(bytes.as_ref()),
                    Some(Err(e)) => {
                        return Some((
                            Err(anyhow::anyhow!("LLM stream error: {}", e)),
                            (body, buffer, true),
                        ));
                    }
                    None => {
                        // A final line without a trailing newline.
                        if buffer.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        buffer.push(b'\n');
                    }
                }
            }
        },
    )
}

fn delta_text(data: &str) -> Option<String> {
    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
    let content = chunk.choices.into_iter().next()?.delta?.content?;
    if content.is_empty() {
        None
    } else {
        Some(content)
    }
}

/// Create the configured [`LanguageModel`].
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "openai" | "ollama" | "gemini" => Ok(Arc::new(OpenAiCompatibleModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
