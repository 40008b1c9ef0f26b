//! Ollama LLM client (OpenAI-compatible API)
//!
//! Chapter prose is requested with `stream: true` and arrives as SSE
//! `data:` lines; enrichment calls use the plain completion endpoint.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::infrastructure::ports::{ChapterRequest, ChunkStream, LlmError, LlmPort};

/// Client for Ollama's OpenAI-compatible API
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

/// Default Ollama base URL.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Default model for Ollama.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        // Use 120 second timeout for LLM requests (they can be slow)
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create client from environment variables.
    ///
    /// Uses `OLLAMA_BASE_URL` and `OLLAMA_MODEL` environment variables,
    /// falling back to defaults if not set.
    pub fn from_env() -> Self {
        let base_url = std::env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_OLLAMA_BASE_URL.to_string());
        let model =
            std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string());
        Self::new(&base_url, &model)
    }

    fn chat_request(&self, request: &ChapterRequest, stream: bool) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.model.clone(),
            messages: build_messages(request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
        }
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_BASE_URL, DEFAULT_OLLAMA_MODEL)
    }
}

#[async_trait]
impl LlmPort for OllamaClient {
    async fn stream_chapter(&self, request: ChapterRequest) -> Result<ChunkStream, LlmError> {
        let api_request = self.chat_request(&request, true);

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
            return Err(LlmError::RequestFailed(error_text));
        }

        // Re-chunk the byte stream into SSE events, yielding one text
        // delta per item. The stream ends at `data: [DONE]` or EOF.
        let stream = futures_util::stream::unfold(
            SseDecoder::new(response.bytes_stream().boxed()),
            |mut decoder| async move { decoder.next_chunk().await.map(|item| (item, decoder)) },
        );

        Ok(Box::pin(stream))
    }

    async fn generate(&self, request: ChapterRequest) -> Result<String, LlmError> {
        let api_request = self.chat_request(&request, false);

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
            return Err(LlmError::RequestFailed(error_text));
        }

        let api_response: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in LLM response".to_string()))?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

fn build_messages(request: &ChapterRequest) -> Vec<OpenAIMessage> {
    let mut messages = Vec::new();

    if let Some(system) = &request.system_prompt {
        messages.push(OpenAIMessage {
            role: "system".to_string(),
            content: Some(system.clone()),
        });
    }

    messages.push(OpenAIMessage {
        role: "user".to_string(),
        content: Some(request.prompt.clone()),
    });

    messages
}

// =============================================================================
// SSE decoding
// =============================================================================

enum SseEvent {
    Chunk(String),
    Done,
    Skip,
}

/// Incremental decoder over the response byte stream. Buffers until a
/// full `data:` line is available, then parses the delta out of it.
struct SseDecoder<S> {
    bytes: S,
    buffer: String,
    finished: bool,
}

impl<S, B> SseDecoder<S>
where
    S: futures_util::Stream<Item = Result<B, reqwest::Error>> + Unpin,
    B: AsRef<[u8]>,
{
    fn new(bytes: S) -> Self {
        Self {
            bytes,
            buffer: String::new(),
            finished: false,
        }
    }

    async fn next_chunk(&mut self) -> Option<Result<String, LlmError>> {
        if self.finished {
            return None;
        }
        loop {
            if let Some(pos) = self.buffer.find('\n') {
                let line: String = self.buffer.drain(..=pos).collect();
                match parse_sse_line(line.trim()) {
                    Ok(SseEvent::Chunk(text)) if !text.is_empty() => return Some(Ok(text)),
                    Ok(SseEvent::Chunk(_)) | Ok(SseEvent::Skip) => continue,
                    Ok(SseEvent::Done) => {
                        self.finished = true;
                        return None;
                    }
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }
            match self.bytes.next().await {
                Some(Ok(chunk)) => self
                    .buffer
                    .push_str(&String::from_utf8_lossy(chunk.as_ref())),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(LlmError::StreamInterrupted(e.to_string())));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }
}

fn parse_sse_line(line: &str) -> Result<SseEvent, LlmError> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Skip);
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(SseEvent::Skip);
    }
    if payload == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk: OpenAIStreamChunk = serde_json::from_str(payload)
        .map_err(|e| LlmError::InvalidResponse(format!("Bad stream chunk: {e}")))?;

    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .unwrap_or_default();
    Ok(SseEvent::Chunk(text))
}

// =============================================================================
// OpenAI API types
// =============================================================================

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_line_yields_its_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Once upon"}}]}"#;
        match parse_sse_line(line) {
            Ok(SseEvent::Chunk(text)) => assert_eq!(text, "Once upon"),
            other => panic!("expected chunk, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn done_sentinel_ends_the_stream() {
        assert!(matches!(parse_sse_line("data: [DONE]"), Ok(SseEvent::Done)));
    }

    #[test]
    fn keepalives_and_blank_lines_are_skipped() {
        assert!(matches!(parse_sse_line(""), Ok(SseEvent::Skip)));
        assert!(matches!(parse_sse_line(": ping"), Ok(SseEvent::Skip)));
    }

    #[test]
    fn malformed_payload_is_an_invalid_response() {
        assert!(matches!(
            parse_sse_line("data: {not json"),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn system_prompt_precedes_the_user_message() {
        let request = ChapterRequest::new("Write chapter 1")
            .with_system_prompt("You are a storyteller")
            .with_temperature(0.9);
        let messages = build_messages(&request);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
    }
}
