//! Streaming chat-completion client.
//!
//! [`OpenAiChatModel`] posts to `{base_url}/chat/completions` with
//! `stream: true` and decodes the server-sent event body incrementally:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! The returned [`DeltaStream`] yields each non-empty `delta.content` and
//! ends cleanly only after `data: [DONE]`. A body that ends before
//! `[DONE]`, an `{"error": ...}` frame, or an unparseable frame yields one
//! `Err` and then ends.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;

use ragline_core::error::ProviderError;
use ragline_core::models::ChatMessage;

use crate::config::{env_secret, LlmConfig, LLM_API_KEY_ENV};

/// Incremental text deltas from a model provider.
pub type DeltaStream = BoxStream<'static, Result<String, ProviderError>>;

/// A streaming language-model backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Start a completion. Status errors surface here; failures after the
    /// first byte surface as an `Err` item in the stream.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<DeltaStream, ProviderError>;
}

/// OpenAI-compatible streaming chat client.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    config: LlmConfig,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: env_secret(LLM_API_KEY_ENV),
            config: config.clone(),
        })
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "repetition_penalty": self.config.repetition_penalty,
            "stream": true,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<DeltaStream, ProviderError> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Accept", "text/event-stream")
            .json(&self.request_body(messages));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|b| b.to_vec())
                    .map_err(|e| ProviderError::Transport(e.to_string()))
            })
            .boxed();
        Ok(decode_sse(bytes))
    }
}

/// One decoded SSE event.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Delta(String),
    Done,
}

/// Line-buffered decoder for `data:` events.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every event completed by them.
    ///
    /// Events are dispatched per `data:` line. Comments, `event:` and `id:`
    /// lines and deltas with empty content are skipped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<SseFrame, ProviderError>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(frame) = parse_line(line) {
                out.push(frame);
            }
        }
        out
    }
}

fn parse_line(line: &str) -> Option<Result<SseFrame, ProviderError>> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(Ok(SseFrame::Done));
    }

    let json: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Some(Err(ProviderError::Malformed(format!("stream frame: {}", e)))),
    };
    if let Some(err) = json.get("error") {
        let msg = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Some(Err(ProviderError::Malformed(format!("error frame: {}", msg))));
    }

    let content = json
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .unwrap_or_default();
    if content.is_empty() {
        None
    } else {
        Some(Ok(SseFrame::Delta(content.to_string())))
    }
}

struct DecodeState {
    bytes: BoxStream<'static, Result<Vec<u8>, ProviderError>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<SseFrame, ProviderError>>,
    finished: bool,
}

/// Turn a raw byte stream into a [`DeltaStream`].
pub fn decode_sse(bytes: BoxStream<'static, Result<Vec<u8>, ProviderError>>) -> DeltaStream {
    let state = DecodeState {
        bytes,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }
            if let Some(frame) = st.pending.pop_front() {
                match frame {
                    Ok(SseFrame::Delta(text)) => return Some((Ok(text), st)),
                    Ok(SseFrame::Done) => return None,
                    Err(e) => {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                }
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = st.decoder.push(&chunk);
                    st.pending.extend(frames);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    // Flush a final line that lacked its newline.
                    let frames = st.decoder.push(b"\n");
                    if frames.is_empty() {
                        st.finished = true;
                        return Some((
                            Err(ProviderError::Transport(
                                "stream ended before [DONE]".to_string(),
                            )),
                            st,
                        ));
                    }
                    st.pending.extend(frames);
                    st.pending.push_back(Err(ProviderError::Transport(
                        "stream ended before [DONE]".to_string(),
                    )));
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> BoxStream<'static, Result<Vec<u8>, ProviderError>> {
        let owned: Vec<Result<Vec<u8>, ProviderError>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned).boxed()
    }

    fn delta(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    async fn collect(s: DeltaStream) -> Vec<Result<String, ProviderError>> {
        s.collect().await
    }

    #[tokio::test]
    async fn test_decodes_deltas_until_done() {
        let body = format!("{}{}data: [DONE]\n\n", delta("Hel"), delta("lo"));
        let out = collect(decode_sse(chunks(&[&body]))).await;
        assert_eq!(out, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
    }

    #[tokio::test]
    async fn test_frames_split_across_chunks() {
        let body = format!("{}{}data: [DONE]\n\n", delta("a"), delta("b"));
        let (left, right) = body.split_at(17);
        let out = collect(decode_sse(chunks(&[left, right]))).await;
        assert_eq!(out, vec![Ok("a".to_string()), Ok("b".to_string())]);
    }

    #[tokio::test]
    async fn test_eof_before_done_is_error() {
        let body = delta("partial");
        let out = collect(decode_sse(chunks(&[&body]))).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Ok("partial".to_string()));
        assert!(matches!(out[1], Err(ProviderError::Transport(_))));
    }

    #[tokio::test]
    async fn test_error_frame_ends_stream() {
        let body = format!(
            "{}data: {{\"error\": {{\"message\": \"overloaded\"}}}}\n\n{}",
            delta("x"),
            delta("never")
        );
        let out = collect(decode_sse(chunks(&[&body]))).await;
        assert_eq!(out.len(), 2);
        match &out[1] {
            Err(ProviderError::Malformed(msg)) => assert!(msg.contains("overloaded")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream() {
        let items: Vec<Result<Vec<u8>, ProviderError>> = vec![
            Ok(delta("ok").into_bytes()),
            Err(ProviderError::Transport("reset".to_string())),
        ];
        let out = collect(decode_sse(stream::iter(items).boxed())).await;
        assert_eq!(out[0], Ok("ok".to_string()));
        assert_eq!(out[1], Err(ProviderError::Transport("reset".to_string())));
    }

    #[test]
    fn test_decoder_skips_noise() {
        let mut d = SseDecoder::new();
        let frames = d.push(b": keep-alive\r\nevent: message\r\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\r\n\r\n");
        assert!(frames.is_empty());
        let frames = d.push(b"data: [DONE]\r\n");
        assert_eq!(frames, vec![Ok(SseFrame::Done)]);
    }

    #[test]
    fn test_request_body() {
        let model = OpenAiChatModel::new(&LlmConfig::default()).unwrap();
        let body = model.request_body(&[ChatMessage::user("hi")]);
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
    }
}
