//! Chat completion against an OpenAI-compatible backend, streaming or not.
//!
//! Streaming is pull-based: the caller polls a [`DeltaStream`] and the
//! producer suspends between server-sent events. Dropping the stream before
//! exhaustion drops the underlying HTTP response, releasing the transport.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::message::ChatMessage;
use crate::sampling::SamplingConfig;
use crate::types::RagError;

/// A fragment of a streamed tool invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    /// Identifier of the tool call this fragment belongs to, when present.
    pub id: Option<String>,
    /// Tool name, usually only on the first fragment of a call.
    pub name: Option<String>,
    /// Argument JSON fragment; concatenates across deltas of the same call.
    pub arguments: String,
}

/// One incremental fragment of a streamed generation response.
///
/// Consumers match exhaustively: print text fragments, dispatch tool-call
/// fragments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseDelta {
    /// A fragment of assistant text.
    Text(String),
    /// A fragment of a tool invocation.
    ToolCall(ToolCallDelta),
}

/// A generation request: ordered conversation, model, and decoding policy.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub sampling: SamplingConfig,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, model: impl Into<String>) -> Self {
        Self {
            messages,
            model: model.into(),
            sampling: SamplingConfig::Greedy,
        }
    }

    #[must_use]
    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }
}

/// Lazy, finite, non-restartable sequence of response deltas.
///
/// A mid-stream failure surfaces as one `Err` item, after which the stream
/// ends. Dropping the value cancels the underlying request.
pub struct DeltaStream {
    inner: BoxStream<'static, Result<ResponseDelta, RagError>>,
}

impl DeltaStream {
    pub fn new(inner: BoxStream<'static, Result<ResponseDelta, RagError>>) -> Self {
        Self { inner }
    }

    /// Drains the stream, concatenating text fragments and discarding
    /// tool-call fragments. Fails on the first mid-stream error.
    pub async fn collect_text(mut self) -> Result<String, RagError> {
        let mut out = String::new();
        while let Some(delta) = self.inner.next().await {
            match delta? {
                ResponseDelta::Text(fragment) => out.push_str(&fragment),
                ResponseDelta::ToolCall(_) => {}
            }
        }
        Ok(out)
    }
}

impl std::fmt::Debug for DeltaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaStream").finish_non_exhaustive()
    }
}

impl futures_util::Stream for DeltaStream {
    type Item = Result<ResponseDelta, RagError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Chat completion backend.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Returns the complete assistant message in one call.
    async fn complete(&self, request: ChatRequest) -> Result<ChatMessage, RagError>;

    /// Streams the response as incremental deltas.
    async fn stream(&self, request: ChatRequest) -> Result<DeltaStream, RagError>;
}

// Wire types for the OpenAI-compatible /v1/chat/completions endpoint.

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct StreamEvent {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamToolFunction>,
}

#[derive(Deserialize, Default)]
struct StreamToolFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Client for an OpenAI-compatible chat completion endpoint.
pub struct HttpChatClient {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: Option<String>,
}

impl HttpChatClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, RagError> {
        Ok(Self {
            client: config.http_client()?,
            endpoint: config.endpoint("v1/chat/completions")?,
            api_key: config.api_key.clone(),
        })
    }

    async fn send(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, RagError> {
        let (temperature, top_p) = request.sampling.request_params();
        let body = CompletionBody {
            model: &request.model,
            messages: &request.messages,
            stream,
            temperature,
            top_p,
        };
        let mut http = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }
        http.send()
            .await
            .map_err(|err| RagError::Generation(err.to_string()))?
            .error_for_status()
            .map_err(|err| RagError::Generation(err.to_string()))
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatMessage, RagError> {
        let response = self.send(&request, false).await?;
        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|err| RagError::Generation(err.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| RagError::Generation("backend returned no choices".to_string()))
    }

    async fn stream(&self, request: ChatRequest) -> Result<DeltaStream, RagError> {
        let response = self.send(&request, true).await?;
        Ok(sse_delta_stream(response))
    }
}

struct SseState {
    body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    buffer: Vec<u8>,
    finished: bool,
}

impl SseState {
    /// Pops the next complete `data:` payload from the buffer, if any.
    fn pop_event(&mut self) -> Option<String> {
        loop {
            let boundary = self
                .buffer
                .windows(2)
                .position(|window| window == b"\n\n")?;
            let frame: Vec<u8> = self.buffer.drain(..boundary + 2).collect();
            let frame = String::from_utf8_lossy(&frame);
            let mut payload = String::new();
            for line in frame.lines() {
                if let Some(rest) = line.strip_prefix("data:") {
                    payload.push_str(rest.trim_start());
                }
            }
            if !payload.is_empty() {
                return Some(payload);
            }
            // Comment or keep-alive frame; keep scanning.
        }
    }
}

fn parse_event(payload: &str) -> Result<Vec<ResponseDelta>, RagError> {
    let event: StreamEvent = serde_json::from_str(payload)
        .map_err(|err| RagError::Generation(format!("malformed stream event: {err}")))?;
    let mut deltas = Vec::new();
    for choice in event.choices {
        if let Some(text) = choice.delta.content {
            if !text.is_empty() {
                deltas.push(ResponseDelta::Text(text));
            }
        }
        if let Some(tool_calls) = choice.delta.tool_calls {
            for call in tool_calls {
                let function = call.function.unwrap_or_default();
                deltas.push(ResponseDelta::ToolCall(ToolCallDelta {
                    id: call.id,
                    name: function.name,
                    arguments: function.arguments.unwrap_or_default(),
                }));
            }
        }
        let _ = choice.finish_reason;
    }
    Ok(deltas)
}

/// Wraps a server-sent-event response body into a [`DeltaStream`].
///
/// The HTTP response is owned by the stream; dropping the stream drops the
/// connection.
fn sse_delta_stream(response: reqwest::Response) -> DeltaStream {
    let state = SseState {
        body: response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed(),
        buffer: Vec::new(),
        finished: false,
    };

    let stream = stream::unfold(
        (state, Vec::<ResponseDelta>::new()),
        |(mut state, mut pending)| async move {
            loop {
                if let Some(delta) = pending.pop() {
                    return Some((Ok(delta), (state, pending)));
                }
                if state.finished {
                    return None;
                }
                while let Some(payload) = state.pop_event() {
                    if payload == "[DONE]" {
                        return None;
                    }
                    match parse_event(&payload) {
                        Ok(mut deltas) => {
                            // Emit in arrival order; `pending` pops from the back.
                            deltas.reverse();
                            pending = deltas;
                            if let Some(delta) = pending.pop() {
                                return Some((Ok(delta), (state, pending)));
                            }
                        }
                        Err(err) => {
                            state.finished = true;
                            return Some((Err(err), (state, pending)));
                        }
                    }
                }
                match state.body.next().await {
                    Some(Ok(bytes)) => state.buffer.extend_from_slice(&bytes),
                    Some(Err(err)) => {
                        state.finished = true;
                        return Some((
                            Err(RagError::Generation(format!("stream transport failed: {err}"))),
                            (state, pending),
                        ));
                    }
                    None => {
                        state.finished = true;
                        return Some((
                            Err(RagError::Generation(
                                "stream ended before completion".to_string(),
                            )),
                            (state, pending),
                        ));
                    }
                }
            }
        },
    );

    DeltaStream::new(stream.boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_event_extracts_text_deltas() {
        let payload = r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        let deltas = parse_event(payload).unwrap();
        assert_eq!(deltas, vec![ResponseDelta::Text("Hel".to_string())]);
    }

    #[test]
    fn parse_event_extracts_tool_call_deltas() {
        let payload = r#"{"choices":[{"delta":{"tool_calls":[{"id":"call_1","function":{"name":"lookup","arguments":"{\"q\":"}}]},"finish_reason":null}]}"#;
        let deltas = parse_event(payload).unwrap();
        match &deltas[0] {
            ResponseDelta::ToolCall(call) => {
                assert_eq!(call.id.as_deref(), Some("call_1"));
                assert_eq!(call.name.as_deref(), Some("lookup"));
                assert_eq!(call.arguments, "{\"q\":");
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn parse_event_rejects_malformed_payloads() {
        let err = parse_event("not json").unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
    }

    #[test]
    fn pop_event_joins_data_lines_and_skips_keepalives() {
        let mut state = SseState {
            body: stream::empty().boxed(),
            buffer: b": keep-alive\n\ndata: {\"a\":1}\n\n".to_vec(),
            finished: false,
        };
        assert_eq!(state.pop_event().as_deref(), Some("{\"a\":1}"));
        assert_eq!(state.pop_event(), None);
    }

    #[test]
    fn pop_event_waits_for_complete_frames() {
        let mut state = SseState {
            body: stream::empty().boxed(),
            buffer: b"data: {\"partial\"".to_vec(),
            finished: false,
        };
        assert_eq!(state.pop_event(), None);
        state.buffer.extend_from_slice(b": true}\n\n");
        assert_eq!(state.pop_event().as_deref(), Some("{\"partial\": true}"));
    }
}
