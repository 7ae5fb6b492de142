//! Gemini API client.
//!
//! Builds `generateContent` payloads, executes buffered or streaming
//! requests, classifies failures into `GeminiError`, and normalizes
//! provider responses into the stable `ChatCompletion` shape.

use crate::config::{GeminiConfig, SharedConfig};
use crate::error::GeminiError;
use crate::types::{
    ChatCompletion, ChatMessage, Choice, GenerationRequest, ModelInfo, Role, StreamEvent, Usage,
};
use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Client for the Gemini generative-language API.
///
/// Holds no cross-call mutable state; each call owns its own transport
/// session for its duration, so one client is safe to share across tasks.
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    /// Create a client from a resolved configuration.
    ///
    /// Fails before any network activity when the API key is missing. The
    /// configured timeout bounds the whole call for buffered requests and
    /// per-read delivery for streams.
    pub fn new(config: GeminiConfig) -> Result<Self, GeminiError> {
        if config.api_key.is_empty() {
            return Err(GeminiError::Api {
                message: "Gemini API key is required".to_string(),
                status: None,
            });
        }
        let client = reqwest::Client::builder()
            .read_timeout(config.timeout())
            .build()?;
        Ok(Self { client, config })
    }

    /// Create a client from a snapshot of the shared configuration.
    ///
    /// Fails when the adapter is disabled or the key is missing, in both
    /// cases before any network call.
    pub fn from_shared(shared: &SharedConfig) -> Result<Self, GeminiError> {
        let config = shared.snapshot();
        if !config.enabled {
            return Err(GeminiError::InvalidRequest(
                "Gemini API is not enabled".to_string(),
            ));
        }
        Self::new(config)
    }

    /// List models available at the configured endpoint.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, GeminiError> {
        let response = self
            .client
            .get(&self.config.api_base_url)
            .header("x-goog-api-key", &self.config.api_key)
            .timeout(self.config.timeout())
            .send()
            .await?;
        let response = check_status(response, "").await?;

        let list: ModelList = response.json().await.map_err(|e| GeminiError::Api {
            message: format!("failed to parse model list: {e}"),
            status: None,
        })?;
        Ok(list.models.into_iter().map(to_model_info).collect())
    }

    /// Generate a completion, buffered.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<ChatCompletion, GeminiError> {
        let url = generate_url(&self.config.api_base_url, &request.model, false);
        debug!(model = %request.model, "dispatching generateContent");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .timeout(self.config.timeout())
            .json(&build_request_body(request))
            .send()
            .await?;
        let response = check_status(response, &request.model).await?;

        let payload: GenerateResponse = response.json().await.map_err(|e| GeminiError::Api {
            message: format!("failed to parse response: {e}"),
            status: None,
        })?;
        normalize(payload)
    }

    /// Generate a completion as a lazy stream of fragments.
    ///
    /// The returned stream is finite and always ends with a terminal event:
    /// `Done` on success, or a single in-band `Error` when the transport or
    /// a frame fails midway. Dropping the stream releases the connection.
    pub async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<BoxStream<'static, StreamEvent>, GeminiError> {
        let url = generate_url(&self.config.api_base_url, &request.model, true);
        debug!(model = %request.model, "dispatching streaming generateContent");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&build_request_body(request))
            .send()
            .await?;
        let response = check_status(response, &request.model).await?;

        Ok(event_stream(response.bytes_stream()))
    }
}

/// Resource path for a generation call; streaming asks for an event stream.
fn generate_url(base: &str, model: &str, stream: bool) -> String {
    let mut url = format!("{base}/{model}:generateContent");
    if stream {
        url.push_str("?alt=sse");
    }
    url
}

/// Rewrite messages into the provider's content-part schema.
///
/// Absent options are forwarded as JSON null; the provider applies its own
/// defaults.
fn build_request_body(request: &GenerationRequest) -> Value {
    let contents: Vec<Value> = request
        .messages
        .iter()
        .map(|msg| {
            json!({
                "role": msg.role.as_str(),
                "parts": [{ "text": msg.content }],
            })
        })
        .collect();

    json!({
        "contents": contents,
        "generationConfig": {
            "temperature": request.temperature,
            "maxOutputTokens": request.max_output_tokens,
        },
    })
}

/// Classify a non-2xx response into the taxonomy.
///
/// The provider's error envelope supplies the message; when the body does
/// not parse, the raw status line stands in.
async fn check_status(
    response: reqwest::Response,
    model: &str,
) -> Result<reqwest::Response, GeminiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let fallback = format!("HTTP {status}");
    let message = match response.json::<ErrorEnvelope>().await {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ => fallback,
    };
    warn!(status = status.as_u16(), "Gemini API error: {message}");
    Err(GeminiError::classify(status.as_u16(), message, model))
}

/// Normalize one provider response envelope into a `ChatCompletion`.
///
/// Takes the first candidate and its first content part. Gemini does not
/// report token counts for this interaction type, so usage stays zero.
fn normalize(payload: GenerateResponse) -> Result<ChatCompletion, GeminiError> {
    let candidate = payload
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| GeminiError::InvalidRequest("no response from the model".to_string()))?;

    let finish_reason = candidate
        .finish_reason
        .unwrap_or_else(|| "stop".to_string());

    let part = candidate
        .content
        .parts
        .into_iter()
        .next()
        .ok_or_else(|| GeminiError::InvalidRequest("empty response from the model".to_string()))?;

    Ok(ChatCompletion {
        choices: vec![Choice {
            message: ChatMessage {
                role: Role::Assistant,
                content: part.text,
            },
            finish_reason,
        }],
        usage: Usage::default(),
    })
}

/// Parse one framed stream line.
///
/// Keep-alive and partial frames are expected; anything that is not a JSON
/// response envelope is skipped. Each line is an independent value, never
/// accumulated into a shared buffer.
fn parse_stream_line(line: &str) -> Option<GenerateResponse> {
    let line = line.trim();
    let data = line.strip_prefix("data: ").unwrap_or(line);
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    serde_json::from_str(data).ok()
}

/// Turn a raw byte stream of newline-delimited frames into terminal-marked
/// events: fragments, then `Done`, or fragments and one `Error` terminal.
fn event_stream<S, B, E>(bytes: S) -> BoxStream<'static, StreamEvent>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<GeminiError> + Send + 'static,
{
    let mut buffer = String::new();
    let fragments = bytes
        .map(Some)
        .chain(stream::once(future::ready(None)))
        .map(move |chunk| -> Result<Vec<ChatCompletion>, GeminiError> {
            let mut chunks = Vec::new();
            match chunk {
                Some(chunk) => {
                    let chunk = chunk.map_err(Into::into)?;
                    buffer.push_str(&String::from_utf8_lossy(chunk.as_ref()));

                    while let Some(pos) = buffer.find('\n') {
                        let line = buffer[..pos].to_string();
                        buffer.drain(..=pos);
                        if let Some(frame) = parse_stream_line(&line) {
                            chunks.push(normalize(frame)?);
                        }
                    }
                }
                None => {
                    // The last frame may arrive without a trailing newline.
                    let rest = std::mem::take(&mut buffer);
                    if let Some(frame) = parse_stream_line(&rest) {
                        chunks.push(normalize(frame)?);
                    }
                }
            }
            Ok(chunks)
        })
        .flat_map(|result| match result {
            Ok(chunks) => stream::iter(chunks.into_iter().map(Ok).collect::<Vec<_>>()),
            Err(e) => stream::iter(vec![Err(e)]),
        });

    fragments
        .map(Some)
        .chain(stream::once(future::ready(None)))
        .scan(false, |failed, item| {
            let event = match item {
                _ if *failed => None,
                Some(Ok(chunk)) => Some(StreamEvent::Chunk(chunk)),
                Some(Err(e)) => {
                    *failed = true;
                    Some(StreamEvent::Error {
                        message: e.to_string(),
                        code: Some(e.status_code()),
                    })
                }
                None => Some(StreamEvent::Done),
            };
            future::ready(event)
        })
        .boxed()
}

fn to_model_info(entry: ModelEntry) -> ModelInfo {
    let id = entry
        .name
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    let display_name = entry.display_name.unwrap_or_else(|| entry.name.clone());
    ModelInfo {
        id,
        display_name,
        description: entry.description,
        token_limit: entry.token_limit,
    }
}

// — Gemini response types for deserialization —

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "tokenLimit", default)]
    token_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(stream: bool) -> GenerationRequest {
        GenerationRequest {
            model: "gemini-pro".to_string(),
            messages: vec![ChatMessage::user("hi")],
            temperature: None,
            max_output_tokens: None,
            stream,
        }
    }

    #[test]
    fn test_missing_api_key_fails_without_network() {
        let err = GeminiClient::new(GeminiConfig::default()).err().unwrap();
        assert!(err.to_string().contains("API key is required"));
    }

    #[test]
    fn test_disabled_config_fails_without_network() {
        let shared = SharedConfig::new(GeminiConfig {
            api_key: "k".to_string(),
            enabled: false,
            ..Default::default()
        });
        let err = GeminiClient::from_shared(&shared).err().unwrap();
        assert!(matches!(err, GeminiError::InvalidRequest(_)));
        assert!(err.to_string().contains("not enabled"));
    }

    #[test]
    fn test_generate_url() {
        assert_eq!(
            generate_url("https://api.test/models", "gemini-pro", false),
            "https://api.test/models/gemini-pro:generateContent"
        );
        assert_eq!(
            generate_url("https://api.test/models", "gemini-pro", true),
            "https://api.test/models/gemini-pro:generateContent?alt=sse"
        );
    }

    #[test]
    fn test_build_request_body() {
        let mut req = request(false);
        req.temperature = Some(0.7);
        req.max_output_tokens = Some(1024);

        let body = build_request_body(&req);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(body["generationConfig"]["temperature"], 0.7);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn test_build_request_body_forwards_absent_options_as_null() {
        let body = build_request_body(&request(false));
        assert!(body["generationConfig"]["temperature"].is_null());
        assert!(body["generationConfig"]["maxOutputTokens"].is_null());
    }

    #[test]
    fn test_normalize_round_trip() {
        let payload: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "hello" }] },
                "finishReason": "stop"
            }]
        }))
        .unwrap();

        let completion = normalize(payload).unwrap();
        assert_eq!(completion.choices.len(), 1);
        assert_eq!(completion.choices[0].message.role, Role::Assistant);
        assert_eq!(completion.choices[0].message.content, "hello");
        assert_eq!(completion.choices[0].finish_reason, "stop");
        assert_eq!(completion.usage, Usage::default());
    }

    #[test]
    fn test_normalize_no_candidates() {
        let payload: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        let err = normalize(payload).err().unwrap();
        assert!(matches!(err, GeminiError::InvalidRequest(_)));
        assert!(err.to_string().contains("no response from the model"));
    }

    #[test]
    fn test_normalize_empty_parts() {
        let payload: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [] } }]
        }))
        .unwrap();
        let err = normalize(payload).err().unwrap();
        assert!(matches!(err, GeminiError::InvalidRequest(_)));
        assert!(err.to_string().contains("empty response from the model"));
    }

    #[test]
    fn test_normalize_defaults_finish_reason() {
        let payload: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "x" }] } }]
        }))
        .unwrap();
        let completion = normalize(payload).unwrap();
        assert_eq!(completion.choices[0].finish_reason, "stop");
    }

    #[test]
    fn test_parse_stream_line_skips_non_json() {
        assert!(parse_stream_line("").is_none());
        assert!(parse_stream_line("not json").is_none());
        assert!(parse_stream_line("data: [DONE]").is_none());
        assert!(parse_stream_line(r#"{"candidates":[]}"#).is_some());
    }

    #[test]
    fn test_parse_stream_line_strips_sse_prefix() {
        let frame = parse_stream_line(
            r#"data: {"candidates":[{"content":{"parts":[{"text":"hi"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(frame.candidates.len(), 1);
    }

    #[test]
    fn test_error_envelope_message() {
        let envelope: ErrorEnvelope =
            serde_json::from_str(r#"{"error":{"message":"quota exceeded"}}"#).unwrap();
        assert_eq!(envelope.error.message, "quota exceeded");

        // Anything else falls back to the raw status line in check_status.
        let empty: ErrorEnvelope = serde_json::from_str("{}").unwrap();
        assert!(empty.error.message.is_empty());
    }

    #[test]
    fn test_model_list_mapping() {
        let list: ModelList = serde_json::from_value(json!({
            "models": [
                {
                    "name": "models/gemini-pro",
                    "displayName": "Gemini Pro",
                    "description": "general purpose",
                    "tokenLimit": 30720
                },
                { "name": "models/gemini-pro-vision" }
            ]
        }))
        .unwrap();

        let models: Vec<ModelInfo> = list.models.into_iter().map(to_model_info).collect();
        assert_eq!(models[0].id, "gemini-pro");
        assert_eq!(models[0].display_name, "Gemini Pro");
        assert_eq!(models[0].token_limit, Some(30720));
        assert_eq!(models[1].id, "gemini-pro-vision");
        assert_eq!(models[1].display_name, "models/gemini-pro-vision");
        assert_eq!(models[1].token_limit, None);
    }

    fn chunk_text(event: &StreamEvent) -> &str {
        match event {
            StreamEvent::Chunk(c) => &c.choices[0].message.content,
            other => panic!("expected Chunk, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_event_stream_ends_with_done() {
        let frames: Vec<Result<String, GeminiError>> = vec![
            Ok("data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\n\n"
                .to_string()),
            Ok("keep-alive garbage\n".to_string()),
            Ok("{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]},\"finishReason\":\"stop\"}]}\n"
                .to_string()),
        ];

        let events: Vec<StreamEvent> = event_stream(stream::iter(frames)).collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(chunk_text(&events[0]), "Hel");
        assert_eq!(chunk_text(&events[1]), "lo");
        assert_eq!(events[2], StreamEvent::Done);
    }

    #[tokio::test]
    async fn test_event_stream_flushes_unterminated_tail() {
        let frames: Vec<Result<String, GeminiError>> = vec![
            Ok("{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a\"}]}}]}\n".to_string()),
            Ok("{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"b\"}]},\"finishReason\":\"stop\"}]}"
                .to_string()),
        ];

        let events: Vec<StreamEvent> = event_stream(stream::iter(frames)).collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(chunk_text(&events[0]), "a");
        assert_eq!(chunk_text(&events[1]), "b");
        assert_eq!(events[2], StreamEvent::Done);
    }

    #[tokio::test]
    async fn test_event_stream_splits_frames_across_chunks() {
        let frames: Vec<Result<String, GeminiError>> = vec![
            Ok("data: {\"candidates\":[{\"content\":".to_string()),
            Ok("{\"parts\":[{\"text\":\"joined\"}]}}]}\n".to_string()),
        ];

        let events: Vec<StreamEvent> = event_stream(stream::iter(frames)).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(chunk_text(&events[0]), "joined");
        assert_eq!(events[1], StreamEvent::Done);
    }

    #[tokio::test]
    async fn test_event_stream_transport_error_is_terminal() {
        let frames: Vec<Result<String, GeminiError>> = vec![
            Ok("{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a\"}]}}]}\n".to_string()),
            Err(GeminiError::Timeout("read timed out".to_string())),
            Ok("{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"never\"}]}}]}\n".to_string()),
        ];

        let events: Vec<StreamEvent> = event_stream(stream::iter(frames)).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(chunk_text(&events[0]), "a");
        match &events[1] {
            StreamEvent::Error { message, code } => {
                assert_eq!(message, "read timed out");
                assert_eq!(*code, Some(504));
            }
            other => panic!("expected Error terminal, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_event_stream_empty_frame_is_error_terminal() {
        let frames: Vec<Result<String, GeminiError>> =
            vec![Ok("{\"candidates\":[]}\n".to_string())];

        let events: Vec<StreamEvent> = event_stream(stream::iter(frames)).collect().await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Error { message, code } => {
                assert!(message.contains("no response from the model"));
                assert_eq!(*code, Some(400));
            }
            other => panic!("expected Error terminal, got: {other:?}"),
        }
    }
}
