//! Textual event-stream encoding for the boundary layer.
//!
//! Wraps normalized completions into the chat-completion shape the boundary
//! emits, and encodes typed stream events as SSE frames. Every encoded
//! stream ends with a literal `[DONE]` marker; mid-stream errors appear as
//! a JSON error object on their own frame before it.

use crate::types::{ChatCompletion, Choice, StreamEvent, Usage};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use ulid::Ulid;

/// Terminal frame closing every encoded stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Chat-completion response object handed to the boundary layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl ChatCompletionResponse {
    pub fn new(model: &str, completion: ChatCompletion) -> Self {
        Self {
            id: format!("gemini-{model}-{}", Ulid::new()),
            model: model.to_string(),
            choices: completion.choices,
            usage: completion.usage,
        }
    }
}

/// Encode a typed event stream into SSE frames.
///
/// `Chunk` becomes a `data:` frame carrying a `ChatCompletionResponse`,
/// `Error` becomes an error frame followed by the `[DONE]` terminal, and
/// `Done` becomes the terminal alone.
pub fn encode_sse(
    model: String,
    events: BoxStream<'static, StreamEvent>,
) -> BoxStream<'static, String> {
    events
        .flat_map(move |event| {
            let frames = match event {
                StreamEvent::Chunk(chunk) => {
                    let response = ChatCompletionResponse::new(&model, chunk);
                    let body = serde_json::to_string(&response).unwrap_or_default();
                    vec![format!("data: {body}\n\n")]
                }
                StreamEvent::Error { message, code } => {
                    let body = json!({ "error": { "message": message, "code": code } });
                    vec![format!("data: {body}\n\n"), DONE_FRAME.to_string()]
                }
                StreamEvent::Done => vec![DONE_FRAME.to_string()],
            };
            stream::iter(frames)
        })
        .boxed()
}
