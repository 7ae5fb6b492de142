//! Error taxonomy for the Gemini adapter.

/// Errors that can occur when talking to the Gemini API.
///
/// Every public client operation fails with exactly one of these variants;
/// raw transport errors never cross the client boundary.
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    /// Provider rejected the credentials.
    #[error("{0}")]
    Authentication(String),

    /// Quota or rate limit exhausted.
    #[error("{0}")]
    RateLimit(String),

    /// Provider reported an unknown model id.
    #[error("model '{0}' not found")]
    ModelNotFound(String),

    /// Malformed request, generic case.
    #[error("{0}")]
    InvalidRequest(String),

    /// Input exceeded the model's context window.
    #[error("{0}")]
    ContextLengthExceeded(String),

    /// Provider-side failure (any 5xx).
    #[error("{0}")]
    Server(String),

    /// Transport timed out before or during the call.
    #[error("{0}")]
    Timeout(String),

    /// Any other API failure, including unparseable responses.
    #[error("{message}")]
    Api {
        message: String,
        status: Option<u16>,
    },
}

impl GeminiError {
    /// HTTP status associated with this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GeminiError::Authentication(_) => 401,
            GeminiError::RateLimit(_) => 429,
            GeminiError::ModelNotFound(_) => 404,
            GeminiError::InvalidRequest(_) => 400,
            GeminiError::ContextLengthExceeded(_) => 400,
            GeminiError::Server(_) => 500,
            GeminiError::Timeout(_) => 504,
            GeminiError::Api { status, .. } => status.unwrap_or(500),
        }
    }

    /// Classify a non-2xx provider response.
    ///
    /// Status code is checked first; the 404 and 400 cases additionally
    /// match on the error message (case-insensitive) to pick the more
    /// specific variant.
    pub fn classify(status: u16, message: impl Into<String>, model: &str) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        match status {
            401 => GeminiError::Authentication("invalid API key".to_string()),
            429 => GeminiError::RateLimit(message),
            404 if lower.contains("model not found") => {
                GeminiError::ModelNotFound(model.to_string())
            }
            400 if lower.contains("context length exceeded") => {
                GeminiError::ContextLengthExceeded(message)
            }
            400 => GeminiError::InvalidRequest(message),
            s if s >= 500 => GeminiError::Server(message),
            _ => GeminiError::Api {
                message,
                status: Some(status),
            },
        }
    }
}

impl From<reqwest::Error> for GeminiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GeminiError::Timeout(err.to_string())
        } else {
            GeminiError::Api {
                message: format!("request failed: {err}"),
                status: None,
            }
        }
    }
}
