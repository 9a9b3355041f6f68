//! Failure taxonomy for call orchestration.
//!
//! Every failure that can surface through a tool operation is one of these
//! variants. The variant name is the stable `kind` used in the single-line
//! tool error format.

/// Error types for call orchestration
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    #[error("missing configuration: {0}")]
    MissingConfiguration(String),
    #[error("provider error: {0}")]
    ProviderError(String),
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("no active call with id {0}")]
    CallNotFound(String),
    #[error("timed out waiting on the call")]
    CallTimeout,
    #[error("the call was hung up")]
    CallHungUp,
    #[error("transcription error: {0}")]
    TranscriptionError(String),
    #[error("synthesis error: {0}")]
    SynthesisError(String),
    #[error("webhook signature invalid")]
    WebhookSignatureInvalid,
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
}

impl CallError {
    /// Stable kind tag, one per taxonomy variant.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::MissingConfiguration(_) => "MissingConfiguration",
            CallError::ProviderError(_) => "ProviderError",
            CallError::NetworkError(_) => "NetworkError",
            CallError::CallNotFound(_) => "CallNotFound",
            CallError::CallTimeout => "CallTimeout",
            CallError::CallHungUp => "CallHungUp",
            CallError::TranscriptionError(_) => "TranscriptionError",
            CallError::SynthesisError(_) => "SynthesisError",
            CallError::WebhookSignatureInvalid => "WebhookSignatureInvalid",
            CallError::AuthenticationFailed(_) => "AuthenticationFailed",
        }
    }

    /// Variant payload, where one exists.
    pub fn detail(&self) -> Option<&str> {
        match self {
            CallError::MissingConfiguration(d)
            | CallError::ProviderError(d)
            | CallError::NetworkError(d)
            | CallError::CallNotFound(d)
            | CallError::TranscriptionError(d)
            | CallError::SynthesisError(d)
            | CallError::AuthenticationFailed(d) => Some(d),
            CallError::CallTimeout | CallError::CallHungUp | CallError::WebhookSignatureInvalid => {
                None
            }
        }
    }

    /// Single-line form surfaced to tool callers:
    /// `Error: <kind>` or `Error: <kind>: <detail>`.
    pub fn tool_line(&self) -> String {
        match self.detail() {
            Some(detail) => format!("Error: {}: {}", self.kind(), detail),
            None => format!("Error: {}", self.kind()),
        }
    }
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        CallError::NetworkError(err.to_string())
    }
}

/// Result type alias for call operations
pub type CallResult<T> = Result<T, CallError>;
