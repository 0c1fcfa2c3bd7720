use tracing::{error, warn};

/// Failure taxonomy for a single pass through the generation pipeline.
///
/// Every variant except `MissingCredential` is absorbed by the public API and
/// turned into synthetic content carrying a fallback notice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AIError {
    /// The transport produced no response at all.
    #[error("generation failed: no response from provider")]
    GenerationFailed,

    /// A response arrived but could not be decoded, or its content was absent.
    #[error("invalid response from provider")]
    InvalidResponse,

    /// The response decoded fine but yielded zero usable records.
    #[error("parsing failed: no usable content in model output")]
    ParsingFailed,

    /// Explicit provider-side failure (non-2xx status, reported error, local session error).
    #[error("API error: {0}")]
    ApiError(String),

    /// No hosted credential is configured. Never retried and never masked.
    #[error("API error: missing credential")]
    MissingCredential,
}

impl AIError {
    /// Stable machine-readable code embedded in fallback notices
    pub fn code(&self) -> &'static str {
        match self {
            AIError::GenerationFailed => "GENERATION_FAILED",
            AIError::InvalidResponse => "INVALID_RESPONSE",
            AIError::ParsingFailed => "PARSING_FAILED",
            AIError::ApiError(_) | AIError::MissingCredential => "API_ERROR",
        }
    }

    pub fn status(code: u16) -> Self {
        AIError::ApiError(format!("status {}", code))
    }

    /// The error the public API must surface instead of falling back, if any
    pub fn terminal(&self) -> Option<GenerationError> {
        match self {
            AIError::MissingCredential => Some(GenerationError::MissingCredential),
            _ => None,
        }
    }
}

/// Errors that escape the public generation API.
///
/// Provider and parsing failures never show up here; they are converted into
/// fallback content instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("No API key is configured for the hosted model. Add one in settings and try again.")]
    MissingCredential,
}

/// Map a reqwest failure raised while sending a request or reading its body
pub fn classify_transport_error(err: &reqwest::Error) -> AIError {
    if err.is_decode() || err.is_body() {
        warn!(error = %err, "Provider response body could not be decoded");
        AIError::InvalidResponse
    } else if let Some(status) = err.status() {
        error!(status = %status, error = %err, "Provider returned error status");
        AIError::status(status.as_u16())
    } else {
        error!(error = %err, "Provider transport failure");
        AIError::GenerationFailed
    }
}
