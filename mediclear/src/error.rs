use thiserror::Error;

use crate::extract::ExtractError;

pub type Result<T> = std::result::Result<T, MediClearError>;

/// Coarse grouping used by callers to decide how an error is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Detected before any network call (missing credential).
    Configuration,
    /// Bad caller input: unsupported or undecodable file, empty question or
    /// language, no active analysis.
    Input,
    /// Non-2xx answer or transport failure talking to the model.
    Upstream,
    /// The model answered but not with a usable JSON object.
    ResponseShape,
    Storage,
    Auth,
}

#[derive(Debug, Error)]
pub enum MediClearError {
    #[error("Gemini API key is not configured")]
    MissingApiKey,

    #[error("Unsupported document type: {0}")]
    UnsupportedMimeType(String),

    #[error("Document is empty")]
    EmptyDocument,

    #[error("Document data is not valid Base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Could not read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("Question cannot be empty")]
    EmptyQuestion,

    #[error("No analysis is active for this session")]
    NoActiveAnalysis,

    #[error("Language code cannot be empty")]
    EmptyLanguage,

    #[error("A newer analysis replaced the one being translated")]
    AnalysisSuperseded,

    #[error("{}", .0.user_message())]
    Upstream(#[from] UpstreamError),

    #[error("Could not reach the AI service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Empty response from AI.")]
    EmptyResponse,

    #[error("{kind} was not in the expected format.")]
    Extraction {
        kind: ResponseKind,
        #[source]
        source: ExtractError,
    },

    #[error("AI response did not match the analysis shape: {0}")]
    InvalidAnalysis(#[source] serde_json::Error),

    #[error("Translation changed the report structure: {0}")]
    TranslationMismatch(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl MediClearError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediClearError::MissingApiKey => ErrorCategory::Configuration,
            MediClearError::UnsupportedMimeType(_)
            | MediClearError::EmptyDocument
            | MediClearError::InvalidBase64(_)
            | MediClearError::Io(_)
            | MediClearError::EmptyQuestion
            | MediClearError::NoActiveAnalysis
            | MediClearError::EmptyLanguage
            | MediClearError::AnalysisSuperseded => ErrorCategory::Input,
            MediClearError::Upstream(_) | MediClearError::Transport(_) => ErrorCategory::Upstream,
            MediClearError::EmptyResponse
            | MediClearError::Extraction { .. }
            | MediClearError::InvalidAnalysis(_)
            | MediClearError::TranslationMismatch(_) => ErrorCategory::ResponseShape,
            MediClearError::Store(_) => ErrorCategory::Storage,
            MediClearError::Auth(_) => ErrorCategory::Auth,
        }
    }
}

/// Which kind of model answer failed to parse; only changes the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Analysis,
    Translation,
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseKind::Analysis => f.write_str("AI response"),
            ResponseKind::Translation => f.write_str("Translation result"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    InvalidCredential,
    PermissionDenied,
    RateLimited,
    ModelUnavailable,
    Other,
}

/// A non-2xx answer from the generative endpoint.
#[derive(Debug, Clone, Error)]
#[error("upstream returned {status}: {message}")]
pub struct UpstreamError {
    pub status: u16,
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    /// Classifies by status code first, then by the well-known markers Gemini puts
    /// in its error messages (an invalid key comes back as a 400).
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if status == 401 || message.contains("API_KEY_INVALID") {
            UpstreamErrorKind::InvalidCredential
        } else if status == 403 || message.contains("PERMISSION_DENIED") {
            UpstreamErrorKind::PermissionDenied
        } else if status == 429 || message.contains("RESOURCE_EXHAUSTED") {
            UpstreamErrorKind::RateLimited
        } else if status == 404 || message.to_lowercase().contains("not found") {
            UpstreamErrorKind::ModelUnavailable
        } else {
            UpstreamErrorKind::Other
        };

        Self {
            status,
            kind,
            message,
        }
    }

    pub fn user_message(&self) -> String {
        match self.kind {
            UpstreamErrorKind::InvalidCredential => {
                "Invalid API key. Check the GEMINI_API_KEY setting.".to_string()
            }
            UpstreamErrorKind::PermissionDenied => {
                "Model requires billing. Check API access.".to_string()
            }
            UpstreamErrorKind::RateLimited => {
                "Rate limit reached. Wait a moment and try again.".to_string()
            }
            UpstreamErrorKind::ModelUnavailable => {
                "Model not available. Check API access.".to_string()
            }
            UpstreamErrorKind::Other if !self.message.trim().is_empty() => self.message.clone(),
            UpstreamErrorKind::Other => "Something went wrong. Please try again.".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The ordered owner query needs an index the backend does not have yet.
    #[error("index not available: {0}")]
    IndexUnavailable(String),

    #[error("analysis not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("An account with this email already exists")]
    EmailInUse,

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Password must be at least {0} characters")]
    WeakPassword(usize),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Not signed in")]
    Unauthenticated,

    #[error("User not found: {0}")]
    UserNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_classified_from_status() {
        let err = UpstreamError::new(429, "Quota exceeded for requests");
        assert_eq!(err.kind, UpstreamErrorKind::RateLimited);
        assert!(err.user_message().contains("Rate limit"));
    }

    #[test]
    fn test_invalid_key_is_classified_from_status_and_marker() {
        let unauthorized = UpstreamError::new(401, "Unauthorized");
        assert_eq!(unauthorized.kind, UpstreamErrorKind::InvalidCredential);

        let bad_request = UpstreamError::new(
            400,
            "API key not valid. Please pass a valid API key. [API_KEY_INVALID]",
        );
        assert_eq!(bad_request.kind, UpstreamErrorKind::InvalidCredential);
        assert!(bad_request.user_message().contains("Invalid API key"));
    }

    #[test]
    fn test_permission_and_missing_model() {
        assert_eq!(
            UpstreamError::new(403, "PERMISSION_DENIED").kind,
            UpstreamErrorKind::PermissionDenied
        );
        assert_eq!(
            UpstreamError::new(400, "models/gemini-9 is not found for API version v1beta").kind,
            UpstreamErrorKind::ModelUnavailable
        );
    }

    #[test]
    fn test_other_errors_keep_upstream_message() {
        let err = UpstreamError::new(500, "Internal error encountered.");
        assert_eq!(err.kind, UpstreamErrorKind::Other);
        assert_eq!(err.user_message(), "Internal error encountered.");

        let blank = UpstreamError::new(503, "  ");
        assert_eq!(blank.user_message(), "Something went wrong. Please try again.");
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            MediClearError::MissingApiKey.category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            MediClearError::Upstream(UpstreamError::new(429, "")).category(),
            ErrorCategory::Upstream
        );
        assert_eq!(
            MediClearError::EmptyResponse.category(),
            ErrorCategory::ResponseShape
        );
        assert_eq!(
            MediClearError::Extraction {
                kind: ResponseKind::Analysis,
                source: ExtractError::NoJsonObject,
            }
            .to_string(),
            "AI response was not in the expected format."
        );
    }
}
