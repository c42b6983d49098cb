use bdams_domain::policy::Action;
use bdams_domain::request::TransitionError;
use bdams_domain::wire::FieldError;

/// Client-side error taxonomy.
///
/// Auth-class errors (`InvalidCredentials`, `Unauthorized`,
/// `ProfileLoadTimeout`, `ProfileLoadFailed`) end the session; workflow-class
/// errors (`RequestConflict`, `Validation`, `InvalidTransition`, ...) are
/// handled where they occur. Nothing is retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unauthorized")]
    Unauthorized,
    #[error("profile load timed out")]
    ProfileLoadTimeout,
    #[error("profile load failed: {0}")]
    ProfileLoadFailed(String),
    #[error("profile is still loading")]
    ProfileLoading,
    #[error("not signed in")]
    NotSignedIn,
    #[error("signed-in user changed while the call was in flight")]
    SessionChanged,
    #[error("request was already taken or closed")]
    RequestConflict,
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found")]
    NotFound,
    #[error("invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),
    #[error("another operation on {0} is still in flight")]
    OperationInFlight(String),
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("network error")]
    Network(#[source] reqwest::Error),
    #[error("unexpected response body")]
    Decode(#[source] serde_json::Error),
    #[error("configuration error")]
    Config(#[from] bdams_core::config::ConfigError),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ClientError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::ProfileLoadTimeout => "PROFILE_LOAD_TIMEOUT",
            Self::ProfileLoadFailed(_) => "PROFILE_LOAD_FAILED",
            Self::ProfileLoading => "PROFILE_LOADING",
            Self::NotSignedIn => "NOT_SIGNED_IN",
            Self::SessionChanged => "SESSION_CHANGED",
            Self::RequestConflict => "REQUEST_CONFLICT",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::OperationInFlight(_) => "OPERATION_IN_FLIGHT",
            Self::Server { .. } => "SERVER_ERROR",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Decode(_) => "DECODE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub(crate) fn denied(action: Action) -> Self {
        Self::Forbidden(format!("{action} is not permitted"))
    }

    /// Errors that mean the session can no longer be used.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::Unauthorized
                | Self::ProfileLoadTimeout
                | Self::ProfileLoadFailed(_)
        )
    }

    /// Transient failures a user may retry by hand.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Server { .. } | Self::OperationInFlight(_)
        )
    }
}
