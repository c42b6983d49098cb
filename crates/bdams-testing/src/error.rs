use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use bdams_domain::wire::{ErrorBody, FieldError};

/// Mock backend error variants.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("invalid input")]
    Validation(Vec<FieldError>),
    #[error("injected failure")]
    Injected(StatusCode),
}

impl BackendError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Injected(_) => "INJECTED",
        }
    }

    pub(crate) fn field(field: &str, message: &str) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Injected(status) => *status,
        };
        let message = self.to_string();
        let kind = self.kind();
        let fields = match self {
            Self::Validation(fields) => fields,
            _ => Vec::new(),
        };
        let body = ErrorBody {
            kind: Some(kind.to_owned()),
            message: Some(message),
            fields,
        };
        (status, Json(body)).into_response()
    }
}
