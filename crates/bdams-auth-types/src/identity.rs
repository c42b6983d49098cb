//! Bearer identity extractor for axum handlers.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use http::StatusCode;
use http::request::Parts;

use crate::bearer;
use crate::token::validate_access_token;

/// HMAC secret used to validate bearer tokens. Expose it from router state
/// via `FromRef`.
#[derive(Clone)]
pub struct JwtSecret(pub Arc<str>);

/// Caller identity taken from a validated `Authorization: Bearer` token.
///
/// Returns 401 if the header is absent or the token fails validation.
/// Role checks (403) are done by handlers after extraction.
#[derive(Debug, Clone)]
pub struct BearerIdentity {
    pub user_id: String,
    pub email: String,
}

impl<S> FromRequestParts<S> for BearerIdentity
where
    S: Send + Sync,
    JwtSecret: FromRef<S>,
{
    type Rejection = StatusCode;

    // Validate synchronously and hand back a 'static future so the result
    // does not borrow `parts`.
    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let secret = JwtSecret::from_ref(state);
        let result = match bearer::extract(&parts.headers) {
            None => Err(StatusCode::UNAUTHORIZED),
            Some(token) => validate_access_token(token, &secret.0)
                .map(|info| Self {
                    user_id: info.user_id,
                    email: info.email,
                })
                .map_err(|e| {
                    tracing::debug!(error = %e, "bearer token rejected");
                    StatusCode::UNAUTHORIZED
                }),
        };

        async move { result }
    }
}
