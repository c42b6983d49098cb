//! `Authorization: Bearer <token>` header helpers.

use http::header::{AUTHORIZATION, HeaderMap, HeaderValue, InvalidHeaderValue};

const SCHEME: &str = "Bearer ";

/// Build the `Authorization` header value for `token`.
///
/// The value is marked sensitive so it is elided from `Debug` output.
pub fn header_value(token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut value = HeaderValue::from_str(&format!("{SCHEME}{token}"))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Extract the bearer token from request headers.
///
/// Returns `None` when the header is absent, not UTF-8, uses another scheme,
/// or carries an empty token.
pub fn extract(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.split_at_checked(SCHEME.len())?;
    if !scheme.eq_ignore_ascii_case(SCHEME) {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
