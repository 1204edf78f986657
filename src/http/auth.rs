//! Bearer token extraction.

use axum::http::{header, HeaderMap};

/// Extract the token from an `Authorization: Bearer <token>` header.
///
/// The token is opaque; it is not validated beyond being present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.split(' ').next()?;

    (!token.is_empty()).then_some(token)
}
