use axum::http::{HeaderMap, header};
use subtle::ConstantTimeEq;

/// Check the request's `Authorization: Bearer <token>` header.
/// Returns true if no token is required (loopback) or if the token matches.
pub fn verify_bearer(headers: &HeaderMap, expected: &Option<String>) -> bool {
    let expected = match expected {
        Some(t) => t,
        None => return true,
    };

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match token {
        Some(t) => constant_time_eq(t.as_bytes(), expected.as_bytes()),
        None => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
