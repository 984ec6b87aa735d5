// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared bearer-token auth for the WebSocket upgrade: the token
//! may arrive as a query parameter or an `Authorization: Bearer` header.

use axum::http::HeaderMap;

use crate::error::DaemonError;

/// Constant-time string comparison, so a mistyped token doesn't leak how
/// many leading bytes matched via response timing.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a caller-supplied token against the configured `expected` token.
/// `token` may come from either the `Authorization: Bearer` header or the
/// `token` query parameter.
pub fn validate_token(headers: &HeaderMap, query_token: Option<&str>, expected: &str) -> Result<(), DaemonError> {
    let header_token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let presented = header_token.or(query_token).ok_or_else(|| DaemonError::unauthorized("missing auth token"))?;

    if constant_time_eq(presented, expected) {
        Ok(())
    } else {
        Err(DaemonError::unauthorized("invalid auth token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_query_token() {
        assert!(validate_token(&HeaderMap::new(), Some("secret"), "secret").is_ok());
    }

    #[test]
    fn rejects_mismatched_token() {
        assert!(validate_token(&HeaderMap::new(), Some("wrong"), "secret").is_err());
    }

    #[test]
    fn rejects_missing_token() {
        assert!(validate_token(&HeaderMap::new(), None, "secret").is_err());
    }

    #[test]
    fn header_token_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer secret".parse().unwrap());
        assert!(validate_token(&headers, None, "secret").is_ok());
    }
}
