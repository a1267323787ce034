//! Bearer-token gate for the artifact routes
//!
//! Every occurrence of the `Authorization` header is joined with `,` before
//! parsing, so a header duplicated by a proxy still authenticates with its
//! first value.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Immutable set of accepted bearer tokens
///
/// Blank entries are dropped on construction. Cloning shares the set.
#[derive(Clone, Default)]
pub struct TokenSet(Arc<HashSet<String>>);

impl TokenSet {
    /// Exact membership test
    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for TokenSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let tokens = iter
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        TokenSet(Arc::new(tokens))
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenSet([{} redacted])", self.0.len())
    }
}

/// Extract the bearer token from request headers
///
/// # Errors
///
/// * [`ApiError::BadRequest`] when no `Authorization` value is present
/// * [`ApiError::Unauthorized`] when the value is not a bearer credential
pub fn bearer_token(headers: &HeaderMap) -> ApiResult<String> {
    let mut values = Vec::new();
    for value in headers.get_all(AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| ApiError::unauthorized("Invalid authorization token"))?;
        values.push(value);
    }

    let joined = values.join(",");
    if joined.is_empty() {
        return Err(ApiError::bad_request("Missing Authorization header"));
    }

    let token = joined
        .strip_prefix(BEARER_PREFIX)
        .ok_or_else(|| ApiError::unauthorized("Invalid authorization token"))?;

    Ok(token.split(',').next().unwrap_or_default().trim().to_string())
}

/// Axum middleware rejecting requests without an accepted token
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())?;

    if !state.tokens.contains(&token) {
        tracing::warn!(
            method = %req.method(),
            path = %req.uri().path(),
            "Rejected request with unknown token"
        );
        return Err(ApiError::unauthorized("Invalid authorization token"));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(values: &[&'static str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for value in values {
            headers.append(AUTHORIZATION, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn test_extracts_token() {
        assert_eq!(bearer_token(&headers(&["Bearer abc"])).unwrap(), "abc");
        assert_eq!(bearer_token(&headers(&["Bearer  abc "])).unwrap(), "abc");
    }

    #[test]
    fn test_missing_header_is_bad_request() {
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            bearer_token(&headers(&[""])),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_wrong_scheme_is_unauthorized() {
        for value in ["Basic dXNlcjpwYXNz", "bearer abc", "abc"] {
            let mut map = HeaderMap::new();
            map.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
            assert!(
                matches!(bearer_token(&map), Err(ApiError::Unauthorized(_))),
                "accepted {:?}",
                value
            );
        }
    }

    #[test]
    fn test_duplicated_header_uses_first_token() {
        let map = headers(&["Bearer abc", "Bearer abc"]);
        assert_eq!(bearer_token(&map).unwrap(), "abc");
    }

    #[test]
    fn test_token_set_drops_blanks() {
        let tokens = TokenSet::from_iter(vec![
            " ci-token ".to_string(),
            "".to_string(),
            "dev-token".to_string(),
        ]);
        assert_eq!(tokens.len(), 2);
        assert!(tokens.contains("ci-token"));
        assert!(!tokens.contains(""));
        assert!(!format!("{:?}", tokens).contains("ci-token"));
    }
}
