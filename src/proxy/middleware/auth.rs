// Access code authentication middleware
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use constant_time_eq::constant_time_eq;
use std::sync::Arc;

use crate::error::ProxyError;

/// Dedicated access code header
pub const ACCESS_CODE_HEADER: &str = "x-access-code";
/// Query parameter fallback, for clients that cannot set headers
pub const ACCESS_CODE_PARAM: &str = "access_code";

/// Shared-secret gate in front of the protected routes.
#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    codes: Arc<[String]>,
}

impl AccessGate {
    pub fn new(codes: Vec<String>) -> Self {
        Self {
            codes: codes.into(),
        }
    }

    /// No codes configured: every request passes
    pub fn is_open(&self) -> bool {
        self.codes.is_empty()
    }

    /// Check request credentials.
    ///
    /// Looks at `X-Access-Code`, then `Authorization: Bearer`, then the
    /// `access_code` query parameter, and takes the first one found.
    pub fn check(&self, headers: &HeaderMap, query: Option<&str>) -> bool {
        if self.is_open() {
            return true;
        }
        match extract_access_code(headers, query) {
            Some(code) => self.check_code(&code),
            None => false,
        }
    }

    /// Compare against every configured code without early exit
    pub fn check_code(&self, code: &str) -> bool {
        self.codes
            .iter()
            .fold(false, |matched, allowed| {
                constant_time_eq(code.as_bytes(), allowed.as_bytes()) | matched
            })
    }
}

/// Pull the supplied credential out of a request, in priority order
pub fn extract_access_code(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    let from_header = headers
        .get(ACCESS_CODE_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(code) = from_header {
        return Some(code.to_string());
    }

    let from_bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token);
    if let Some(code) = from_bearer {
        return Some(code.to_string());
    }

    query_param(query, ACCESS_CODE_PARAM)
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// First value of a query parameter, percent-decoded
pub fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn bearer_token(value: &str) -> Option<&str> {
    const PREFIX: &str = "bearer ";
    let value = value.trim();
    if value.len() <= PREFIX.len() || !value.is_char_boundary(PREFIX.len()) {
        return None;
    }
    let (scheme, token) = value.split_at(PREFIX.len());
    if !scheme.eq_ignore_ascii_case(PREFIX) {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Reject requests without a valid access code
pub async fn auth_middleware(
    State(gate): State<AccessGate>,
    request: Request,
    next: Next,
) -> Response {
    if gate.check(request.headers(), request.uri().query()) {
        return next.run(request).await;
    }
    tracing::info!(
        "Rejected unauthenticated request: {} {}",
        request.method(),
        request.uri().path()
    );
    ProxyError::Unauthorized.into_response()
}
