// CORS middleware
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Superset of request headers used by every route family
const ALLOW_HEADERS: &str = "Authorization, Content-Type, X-Access-Code, X-WebDAV-URL, \
     X-WebDAV-Username, X-WebDAV-Password, Depth, Destination, Overwrite";

/// Superset of methods used by every route family
const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, PROPFIND, MKCOL, COPY, MOVE, OPTIONS";

/// Origin allow-list. `*` grants every origin.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    allowed: Arc<[String]>,
}

impl CorsPolicy {
    pub fn new(allowed: Vec<String>) -> Self {
        Self {
            allowed: allowed.into(),
        }
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.allowed.iter().any(|a| a == "*" || a == origin)
    }

    /// Response headers granting `origin`, or `None` when it is not allowed
    pub fn headers_for(&self, origin: Option<&HeaderValue>) -> Option<HeaderMap> {
        let origin = origin.filter(|o| !o.is_empty())?;
        if !self.allows(origin.to_str().ok()?) {
            return None;
        }

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        Some(headers)
    }
}

/// Annotate responses with CORS headers and answer every preflight.
///
/// `OPTIONS` ends here with 204 before any access check runs.
pub async fn cors_middleware(
    State(policy): State<CorsPolicy>,
    request: Request,
    next: Next,
) -> Response {
    let cors_headers = policy.headers_for(request.headers().get(header::ORIGIN));

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    if let Some(cors_headers) = cors_headers {
        // Ours win over anything copied from an upstream
        response.headers_mut().extend(cors_headers);
    }
    response
}
