// Target resolution: where an inbound request is sent
use axum::http::{header, HeaderMap, HeaderValue, Uri};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use url::Url;

use crate::error::ProxyError;

/// Header carrying the WebDAV server base URL
pub const WEBDAV_URL_HEADER: &str = "x-webdav-url";
pub const WEBDAV_USERNAME_HEADER: &str = "x-webdav-username";
pub const WEBDAV_PASSWORD_HEADER: &str = "x-webdav-password";

/// Mount point of the WebDAV proxy on the gateway
pub const WEBDAV_MOUNT: &str = "/webapi/webdav";

/// Credential attached to the outbound request
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    None,
    /// Bearer key from the gateway config
    Bearer(String),
    /// Basic auth taken from the caller's X-WebDAV-* headers
    Basic { username: String, password: String },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secrets
        match self {
            Credential::None => f.write_str("None"),
            Credential::Bearer(_) => f.write_str("Bearer(..)"),
            Credential::Basic { username, .. } => write!(f, "Basic({}:..)", username),
        }
    }
}

impl Credential {
    /// `Authorization` value, if any
    pub fn header_value(&self) -> Result<Option<HeaderValue>, ProxyError> {
        let raw = match self {
            Credential::None => return Ok(None),
            Credential::Bearer(key) => format!("Bearer {}", key),
            Credential::Basic { username, password } => {
                format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
            }
        };
        let mut value = HeaderValue::from_str(&raw)
            .map_err(|_| ProxyError::BadRequest("invalid credentials".to_string()))?;
        value.set_sensitive(true);
        Ok(Some(value))
    }

    /// Replace whatever `Authorization` is in `headers` with this credential.
    ///
    /// With `Credential::None` the header is removed too, so a client value
    /// can never reach an upstream through this path.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<(), ProxyError> {
        headers.remove(header::AUTHORIZATION);
        if let Some(value) = self.header_value()? {
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(())
    }
}

/// Resolved outbound destination for one request
#[derive(Debug, Clone)]
pub struct TargetSpec {
    pub url: Url,
    pub credential: Credential,
}

/// OpenAI-compatible routes and the upstream suffix each maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRoute {
    ChatCompletions,
    Responses,
    Models,
}

impl ApiRoute {
    pub const ALL: [ApiRoute; 3] = [ApiRoute::ChatCompletions, ApiRoute::Responses, ApiRoute::Models];

    /// Path appended to the configured upstream base
    pub fn suffix(self) -> &'static str {
        match self {
            ApiRoute::ChatCompletions => "/chat/completions",
            ApiRoute::Responses => "/responses",
            ApiRoute::Models => "/models",
        }
    }

    /// Path served by the gateway
    pub fn gateway_path(self) -> &'static str {
        match self {
            ApiRoute::ChatCompletions => "/v1/chat/completions",
            ApiRoute::Responses => "/v1/responses",
            ApiRoute::Models => "/v1/models",
        }
    }
}

/// Static-suffix strategy: fixed upstream plus a per-route suffix
#[derive(Clone)]
pub struct StaticTarget {
    base: Url,
    api_key: String,
}

impl StaticTarget {
    pub fn new(base: Url, api_key: impl Into<String>) -> Self {
        Self {
            base,
            api_key: api_key.into(),
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn resolve(&self, route: ApiRoute, inbound: &Uri) -> TargetSpec {
        let mut url = self.base.clone();
        let path = format!("{}{}", self.base.path().trim_end_matches('/'), route.suffix());
        url.set_path(&path);
        url.set_query(inbound.query());
        TargetSpec {
            url,
            credential: Credential::Bearer(self.api_key.clone()),
        }
    }
}

/// Dynamic strategy: destination chosen by the caller's `X-WebDAV-URL`.
///
/// Only call this after the access gate has passed; otherwise the gateway
/// relays to arbitrary hosts for anyone.
pub fn resolve_webdav(headers: &HeaderMap, inbound: &Uri) -> Result<TargetSpec, ProxyError> {
    let base = header_str(headers, WEBDAV_URL_HEADER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProxyError::BadRequest("missing X-WebDAV-URL header".to_string()))?;

    let parsed =
        Url::parse(base).map_err(|_| ProxyError::BadRequest("invalid X-WebDAV-URL".to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ProxyError::BadRequest(
            "X-WebDAV-URL must be http or https".to_string(),
        ));
    }

    let rest = inbound.path().strip_prefix(WEBDAV_MOUNT).unwrap_or("");
    let rest = if rest.is_empty() { "/" } else { rest };

    let mut full = format!("{}{}", base.trim_end_matches('/'), rest);
    if let Some(query) = inbound.query().filter(|q| !q.is_empty()) {
        full.push('?');
        full.push_str(query);
    }
    let url =
        Url::parse(&full).map_err(|_| ProxyError::BadRequest("invalid X-WebDAV-URL".to_string()))?;

    let credential = match header_str(headers, WEBDAV_USERNAME_HEADER).filter(|u| !u.is_empty()) {
        Some(username) => Credential::Basic {
            username: username.to_string(),
            password: header_str(headers, WEBDAV_PASSWORD_HEADER)
                .unwrap_or_default()
                .to_string(),
        },
        None => Credential::None,
    };

    Ok(TargetSpec { url, credential })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dav_headers(url: &'static str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(WEBDAV_URL_HEADER, HeaderValue::from_static(url));
        map
    }

    #[test]
    fn test_static_suffix() {
        let target = StaticTarget::new(Url::parse("https://api.example.com/v1").unwrap(), "sk-up");
        let uri: Uri = "/v1/models?limit=5".parse().unwrap();
        let spec = target.resolve(ApiRoute::Models, &uri);
        assert_eq!(spec.url.as_str(), "https://api.example.com/v1/models?limit=5");
        assert_eq!(spec.credential, Credential::Bearer("sk-up".to_string()));

        let uri: Uri = "/v1/chat/completions".parse().unwrap();
        let spec = target.resolve(ApiRoute::ChatCompletions, &uri);
        assert_eq!(spec.url.as_str(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_static_suffix_on_bare_host() {
        let target = StaticTarget::new(Url::parse("http://10.0.0.2:8000").unwrap(), "k");
        let uri: Uri = "/v1/responses".parse().unwrap();
        let spec = target.resolve(ApiRoute::Responses, &uri);
        assert_eq!(spec.url.as_str(), "http://10.0.0.2:8000/responses");
    }

    #[test]
    fn test_webdav_path_and_query() {
        let uri: Uri = "/webapi/webdav/foo?x=1".parse().unwrap();
        let spec = resolve_webdav(&dav_headers("http://example.com/dav/"), &uri).unwrap();
        assert_eq!(spec.url.as_str(), "http://example.com/dav/foo?x=1");
        assert_eq!(spec.credential, Credential::None);
    }

    #[test]
    fn test_webdav_empty_remainder_is_root() {
        let uri: Uri = "/webapi/webdav".parse().unwrap();
        let spec = resolve_webdav(&dav_headers("https://dav.example.com/remote.php/dav"), &uri).unwrap();
        assert_eq!(spec.url.as_str(), "https://dav.example.com/remote.php/dav/");

        let uri: Uri = "/webapi/webdav/".parse().unwrap();
        let spec = resolve_webdav(&dav_headers("https://dav.example.com/dav//"), &uri).unwrap();
        assert_eq!(spec.url.as_str(), "https://dav.example.com/dav/");
    }

    #[test]
    fn test_webdav_basic_credential() {
        let uri: Uri = "/webapi/webdav/backup/".parse().unwrap();
        let mut headers = dav_headers("http://example.com/dav");
        headers.insert(WEBDAV_USERNAME_HEADER, HeaderValue::from_static("alice"));
        headers.insert(WEBDAV_PASSWORD_HEADER, HeaderValue::from_static("s3cret"));
        let spec = resolve_webdav(&headers, &uri).unwrap();
        assert_eq!(
            spec.credential,
            Credential::Basic {
                username: "alice".to_string(),
                password: "s3cret".to_string()
            }
        );
        let value = spec.credential.header_value().unwrap().unwrap();
        assert_eq!(value, "Basic YWxpY2U6czNjcmV0");

        // Password alone does nothing
        let mut headers = dav_headers("http://example.com/dav");
        headers.insert(WEBDAV_PASSWORD_HEADER, HeaderValue::from_static("s3cret"));
        let spec = resolve_webdav(&headers, &uri).unwrap();
        assert_eq!(spec.credential, Credential::None);
    }

    #[test]
    fn test_webdav_rejections() {
        let uri: Uri = "/webapi/webdav/foo".parse().unwrap();
        assert!(matches!(
            resolve_webdav(&HeaderMap::new(), &uri),
            Err(ProxyError::BadRequest(_))
        ));
        assert!(matches!(
            resolve_webdav(&dav_headers("ftp://example.com/"), &uri),
            Err(ProxyError::BadRequest(_))
        ));
        assert!(matches!(
            resolve_webdav(&dav_headers("::not a url"), &uri),
            Err(ProxyError::BadRequest(_))
        ));
    }

    #[test]
    fn test_apply_replaces_client_authorization() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer client"));
        Credential::Bearer("upstream".to_string()).apply(&mut headers).unwrap();
        assert_eq!(headers.get_all(header::AUTHORIZATION).iter().count(), 1);
        assert_eq!(headers[header::AUTHORIZATION], "Bearer upstream");

        Credential::None.apply(&mut headers).unwrap();
        assert!(headers.get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let shown = format!("{:?}", Credential::Bearer("sk-very-secret".to_string()));
        assert!(!shown.contains("sk-very-secret"));
    }
}
