// Outbound header policy
use axum::http::{header, HeaderMap, HeaderValue};

/// Inbound headers forwarded to one route family.
///
/// Anything not listed is dropped. `Authorization` is never listed; the
/// forwarder sets it from the resolved credential instead.
#[derive(Debug, Clone, Copy)]
pub struct HeaderAllowList {
    pub name: &'static str,
    headers: &'static [&'static str],
}

/// OpenAI-compatible API routes
pub const API_HEADERS: HeaderAllowList = HeaderAllowList {
    name: "api",
    headers: &["content-type", "accept", "user-agent"],
};

/// WebDAV routes
pub const WEBDAV_HEADERS: HeaderAllowList = HeaderAllowList {
    name: "webdav",
    headers: &[
        "content-type",
        "content-length",
        "depth",
        "destination",
        "overwrite",
    ],
};

impl HeaderAllowList {
    pub fn allows(&self, name: &str) -> bool {
        self.headers.iter().any(|h| name.eq_ignore_ascii_case(h))
    }

    /// Outbound header set for a request carrying `inbound` headers
    pub fn outbound_headers(&self, inbound: &HeaderMap) -> HeaderMap {
        let mut outbound = HeaderMap::new();
        for name in self.headers {
            if let Some(value) = inbound.get(*name).filter(|v| !v.is_empty()) {
                outbound.insert(*name, value.clone());
            }
        }
        // The relay copies bytes as-is; upstream compression would leak through
        outbound.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        outbound
    }
}

/// Hop-by-hop headers, meaningful only for a single connection
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

/// Whether an upstream response header may be copied to the client.
///
/// `Content-Encoding` is dropped: identity was requested, so a marker
/// left by the upstream would misdescribe the relayed bytes.
pub fn is_relayable_response_header(name: &str) -> bool {
    !name.eq_ignore_ascii_case("content-encoding")
        && !HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound() -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert("content-type", HeaderValue::from_static("application/json"));
        map.insert("accept", HeaderValue::from_static("text/event-stream"));
        map.insert("user-agent", HeaderValue::from_static("kelivo/1.0"));
        map.insert("authorization", HeaderValue::from_static("Bearer client-secret"));
        map.insert("x-access-code", HeaderValue::from_static("code"));
        map.insert("accept-encoding", HeaderValue::from_static("gzip, br"));
        map.insert("depth", HeaderValue::from_static("1"));
        map.insert("content-length", HeaderValue::from_static("42"));
        map.insert("cookie", HeaderValue::from_static("session=1"));
        map
    }

    #[test]
    fn test_api_allow_list() {
        let out = API_HEADERS.outbound_headers(&inbound());
        assert_eq!(out["content-type"], "application/json");
        assert_eq!(out["accept"], "text/event-stream");
        assert_eq!(out["user-agent"], "kelivo/1.0");
        assert_eq!(out["accept-encoding"], "identity");
        assert!(out.get("authorization").is_none());
        assert!(out.get("x-access-code").is_none());
        assert!(out.get("depth").is_none());
        assert!(out.get("cookie").is_none());
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_webdav_allow_list() {
        let out = WEBDAV_HEADERS.outbound_headers(&inbound());
        assert_eq!(out["depth"], "1");
        assert_eq!(out["content-length"], "42");
        assert_eq!(out["accept-encoding"], "identity");
        assert!(out.get("accept").is_none());
        assert!(out.get("authorization").is_none());
        assert!(WEBDAV_HEADERS.allows("Destination"));
        assert!(!WEBDAV_HEADERS.allows("User-Agent"));
    }

    #[test]
    fn test_relayable_response_headers() {
        assert!(!is_relayable_response_header("Content-Encoding"));
        assert!(!is_relayable_response_header("transfer-encoding"));
        assert!(!is_relayable_response_header("Connection"));
        assert!(is_relayable_response_header("content-type"));
        assert!(is_relayable_response_header("etag"));
        assert!(is_relayable_response_header("dav"));
    }
}
