use std::path::PathBuf;
use url::Url;

/// Default upload ceiling (25 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 25 << 20;

/// Gateway configuration, built once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address, e.g. "0.0.0.0:8080"
    pub listen_addr: String,

    /// OpenAI-compatible upstream base URL (path without trailing slash)
    pub upstream_base_url: Option<Url>,

    /// Bearer key injected into every upstream API call
    pub upstream_api_key: Option<String>,

    /// Accepted access codes. Empty means open mode.
    pub access_codes: Vec<String>,

    /// Allowed CORS origins. Empty means same-origin only.
    pub allowed_origins: Vec<String>,

    /// Where uploaded files are stored
    pub upload_dir: PathBuf,

    /// Upload body ceiling in bytes
    pub max_upload_bytes: u64,

    /// Outbound proxy for upstream and WebDAV calls
    pub outbound_proxy: UpstreamProxyConfig,
}

/// How outbound connections reach the network
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UpstreamProxyConfig {
    /// Honour the usual proxy environment variables
    #[default]
    System,
    /// Connect directly, ignoring proxy environment variables
    Direct,
    /// Explicit proxy address (http://, https://, socks5://)
    Url(String),
}

impl GatewayConfig {
    /// Upstream base URL and key, only when both are present.
    ///
    /// The API proxy routes exist iff this returns `Some`.
    pub fn api_upstream(&self) -> Option<(&Url, &str)> {
        match (&self.upstream_base_url, &self.upstream_api_key) {
            (Some(url), Some(key)) if !key.is_empty() => Some((url, key.as_str())),
            _ => None,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            upstream_base_url: None,
            upstream_api_key: None,
            access_codes: Vec::new(),
            allowed_origins: Vec::new(),
            upload_dir: PathBuf::from("./uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            outbound_proxy: UpstreamProxyConfig::default(),
        }
    }
}
