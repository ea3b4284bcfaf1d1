use std::path::PathBuf;
use url::Url;

use crate::error::{AppError, AppResult};
use crate::proxy::config::{GatewayConfig, UpstreamProxyConfig, DEFAULT_MAX_UPLOAD_BYTES};

const DEFAULT_LISTEN_ADDR: &str = ":8080";
const DEFAULT_UPLOAD_DIR: &str = "./uploads";

/// Load gateway config from the process environment
pub fn load_app_config() -> AppResult<GatewayConfig> {
    parse_config(|key| std::env::var(key).ok())
}

/// Build config from an arbitrary variable lookup.
///
/// Values are trimmed; blank values count as unset.
pub fn parse_config<F>(lookup: F) -> AppResult<GatewayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let listen_addr =
        normalize_listen_addr(&get("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.into()));

    let upstream_base_url = get("UPSTREAM_BASE_URL")
        .map(|raw| parse_upstream_url(&raw))
        .transpose()?;

    let max_upload_bytes = get("MAX_UPLOAD_MB")
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|mb| *mb > 0)
        .and_then(|mb| mb.checked_mul(1 << 20))
        .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

    let outbound_proxy = match get("OUTBOUND_PROXY") {
        None => UpstreamProxyConfig::System,
        Some(v) if v.eq_ignore_ascii_case("direct") || v.eq_ignore_ascii_case("none") => {
            UpstreamProxyConfig::Direct
        }
        Some(v) => {
            Url::parse(&v)
                .map_err(|e| AppError::Config(format!("invalid OUTBOUND_PROXY: {}", e)))?;
            UpstreamProxyConfig::Url(v)
        }
    };

    Ok(GatewayConfig {
        listen_addr,
        upstream_base_url,
        upstream_api_key: get("UPSTREAM_API_KEY"),
        access_codes: split_csv(get("ACCESS_CODE").as_deref()),
        allowed_origins: split_csv(get("CORS_ALLOW_ORIGINS").as_deref()),
        upload_dir: PathBuf::from(get("UPLOAD_DIR").unwrap_or_else(|| DEFAULT_UPLOAD_DIR.into())),
        max_upload_bytes,
        outbound_proxy,
    })
}

fn parse_upstream_url(raw: &str) -> AppResult<Url> {
    let mut url = Url::parse(raw)
        .map_err(|e| AppError::Config(format!("invalid UPSTREAM_BASE_URL: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AppError::Config(
            "UPSTREAM_BASE_URL must be http(s)".to_string(),
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(AppError::Config(
            "UPSTREAM_BASE_URL must include host".to_string(),
        ));
    }

    let trimmed = url.path().trim_end_matches('/').to_string();
    url.set_path(&trimmed);
    Ok(url)
}

/// ":8080" binds every interface
fn normalize_listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

fn split_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(vars: &[(&str, &str)]) -> AppResult<GatewayConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        parse_config(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert!(config.upstream_base_url.is_none());
        assert!(config.access_codes.is_empty());
        assert!(config.allowed_origins.is_empty());
        assert_eq!(config.upload_dir, PathBuf::from("./uploads"));
        assert_eq!(config.max_upload_bytes, 25 << 20);
        assert_eq!(config.outbound_proxy, UpstreamProxyConfig::System);
    }

    #[test]
    fn test_upstream_url_trailing_slash_trimmed() {
        let config = parse(&[
            ("UPSTREAM_BASE_URL", " https://api.example.com/v1/ "),
            ("UPSTREAM_API_KEY", "sk-1"),
        ])
        .unwrap();
        let url = config.upstream_base_url.unwrap();
        assert_eq!(url.path(), "/v1");
        assert_eq!(config.upstream_api_key.as_deref(), Some("sk-1"));
    }

    #[test]
    fn test_upstream_url_rejected() {
        assert!(matches!(
            parse(&[("UPSTREAM_BASE_URL", "ftp://example.com")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            parse(&[("UPSTREAM_BASE_URL", "not a url")]),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_csv_lists() {
        let config = parse(&[
            ("ACCESS_CODE", " a, ,b ,"),
            ("CORS_ALLOW_ORIGINS", "https://app.example.com,*"),
        ])
        .unwrap();
        assert_eq!(config.access_codes, vec!["a", "b"]);
        assert_eq!(config.allowed_origins, vec!["https://app.example.com", "*"]);
    }

    #[test]
    fn test_max_upload_fallback() {
        assert_eq!(
            parse(&[("MAX_UPLOAD_MB", "4")]).unwrap().max_upload_bytes,
            4 << 20
        );
        assert_eq!(
            parse(&[("MAX_UPLOAD_MB", "0")]).unwrap().max_upload_bytes,
            25 << 20
        );
        assert_eq!(
            parse(&[("MAX_UPLOAD_MB", "lots")]).unwrap().max_upload_bytes,
            25 << 20
        );
    }

    #[test]
    fn test_listen_addr_and_proxy() {
        let config = parse(&[
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("OUTBOUND_PROXY", "direct"),
        ])
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.outbound_proxy, UpstreamProxyConfig::Direct);

        let config = parse(&[("OUTBOUND_PROXY", "socks5://127.0.0.1:1080")]).unwrap();
        assert_eq!(
            config.outbound_proxy,
            UpstreamProxyConfig::Url("socks5://127.0.0.1:1080".to_string())
        );
    }
}
