// Pooled outbound HTTP clients
use reqwest::{Client, Proxy};
use tokio::time::Duration;

use crate::error::{AppError, AppResult};
use crate::proxy::config::UpstreamProxyConfig;

/// Pool and timeout settings for one outbound client
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
    /// Overall per-request deadline. `None` leaves long streams alone.
    pub request_timeout: Option<Duration>,
}

/// API proxy: chat streams may run for minutes, so there is no overall
/// deadline; a client disconnect is what ends a stuck call.
pub const API_CLIENT: ClientOptions = ClientOptions {
    max_idle_per_host: 64,
    idle_timeout: Duration::from_secs(90),
    connect_timeout: Duration::from_secs(10),
    request_timeout: None,
};

/// WebDAV proxy: bounded so a stalled server cannot pin a request forever
pub const WEBDAV_CLIENT: ClientOptions = ClientOptions {
    max_idle_per_host: 32,
    idle_timeout: Duration::from_secs(90),
    connect_timeout: Duration::from_secs(10),
    request_timeout: Some(Duration::from_secs(120)),
};

/// Build a client, shared by every request of its route family
pub fn create_client(options: ClientOptions, proxy: &UpstreamProxyConfig) -> AppResult<Client> {
    let mut builder = Client::builder()
        .pool_max_idle_per_host(options.max_idle_per_host)
        .pool_idle_timeout(options.idle_timeout)
        .connect_timeout(options.connect_timeout)
        .tcp_keepalive(Duration::from_secs(30));

    if let Some(timeout) = options.request_timeout {
        builder = builder.timeout(timeout);
    }

    match proxy {
        UpstreamProxyConfig::System => {}
        UpstreamProxyConfig::Direct => {
            builder = builder.no_proxy();
        }
        UpstreamProxyConfig::Url(url) => {
            let proxy = Proxy::all(url)
                .map_err(|e| AppError::Config(format!("Invalid proxy address {}: {}", url, e)))?;
            builder = builder.proxy(proxy);
            tracing::info!("Outbound proxy enabled: {}", url);
        }
    }

    Ok(builder.build()?)
}
