// WebDAV proxy
//
// Lets the web frontend reach WebDAV servers it could not call directly
// because of CORS. The destination comes from the request itself:
//   X-WebDAV-URL       target server base URL (required, http/https)
//   X-WebDAV-Username  Basic auth username (optional)
//   X-WebDAV-Password  Basic auth password (optional)
use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use reqwest::Client;

use crate::error::ProxyError;
use crate::proxy::common::headers::WEBDAV_HEADERS;
use crate::proxy::common::relay::RelayMode;
use crate::proxy::common::target::resolve_webdav;
use crate::proxy::server::AppState;
use crate::proxy::upstream::forward::{Forwarder, MethodPolicy, RouteProfile, UpstreamErrors};

const WEBDAV_PROFILE: RouteProfile = RouteProfile {
    name: "webdav",
    methods: MethodPolicy::Any,
    headers: WEBDAV_HEADERS,
    body_limit: None,
    relay: RelayMode::Plain,
    upstream_errors: UpstreamErrors::Detailed("webdav request failed"),
};

pub struct WebDavProxy {
    forwarder: Forwarder,
}

impl WebDavProxy {
    pub fn new(client: Client) -> Self {
        Self {
            forwarder: Forwarder::new(client, WEBDAV_PROFILE),
        }
    }

    /// Must sit behind the access gate
    pub async fn handle(&self, request: Request) -> Result<Response, ProxyError> {
        let target = resolve_webdav(request.headers(), request.uri())?;
        self.forwarder.forward(request, target).await
    }
}

pub async fn handle_webdav(State(state): State<AppState>, request: Request) -> Response {
    match state.webdav.handle(request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}
