// OpenAI-compatible API proxy
use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use reqwest::Client;

use crate::proxy::common::headers::API_HEADERS;
use crate::proxy::common::relay::RelayMode;
use crate::proxy::common::target::{ApiRoute, StaticTarget};
use crate::proxy::upstream::forward::{Forwarder, MethodPolicy, RouteProfile, UpstreamErrors};

/// Chat payloads are JSON and stay small; anything bigger is abuse
pub const MAX_API_BODY_BYTES: u64 = 10 << 20;

const API_PROFILE: RouteProfile = RouteProfile {
    name: "api",
    methods: MethodPolicy::GetOrPost,
    headers: API_HEADERS,
    body_limit: Some(MAX_API_BODY_BYTES),
    relay: RelayMode::Live,
    upstream_errors: UpstreamErrors::Generic("upstream error"),
};

/// Relays `/v1/*` calls to the configured upstream with its API key
pub struct ApiProxy {
    target: StaticTarget,
    forwarder: Forwarder,
}

impl ApiProxy {
    pub fn new(target: StaticTarget, client: Client) -> Self {
        Self {
            target,
            forwarder: Forwarder::new(client, API_PROFILE),
        }
    }

    pub fn upstream(&self) -> &url::Url {
        self.target.base()
    }

    pub async fn handle(&self, route: ApiRoute, request: Request) -> Response {
        let target = self.target.resolve(route, request.uri());
        match self.forwarder.forward(request, target).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }
}
