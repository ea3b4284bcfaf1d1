// Request forwarding: build, send and relay one outbound call
use axum::{
    body::{Body, HttpBody},
    extract::Request,
    http::{header, HeaderMap, Method},
    response::Response,
};
use http_body_util::{LengthLimitError, Limited};
use reqwest::Client;
use std::error::Error as StdError;
use tracing::{debug, warn};

use crate::error::ProxyError;
use crate::proxy::common::headers::HeaderAllowList;
use crate::proxy::common::relay::{relay_response, RelayMode};
use crate::proxy::common::target::TargetSpec;

/// Methods a route accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodPolicy {
    Any,
    GetOrPost,
}

impl MethodPolicy {
    pub fn allows(self, method: &Method) -> bool {
        match self {
            MethodPolicy::Any => true,
            MethodPolicy::GetOrPost => method == Method::GET || method == Method::POST,
        }
    }
}

/// What the caller learns when the upstream cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrors {
    /// Fixed message, nothing about the upstream leaks
    Generic(&'static str),
    /// Prefix followed by the transport error text
    Detailed(&'static str),
}

/// Per route family forwarding rules
#[derive(Debug, Clone, Copy)]
pub struct RouteProfile {
    pub name: &'static str,
    pub methods: MethodPolicy,
    pub headers: HeaderAllowList,
    /// Request body ceiling, checked before connecting upstream
    pub body_limit: Option<u64>,
    pub relay: RelayMode,
    pub upstream_errors: UpstreamErrors,
}

/// Executes outbound calls for one route family over a pooled client
#[derive(Clone)]
pub struct Forwarder {
    client: Client,
    profile: RouteProfile,
}

impl Forwarder {
    pub fn new(client: Client, profile: RouteProfile) -> Self {
        Self { client, profile }
    }

    /// Forward `request` to `target` and relay the answer.
    ///
    /// The inbound body is streamed, never buffered. If the client goes
    /// away, the future (or the relayed body) is dropped, which cancels
    /// the outbound call with it.
    pub async fn forward(&self, request: Request, target: TargetSpec) -> Result<Response, ProxyError> {
        let profile = &self.profile;
        let (parts, body) = request.into_parts();

        if !profile.methods.allows(&parts.method) {
            return Err(ProxyError::MethodNotAllowed);
        }

        if let Some(limit) = profile.body_limit {
            if declared_length(&parts.headers).is_some_and(|len| len > limit) {
                debug!("[{}] rejected oversized body before connecting", profile.name);
                return Err(ProxyError::PayloadTooLarge);
            }
        }

        let mut headers = profile.headers.outbound_headers(&parts.headers);
        target.credential.apply(&mut headers)?;

        debug!(
            "[{}] {} {} -> {}{}",
            profile.name,
            parts.method,
            parts.uri.path(),
            target.url.host_str().unwrap_or_default(),
            target.url.path()
        );

        let mut builder = self
            .client
            .request(parts.method.clone(), target.url)
            .headers(headers);
        if !is_empty_body(&body) {
            builder = builder.body(outbound_body(body, profile.body_limit));
        }

        let upstream = builder.send().await.map_err(|e| self.upstream_error(e))?;

        Ok(relay_response(upstream, profile.relay, profile.name))
    }

    fn upstream_error(&self, err: reqwest::Error) -> ProxyError {
        if caused_by_length_limit(&err) {
            debug!("[{}] request body exceeded ceiling mid-stream", self.profile.name);
            return ProxyError::PayloadTooLarge;
        }
        warn!("[{}] upstream request failed: {}", self.profile.name, err);
        match self.profile.upstream_errors {
            UpstreamErrors::Generic(message) => ProxyError::Upstream(message.to_string()),
            UpstreamErrors::Detailed(prefix) => ProxyError::Upstream(format!("{}: {}", prefix, err)),
        }
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn is_empty_body(body: &Body) -> bool {
    HttpBody::size_hint(body).exact() == Some(0)
}

fn outbound_body(body: Body, limit: Option<u64>) -> reqwest::Body {
    match limit {
        Some(limit) => {
            let limited = Limited::new(body, usize::try_from(limit).unwrap_or(usize::MAX));
            reqwest::Body::wrap_stream(Body::new(limited).into_data_stream())
        }
        None => reqwest::Body::wrap_stream(body.into_data_stream()),
    }
}

fn caused_by_length_limit(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}
