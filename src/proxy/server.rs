use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{any, get, MethodRouter},
    Router,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::error::{AppResult, ProxyError};
use crate::proxy::common::target::{ApiRoute, StaticTarget, WEBDAV_MOUNT};
use crate::proxy::config::GatewayConfig;
use crate::proxy::handlers::{self, files::FileStore, openai::ApiProxy, webdav::WebDavProxy};
use crate::proxy::middleware::{auth_middleware, cors_middleware, AccessGate, CorsPolicy};
use crate::proxy::upstream::client::{create_client, API_CLIENT, WEBDAV_CLIENT};

/// Slow clients get this long to send their request head
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Axum application state
///
/// Everything here is immutable after startup; the only shared resources
/// are the config and the pooled clients inside the proxies.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub gate: AccessGate,
    pub cors: CorsPolicy,
    /// Present only when both upstream URL and key are configured
    pub api: Option<Arc<ApiProxy>>,
    pub webdav: Arc<WebDavProxy>,
    pub files: Arc<FileStore>,
}

impl AppState {
    pub fn new(config: Arc<GatewayConfig>) -> AppResult<Self> {
        let gate = AccessGate::new(config.access_codes.clone());
        let cors = CorsPolicy::new(config.allowed_origins.clone());

        let api = match config.api_upstream() {
            Some((base, key)) => {
                let client = create_client(API_CLIENT, &config.outbound_proxy)?;
                Some(Arc::new(ApiProxy::new(
                    StaticTarget::new(base.clone(), key),
                    client,
                )))
            }
            None => None,
        };

        let webdav = Arc::new(WebDavProxy::new(create_client(
            WEBDAV_CLIENT,
            &config.outbound_proxy,
        )?));
        let files = Arc::new(FileStore::new(
            config.upload_dir.clone(),
            config.max_upload_bytes,
            gate.clone(),
        ));

        Ok(Self {
            config,
            gate,
            cors,
            api,
            webdav,
            files,
        })
    }
}

/// Build the full route table.
///
/// Layer order, outermost first: CORS (answers every preflight), request
/// tracing, then the access gate on protected routes only.
pub fn build_router(state: AppState) -> Router {
    let mut protected: Router<AppState> = Router::new()
        .route(
            "/webapi/upload",
            any(handlers::files::handle_upload).layer(DefaultBodyLimit::max(
                usize::try_from(state.files.max_upload_bytes()).unwrap_or(usize::MAX),
            )),
        )
        .route(WEBDAV_MOUNT, any(handlers::webdav::handle_webdav))
        .route("/webapi/webdav/", any(handlers::webdav::handle_webdav))
        .route("/webapi/webdav/*path", any(handlers::webdav::handle_webdav));

    if let Some(api) = &state.api {
        for route in ApiRoute::ALL {
            protected = protected.route(route.gateway_path(), api_route(api.clone(), route));
        }
        tracing::info!("LLM proxy enabled: upstream={}", api.upstream());
    } else {
        tracing::info!("LLM proxy disabled (UPSTREAM_BASE_URL or UPSTREAM_API_KEY not set)");
    }

    let protected = protected.route_layer(from_fn_with_state(state.gate.clone(), auth_middleware));

    Router::new()
        .route("/healthz", get(health_check_handler))
        .route("/files/*name", get(handlers::files::handle_file))
        .merge(protected)
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.cors.clone(), cors_middleware))
        .with_state(state)
}

/// Bind one API route to the shared proxy component
fn api_route(api: Arc<ApiProxy>, route: ApiRoute) -> MethodRouter<AppState> {
    any(move |request: Request| async move { api.handle(route, request).await })
}

/// Axum server instance
pub struct AxumServer {
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl AxumServer {
    /// Start Axum server
    pub async fn start(state: AppState) -> AppResult<(Self, tokio::task::JoinHandle<()>)> {
        let addr = state.config.listen_addr.clone();
        let app = build_router(state);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("kelivo-gateway listening on {}", listener.local_addr()?);

        // Create shutdown channel
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        // Start server in new task
        let handle = tokio::spawn(async move {
            use hyper::server::conn::http1;
            use hyper_util::rt::{TokioIo, TokioTimer};
            use hyper_util::service::TowerToHyperService;

            loop {
                tokio::select! {
                    res = listener.accept() => {
                        match res {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let service = TowerToHyperService::new(app.clone());

                                // One task per connection; dropping it on disconnect
                                // drops the in-flight handler and its upstream call.
                                tokio::task::spawn(async move {
                                    if let Err(err) = http1::Builder::new()
                                        .timer(TokioTimer::new())
                                        .header_read_timeout(HEADER_READ_TIMEOUT)
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        debug!("Connection handling finished or errored: {:?}", err);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {:?}", e);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::info!("Gateway stopped listening");
                        break;
                    }
                }
            }
        });

        Ok((
            Self {
                shutdown_tx: Some(shutdown_tx),
            },
            handle,
        ))
    }

    /// Stop server
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Health check handler
async fn health_check_handler() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "ok\n",
    )
        .into_response()
}

async fn not_found_handler() -> Response {
    ProxyError::NotFound.into_response()
}
