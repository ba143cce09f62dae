//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with built-in and caller-supplied routes
//! - Wire up middleware (request ID, tracing, metrics, panic recovery,
//!   CORS, rate limiting, body limit, timeout)
//! - Run the accept loop on its own task, stopping on the drain signal

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    response::Response,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::response;
use crate::lifecycle::tasks::BackgroundTaskTracker;
use crate::observability::metrics::metrics_middleware;
use crate::security::rate_limit::{rate_limit_middleware, ClientLimiterRegistry};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub limiter: Arc<ClientLimiterRegistry>,
    /// Deferred work that must finish before the process exits.
    pub tasks: BackgroundTaskTracker,
}

/// HTTP server for the API.
pub struct HttpServer {
    state: AppState,
    routes: Router<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: AppConfig, tasks: BackgroundTaskTracker) -> Self {
        let limiter = Arc::new(ClientLimiterRegistry::new(&config.rate_limit));

        Self {
            state: AppState {
                config: Arc::new(config),
                limiter,
                tasks,
            },
            routes: Router::new(),
        }
    }

    /// Merge additional resource routes behind the shared middleware stack.
    pub fn with_routes(mut self, routes: Router<AppState>) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The complete router, middleware included.
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), self.routes.clone())
    }

    /// Start accepting connections on `listener` in a background task.
    ///
    /// The accept loop stops as soon as `drain` fires; the returned handle
    /// resolves once in-flight connections have finished.
    pub fn spawn(
        self,
        listener: TcpListener,
        mut drain: broadcast::Receiver<()>,
    ) -> io::Result<ServerHandle> {
        let addr = listener.local_addr()?;

        if self.state.limiter.is_enabled() {
            self.state.limiter.spawn_sweeper();
        }

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        tracing::info!(
            address = %addr,
            env = %self.state.config.environment,
            "starting server"
        );

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = drain.recv().await;
                })
                .await
        });

        Ok(ServerHandle { addr, task })
    }
}

/// Build the Axum router with all middleware layers.
///
/// Layers are listed innermost first.
#[allow(deprecated)]
fn build_router(state: AppState, routes: Router<AppState>) -> Router {
    let config = Arc::clone(&state.config);

    let router = Router::new()
        .route("/v1/healthcheck", get(handlers::healthcheck))
        .merge(routes)
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.limiter),
            rate_limit_middleware,
        ));

    // Preflights are answered here, ahead of the rate limiter.
    let router = match cors_layer(&config.cors.trusted_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router
        .layer(CatchPanicLayer::custom(response::handler_panicked))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id_layer())
        .with_state(state)
}

/// CORS for the trusted origins, or `None` when there are none.
fn cors_layer(trusted_origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = trusted_origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::OPTIONS, Method::PUT, Method::PATCH, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    )
}

async fn not_found() -> Response {
    response::not_found()
}

async fn method_not_allowed(method: Method) -> Response {
    response::method_not_allowed(&method)
}

/// A running accept loop.
#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    task: JoinHandle<io::Result<()>>,
}

impl ServerHandle {
    #[cfg(test)]
    pub(crate) fn from_task(addr: SocketAddr, task: JoinHandle<io::Result<()>>) -> Self {
        Self { addr, task }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the accept loop to end.
    ///
    /// After a drain signal this means every in-flight connection has
    /// finished. Must not be awaited again once it has resolved.
    pub async fn closed(&mut self) -> io::Result<()> {
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(e)),
        }
    }
}
