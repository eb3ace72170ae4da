//! HTTP server wiring: tower-http middleware stack and graceful shutdown.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{HeaderName, Request};
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    sensitive_headers::SetSensitiveRequestHeadersLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use uuid::Uuid;

use crate::config::ThunderConfig;
use crate::error::Result;

const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie"];

#[derive(Clone, Default)]
struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Wraps a configured [`ThunderConfig`] to serve a router with the standard
/// middleware stack and graceful shutdown.
pub struct Server {
    config: ThunderConfig,
}

impl Server {
    pub fn new(config: ThunderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ThunderConfig {
        &self.config
    }

    /// Layer `app` with the standard stack and serve it until a shutdown
    /// signal arrives. Layer order, outermost first: CORS, timeout, trace,
    /// sensitive-header masking, request-id propagation/assignment, panic
    /// recovery.
    pub async fn serve(self, app: Router) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.service.port));
        tracing::info!(service = %self.config.service.name, %addr, "starting server");

        let request_id_header = HeaderName::from_static("x-request-id");

        let app = app
            .layer(CorsLayer::permissive())
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.service.timeout_secs)))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().include_headers(true))
                    .on_response(DefaultOnResponse::new().include_headers(true)),
            )
            .layer(SetSensitiveRequestHeadersLayer::new(
                SENSITIVE_HEADERS.iter().map(|h| HeaderName::from_static(h)),
            ))
            .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
            .layer(SetRequestIdLayer::new(request_id_header, UuidRequestId))
            .layer(CatchPanicLayer::new());

        let listener = TcpListener::bind(&addr).await.map_err(|e| crate::error::Error::Config(e.to_string()))?;
        tracing::info!(%addr, "listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| crate::error::Error::Config(e.to_string()))?;

        tracing::info!("server shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, starting graceful shutdown"),
    }
}
