//! # HTTP Server Module
//!
//! Two axum listeners:
//! - the discovery port, where every request is redirected to a broker
//! - the admin port, with health, host usage, instance list and metrics

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router as AxumRouter};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::core::config::ServerConfig;
use crate::core::error::{DiscoveryError, DiscoveryResult};
use crate::gateway::redirect::{redirect_handler, RedirectState};
use crate::host_usage::HostUsageHandle;
use crate::load_balancing::RoundRobinRouter;

/// Shared state of the admin surface
#[derive(Clone)]
pub struct AdminState {
    pub router: Arc<RoundRobinRouter>,
    pub host_usage: Option<Arc<HostUsageHandle>>,
    pub prometheus: Option<PrometheusHandle>,
}

/// Discovery HTTP server
pub struct DiscoveryServer {
    bind_addr: SocketAddr,
    admin_bind_addr: SocketAddr,
    discovery_app: AxumRouter,
    admin_app: AxumRouter,
}

impl DiscoveryServer {
    /// Build both applications from the server configuration
    pub fn new(
        config: &ServerConfig,
        router: Arc<RoundRobinRouter>,
        host_usage: Option<Arc<HostUsageHandle>>,
        prometheus: Option<PrometheusHandle>,
    ) -> DiscoveryResult<Self> {
        let bind_addr = parse_addr(&config.bind_address, config.web_service_port)?;
        let admin_bind_addr = parse_addr(&config.bind_address, config.admin_port)?;

        let redirect_state = RedirectState {
            router: router.clone(),
            tls_fronted: config.tls_fronted,
            redirect_status: config.redirect_status.status_code(),
        };
        let admin_state = AdminState {
            router,
            host_usage,
            prometheus,
        };

        Ok(Self {
            bind_addr,
            admin_bind_addr,
            discovery_app: discovery_app(redirect_state),
            admin_app: admin_app(admin_state),
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub fn admin_bind_addr(&self) -> SocketAddr {
        self.admin_bind_addr
    }

    /// Serve both listeners until one of them fails
    #[instrument(skip(self))]
    pub async fn start(self) -> DiscoveryResult<()> {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| DiscoveryError::internal(format!("Failed to bind discovery server to {}: {}", self.bind_addr, e)))?;
        let admin_listener = TcpListener::bind(self.admin_bind_addr)
            .await
            .map_err(|e| DiscoveryError::internal(format!("Failed to bind admin server to {}: {}", self.admin_bind_addr, e)))?;

        info!("Discovery HTTP server listening on {}", self.bind_addr);
        info!("Admin HTTP server listening on {}", self.admin_bind_addr);

        tokio::select! {
            result = axum::serve(listener, self.discovery_app) => {
                result.map_err(|e| DiscoveryError::internal(format!("Discovery server error: {}", e)))?;
            }
            result = axum::serve(admin_listener, self.admin_app) => {
                result.map_err(|e| DiscoveryError::internal(format!("Admin server error: {}", e)))?;
            }
        }

        Ok(())
    }
}

fn parse_addr(bind_address: &str, port: u16) -> DiscoveryResult<SocketAddr> {
    format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| DiscoveryError::config(format!("Invalid bind address {}:{}: {}", bind_address, port, e)))
}

/// Redirect application: every method on every path goes to the fallback
pub fn discovery_app(state: RedirectState) -> AxumRouter {
    AxumRouter::new()
        .fallback(redirect_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Admin application
pub fn admin_app(state: AdminState) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(health_check))
        .route("/admin/host-usage", get(host_usage))
        .route("/admin/instances", get(instances))
        .route("/admin/router", get(router_stats))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn host_usage(State(state): State<AdminState>) -> Response {
    match &state.host_usage {
        Some(handle) => Json(*handle.current_usage()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "host usage sampling is disabled" })),
        )
            .into_response(),
    }
}

async fn instances(State(state): State<AdminState>) -> Response {
    let instances = state.router.registry().healthy_instances();
    Json(instances.as_ref().clone()).into_response()
}

async fn router_stats(State(state): State<AdminState>) -> Response {
    Json(state.router.stats()).into_response()
}

async fn prometheus_metrics(State(state): State<AdminState>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter is disabled").into_response(),
    }
}
