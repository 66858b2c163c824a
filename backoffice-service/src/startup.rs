//! Application startup and lifecycle management.

use crate::config::BackofficeConfig;
use crate::handlers::{move_table, payroll};
use crate::services::{get_metrics, init_metrics, Database, PayrollReconciler, TableResolver};
use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse, routing::get,
    routing::post, routing::put, Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: BackofficeConfig,
    pub db: Arc<Database>,
}

impl AppState {
    /// Request-scoped payroll reconciler over the shared store.
    pub fn payroll_reconciler(&self) -> PayrollReconciler {
        PayrollReconciler::new(
            self.db.clone(),
            self.db.clone(),
            self.db.clone(),
            self.config.venue.timezone,
        )
    }

    /// Request-scoped table resolver over the shared store.
    pub fn table_resolver(&self) -> TableResolver {
        TableResolver::new(
            self.db.clone(),
            self.db.clone(),
            self.db.clone(),
            self.db.clone(),
            self.config.venue.clone(),
        )
    }
}

/// State for health check endpoints.
#[derive(Clone)]
struct HealthState {
    db: Arc<Database>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "backoffice-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "backoffice-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

fn api_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/boh/table-bookings/:booking_id/move-table",
            get(move_table::move_table_options).post(move_table::move_table),
        )
        .route("/boh/payroll/:year/:month", get(payroll::payroll_month))
        .route(
            "/boh/payroll/:year/:month/approve",
            post(payroll::approve_month),
        )
        .route(
            "/boh/payroll/:year/:month/rows",
            put(payroll::update_row_times).delete(payroll::delete_row),
        )
        .route(
            "/boh/payroll/:year/:month/period",
            put(payroll::update_period),
        )
        .route("/boh/payroll/:year/:month/email", post(payroll::send_email))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: BackofficeConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the harness.
    pub async fn build_without_migrations(config: BackofficeConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: BackofficeConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let state = AppState {
            config: config.clone(),
            db: Arc::new(db),
        };

        let addr = SocketAddr::from((
            config
                .common
                .host
                .parse::<std::net::IpAddr>()
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid host: {}", e)))?,
            config.common.port,
        ));
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn db(&self) -> Arc<Database> {
        self.state.db.clone()
    }

    /// Serve until the socket closes or the task is aborted.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let health_state = HealthState {
            db: self.state.db.clone(),
        };

        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .with_state(health_state)
            .route("/metrics", get(metrics_handler))
            .merge(api_router(self.state));

        tracing::info!(port = self.port, "HTTP server listening");
        axum::serve(self.listener, router).await
    }
}
