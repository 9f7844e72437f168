//! HTTP surface: `GET /api/dashboard`.

use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::db::StorageGateway;
use crate::errors::{AppError, AppResult};
use crate::models::{DashboardPayload, DashboardQuery, Filter};
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::Instrument;
use uuid::Uuid;

pub fn router<G>(dashboard: Dashboard<G>, config: &Config) -> Router
where
    G: StorageGateway + 'static,
{
    Router::new()
        .route("/api/dashboard", get(dashboard_handler::<G>))
        .layer(cors_layer(config))
        .with_state(Arc::new(dashboard))
}

pub async fn serve<G>(config: &Config, dashboard: Dashboard<G>) -> AppResult<()>
where
    G: StorageGateway + 'static,
{
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "dashboard API listening");

    axum::serve(listener, router(dashboard, config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn dashboard_handler<G: StorageGateway>(
    State(dashboard): State<Arc<Dashboard<G>>>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardPayload>, ApiError> {
    let request_id = Uuid::new_v4();
    let filter = Filter::from_query(&query).map_err(|error| {
        tracing::warn!(request_id = %request_id, error = %error, "rejected dashboard filter");
        ApiError(error)
    })?;
    let span = tracing::info_span!("dashboard_request", request_id = %request_id);

    dashboard
        .get_dashboard(&filter)
        .instrument(span)
        .await
        .map(Json)
        .map_err(|error| {
            tracing::error!(
                request_id = %request_id,
                metric = error.failed_metric().unwrap_or("unknown"),
                error = %error,
                "dashboard request failed"
            );
            ApiError(error)
        })
}

/// Failures are reported to clients as a generic 500; details stay in logs.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "statusCode": 500,
                "message": "Internal server error",
            })),
        )
            .into_response()
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let allow_origin = match config.cors_origins() {
        None => AllowOrigin::mirror_request(),
        Some(origins) => AllowOrigin::list(origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|error| tracing::warn!(origin = %origin, error = %error, "ignoring invalid CORS origin"))
                .ok()
        })),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::HEAD])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
