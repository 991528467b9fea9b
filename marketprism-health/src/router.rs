//! Builds the `axum::Router` every MarketPrism binary serves unmodified,
//! grounded on `cooprefr-bettersys`'s `route_quality_monitor` binary
//! (same three routes, same pattern of a shared handle captured by the
//! `/metrics` closure).

use crate::readiness::ReadinessCheck;
use crate::registry::HealthRegistry;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

#[derive(Clone)]
struct AppState {
    registry: Arc<HealthRegistry>,
    readiness: Vec<Arc<dyn ReadinessCheck>>,
    prometheus: PrometheusHandle,
}

pub fn build_router(
    registry: Arc<HealthRegistry>,
    readiness: Vec<Arc<dyn ReadinessCheck>>,
    prometheus: PrometheusHandle,
) -> Router {
    let state = AppState {
        registry,
        readiness,
        prometheus,
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let statuses = state.registry.statuses();
    let alive = state.registry.is_alive();
    let body = serde_json::json!({
        "status": if alive { "ok" } else { "degraded" },
        "tasks": statuses,
    });

    let code = if alive { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(body))
}

async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut results = Vec::with_capacity(state.readiness.len());
    let mut all_ready = true;
    for check in &state.readiness {
        let ok = check.check().await;
        all_ready &= ok;
        results.push(serde_json::json!({ "dependency": check.name(), "ready": ok }));
    }

    let code = if all_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(serde_json::json!({ "ready": all_ready, "dependencies": results })))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.prometheus.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readiness::AlwaysReady;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let registry = Arc::new(HealthRegistry::new());
        let handle = PrometheusBuilder::new().build_recorder().handle();
        build_router(registry, vec![Arc::new(AlwaysReady)], handle)
    }

    #[tokio::test]
    async fn health_returns_200_with_no_registered_tasks() {
        let response = test_router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_returns_200_when_all_dependencies_are_ready() {
        let response = test_router()
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
