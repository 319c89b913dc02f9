//! Dashboard: read-only Axum server for the watchlist query path.
//!
//! Serves a small REST API over the tracker, provider health table and
//! cycle log. CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use routes::AppState;

/// Start the dashboard web server.
///
/// Binds before returning so a taken port fails startup; serving runs on a
/// background task.
pub async fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;

    info!(port, "Dashboard server starting on http://localhost:{port}");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/watchlist", get(routes::get_watchlist))
        .route("/api/symbols/:symbol", get(routes::get_symbol))
        .route("/api/providers", get(routes::get_providers))
        .route("/api/cycles", get(routes::get_cycles))
        .route("/api/alerts", get(routes::get_alerts))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::manager::{HealthPolicy, ProviderManager};
    use crate::data::mock::MockProvider;
    use crate::engine::tracker::{SymbolTracker, TrackerConfig};
    use crate::notify::AlertLog;
    use crate::types::{Phase, SymbolState};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use routes::DashboardState;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let names = vec!["mock".to_string()];
        let manager = ProviderManager::new(
            vec![Arc::new(MockProvider::new(1))],
            &names,
            &names,
            HealthPolicy::default(),
        )
        .unwrap();
        let tracker = Arc::new(SymbolTracker::new(TrackerConfig::default()));
        let universe: Vec<String> = ["AAA", "BBB", "CCC"].iter().map(|s| s.to_string()).collect();
        tracker.restore(
            vec![
                SymbolState { phase: Phase::Flagged, last_score: 62.0, ..SymbolState::new("AAA") },
                SymbolState { phase: Phase::Cooldown, last_score: 80.0, ..SymbolState::new("BBB") },
                SymbolState::new("CCC"),
            ],
            &universe,
        );
        Arc::new(DashboardState::new(
            "RADAR-TEST",
            tracker,
            Arc::new(manager),
            Arc::new(AlertLog::new(10)),
        ))
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (status, json) = get_json("/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "RADAR-TEST");
        assert_eq!(json["tracked_symbols"], 3);
        assert_eq!(json["watchlist_size"], 2);
    }

    #[tokio::test]
    async fn test_watchlist_sorted_by_score() {
        let (status, json) = get_json("/api/watchlist").await;
        assert_eq!(status, StatusCode::OK);
        let list = json.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["symbol"], "BBB");
        assert_eq!(list[1]["symbol"], "AAA");
    }

    #[tokio::test]
    async fn test_symbol_endpoint() {
        let (status, json) = get_json("/api/symbols/AAA").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["symbol"], "AAA");

        let (status, _) = get_json("/api/symbols/ZZZ").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_providers_endpoint() {
        let (status, json) = get_json("/api/providers").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["adapters"][0]["name"], "mock");
        assert!(json["stats"]["requests"].is_number());
    }

    #[tokio::test]
    async fn test_cycles_endpoint() {
        let (status, json) = get_json("/api/cycles").await;
        assert_eq!(status, StatusCode::OK);
        assert!(json.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .header("origin", "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("access-control-allow-origin"));
    }
}
