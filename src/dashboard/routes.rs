//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.
//! Tracker and provider reads take their own locks, so every response is a
//! consistent snapshot even while a cycle is writing.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::data::manager::{AdapterStatus, ManagerStats, ProviderManager};
use crate::engine::tracker::{SymbolTracker, TrackerStats};
use crate::notify::AlertLog;
use crate::types::{AlertRecord, CycleReport, SymbolState};

/// Cycle reports kept for `/api/cycles`.
pub const MAX_CYCLE_LOG: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub tracker: Arc<SymbolTracker>,
    pub manager: Arc<ProviderManager>,
    pub alerts: Arc<AlertLog>,
    pub cycle_log: RwLock<Vec<CycleReport>>,
}

impl DashboardState {
    pub fn new(
        name: &str,
        tracker: Arc<SymbolTracker>,
        manager: Arc<ProviderManager>,
        alerts: Arc<AlertLog>,
    ) -> Self {
        Self {
            name: name.to_string(),
            started_at: Utc::now(),
            tracker,
            manager,
            alerts,
            cycle_log: RwLock::new(Vec::new()),
        }
    }

    /// Append a finished cycle, keeping the last `MAX_CYCLE_LOG`.
    pub async fn record_cycle(&self, report: CycleReport) {
        let mut log = self.cycle_log.write().await;
        log.push(report);
        if log.len() > MAX_CYCLE_LOG {
            let excess = log.len() - MAX_CYCLE_LOG;
            log.drain(..excess);
        }
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub name: String,
    pub uptime_secs: i64,
    pub cycle_count: u64,
    pub last_cycle: Option<CycleReport>,
    pub tracked_symbols: usize,
    pub watchlist_size: usize,
    pub tracker: TrackerStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolDetail {
    #[serde(flatten)]
    pub state: SymbolState,
    pub cooldown_remaining_secs: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvidersResponse {
    pub adapters: Vec<AdapterStatus>,
    pub stats: ManagerStats,
}

pub type AppState = Arc<DashboardState>;

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let last_cycle = state.cycle_log.read().await.last().cloned();
    Json(StatusResponse {
        name: state.name.clone(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        cycle_count: last_cycle.as_ref().map_or(0, |c| c.cycle_number),
        last_cycle,
        tracked_symbols: state.tracker.snapshot().len(),
        watchlist_size: state.tracker.watchlist().len(),
        tracker: state.tracker.stats(),
    })
}

/// GET /api/watchlist
pub async fn get_watchlist(State(state): State<AppState>) -> Json<Vec<SymbolState>> {
    Json(state.tracker.watchlist())
}

/// GET /api/symbols/:symbol
pub async fn get_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<SymbolDetail>, StatusCode> {
    let symbol = symbol.to_uppercase();
    let detail = state.tracker.get(&symbol).ok_or(StatusCode::NOT_FOUND)?;
    let remaining = state
        .tracker
        .cooldown_remaining(&symbol, Utc::now())
        .map(|d| d.num_seconds());
    Ok(Json(SymbolDetail {
        state: detail,
        cooldown_remaining_secs: remaining,
    }))
}

/// GET /api/providers
pub async fn get_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        adapters: state.manager.health_summary(),
        stats: state.manager.stats(),
    })
}

/// GET /api/cycles
pub async fn get_cycles(State(state): State<AppState>) -> Json<Vec<CycleReport>> {
    let log = state.cycle_log.read().await;
    Json(log.clone())
}

/// GET /api/alerts
pub async fn get_alerts(State(state): State<AppState>) -> Json<Vec<AlertRecord>> {
    let mut alerts = state.alerts.recent();
    alerts.reverse();
    Json(alerts)
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
