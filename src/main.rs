//! RADAR: pre-breakout accumulation scanner.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores tracker state from disk (or starts fresh), and runs the
//! periodic scan loop with graceful shutdown.

use anyhow::{Context, Result};
use chrono::Utc;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use radar::config::AppConfig;
use radar::dashboard::{self, routes::DashboardState};
use radar::data::finnhub::FinnhubProvider;
use radar::data::manager::ProviderManager;
use radar::data::mock::MockProvider;
use radar::data::yahoo::YahooProvider;
use radar::data::{DataProvider, NoContext};
use radar::engine::scanner::{ScanSettings, Scanner};
use radar::engine::tracker::SymbolTracker;
use radar::notify::{AlertLog, FanOut, LogDispatcher, NotificationDispatcher};
use radar::storage::{self, PersistedState};
use radar::strategy::features::FeatureExtractor;
use radar::strategy::scoring::ScoringEngine;
use radar::strategy::Pipeline;
use radar::types::CycleReport;

const BANNER: &str = r#"
 ____      _    ____    _    ____
|  _ \    / \  |  _ \  / \  |  _ \
| |_) |  / _ \ | | | |/ _ \ | |_) |
|  _ <  / ___ \| |_| / ___ \|  _ <
|_| \_\/_/   \_\____/_/   \_\_| \_\

  Pre-breakout accumulation scanner
  v0.1.0
"#;

/// Alerts kept in memory for `/api/alerts`.
const ALERT_LOG_CAPACITY: usize = 200;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load(&AppConfig::path_from_env())?;

    init_logging();

    println!("{BANNER}");
    info!(
        name = %cfg.scanner.name,
        scan_interval_secs = cfg.scanner.scan_interval_secs,
        universe = cfg.scanner.universe.len(),
        blacklisted = cfg.scanner.blacklist.len(),
        max_concurrency = cfg.scanner.max_concurrency,
        session_gate = cfg.scanner.session.enabled,
        "RADAR starting up"
    );

    // -- Restore or create state -----------------------------------------

    let state_file = cfg.storage.state_file.clone();
    let tracker = Arc::new(SymbolTracker::new(cfg.tracker.clone()));

    let mut cycle_count = match storage::load_state(Some(&state_file))? {
        Some(saved) => {
            let restored = tracker.restore(saved.symbols, &cfg.scanner.active_universe());
            info!(
                restored,
                cycles = saved.cycle_count,
                saved_at = %saved.saved_at,
                "Resumed from saved state"
            );
            saved.cycle_count
        }
        None => {
            info!("Fresh start, every symbol CLEAN");
            0
        }
    };

    // -- Initialise components -------------------------------------------

    let adapters = build_providers(&cfg)?;
    let manager = Arc::new(ProviderManager::new(
        adapters,
        &cfg.providers.intraday_priority,
        &cfg.providers.daily_priority,
        cfg.providers.health.clone(),
    )?);

    let alert_log = Arc::new(AlertLog::new(ALERT_LOG_CAPACITY));
    let dispatcher: Arc<dyn NotificationDispatcher> = Arc::new(FanOut::new(vec![
        Arc::new(LogDispatcher),
        alert_log.clone(),
    ]));

    let scanner = Scanner::new(
        manager.clone(),
        Pipeline::new(
            FeatureExtractor::new(cfg.features.clone()),
            ScoringEngine::new(cfg.scoring.clone()),
        ),
        tracker.clone(),
        dispatcher,
        Arc::new(NoContext),
        ScanSettings::from_config(&cfg),
    );

    let dashboard_state = Arc::new(DashboardState::new(
        &cfg.scanner.name,
        tracker.clone(),
        manager.clone(),
        alert_log,
    ));
    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(dashboard_state.clone(), cfg.dashboard.port).await?;
    }

    // -- Main loop -------------------------------------------------------

    let scan_interval = Duration::from_secs(cfg.scanner.scan_interval_secs);
    let session = &cfg.scanner.session;
    let mut market_open: Option<bool> = None;

    let mut interval = tokio::time::interval(scan_interval);
    // A cycle that overruns delays the next tick; cycles never overlap.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.scanner.scan_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();
                let open = session.is_open(now);
                if market_open != Some(open) {
                    info!(open, "Exchange session {}", if open { "open" } else { "closed" });
                    market_open = Some(open);
                }
                if !open {
                    let wait = session.poll_period(now, scan_interval);
                    debug!(wait_secs = wait.as_secs(), "Market closed, cycle skipped");
                    interval.reset_after(wait);
                    continue;
                }

                cycle_count += 1;
                let report = scanner.run_cycle(cycle_count, now).await;
                log_cycle_report(&report);
                dashboard_state.record_cycle(report).await;

                if let Err(e) = persist(&tracker, cycle_count, &state_file) {
                    error!(error = %e, "Failed to save state");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    persist(&tracker, cycle_count, &state_file)?;
    let stats = tracker.stats();
    info!(
        cycles = cycle_count,
        preparation_alerts = stats.preparation_alerts,
        initiation_alerts = stats.initiation_alerts,
        "RADAR shut down cleanly."
    );

    Ok(())
}

/// Construct every enabled adapter. Keyed adapters whose key is missing
/// are skipped; the manager then drops them from the priority lists.
fn build_providers(cfg: &AppConfig) -> Result<Vec<Arc<dyn DataProvider>>> {
    let timeout = Duration::from_secs(cfg.providers.health.call_timeout_secs);
    let mut adapters: Vec<Arc<dyn DataProvider>> = Vec::new();

    if let Some(yahoo) = cfg.providers.yahoo.as_ref().filter(|c| c.enabled) {
        adapters.push(Arc::new(YahooProvider::new(
            &yahoo.symbol_suffix,
            yahoo.base_url.as_deref(),
            timeout,
        )?));
    }

    if let Some(finnhub) = cfg.providers.finnhub.as_ref().filter(|c| c.enabled) {
        match AppConfig::resolve_env(&finnhub.api_key_env) {
            Ok(key) if !key.is_empty() => {
                adapters.push(Arc::new(FinnhubProvider::new(
                    SecretString::new(key),
                    &finnhub.symbol_suffix,
                    finnhub.base_url.as_deref(),
                    timeout,
                )?));
            }
            _ => warn!(
                env = %finnhub.api_key_env,
                "Finnhub API key not set, adapter disabled"
            ),
        }
    }

    if let Some(mock) = cfg.providers.mock.as_ref().filter(|c| c.enabled) {
        warn!(seed = mock.seed, "Mock provider enabled, data is synthetic");
        adapters.push(Arc::new(MockProvider::new(mock.seed)));
    }

    Ok(adapters)
}

/// Snapshot the tracker and write it to disk.
fn persist(tracker: &SymbolTracker, cycle_count: u64, path: &str) -> Result<()> {
    let state = PersistedState::new(tracker.snapshot(), cycle_count, Utc::now());
    storage::save_state(&state, Some(path)).context("Persisting tracker state")
}

/// Log a human-readable cycle summary.
fn log_cycle_report(report: &CycleReport) {
    info!(
        cycle = report.cycle_number,
        scored = report.symbols_scored,
        total = report.symbols_total,
        no_data = report.symbols_no_data,
        filtered = report.symbols_filtered,
        preparation = report.preparation_alerts,
        initiation = report.initiation_alerts,
        dispatch_failures = report.dispatch_failures,
        watchlist = report.watchlist_size,
        top = ?report.top_symbol,
        top_score = format!("{:.1}", report.top_score),
        duration_ms = report.duration_ms,
        "Cycle complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("radar=info"));

    let json_logging = std::env::var("RADAR_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
