//! End-to-end scan cycles: provider failover, health recovery and alert
//! delivery through the real manager, pipeline and tracker.

use chrono::Duration;
use std::sync::Arc;

use radar::data::manager::{HealthPolicy, ProviderManager};
use radar::data::mock::MockProvider;
use radar::data::{DataProvider, NoContext, ProviderError};
use radar::engine::scanner::{ScanSettings, Scanner};
use radar::engine::tracker::{SymbolTracker, TrackerConfig};
use radar::notify::NotificationDispatcher;
use radar::strategy::features::{FeatureConfig, FeatureExtractor};
use radar::strategy::scoring::{ScoringConfig, ScoringEngine};
use radar::strategy::Pipeline;
use radar::types::{AlertKind, Phase, ProviderHealth};

use crate::mock_provider::{daily, intraday, t0, RecordingDispatcher, ScriptedProvider};

fn make_settings(universe: &[&str]) -> ScanSettings {
    ScanSettings {
        universe: universe.iter().map(|s| s.to_string()).collect(),
        max_concurrency: 4,
        intraday_bars: 120,
        daily_bars: 60,
        min_daily_turnover: 1_000_000.0,
        order_book_depth: 5,
        prints_window_minutes: 30,
    }
}

fn make_scanner(
    adapters: Vec<Arc<dyn DataProvider>>,
    priority: &[&str],
    universe: &[&str],
    dispatcher: Arc<dyn NotificationDispatcher>,
) -> (Scanner, Arc<ProviderManager>) {
    let priority: Vec<String> = priority.iter().map(|s| s.to_string()).collect();
    let manager = Arc::new(
        ProviderManager::new(adapters, &priority, &priority, HealthPolicy::default()).unwrap(),
    );
    let scanner = Scanner::new(
        manager.clone(),
        Pipeline::new(
            FeatureExtractor::new(FeatureConfig::default()),
            ScoringEngine::new(ScoringConfig::default()),
        ),
        Arc::new(SymbolTracker::new(TrackerConfig::default())),
        dispatcher,
        Arc::new(NoContext),
        make_settings(universe),
    );
    (scanner, manager)
}

#[tokio::test]
async fn test_failover_serves_from_secondary() {
    let primary = Arc::new(ScriptedProvider::new("yahoo"));
    primary.fail_with(Some(ProviderError::Unavailable("HTTP 503".into())));
    let secondary = Arc::new(ScriptedProvider::new("finnhub"));
    secondary.serve("ABC", intraday(60, false), daily(30, 50_000.0));

    let (scanner, manager) = make_scanner(
        vec![primary.clone() as Arc<dyn DataProvider>, secondary.clone()],
        &["yahoo", "finnhub"],
        &["ABC"],
        Arc::new(RecordingDispatcher::default()),
    );

    let report = scanner.run_cycle(1, t0()).await;
    assert_eq!(report.symbols_scored, 1);
    assert_eq!(manager.health("yahoo"), ProviderHealth::Degraded);
    assert_eq!(manager.health("finnhub"), ProviderHealth::Healthy);
    assert!(manager.stats().failovers >= 2);
}

#[tokio::test]
async fn test_down_provider_skipped_then_retried() {
    let primary = Arc::new(ScriptedProvider::new("yahoo"));
    primary.fail_with(Some(ProviderError::Timeout(10_000)));
    primary.serve("ABC", intraday(60, false), daily(30, 50_000.0));
    let secondary = Arc::new(ScriptedProvider::new("finnhub"));
    secondary.serve("ABC", intraday(60, false), daily(30, 50_000.0));

    let (scanner, manager) = make_scanner(
        vec![primary.clone() as Arc<dyn DataProvider>, secondary.clone()],
        &["yahoo", "finnhub"],
        &["ABC"],
        Arc::new(RecordingDispatcher::default()),
    );

    // Two candle requests per cycle: three failures are reached in cycle 2.
    scanner.run_cycle(1, t0()).await;
    scanner.run_cycle(2, t0() + Duration::minutes(1)).await;
    assert_eq!(manager.health("yahoo"), ProviderHealth::Down);

    let calls = primary.calls();
    let report = scanner.run_cycle(3, t0() + Duration::minutes(2)).await;
    assert_eq!(report.symbols_scored, 1);
    assert_eq!(primary.calls(), calls, "DOWN provider must not be invoked");

    // Past the retry window the provider gets a trial call; it has recovered.
    primary.fail_with(None);
    scanner.run_cycle(4, t0() + Duration::minutes(10)).await;
    assert!(primary.calls() > calls);
    assert_eq!(manager.health("yahoo"), ProviderHealth::Healthy);
}

#[tokio::test]
async fn test_unserved_symbol_does_not_block_others() {
    let broken = Arc::new(ScriptedProvider::new("yahoo"));
    broken.fail_with(Some(ProviderError::MalformedData("non-monotonic timestamps".into())));
    let healthy = Arc::new(ScriptedProvider::new("finnhub"));
    healthy.serve("XYZ", intraday(60, false), daily(30, 50_000.0));

    // ABC is only known to the broken provider; XYZ to the healthy one.
    let (scanner, manager) = make_scanner(
        vec![broken as Arc<dyn DataProvider>, healthy],
        &["yahoo", "finnhub"],
        &["ABC", "XYZ"],
        Arc::new(RecordingDispatcher::default()),
    );

    let report = scanner.run_cycle(1, t0()).await;
    assert_eq!(report.symbols_total, 2);
    assert_eq!(report.symbols_scored, 1);
    assert_eq!(report.symbols_no_data, 1);
    assert!(manager.stats().served >= 2);
}

#[tokio::test]
async fn test_initiation_delivered_once_per_episode() {
    let provider = Arc::new(ScriptedProvider::new("yahoo"));
    provider.serve("ABC", intraday(60, true), daily(30, 50_000.0));
    let recorder = Arc::new(RecordingDispatcher::default());
    let (scanner, _) = make_scanner(
        vec![provider.clone() as Arc<dyn DataProvider>],
        &["yahoo"],
        &["ABC"],
        recorder.clone(),
    );

    let report = scanner.run_cycle(1, t0()).await;
    assert_eq!(report.initiation_alerts, 1);

    let alerts = recorder.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Initiation);
    assert_eq!(alerts[0].symbol, "ABC");
    assert!(alerts[0].reasons[0].contains("volume"));
    // Initiation does not move the preparation phase machine.
    assert_eq!(scanner.tracker().get("ABC").unwrap().phase, Phase::Clean);

    // Breakout still in the data: latched.
    scanner.run_cycle(2, t0() + Duration::minutes(3)).await;
    assert_eq!(recorder.alerts().len(), 1);

    // Quiet cycle clears the latch; a fresh breakout fires again.
    provider.serve("ABC", intraday(60, false), daily(30, 50_000.0));
    scanner.run_cycle(3, t0() + Duration::minutes(6)).await;
    provider.serve("ABC", intraday(60, true), daily(30, 50_000.0));
    let report = scanner.run_cycle(4, t0() + Duration::minutes(9)).await;
    assert_eq!(report.initiation_alerts, 1);
    assert_eq!(recorder.alerts().len(), 2);
}

#[tokio::test]
async fn test_mock_provider_full_universe() {
    let universe = ["THYAO", "ASELS", "GARAN", "AKBNK", "EREGL", "KCHOL"];
    let (scanner, manager) = make_scanner(
        vec![Arc::new(MockProvider::new(42))],
        &["mock"],
        &universe,
        Arc::new(RecordingDispatcher::default()),
    );

    let report = scanner.run_cycle(1, t0()).await;
    assert_eq!(report.symbols_total, universe.len());
    assert_eq!(report.symbols_no_data, 0);
    assert_eq!(report.symbols_scored + report.symbols_filtered, universe.len());
    assert!(report.top_score >= 0.0 && report.top_score <= 100.0);
    assert_eq!(manager.health("mock"), ProviderHealth::Healthy);

    for state in scanner.tracker().snapshot() {
        assert!((0.0..=100.0).contains(&state.last_score));
    }
}
