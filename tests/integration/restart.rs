//! Restart behaviour: tracker state survives a save/load round through the
//! state file, and a restart cannot be used to bypass cooldown.

use chrono::Duration;

use radar::engine::tracker::{SymbolTracker, TrackerConfig};
use radar::storage::{self, PersistedState};
use radar::types::{AlertKind, Label, Phase, ScoreResult};

use crate::mock_provider::t0;

fn temp_path() -> String {
    let mut p = std::env::temp_dir();
    p.push(format!("radar_restart_{}.json", uuid::Uuid::new_v4()));
    p.to_string_lossy().to_string()
}

fn make_score(symbol: &str, composite: f64) -> ScoreResult {
    let label = if composite >= 75.0 { Label::VeryHigh } else { Label::Baseline };
    ScoreResult {
        composite,
        label,
        ..ScoreResult::empty(symbol)
    }
}

fn universe() -> Vec<String> {
    vec!["ABC".to_string(), "XYZ".to_string()]
}

#[test]
fn test_cooldown_survives_restart() {
    let path = temp_path();

    let tracker = SymbolTracker::new(TrackerConfig::default());
    let alerts = tracker.observe(&make_score("ABC", 80.0), None, t0());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Preparation);
    tracker.observe(&make_score("ABC", 82.0), None, t0() + Duration::minutes(3));
    assert_eq!(tracker.get("ABC").unwrap().phase, Phase::Cooldown);

    let saved = PersistedState::new(tracker.snapshot(), 2, t0() + Duration::minutes(3));
    storage::save_state(&saved, Some(&path)).unwrap();
    drop(tracker);

    // Restart.
    let loaded = storage::load_state(Some(&path)).unwrap().unwrap();
    assert_eq!(loaded.cycle_count, 2);
    let tracker = SymbolTracker::new(TrackerConfig::default());
    assert_eq!(tracker.restore(loaded.symbols, &universe()), 1);
    assert_eq!(tracker.get("ABC").unwrap().phase, Phase::Cooldown);

    // Inside the 240-minute window: suppressed however high the score.
    let alerts = tracker.observe(&make_score("ABC", 95.0), None, t0() + Duration::minutes(60));
    assert!(alerts.is_empty());
    assert!(tracker.stats().suppressed_by_cooldown >= 1);

    // Window elapsed: a fresh episode may alert again.
    let alerts = tracker.observe(&make_score("ABC", 95.0), None, t0() + Duration::minutes(241));
    assert_eq!(alerts.len(), 1);
    assert_eq!(tracker.get("ABC").unwrap().phase, Phase::Alerted);

    storage::delete_state(Some(&path)).unwrap();
}

#[test]
fn test_restore_drops_symbols_outside_universe() {
    let path = temp_path();

    let tracker = SymbolTracker::new(TrackerConfig::default());
    for symbol in ["ABC", "OLD"] {
        tracker.observe(&make_score(symbol, 65.0), None, t0());
    }
    let saved = PersistedState::new(tracker.snapshot(), 1, t0());
    storage::save_state(&saved, Some(&path)).unwrap();

    let loaded = storage::load_state(Some(&path)).unwrap().unwrap();
    let restored = SymbolTracker::new(TrackerConfig::default());
    assert_eq!(restored.restore(loaded.symbols, &universe()), 1);
    assert!(restored.get("OLD").is_none());
    assert_eq!(restored.get("ABC").unwrap().phase, Phase::Flagged);

    storage::delete_state(Some(&path)).unwrap();
}

#[test]
fn test_missing_state_file_starts_clean() {
    let loaded = storage::load_state(Some(&temp_path())).unwrap();
    assert!(loaded.is_none());

    let tracker = SymbolTracker::new(TrackerConfig::default());
    assert!(tracker.snapshot().is_empty());
    assert!(tracker.watchlist().is_empty());
}
