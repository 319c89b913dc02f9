//! Symbol state tracker: per-symbol lifecycle, cooldown and alert emission.
//!
//! Phases: `CLEAN → FLAGGED → ALERTED → COOLDOWN → CLEAN | FLAGGED`.
//!
//! - CLEAN → FLAGGED the cycle the composite reaches `flagged_threshold`.
//! - FLAGGED emits the PREPARATION alert (→ ALERTED) once the composite
//!   reaches `alert_threshold`, or after `confirm_cycles` consecutive cycles
//!   at or above the flagged threshold. Dropping below it resets to CLEAN.
//! - ALERTED lasts for the cycle it was emitted in; the next observation
//!   moves it to COOLDOWN regardless of score.
//! - COOLDOWN blocks preparation alerts until `cooldown_minutes` after the
//!   last alert, then resolves to FLAGGED (score still high) or CLEAN.
//!   High cycles inside ALERTED / COOLDOWN do not count towards
//!   `confirm_cycles`; confirmation starts over at expiry.
//!
//! The INITIATION alert is a separate event class: it is checked every
//! cycle in any phase and latches until the symbol is back in CLEAN.
//!
//! All reads and writes go through one `RwLock`; `observe` performs its
//! read-compute-write under the write lock so readers never see a
//! half-updated record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::strategy::scoring::InitiationSignal;
use crate::types::{AlertKind, AlertRecord, Phase, RadarError, ScoreResult, SymbolState};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Loaded from `[tracker]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub flagged_threshold: f64,
    pub alert_threshold: f64,
    pub confirm_cycles: u32,
    pub cooldown_minutes: i64,
    /// Move a CLEAN symbol to FLAGGED when an initiation alert fires.
    pub initiation_flags_symbol: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            flagged_threshold: 60.0,
            alert_threshold: 75.0,
            confirm_cycles: 2,
            cooldown_minutes: 240,
            initiation_flags_symbol: false,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), RadarError> {
        if !(self.flagged_threshold > 0.0 && self.flagged_threshold <= self.alert_threshold) {
            return Err(RadarError::Config(
                "tracker: need 0 < flagged_threshold <= alert_threshold".into(),
            ));
        }
        if self.confirm_cycles == 0 {
            return Err(RadarError::Config("tracker: confirm_cycles must be > 0".into()));
        }
        if self.cooldown_minutes <= 0 {
            return Err(RadarError::Config("tracker: cooldown_minutes must be > 0".into()));
        }
        Ok(())
    }

    fn cooldown(&self) -> Duration {
        Duration::minutes(self.cooldown_minutes)
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerStats {
    pub preparation_alerts: u64,
    pub initiation_alerts: u64,
    /// Preparation-worthy scores swallowed by ALERTED / COOLDOWN.
    pub suppressed_by_cooldown: u64,
    pub observations: u64,
}

#[derive(Default)]
struct Inner {
    states: HashMap<String, SymbolState>,
    stats: TrackerStats,
}

pub struct SymbolTracker {
    config: TrackerConfig,
    inner: RwLock<Inner>,
}

impl SymbolTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Load persisted records, keeping only symbols still in the universe.
    /// Returns how many were restored.
    pub fn restore(&self, states: Vec<SymbolState>, universe: &[String]) -> usize {
        let keep: HashSet<&str> = universe.iter().map(String::as_str).collect();
        let mut inner = self.write();
        let mut restored = 0;
        for state in states {
            if keep.contains(state.symbol.as_str()) {
                inner.states.insert(state.symbol.clone(), state);
                restored += 1;
            } else {
                debug!(symbol = %state.symbol, "Dropping persisted state outside universe");
            }
        }
        info!(restored, "Tracker state restored");
        restored
    }

    /// Apply one cycle's score (and optional breakout signal) for a symbol.
    /// Returns the alerts to dispatch, preparation first.
    pub fn observe(
        &self,
        score: &ScoreResult,
        initiation: Option<&InitiationSignal>,
        now: DateTime<Utc>,
    ) -> Vec<AlertRecord> {
        let cfg = &self.config;
        let mut inner = self.write();
        let Inner { states, stats } = &mut *inner;
        stats.observations += 1;

        let state = states
            .entry(score.symbol.clone())
            .or_insert_with(|| SymbolState::new(&score.symbol));
        let prev = state.phase;
        let composite = score.composite;
        let high = composite >= cfg.flagged_threshold;
        let mut alerts = Vec::new();

        state.consecutive_high = if high { state.consecutive_high + 1 } else { 0 };

        let next = match prev {
            Phase::Clean | Phase::Flagged if high => {
                if composite >= cfg.alert_threshold || state.consecutive_high >= cfg.confirm_cycles {
                    Phase::Alerted
                } else {
                    Phase::Flagged
                }
            }
            Phase::Clean | Phase::Flagged => Phase::Clean,
            Phase::Alerted => {
                if composite >= cfg.alert_threshold {
                    stats.suppressed_by_cooldown += 1;
                }
                state.consecutive_high = 0;
                Phase::Cooldown
            }
            Phase::Cooldown => {
                let expired = state
                    .last_alert_at
                    .map_or(true, |at| now >= at + cfg.cooldown());
                if !expired {
                    if composite >= cfg.alert_threshold {
                        stats.suppressed_by_cooldown += 1;
                    }
                    // Confirmation counts restart after the window.
                    state.consecutive_high = 0;
                    Phase::Cooldown
                } else if !high {
                    Phase::Clean
                } else if composite >= cfg.alert_threshold
                    || state.consecutive_high >= cfg.confirm_cycles
                {
                    Phase::Alerted
                } else {
                    Phase::Flagged
                }
            }
        };

        if next == Phase::Alerted && prev != Phase::Alerted {
            state.last_alert_at = Some(now);
            stats.preparation_alerts += 1;
            alerts.push(make_alert(score, AlertKind::Preparation, Vec::new(), now));
        }

        if next == Phase::Clean && prev != Phase::Clean {
            state.initiation_fired = false;
        }
        state.phase = next;

        match initiation {
            Some(signal) if !state.initiation_fired => {
                state.initiation_fired = true;
                stats.initiation_alerts += 1;
                alerts.push(make_alert(score, AlertKind::Initiation, vec![signal.reason()], now));
                if cfg.initiation_flags_symbol && state.phase == Phase::Clean {
                    state.phase = Phase::Flagged;
                }
            }
            Some(_) => {
                debug!(symbol = %score.symbol, "Initiation already signalled this episode");
            }
            None if state.phase == Phase::Clean && !high => {
                state.initiation_fired = false;
            }
            None => {}
        }

        state.last_score = composite;
        state.last_label = Some(score.label);
        state.updated_at = Some(now);

        if state.phase != prev {
            info!(
                symbol = %score.symbol,
                from = %prev,
                to = %state.phase,
                score = composite,
                "Phase transition"
            );
        }
        alerts
    }

    pub fn get(&self, symbol: &str) -> Option<SymbolState> {
        self.read().states.get(symbol).cloned()
    }

    /// Every tracked record, sorted by symbol.
    pub fn snapshot(&self) -> Vec<SymbolState> {
        let mut all: Vec<SymbolState> = self.read().states.values().cloned().collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }

    /// Non-CLEAN symbols, highest last score first.
    pub fn watchlist(&self) -> Vec<SymbolState> {
        let mut list: Vec<SymbolState> = self
            .read()
            .states
            .values()
            .filter(|s| s.phase.is_elevated())
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            b.last_score
                .total_cmp(&a.last_score)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        list
    }

    pub fn stats(&self) -> TrackerStats {
        self.read().stats.clone()
    }

    /// Time left before a COOLDOWN symbol may alert again.
    pub fn cooldown_remaining(&self, symbol: &str, now: DateTime<Utc>) -> Option<Duration> {
        let inner = self.read();
        let state = inner.states.get(symbol)?;
        if state.phase != Phase::Cooldown && state.phase != Phase::Alerted {
            return None;
        }
        let until = state.last_alert_at? + self.config.cooldown();
        (until > now).then(|| until - now)
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn make_alert(
    score: &ScoreResult,
    kind: AlertKind,
    mut lead: Vec<String>,
    now: DateTime<Utc>,
) -> AlertRecord {
    lead.extend(score.reasons.iter().cloned());
    AlertRecord {
        id: uuid::Uuid::new_v4(),
        symbol: score.symbol.clone(),
        kind,
        composite_score: score.composite,
        label: score.label,
        reasons: lead,
        caveat: score.caveat.clone(),
        timestamp: now,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CategoryScores, Label};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    fn mins(m: i64) -> DateTime<Utc> {
        t0() + Duration::minutes(m)
    }

    fn make_score(symbol: &str, composite: f64) -> ScoreResult {
        ScoreResult {
            symbol: symbol.into(),
            scores: CategoryScores { accumulation: composite, ..Default::default() },
            composite,
            label: if composite >= 75.0 { Label::VeryHigh } else { Label::Baseline },
            reasons: vec![format!("score {composite}")],
            caveat: None,
        }
    }

    fn breakout() -> InitiationSignal {
        InitiationSignal { volume_ratio: 3.5, price_change: 0.013 }
    }

    fn make_tracker() -> SymbolTracker {
        SymbolTracker::new(TrackerConfig::default())
    }

    fn phase(t: &SymbolTracker, symbol: &str) -> Phase {
        t.get(symbol).unwrap().phase
    }

    #[test]
    fn test_low_score_stays_clean() {
        let t = make_tracker();
        assert!(t.observe(&make_score("ABC", 25.0), None, t0()).is_empty());
        assert_eq!(phase(&t, "ABC"), Phase::Clean);
        assert!(t.watchlist().is_empty());
    }

    #[test]
    fn test_flagged_then_confirmed_alert() {
        let t = make_tracker();
        assert!(t.observe(&make_score("ABC", 65.0), None, mins(0)).is_empty());
        assert_eq!(phase(&t, "ABC"), Phase::Flagged);

        let alerts = t.observe(&make_score("ABC", 66.0), None, mins(3));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Preparation);
        assert_eq!(phase(&t, "ABC"), Phase::Alerted);
        assert_eq!(t.get("ABC").unwrap().last_alert_at, Some(mins(3)));
    }

    #[test]
    fn test_high_score_alerts_immediately() {
        let t = make_tracker();
        let alerts = t.observe(&make_score("ABC", 80.0), None, t0());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].composite_score, 80.0);
        assert_eq!(alerts[0].reasons, vec!["score 80".to_string()]);
        assert_eq!(phase(&t, "ABC"), Phase::Alerted);
    }

    #[test]
    fn test_flagged_drop_resets_to_clean() {
        let t = make_tracker();
        t.observe(&make_score("ABC", 62.0), None, mins(0));
        t.observe(&make_score("ABC", 40.0), None, mins(3));
        assert_eq!(phase(&t, "ABC"), Phase::Clean);
        assert_eq!(t.get("ABC").unwrap().consecutive_high, 0);
    }

    #[test]
    fn test_no_repeat_preparation_until_cooldown_expires() {
        let t = make_tracker();
        assert_eq!(t.observe(&make_score("ABC", 80.0), None, mins(0)).len(), 1);

        // Score keeps climbing; still no second preparation alert.
        for (i, score) in [85.0, 90.0, 99.0].iter().enumerate() {
            let alerts = t.observe(&make_score("ABC", *score), None, mins(3 * (i as i64 + 1)));
            assert!(alerts.is_empty());
            assert_eq!(phase(&t, "ABC"), Phase::Cooldown);
        }
        assert_eq!(t.stats().suppressed_by_cooldown, 3);

        let alerts = t.observe(&make_score("ABC", 95.0), None, mins(239));
        assert!(alerts.is_empty());

        // Cooldown over, score still high: straight back to an alert.
        let alerts = t.observe(&make_score("ABC", 95.0), None, mins(241));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Preparation);
        assert_eq!(t.stats().preparation_alerts, 2);
    }

    #[test]
    fn test_cooldown_expiry_low_score_returns_clean() {
        let t = make_tracker();
        t.observe(&make_score("ABC", 80.0), None, mins(0));
        t.observe(&make_score("ABC", 50.0), None, mins(3));
        assert_eq!(phase(&t, "ABC"), Phase::Cooldown);
        t.observe(&make_score("ABC", 50.0), None, mins(245));
        assert_eq!(phase(&t, "ABC"), Phase::Clean);
    }

    #[test]
    fn test_cooldown_expiry_moderate_score_reenters_flagged() {
        let t = make_tracker();
        t.observe(&make_score("ABC", 80.0), None, mins(0));
        t.observe(&make_score("ABC", 40.0), None, mins(3));
        let alerts = t.observe(&make_score("ABC", 65.0), None, mins(250));
        assert!(alerts.is_empty());
        assert_eq!(phase(&t, "ABC"), Phase::Flagged);
    }

    #[test]
    fn test_sustained_mid_score_after_cooldown_is_flagged() {
        let t = make_tracker();
        t.observe(&make_score("ABC", 80.0), None, mins(0));
        // Hold at 65 every three minutes through the whole window.
        let mut at = 3;
        while at < 240 {
            assert!(t.observe(&make_score("ABC", 65.0), None, mins(at)).is_empty());
            at += 3;
        }
        assert_eq!(phase(&t, "ABC"), Phase::Cooldown);
        assert_eq!(t.get("ABC").unwrap().consecutive_high, 0);

        // Expiry starts a fresh confirmation count.
        let alerts = t.observe(&make_score("ABC", 65.0), None, mins(at));
        assert!(alerts.is_empty());
        assert_eq!(phase(&t, "ABC"), Phase::Flagged);
        assert_eq!(t.get("ABC").unwrap().consecutive_high, 1);
        assert_eq!(t.stats().preparation_alerts, 1);

        // Second high cycle after expiry confirms.
        let alerts = t.observe(&make_score("ABC", 65.0), None, mins(at + 3));
        assert_eq!(alerts.len(), 1);
        assert_eq!(phase(&t, "ABC"), Phase::Alerted);
    }

    #[test]
    fn test_initiation_fires_in_clean_without_phase_change() {
        let t = make_tracker();
        let alerts = t.observe(&make_score("ABC", 25.0), Some(&breakout()), t0());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Initiation);
        assert!(alerts[0].reasons[0].starts_with("Breakout"));
        assert_eq!(phase(&t, "ABC"), Phase::Clean);
    }

    #[test]
    fn test_initiation_latched_until_quiet_clean() {
        let t = make_tracker();
        t.observe(&make_score("ABC", 25.0), Some(&breakout()), mins(0));
        assert!(t.observe(&make_score("ABC", 25.0), Some(&breakout()), mins(3)).is_empty());
        assert!(t.get("ABC").unwrap().initiation_fired);

        // A quiet CLEAN cycle clears the latch.
        t.observe(&make_score("ABC", 25.0), None, mins(6));
        assert!(!t.get("ABC").unwrap().initiation_fired);
        assert_eq!(t.observe(&make_score("ABC", 25.0), Some(&breakout()), mins(9)).len(), 1);
        assert_eq!(t.stats().initiation_alerts, 2);
    }

    #[test]
    fn test_initiation_fires_during_cooldown() {
        let t = make_tracker();
        t.observe(&make_score("ABC", 80.0), None, mins(0));
        t.observe(&make_score("ABC", 80.0), None, mins(3));
        assert_eq!(phase(&t, "ABC"), Phase::Cooldown);

        let alerts = t.observe(&make_score("ABC", 82.0), Some(&breakout()), mins(6));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Initiation);
        assert_eq!(phase(&t, "ABC"), Phase::Cooldown);

        // Not again in this episode.
        assert!(t.observe(&make_score("ABC", 82.0), Some(&breakout()), mins(9)).is_empty());
    }

    #[test]
    fn test_preparation_and_initiation_same_cycle() {
        let t = make_tracker();
        let alerts = t.observe(&make_score("ABC", 90.0), Some(&breakout()), t0());
        let kinds: Vec<AlertKind> = alerts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::Preparation, AlertKind::Initiation]);
    }

    #[test]
    fn test_initiation_flags_symbol_when_configured() {
        let t = SymbolTracker::new(TrackerConfig {
            initiation_flags_symbol: true,
            ..TrackerConfig::default()
        });
        t.observe(&make_score("ABC", 20.0), Some(&breakout()), t0());
        assert_eq!(phase(&t, "ABC"), Phase::Flagged);
    }

    #[test]
    fn test_restore_keeps_universe_and_resumes_cooldown() {
        let t = make_tracker();
        let mut abc = SymbolState::new("ABC");
        abc.phase = Phase::Cooldown;
        abc.last_score = 81.0;
        abc.last_alert_at = Some(mins(-10));
        let gone = SymbolState::new("OLD");

        let restored = t.restore(vec![abc, gone], &["ABC".to_string(), "XYZ".to_string()]);
        assert_eq!(restored, 1);
        assert!(t.get("OLD").is_none());

        // Restart must not bypass the cooldown.
        assert!(t.observe(&make_score("ABC", 90.0), None, t0()).is_empty());
        assert_eq!(phase(&t, "ABC"), Phase::Cooldown);
        let left = t.cooldown_remaining("ABC", t0()).unwrap();
        assert_eq!(left, Duration::minutes(230));
    }

    #[test]
    fn test_watchlist_sorted_by_score() {
        let t = make_tracker();
        t.observe(&make_score("AAA", 62.0), None, t0());
        t.observe(&make_score("BBB", 90.0), None, t0());
        t.observe(&make_score("CCC", 10.0), None, t0());
        let list: Vec<String> = t.watchlist().into_iter().map(|s| s.symbol).collect();
        assert_eq!(list, vec!["BBB".to_string(), "AAA".to_string()]);
        assert_eq!(t.snapshot().len(), 3);
    }

    #[test]
    fn test_concurrent_observers_keep_one_record_per_symbol() {
        let t = Arc::new(make_tracker());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let t = Arc::clone(&t);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let symbol = format!("S{}", (worker * 50 + i) % 20);
                        t.observe(&make_score(&symbol, 30.0), None, t0());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(t.snapshot().len(), 20);
        assert_eq!(t.stats().observations, 400);
    }

    #[test]
    fn test_config_validation() {
        assert!(TrackerConfig::default().validate().is_ok());
        let inverted = TrackerConfig { flagged_threshold: 80.0, ..Default::default() };
        assert!(inverted.validate().is_err());
        let zero = TrackerConfig { confirm_cycles: 0, ..Default::default() };
        assert!(zero.validate().is_err());
    }
}
