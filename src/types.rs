//! Shared types for the RADAR scanner.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that data, strategy, and engine
//! modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// One OHLCV sample for a single interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Traded value of the bar (close × volume).
    pub fn turnover(&self) -> f64 {
        self.close * self.volume
    }

    /// Structural sanity: finite prices, `high >= low`, non-negative volume.
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p >= 0.0)
            && self.volume.is_finite()
            && self.volume >= 0.0
            && self.high >= self.low
    }
}

impl fmt::Display for Candle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} O:{:.2} H:{:.2} L:{:.2} C:{:.2} V:{:.0}",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        )
    }
}

/// Timeframe class used for provider routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    /// 5-minute bars.
    Intraday,
    /// Daily bars.
    Daily,
}

impl Timeframe {
    /// Nominal bar length in seconds.
    pub fn bar_seconds(&self) -> i64 {
        match self {
            Timeframe::Intraday => 300,
            Timeframe::Daily => 86_400,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::Intraday => write!(f, "intraday"),
            Timeframe::Daily => write!(f, "daily"),
        }
    }
}

/// A single resting price level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// Best-N bid/ask levels at one instant. Bids are best-first (descending
/// price), asks are best-first (ascending price).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBookSnapshot {
    pub fn total_ask_size(&self) -> f64 {
        self.asks.iter().map(|l| l.size).sum()
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// Quoted spread as a percentage of the mid price.
    pub fn spread_pct(&self) -> Option<f64> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        let mid = (bid + ask) / 2.0;
        if mid <= 0.0 || ask < bid {
            return None;
        }
        Some((ask - bid) / mid * 100.0)
    }
}

/// Aggressor side of an executed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// One executed trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradePrint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
    pub side: TradeSide,
}

impl TradePrint {
    /// Size signed by aggressor side (+buy / -sell).
    pub fn signed_size(&self) -> f64 {
        match self.side {
            TradeSide::Buy => self.size,
            TradeSide::Sell => -self.size,
        }
    }
}

/// Auxiliary signals supplied from outside the feature pipeline.
/// Every field is optional; `None` means the signal is unavailable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSignals {
    /// Public-disclosure announcements in the lookback window.
    pub disclosure_count: Option<u32>,
    /// Social mention volume relative to normal (1.0 = normal).
    pub social_mention_ratio: Option<f64>,
    /// Last session's traded value (close × volume).
    pub daily_turnover: Option<f64>,
    /// Quoted spread in percent.
    pub spread_pct: Option<f64>,
    pub liquidity_tier: Option<LiquidityTier>,
}

impl ContextSignals {
    /// Overlay `other` onto `self`; fields present in `other` win.
    pub fn merge(self, other: ContextSignals) -> ContextSignals {
        ContextSignals {
            disclosure_count: other.disclosure_count.or(self.disclosure_count),
            social_mention_ratio: other.social_mention_ratio.or(self.social_mention_ratio),
            daily_turnover: other.daily_turnover.or(self.daily_turnover),
            spread_pct: other.spread_pct.or(self.spread_pct),
            liquidity_tier: other.liquidity_tier.or(self.liquidity_tier),
        }
    }
}

/// Coarse liquidity bucket derived from daily turnover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityTier {
    Illiquid,
    Thin,
    Normal,
}

impl fmt::Display for LiquidityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiquidityTier::Illiquid => write!(f, "illiquid"),
            LiquidityTier::Thin => write!(f, "thin"),
            LiquidityTier::Normal => write!(f, "normal"),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider health
// ---------------------------------------------------------------------------

/// Health of one provider adapter, owned by the provider manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderHealth {
    Healthy,
    Degraded,
    Down,
    Unknown,
}

impl fmt::Display for ProviderHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderHealth::Healthy => write!(f, "HEALTHY"),
            ProviderHealth::Degraded => write!(f, "DEGRADED"),
            ProviderHealth::Down => write!(f, "DOWN"),
            ProviderHealth::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Preparation label band, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Baseline,
    Medium,
    High,
    VeryHigh,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::VeryHigh => write!(f, "very high"),
            Label::High => write!(f, "high"),
            Label::Medium => write!(f, "medium"),
            Label::Baseline => write!(f, "baseline"),
        }
    }
}

/// Per-category sub-scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub accumulation: f64,
    pub volatility: f64,
    pub absorption: f64,
    pub flow: f64,
    pub context: f64,
}

impl CategoryScores {
    pub fn total(&self) -> f64 {
        self.accumulation + self.volatility + self.absorption + self.flow + self.context
    }
}

impl fmt::Display for CategoryScores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A={:.1} V={:.1} O={:.1} F={:.1} C={:.1}",
            self.accumulation, self.volatility, self.absorption, self.flow, self.context,
        )
    }
}

/// Outcome of scoring one symbol in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub symbol: String,
    pub scores: CategoryScores,
    /// Sum of sub-scores, within `[0, 100]`.
    pub composite: f64,
    pub label: Label,
    /// Triggered rules in evaluation order.
    pub reasons: Vec<String>,
    /// Tradability caveat; never affects `composite`.
    pub caveat: Option<String>,
}

impl ScoreResult {
    /// A zero result for a symbol with no usable data this cycle.
    pub fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            scores: CategoryScores::default(),
            composite: 0.0,
            label: Label::Baseline,
            reasons: Vec::new(),
            caveat: None,
        }
    }
}

impl fmt::Display for ScoreResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.1} ({}) [{}]",
            self.symbol, self.composite, self.label, self.scores,
        )
    }
}

// ---------------------------------------------------------------------------
// Symbol lifecycle
// ---------------------------------------------------------------------------

/// Per-symbol lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Clean,
    Flagged,
    Alerted,
    Cooldown,
}

impl Phase {
    /// Whether the symbol belongs on the watchlist.
    pub fn is_elevated(&self) -> bool {
        !matches!(self, Phase::Clean)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Clean => write!(f, "CLEAN"),
            Phase::Flagged => write!(f, "FLAGGED"),
            Phase::Alerted => write!(f, "ALERTED"),
            Phase::Cooldown => write!(f, "COOLDOWN"),
        }
    }
}

/// Cross-cycle memory for one symbol. Persisted after each cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolState {
    pub symbol: String,
    pub phase: Phase,
    pub last_score: f64,
    pub last_alert_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub consecutive_high: u32,
    /// Set once an initiation alert fires; cleared on return to CLEAN.
    #[serde(default)]
    pub initiation_fired: bool,
    #[serde(default)]
    pub last_label: Option<Label>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SymbolState {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            phase: Phase::Clean,
            last_score: 0.0,
            last_alert_at: None,
            consecutive_high: 0,
            initiation_fired: false,
            last_label: None,
            updated_at: None,
        }
    }
}

impl fmt::Display for SymbolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} score={:.1} streak={}",
            self.symbol, self.phase, self.last_score, self.consecutive_high,
        )
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertKind {
    /// Quiet accumulation crossed the alert threshold.
    Preparation,
    /// Volume/price breakout signature.
    Initiation,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Preparation => write!(f, "PREPARATION"),
            AlertKind::Initiation => write!(f, "INITIATION"),
        }
    }
}

/// Structured alert handed to the notification dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: uuid::Uuid,
    pub symbol: String,
    pub kind: AlertKind,
    pub composite_score: f64,
    pub label: Label,
    pub reasons: Vec<String>,
    pub caveat: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for AlertRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} score={:.1} ({})",
            self.kind, self.symbol, self.composite_score, self.label,
        )?;
        if let Some(caveat) = &self.caveat {
            write!(f, " ⚠ {caveat}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Summary of one scan cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub symbols_total: usize,
    pub symbols_scored: usize,
    pub symbols_no_data: usize,
    pub symbols_filtered: usize,
    pub preparation_alerts: usize,
    pub initiation_alerts: usize,
    pub dispatch_failures: usize,
    pub watchlist_size: usize,
    pub top_symbol: Option<String>,
    pub top_score: f64,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cycle #{}: scored={}/{} no_data={} filtered={} prep={} init={} watchlist={} ({}ms)",
            self.cycle_number,
            self.symbols_scored,
            self.symbols_total,
            self.symbols_no_data,
            self.symbols_filtered,
            self.preparation_alerts,
            self.initiation_alerts,
            self.watchlist_size,
            self.duration_ms,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for RADAR.
#[derive(Debug, thiserror::Error)]
pub enum RadarError {
    #[error("Provider has no data ({provider}): {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("Provider timed out ({provider}) after {timeout_ms}ms")]
    ProviderTimeout { provider: String, timeout_ms: u64 },

    #[error("Provider returned malformed data ({provider}): {message}")]
    ProviderMalformed { provider: String, message: String },

    #[error("All providers exhausted for {symbol} ({timeframe})")]
    AllProvidersExhausted { symbol: String, timeframe: Timeframe },

    #[error("Insufficient history: need {needed} samples, have {available}")]
    InsufficientHistory { needed: usize, available: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap() + chrono::Duration::minutes(min)
    }

    fn candle(close: f64, volume: f64) -> Candle {
        Candle {
            timestamp: ts(0),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
        }
    }

    // -- Candle tests --

    #[test]
    fn test_candle_turnover() {
        assert!((candle(10.0, 500.0).turnover() - 5000.0).abs() < 1e-10);
    }

    #[test]
    fn test_candle_well_formed() {
        assert!(candle(10.0, 100.0).is_well_formed());

        let mut inverted = candle(10.0, 100.0);
        inverted.high = 8.0;
        assert!(!inverted.is_well_formed());

        let mut negative_volume = candle(10.0, 100.0);
        negative_volume.volume = -1.0;
        assert!(!negative_volume.is_well_formed());

        let mut nan = candle(10.0, 100.0);
        nan.close = f64::NAN;
        assert!(!nan.is_well_formed());
    }

    // -- Order book tests --

    #[test]
    fn test_order_book_spread_pct() {
        let book = OrderBookSnapshot {
            timestamp: ts(0),
            bids: vec![BookLevel { price: 99.0, size: 10.0 }],
            asks: vec![BookLevel { price: 101.0, size: 5.0 }, BookLevel { price: 102.0, size: 7.0 }],
        };
        assert!((book.spread_pct().unwrap() - 2.0).abs() < 1e-10);
        assert!((book.total_ask_size() - 12.0).abs() < 1e-10);
    }

    #[test]
    fn test_order_book_spread_missing_side() {
        let book = OrderBookSnapshot { timestamp: ts(0), bids: vec![], asks: vec![] };
        assert!(book.spread_pct().is_none());
    }

    // -- Trade print tests --

    #[test]
    fn test_trade_print_signed_size() {
        let buy = TradePrint { timestamp: ts(0), price: 1.0, size: 3.0, side: TradeSide::Buy };
        let sell = TradePrint { side: TradeSide::Sell, ..buy };
        assert_eq!(buy.signed_size(), 3.0);
        assert_eq!(sell.signed_size(), -3.0);
    }

    // -- Context tests --

    #[test]
    fn test_context_merge_prefers_other() {
        let derived = ContextSignals {
            daily_turnover: Some(1e6),
            spread_pct: Some(0.5),
            ..Default::default()
        };
        let external = ContextSignals {
            disclosure_count: Some(0),
            spread_pct: Some(0.8),
            ..Default::default()
        };
        let merged = derived.merge(external);
        assert_eq!(merged.disclosure_count, Some(0));
        assert_eq!(merged.daily_turnover, Some(1e6));
        assert_eq!(merged.spread_pct, Some(0.8));
    }

    // -- Label tests --

    #[test]
    fn test_label_ordering() {
        assert!(Label::VeryHigh > Label::High);
        assert!(Label::High > Label::Medium);
        assert!(Label::Medium > Label::Baseline);
    }

    #[test]
    fn test_label_display() {
        assert_eq!(format!("{}", Label::VeryHigh), "very high");
        assert_eq!(format!("{}", Label::Baseline), "baseline");
    }

    // -- Phase / state tests --

    #[test]
    fn test_phase_elevated() {
        assert!(!Phase::Clean.is_elevated());
        assert!(Phase::Flagged.is_elevated());
        assert!(Phase::Alerted.is_elevated());
        assert!(Phase::Cooldown.is_elevated());
    }

    #[test]
    fn test_symbol_state_deserializes_minimal_record() {
        // Older state files only carry phase, score and alert time.
        let json = r#"{"symbol":"ABC","phase":"COOLDOWN","last_score":71.0,"last_alert_at":"2026-03-02T10:00:00Z"}"#;
        let state: SymbolState = serde_json::from_str(json).unwrap();
        assert_eq!(state.phase, Phase::Cooldown);
        assert_eq!(state.consecutive_high, 0);
        assert!(!state.initiation_fired);
        assert_eq!(state.last_alert_at, Some(ts(0)));
    }

    #[test]
    fn test_health_serialization() {
        let json = serde_json::to_string(&ProviderHealth::Degraded).unwrap();
        assert_eq!(json, "\"DEGRADED\"");
    }

    #[test]
    fn test_alert_display_with_caveat() {
        let alert = AlertRecord {
            id: uuid::Uuid::new_v4(),
            symbol: "ABC".into(),
            kind: AlertKind::Preparation,
            composite_score: 77.0,
            label: Label::VeryHigh,
            reasons: vec![],
            caveat: Some("low liquidity".into()),
            timestamp: ts(0),
        };
        let text = format!("{alert}");
        assert!(text.contains("PREPARATION"));
        assert!(text.contains("low liquidity"));
    }

    #[test]
    fn test_error_display() {
        let err = RadarError::InsufficientHistory { needed: 20, available: 5 };
        assert_eq!(format!("{err}"), "Insufficient history: need 20 samples, have 5");
    }
}
