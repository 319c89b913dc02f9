//! Feature extraction.
//!
//! Turns one symbol's raw samples (intraday and daily candles, optional
//! order-book snapshots and trade prints, externally supplied context) into
//! a `FeatureSet` of bounded numbers. A feature whose inputs are missing or
//! too short is `None` ("unavailable"); it never fails the rest of the set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::indicators;
use crate::types::{Candle, ContextSignals, OrderBookSnapshot, RadarError, TradePrint};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Lookbacks and minimum sample sizes. Loaded from `[features]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Intraday bars used for the accumulation slopes.
    pub lookback: usize,
    /// Fewer intraday bars than this ⇒ accumulation unavailable.
    pub min_samples: usize,
    /// |normalised price slope| below this counts as flat.
    pub flat_threshold: f64,
    /// ATR period, applied to daily bars.
    pub atr_period: usize,
    /// Bollinger period, applied to intraday closes.
    pub bb_period: usize,
    pub bb_std: f64,
    /// Trailing observations for ATR / band-width percentile ranks.
    pub percentile_window: usize,
    pub min_book_snapshots: usize,
    pub flow_bucket_secs: i64,
    pub min_flow_buckets: usize,
    /// Only the newest this-many buckets are kept; older prints are dropped.
    pub max_flow_buckets: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lookback: 60,
            min_samples: 20,
            flat_threshold: 0.002,
            atr_period: 14,
            bb_period: 20,
            bb_std: 2.0,
            percentile_window: 20,
            min_book_snapshots: 2,
            flow_bucket_secs: 60,
            min_flow_buckets: 5,
            max_flow_buckets: 120,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), RadarError> {
        if self.min_samples < 2 || self.lookback < self.min_samples {
            return Err(RadarError::Config(
                "features: need 2 <= min_samples <= lookback".into(),
            ));
        }
        if self.atr_period == 0 || self.bb_period < 2 || self.percentile_window == 0 {
            return Err(RadarError::Config("features: periods must be positive".into()));
        }
        if self.min_book_snapshots < 2 || self.min_flow_buckets < 3 || self.flow_bucket_secs <= 0 {
            return Err(RadarError::Config(
                "features: order-book / flow minimums too small".into(),
            ));
        }
        if self.max_flow_buckets < self.min_flow_buckets {
            return Err(RadarError::Config(
                "features: max_flow_buckets must be >= min_flow_buckets".into(),
            ));
        }
        Ok(())
    }
}

/// Slopes are clamped to this magnitude.
const MAX_SLOPE: f64 = 1.0;

/// Z-scores are clamped to this magnitude.
const MAX_Z: f64 = 10.0;

// ---------------------------------------------------------------------------
// Feature set
// ---------------------------------------------------------------------------

/// Raw samples for one symbol in one cycle.
#[derive(Debug, Clone, Default)]
pub struct FeatureInput<'a> {
    pub symbol: &'a str,
    pub intraday: &'a [Candle],
    pub daily: &'a [Candle],
    pub order_book: &'a [OrderBookSnapshot],
    pub prints: &'a [TradePrint],
    pub context: ContextSignals,
}

/// Bounded features for one symbol. `None` = unavailable.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureSet {
    pub symbol: String,
    // Accumulation
    pub price_slope: Option<f64>,
    pub obv_slope: Option<f64>,
    pub adl_slope: Option<f64>,
    pub price_flat: Option<bool>,
    // Volatility compression
    pub atr_pct: Option<f64>,
    pub atr_percentile: Option<f64>,
    pub bb_width: Option<f64>,
    pub bbw_percentile: Option<f64>,
    // Order-book absorption
    pub ask_change: Option<f64>,
    pub bid_stability: Option<f64>,
    // Flow footprint
    pub flow_zscore: Option<f64>,
    /// Fractional change between the two latest intraday closes.
    pub price_change: Option<f64>,
    // Context (pass-through)
    pub context: ContextSignals,
}

impl FeatureSet {
    /// Every feature unavailable.
    pub fn unavailable(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Default::default()
        }
    }

    /// Name → value view. Booleans map to 0/1.
    pub fn values(&self) -> BTreeMap<&'static str, Option<f64>> {
        let ctx = &self.context;
        BTreeMap::from([
            ("price_slope", self.price_slope),
            ("obv_slope", self.obv_slope),
            ("adl_slope", self.adl_slope),
            ("price_flat", self.price_flat.map(|f| if f { 1.0 } else { 0.0 })),
            ("atr_pct", self.atr_pct),
            ("atr_percentile", self.atr_percentile),
            ("bb_width", self.bb_width),
            ("bbw_percentile", self.bbw_percentile),
            ("ask_change", self.ask_change),
            ("bid_stability", self.bid_stability),
            ("flow_zscore", self.flow_zscore),
            ("price_change", self.price_change),
            ("disclosure_count", ctx.disclosure_count.map(f64::from)),
            ("social_mention_ratio", ctx.social_mention_ratio),
            ("daily_turnover", ctx.daily_turnover),
            ("spread_pct", ctx.spread_pct),
        ])
    }

    pub fn available_count(&self) -> usize {
        self.values().values().filter(|v| v.is_some()).count()
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Compute every feature the inputs allow.
    pub fn extract(&self, input: &FeatureInput<'_>) -> FeatureSet {
        let mut set = FeatureSet::unavailable(input.symbol);

        if let Some((price, obv, adl)) = self.accumulation(input.intraday) {
            set.price_slope = Some(price);
            set.obv_slope = obv;
            set.adl_slope = adl;
            set.price_flat = Some(price.abs() < self.config.flat_threshold);
        }

        if let Ok((atr_pct, rank)) = self.atr_compression(input.daily) {
            set.atr_pct = Some(atr_pct);
            set.atr_percentile = Some(rank);
        }
        if let Ok((width, rank)) = self.band_compression(input.intraday) {
            set.bb_width = Some(width);
            set.bbw_percentile = Some(rank);
        }

        if let Some((ask_change, bid_stability)) = self.absorption(input.order_book) {
            set.ask_change = ask_change;
            set.bid_stability = bid_stability;
        }

        set.flow_zscore = self.flow(input.prints);
        set.price_change = last_change(input.intraday);
        set.context = input.context.clone();

        debug!(
            symbol = input.symbol,
            available = set.available_count(),
            "Features extracted"
        );
        set
    }

    /// (price slope, OBV slope, ADL slope) over the trailing lookback.
    fn accumulation(&self, intraday: &[Candle]) -> Option<(f64, Option<f64>, Option<f64>)> {
        if intraday.len() < self.config.min_samples {
            return None;
        }
        let window = &intraday[intraday.len().saturating_sub(self.config.lookback)..];
        let closes: Vec<f64> = window.iter().map(|c| c.close).collect();

        let price = clamp_slope(indicators::normalized_slope(&closes).ok()?);
        let obv = indicators::normalized_slope(&indicators::obv(window)).ok().map(clamp_slope);
        let adl = indicators::normalized_slope(&indicators::adl(window)).ok().map(clamp_slope);
        Some((price, obv, adl))
    }

    /// Latest daily ATR% and its percentile rank.
    fn atr_compression(&self, daily: &[Candle]) -> Result<(f64, f64), RadarError> {
        let series = indicators::atr_pct(daily, self.config.atr_period)?;
        let rank = indicators::percentile_rank(&series, self.config.percentile_window)?;
        let last = series.last().copied().unwrap_or_default();
        Ok((last, rank))
    }

    /// Latest intraday band width and its percentile rank.
    fn band_compression(&self, intraday: &[Candle]) -> Result<(f64, f64), RadarError> {
        let closes: Vec<f64> = intraday.iter().map(|c| c.close).collect();
        let series = indicators::bollinger_width(&closes, self.config.bb_period, self.config.bb_std)?;
        let rank = indicators::percentile_rank(&series, self.config.percentile_window)?;
        let last = series.last().copied().unwrap_or_default();
        Ok((last, rank))
    }

    /// (relative ask-size change first→last, bid stability in [0, 1]).
    fn absorption(&self, book: &[OrderBookSnapshot]) -> Option<(Option<f64>, Option<f64>)> {
        if book.len() < self.config.min_book_snapshots {
            return None;
        }
        let first_asks = book.first()?.total_ask_size();
        let last_asks = book.last()?.total_ask_size();
        let ask_change = (first_asks > 0.0).then(|| (last_asks - first_asks) / first_asks);

        let bids: Vec<f64> = book.iter().filter_map(|s| s.best_bid()).collect();
        let bid_mean = indicators::mean(&bids);
        let bid_stability = (bids.len() >= 2 && bid_mean > 0.0)
            .then(|| (1.0 - indicators::population_std(&bids) / bid_mean).clamp(0.0, 1.0));

        Some((ask_change, bid_stability))
    }

    /// Z-score of the latest bucket's net signed volume against the
    /// preceding buckets. The span is capped at `max_flow_buckets` counted
    /// back from the newest print.
    fn flow(&self, prints: &[TradePrint]) -> Option<f64> {
        let bucket = self.config.flow_bucket_secs;
        let bucket_of = |p: &TradePrint| p.timestamp.timestamp().div_euclid(bucket);
        let last = prints.iter().map(bucket_of).max()?;
        let floor = last - (self.config.max_flow_buckets as i64 - 1);
        let first = prints.iter().map(bucket_of).filter(|b| *b >= floor).min()?;
        let count = (last - first + 1) as usize;
        if count < self.config.min_flow_buckets {
            return None;
        }

        let mut net = vec![0.0; count];
        let mut dropped = 0usize;
        for p in prints {
            let b = bucket_of(p);
            if b < first {
                dropped += 1;
                continue;
            }
            net[(b - first) as usize] += p.signed_size();
        }
        if dropped > 0 {
            debug!(dropped, "Prints older than the flow window ignored");
        }
        let (latest, trailing) = net.split_last()?;
        indicators::zscore(*latest, trailing)
            .ok()
            .map(|z| z.clamp(-MAX_Z, MAX_Z))
    }
}

fn clamp_slope(slope: f64) -> f64 {
    slope.clamp(-MAX_SLOPE, MAX_SLOPE)
}

/// Fractional change between the last two closes.
pub fn last_change(candles: &[Candle]) -> Option<f64> {
    let [.., prev, last] = candles else {
        return None;
    };
    (prev.close > 0.0).then(|| (last.close - prev.close) / prev.close)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
