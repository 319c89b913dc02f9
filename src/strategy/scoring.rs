//! Scoring engine.
//!
//! Maps a `FeatureSet` to per-category sub-scores, a composite in
//! `[0, 100]`, a label band and an ordered list of trigger reasons. Rules are
//! evaluated category by category (A, V, O, F, C); each category is capped
//! at its configured maximum. A final suppression pass may lower the score
//! and attaches the liquidity caveat, which never touches the number.
//!
//! The initiation (breakout) detector lives here too but is independent of
//! the composite.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::features::{last_change, FeatureSet};
use crate::types::{Candle, CategoryScores, Label, RadarError, ScoreResult};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Category maxima, label bands and rule thresholds. Loaded from `[scoring]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub max_accumulation: f64,
    pub max_volatility: f64,
    pub max_absorption: f64,
    pub max_flow: f64,
    pub max_context: f64,

    pub very_high_threshold: f64,
    pub high_threshold: f64,
    pub medium_threshold: f64,

    /// Percentile at or below which ATR / band width count as compressed.
    pub compression_percentile: f64,
    /// Ask-side reduction (fraction) that signals absorption.
    pub ask_reduction_threshold: f64,
    /// |price change| below this earns the absorption stability bonus.
    pub price_stability_threshold: f64,
    pub bid_stability_threshold: f64,
    pub flow_sigma_threshold: f64,
    /// Price change below this earns the flow suppression bonus.
    pub flow_price_threshold: f64,
    pub social_silence_threshold: f64,
    pub low_turnover_threshold: f64,
    pub wide_spread_pct: f64,
    /// More disclosures than this zero the context category.
    pub max_disclosures: u32,
    pub illiquid_turnover: f64,
    pub illiquid_spread_pct: f64,

    /// Initiation: last volume ≥ this multiple of the trailing mean.
    pub initiation_volume_multiple: f64,
    /// Initiation: |last close change| ≥ this fraction.
    pub initiation_price_change: f64,
    /// Initiation: bars in the trailing volume mean.
    pub initiation_lookback: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_accumulation: 30.0,
            max_volatility: 20.0,
            max_absorption: 25.0,
            max_flow: 15.0,
            max_context: 10.0,
            very_high_threshold: 75.0,
            high_threshold: 60.0,
            medium_threshold: 45.0,
            compression_percentile: 25.0,
            ask_reduction_threshold: 0.30,
            price_stability_threshold: 0.003,
            bid_stability_threshold: 0.7,
            flow_sigma_threshold: 2.0,
            flow_price_threshold: 0.005,
            social_silence_threshold: 0.3,
            low_turnover_threshold: 50_000_000.0,
            wide_spread_pct: 1.0,
            max_disclosures: 2,
            illiquid_turnover: 10_000_000.0,
            illiquid_spread_pct: 3.0,
            initiation_volume_multiple: 3.0,
            initiation_price_change: 0.01,
            initiation_lookback: 20,
        }
    }
}

impl ScoringConfig {
    pub fn max_total(&self) -> f64 {
        self.max_accumulation + self.max_volatility + self.max_absorption + self.max_flow + self.max_context
    }

    pub fn validate(&self) -> Result<(), RadarError> {
        let maxima = [
            self.max_accumulation,
            self.max_volatility,
            self.max_absorption,
            self.max_flow,
            self.max_context,
        ];
        if maxima.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(RadarError::Config("scoring: category maxima must be >= 0".into()));
        }
        if (self.max_total() - 100.0).abs() > 1e-9 {
            return Err(RadarError::Config(format!(
                "scoring: category maxima must sum to 100 (got {})",
                self.max_total()
            )));
        }
        if !(self.very_high_threshold > self.high_threshold
            && self.high_threshold > self.medium_threshold
            && self.medium_threshold > 0.0
            && self.very_high_threshold <= 100.0)
        {
            return Err(RadarError::Config(
                "scoring: label thresholds must be strictly descending within (0, 100]".into(),
            ));
        }
        if self.initiation_lookback == 0 || self.initiation_volume_multiple <= 0.0 {
            return Err(RadarError::Config("scoring: invalid initiation settings".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Initiation
// ---------------------------------------------------------------------------

/// Volume/price breakout signature on the latest intraday bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InitiationSignal {
    /// Last volume over the trailing mean.
    pub volume_ratio: f64,
    /// Fractional close-to-close change.
    pub price_change: f64,
}

impl InitiationSignal {
    pub fn reason(&self) -> String {
        format!(
            "Breakout: volume {:.1}x trailing average, price {:+.2}%",
            self.volume_ratio,
            self.price_change * 100.0
        )
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Band for a composite score; ties go to the higher band.
    pub fn label_for(&self, composite: f64) -> Label {
        let c = &self.config;
        if composite >= c.very_high_threshold {
            Label::VeryHigh
        } else if composite >= c.high_threshold {
            Label::High
        } else if composite >= c.medium_threshold {
            Label::Medium
        } else {
            Label::Baseline
        }
    }

    /// Score one feature set. Pure: identical input, identical output.
    pub fn score(&self, features: &FeatureSet) -> ScoreResult {
        let mut reasons = Vec::new();
        let mut scores = CategoryScores {
            accumulation: self.accumulation(features, &mut reasons),
            volatility: self.volatility(features, &mut reasons),
            absorption: self.absorption(features, &mut reasons),
            flow: self.flow(features, &mut reasons),
            context: self.context(features, &mut reasons),
        };

        self.suppress(features, &mut scores, &mut reasons);
        let caveat = self.caveat(features);

        let composite = scores.total().clamp(0.0, 100.0);
        let result = ScoreResult {
            symbol: features.symbol.clone(),
            scores,
            composite,
            label: self.label_for(composite),
            reasons,
            caveat,
        };

        debug!(
            symbol = %result.symbol,
            composite = result.composite,
            label = %result.label,
            scores = %result.scores,
            "Scored"
        );
        result
    }

    fn accumulation(&self, f: &FeatureSet, reasons: &mut Vec<String>) -> f64 {
        if f.price_flat != Some(true) {
            return 0.0;
        }
        let obv_rising = f.obv_slope.is_some_and(|s| s > 0.0);
        let adl_rising = f.adl_slope.is_some_and(|s| s > 0.0);
        let mut score: f64 = 0.0;

        if obv_rising {
            score += 15.0;
            reasons.push(format!(
                "OBV rising while price flat (slope {:.4})",
                f.obv_slope.unwrap_or_default()
            ));
        }
        if adl_rising {
            score += 10.0;
            reasons.push(format!(
                "ADL rising while price flat (slope {:.4})",
                f.adl_slope.unwrap_or_default()
            ));
        }
        if obv_rising && adl_rising {
            score += 5.0;
            reasons.push("OBV and ADL rising together".to_string());
        }
        score.min(self.config.max_accumulation)
    }

    fn volatility(&self, f: &FeatureSet, reasons: &mut Vec<String>) -> f64 {
        let limit = self.config.compression_percentile;
        let mut score: f64 = 0.0;

        if let Some(p) = f.atr_percentile.filter(|p| *p <= limit) {
            score += 10.0;
            reasons.push(format!("ATR compressed (percentile {p:.1})"));
        }
        if let Some(p) = f.bbw_percentile.filter(|p| *p <= limit) {
            score += 10.0;
            reasons.push(format!("Band width compressed (percentile {p:.1})"));
        }
        score.min(self.config.max_volatility)
    }

    fn absorption(&self, f: &FeatureSet, reasons: &mut Vec<String>) -> f64 {
        let c = &self.config;
        let mut score: f64 = 0.0;

        if let Some(change) = f.ask_change.filter(|d| *d < -c.ask_reduction_threshold) {
            score += (change.abs() * 50.0).min(15.0);
            reasons.push(format!("Ask size down {:.1}%", change * 100.0));

            if let Some(pc) = f.price_change.filter(|pc| pc.abs() < c.price_stability_threshold) {
                score += 5.0;
                reasons.push(format!("Price steady under absorption ({:+.2}%)", pc * 100.0));
            }
        }
        if let Some(bs) = f.bid_stability.filter(|bs| *bs > c.bid_stability_threshold) {
            score += (bs * 10.0).min(10.0);
            reasons.push(format!("Bid side stable ({bs:.2})"));
        }
        score.min(c.max_absorption)
    }

    fn flow(&self, f: &FeatureSet, reasons: &mut Vec<String>) -> f64 {
        let c = &self.config;
        let Some(z) = f.flow_zscore.filter(|z| *z > c.flow_sigma_threshold) else {
            return 0.0;
        };
        let mut score = (z.abs() * 2.0).min(10.0);
        reasons.push(format!("Aggressive net buying (z {z:.2})"));

        if let Some(pc) = f.price_change.filter(|pc| *pc < c.flow_price_threshold) {
            score += 5.0;
            reasons.push(format!("Price held down despite buying ({:+.2}%)", pc * 100.0));
        }
        score.min(c.max_flow)
    }

    fn context(&self, f: &FeatureSet, reasons: &mut Vec<String>) -> f64 {
        let c = &self.config;
        let ctx = &f.context;
        let mut score: f64 = 0.0;

        if let Some(ratio) = ctx.social_mention_ratio.filter(|r| *r < c.social_silence_threshold) {
            score += 3.0;
            reasons.push(format!("Social silence (mention ratio {ratio:.2})"));
        }
        if ctx.disclosure_count == Some(0) {
            score += 2.0;
            reasons.push("No recent disclosures".to_string());
        }
        if let Some(t) = ctx.daily_turnover.filter(|t| *t < c.low_turnover_threshold) {
            score += 3.0;
            reasons.push(format!("Low turnover ({:.1}M)", t / 1e6));
        }
        if let Some(s) = ctx.spread_pct.filter(|s| *s > c.wide_spread_pct) {
            score += 2.0;
            reasons.push(format!("Wide spread ({s:.2}%)"));
        }
        score.min(c.max_context)
    }

    /// Reduce-only false-positive pass.
    fn suppress(&self, f: &FeatureSet, scores: &mut CategoryScores, reasons: &mut Vec<String>) {
        if let Some(n) = f.context.disclosure_count.filter(|n| *n > self.config.max_disclosures) {
            if scores.context > 0.0 {
                scores.context = 0.0;
            }
            reasons.push(format!("Context suppressed: {n} recent disclosures (event-driven)"));
        }

        let diverging = f.obv_slope.is_some_and(|s| s > 0.0) || f.adl_slope.is_some_and(|s| s > 0.0);
        let quiet_flow = f.flow_zscore.unwrap_or(0.0) < 1.0;
        if scores.volatility > 0.0 && !diverging && quiet_flow {
            scores.volatility /= 2.0;
            reasons.push("Compression without accumulation divergence: volatility halved".to_string());
        }
    }

    fn caveat(&self, f: &FeatureSet) -> Option<String> {
        let c = &self.config;
        let turnover = f.context.daily_turnover.filter(|t| *t < c.illiquid_turnover);
        let spread = f.context.spread_pct.filter(|s| *s > c.illiquid_spread_pct);
        if turnover.is_none() && spread.is_none() {
            return None;
        }
        let mut parts = Vec::new();
        if let Some(t) = turnover {
            parts.push(format!("turnover {:.1}M", t / 1e6));
        }
        if let Some(s) = spread {
            parts.push(format!("spread {s:.2}%"));
        }
        Some(format!("Low liquidity, do not trade ({})", parts.join(", ")))
    }

    /// Breakout check on the latest intraday bar against the preceding
    /// `initiation_lookback` bars.
    pub fn detect_initiation(&self, intraday: &[Candle]) -> Option<InitiationSignal> {
        let c = &self.config;
        let (last, prior) = intraday.split_last()?;
        if prior.len() < c.initiation_lookback {
            return None;
        }
        let trailing = &prior[prior.len() - c.initiation_lookback..];
        let avg = trailing.iter().map(|b| b.volume).sum::<f64>() / trailing.len() as f64;
        if avg <= 0.0 {
            return None;
        }
        let volume_ratio = last.volume / avg;
        let price_change = last_change(intraday)?;

        (volume_ratio >= c.initiation_volume_multiple && price_change.abs() >= c.initiation_price_change)
            .then_some(InitiationSignal { volume_ratio, price_change })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
