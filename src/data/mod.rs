//! Market data providers.
//!
//! Defines the `DataProvider` trait (one adapter per external source), the
//! `ContextSource` trait for externally-computed context signals, and the
//! adapter implementations. Failover across adapters lives in [`manager`].

pub mod finnhub;
pub mod manager;
pub mod mock;
pub mod yahoo;

use async_trait::async_trait;
use serde::Serialize;

use crate::types::{Candle, ContextSignals, OrderBookSnapshot, RadarError, Timeframe, TradePrint};

// ---------------------------------------------------------------------------
// Errors and capabilities
// ---------------------------------------------------------------------------

/// Failure kinds an adapter may report. "No data yet" is not a failure:
/// adapters return an empty `Vec` for it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("malformed data: {0}")]
    MalformedData(String),

    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl ProviderError {
    /// Lift into the crate-wide taxonomy, naming the adapter.
    pub fn attribute(&self, provider: &str) -> RadarError {
        let provider = provider.to_string();
        match self {
            ProviderError::Unavailable(message) => RadarError::ProviderUnavailable {
                provider,
                message: message.clone(),
            },
            ProviderError::RateLimited(message) => RadarError::ProviderUnavailable {
                provider,
                message: format!("rate limited: {message}"),
            },
            ProviderError::Timeout(timeout_ms) => RadarError::ProviderTimeout {
                provider,
                timeout_ms: *timeout_ms,
            },
            ProviderError::MalformedData(message) => RadarError::ProviderMalformed {
                provider,
                message: message.clone(),
            },
        }
    }
}

/// What an adapter can serve. The manager never routes a request to an
/// adapter lacking the matching flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    pub intraday: bool,
    pub daily: bool,
    pub orderbook: bool,
    pub prints: bool,
}

impl Capabilities {
    pub fn supports(&self, timeframe: Timeframe) -> bool {
        match timeframe {
            Timeframe::Intraday => self.intraday,
            Timeframe::Daily => self.daily,
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Uniform wrapper around one external market data source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Stable adapter name, as used in priority lists.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Up to `limit` most recent candles, oldest first.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError>;

    /// Recent order-book snapshots, oldest first.
    async fn fetch_order_book(
        &self,
        _symbol: &str,
        _depth: usize,
    ) -> Result<Vec<OrderBookSnapshot>, ProviderError> {
        Err(ProviderError::Unavailable("order book not supported".into()))
    }

    /// Trade prints from the last `window_minutes`, oldest first.
    async fn fetch_prints(
        &self,
        _symbol: &str,
        _window_minutes: u32,
    ) -> Result<Vec<TradePrint>, ProviderError> {
        Err(ProviderError::Unavailable("trade prints not supported".into()))
    }
}

/// Supplier of auxiliary context (disclosure counts, social mention ratio).
/// The scanner only passes these through to scoring.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn context_for(&self, symbol: &str) -> ContextSignals;
}

/// Context source that knows nothing; every signal stays unavailable.
pub struct NoContext;

#[async_trait]
impl ContextSource for NoContext {
    async fn context_for(&self, _symbol: &str) -> ContextSignals {
        ContextSignals::default()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check a candle series is structurally sound: strictly increasing
/// timestamps and well-formed bars.
pub fn validate_candles(candles: &[Candle]) -> Result<(), ProviderError> {
    for (i, candle) in candles.iter().enumerate() {
        if !candle.is_well_formed() {
            return Err(ProviderError::MalformedData(format!(
                "bar {i} is not well formed ({candle})"
            )));
        }
    }
    if let Some(pos) = candles
        .windows(2)
        .position(|w| w[1].timestamp <= w[0].timestamp)
    {
        return Err(ProviderError::MalformedData(format!(
            "timestamps not strictly increasing at bar {}",
            pos + 1
        )));
    }
    Ok(())
}

/// Order-book snapshots must be strictly increasing in time, and every
/// level needs a positive finite price and a non-negative finite size.
pub fn validate_snapshots(snapshots: &[OrderBookSnapshot]) -> Result<(), ProviderError> {
    for (i, snap) in snapshots.iter().enumerate() {
        let bad = snap
            .bids
            .iter()
            .chain(snap.asks.iter())
            .find(|l| !(l.price.is_finite() && l.price > 0.0 && l.size.is_finite() && l.size >= 0.0));
        if let Some(level) = bad {
            return Err(ProviderError::MalformedData(format!(
                "snapshot {i} has invalid level (price {}, size {})",
                level.price, level.size
            )));
        }
    }
    if let Some(pos) = snapshots
        .windows(2)
        .position(|w| w[1].timestamp <= w[0].timestamp)
    {
        return Err(ProviderError::MalformedData(format!(
            "snapshot timestamps not strictly increasing at {}",
            pos + 1
        )));
    }
    Ok(())
}

/// Prints may share a timestamp but never go backwards.
pub fn validate_prints(prints: &[TradePrint]) -> Result<(), ProviderError> {
    if let Some((i, p)) = prints
        .iter()
        .enumerate()
        .find(|(_, p)| !(p.price.is_finite() && p.price > 0.0 && p.size.is_finite() && p.size > 0.0))
    {
        return Err(ProviderError::MalformedData(format!(
            "print {i} has invalid price {} or size {}",
            p.price, p.size
        )));
    }
    if let Some(pos) = prints
        .windows(2)
        .position(|w| w[1].timestamp < w[0].timestamp)
    {
        return Err(ProviderError::MalformedData(format!(
            "print timestamps go backwards at {}",
            pos + 1
        )));
    }
    Ok(())
}

/// Keep only the newest `limit` candles.
pub(crate) fn keep_last(mut candles: Vec<Candle>, limit: usize) -> Vec<Candle> {
    if candles.len() > limit {
        candles.drain(..candles.len() - limit);
    }
    candles
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
