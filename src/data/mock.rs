//! Deterministic synthetic data source.
//!
//! A pseudo-random walk seeded from the symbol name (plus an optional
//! config seed), so every run over the same universe sees the same bars.
//! Supports every capability, which makes it the fallback of last resort
//! in dry runs and the data source for offline demos.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use super::{Capabilities, DataProvider, ProviderError};
use crate::types::{BookLevel, Candle, OrderBookSnapshot, Timeframe, TradePrint, TradeSide};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Order-book snapshots returned per request.
const BOOK_SNAPSHOTS: usize = 6;

/// Spacing between synthetic order-book snapshots.
const BOOK_INTERVAL_SECS: i64 = 60;

/// Synthetic trades generated per minute of window.
const PRINTS_PER_MINUTE: usize = 6;

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Independent ChaCha streams, one per kind of generated data.
#[derive(Debug, Clone, Copy)]
enum Stream {
    Price = 0,
    Intraday = 1,
    Daily = 2,
    Book = 3,
    Prints = 4,
}

impl From<Timeframe> for Stream {
    fn from(tf: Timeframe) -> Self {
        match tf {
            Timeframe::Intraday => Stream::Intraday,
            Timeframe::Daily => Stream::Daily,
        }
    }
}

/// 32-byte ChaCha key: the config seed, then the symbol bytes folded in.
fn symbol_key(seed: u64, symbol: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&seed.to_le_bytes());
    for (i, b) in symbol.bytes().enumerate() {
        key[8 + i % 24] ^= b;
    }
    key
}

pub struct MockProvider {
    seed: u64,
}

impl MockProvider {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn rng(&self, symbol: &str, stream: Stream) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::from_seed(symbol_key(self.seed, symbol));
        rng.set_stream(stream as u64);
        rng
    }

    /// Starting price in `[5, 305)`, fixed per symbol.
    fn base_price(&self, symbol: &str) -> f64 {
        self.rng(symbol, Stream::Price).gen_range(5.0..305.0_f64)
    }

    /// Deterministic bars ending at the last completed bar boundary.
    pub fn candles_at(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<Candle> {
        let bar = timeframe.bar_seconds();
        let last_open = now.timestamp() / bar * bar - bar;
        let mut rng = self.rng(symbol, Stream::from(timeframe));
        let (vol, base_volume) = match timeframe {
            Timeframe::Intraday => (0.002, 20_000.0),
            Timeframe::Daily => (0.015, 2_000_000.0),
        };

        let mut close = self.base_price(symbol);
        let mut candles = Vec::with_capacity(limit);
        for i in 0..limit {
            let open = close;
            let shock: f64 = rng.sample(StandardNormal);
            close = (open * (1.0 + vol * shock)).max(0.01);
            let wick = open.max(close) * vol * rng.gen::<f64>();
            let high = open.max(close) + wick;
            let low = (open.min(close) - wick).max(0.0);
            let volume = (base_volume * rng.gen_range(0.5..1.5_f64)).round();
            let Some(timestamp) =
                DateTime::<Utc>::from_timestamp(last_open - (limit - 1 - i) as i64 * bar, 0)
            else {
                continue;
            };
            candles.push(Candle { timestamp, open, high, low, close, volume });
        }
        candles
    }

    pub fn order_book_at(
        &self,
        symbol: &str,
        depth: usize,
        now: DateTime<Utc>,
    ) -> Vec<OrderBookSnapshot> {
        let mut rng = self.rng(symbol, Stream::Book);
        let mid = self.base_price(symbol);
        let tick = (mid * 0.001).max(0.01);

        (0..BOOK_SNAPSHOTS)
            .map(|i| {
                let age = (BOOK_SNAPSHOTS - 1 - i) as i64 * BOOK_INTERVAL_SECS;
                let drift = tick * rng.sample::<f64, _>(StandardNormal) * 0.5;
                let bids = (0..depth)
                    .map(|lvl| BookLevel {
                        price: mid - tick * (lvl as f64 + 1.0) + drift,
                        size: rng.gen_range(1_000.0..5_000.0_f64).round(),
                    })
                    .collect();
                let asks = (0..depth)
                    .map(|lvl| BookLevel {
                        price: mid + tick * (lvl as f64 + 1.0) + drift,
                        size: rng.gen_range(1_000.0..5_000.0_f64).round(),
                    })
                    .collect();
                OrderBookSnapshot {
                    timestamp: now - Duration::seconds(age),
                    bids,
                    asks,
                }
            })
            .collect()
    }

    pub fn prints_at(&self, symbol: &str, window_minutes: u32, now: DateTime<Utc>) -> Vec<TradePrint> {
        let mut rng = self.rng(symbol, Stream::Prints);
        let price = self.base_price(symbol);
        let count = window_minutes as usize * PRINTS_PER_MINUTE;
        let step_ms = 60_000 / PRINTS_PER_MINUTE as i64;
        let start = now - Duration::minutes(window_minutes as i64);

        (0..count)
            .map(|i| {
                let noise: f64 = rng.sample(StandardNormal);
                TradePrint {
                    timestamp: start + Duration::milliseconds(i as i64 * step_ms),
                    price: price * (1.0 + 0.001 * noise),
                    size: rng.gen_range(100.0..1_000.0_f64).round(),
                    side: if rng.gen_bool(0.5) { TradeSide::Buy } else { TradeSide::Sell },
                }
            })
            .collect()
    }
}

#[async_trait]
impl DataProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            intraday: true,
            daily: true,
            orderbook: true,
            prints: true,
        }
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        Ok(self.candles_at(symbol, timeframe, limit, Utc::now()))
    }

    async fn fetch_order_book(
        &self,
        symbol: &str,
        depth: usize,
    ) -> Result<Vec<OrderBookSnapshot>, ProviderError> {
        Ok(self.order_book_at(symbol, depth, Utc::now()))
    }

    async fn fetch_prints(
        &self,
        symbol: &str,
        window_minutes: u32,
    ) -> Result<Vec<TradePrint>, ProviderError> {
        Ok(self.prints_at(symbol, window_minutes, Utc::now()))
    }
}
