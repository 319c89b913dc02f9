//! Scripted provider and recording dispatcher for integration testing.
//!
//! `ScriptedProvider` serves fixed candles per symbol and can be switched
//! into a failing mode; `RecordingDispatcher` keeps every alert it is
//! handed. Both are in-memory with no external dependencies.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use radar::data::{Capabilities, DataProvider, ProviderError};
use radar::notify::NotificationDispatcher;
use radar::types::{AlertRecord, Candle, Timeframe};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap()
}

pub fn bar(at: DateTime<Utc>, close: f64, volume: f64) -> Candle {
    Candle {
        timestamp: at,
        open: close,
        high: close * 1.001,
        low: close * 0.999,
        close,
        volume,
    }
}

/// `n` flat 5-minute bars ending at `t0()`. With `breakout`, the last bar
/// trades 3.5× volume and closes 1.3% higher.
pub fn intraday(n: usize, breakout: bool) -> Vec<Candle> {
    let start = t0() - Duration::minutes(5 * n as i64);
    let mut bars: Vec<Candle> = (0..n)
        .map(|i| bar(start + Duration::minutes(5 * i as i64), 100.0, 10_000.0))
        .collect();
    if breakout {
        if let Some(last) = bars.last_mut() {
            last.close = 101.3;
            last.high = 101.5;
            last.volume = 35_000.0;
        }
    }
    bars
}

/// `n` daily bars at a constant close of 100.
pub fn daily(n: usize, volume: f64) -> Vec<Candle> {
    let start = t0() - Duration::days(n as i64);
    (0..n)
        .map(|i| bar(start + Duration::days(i as i64), 100.0, volume))
        .collect()
}

/// A controllable candle provider.
pub struct ScriptedProvider {
    name: &'static str,
    candles: Mutex<HashMap<(String, Timeframe), Vec<Candle>>>,
    /// If set, every call fails with this error.
    force_error: Mutex<Option<ProviderError>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            candles: Mutex::new(HashMap::new()),
            force_error: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn serve(&self, symbol: &str, intraday: Vec<Candle>, daily: Vec<Candle>) {
        let mut table = self.candles.lock().unwrap();
        table.insert((symbol.to_string(), Timeframe::Intraday), intraday);
        table.insert((symbol.to_string(), Timeframe::Daily), daily);
    }

    pub fn fail_with(&self, error: Option<ProviderError>) {
        *self.force_error.lock().unwrap() = error;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            intraday: true,
            daily: true,
            ..Capabilities::default()
        }
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.force_error.lock().unwrap().clone() {
            return Err(err);
        }
        let table = self.candles.lock().unwrap();
        let bars = table
            .get(&(symbol.to_string(), timeframe))
            .cloned()
            .unwrap_or_default();
        let skip = bars.len().saturating_sub(limit);
        Ok(bars.into_iter().skip(skip).collect())
    }
}

/// Keeps every dispatched alert, in order.
#[derive(Default)]
pub struct RecordingDispatcher {
    alerts: Mutex<Vec<AlertRecord>>,
}

impl RecordingDispatcher {
    pub fn alerts(&self) -> Vec<AlertRecord> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, alert: &AlertRecord) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}
