//! Yahoo Finance chart adapter.
//!
//! Serves 5-minute intraday and daily OHLCV bars from the public chart
//! endpoint. No API key; exchange-listed symbols get a configurable suffix
//! (e.g. `THYAO` → `THYAO.IS`).
//!
//! API: `https://query1.finance.yahoo.com/v8/finance/chart/{symbol}`
//! Auth: None required.
//! Rate limit: Undocumented; HTTP 429 is reported as `RateLimited`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{keep_last, Capabilities, DataProvider, ProviderError};
use crate::types::{Candle, Timeframe};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

// ---------------------------------------------------------------------------
// Chart response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct YahooProvider {
    http: Client,
    base_url: String,
    symbol_suffix: String,
    timeout_ms: u64,
}

impl YahooProvider {
    pub fn new(symbol_suffix: &str, base_url: Option<&str>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (RADAR/0.1.0)")
            .build()
            .context("Failed to build Yahoo HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
            symbol_suffix: symbol_suffix.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    fn ticker(&self, symbol: &str) -> String {
        if self.symbol_suffix.is_empty() || symbol.ends_with(&self.symbol_suffix) {
            symbol.to_string()
        } else {
            format!("{symbol}{}", self.symbol_suffix)
        }
    }

    /// Chart interval and range covering `limit` bars.
    fn query_params(timeframe: Timeframe, limit: usize) -> (&'static str, &'static str) {
        match timeframe {
            // Roughly 100 five-minute bars per session.
            Timeframe::Intraday if limit <= 100 => ("5m", "2d"),
            Timeframe::Intraday if limit <= 400 => ("5m", "5d"),
            Timeframe::Intraday => ("5m", "1mo"),
            Timeframe::Daily if limit <= 60 => ("1d", "3mo"),
            Timeframe::Daily if limit <= 120 => ("1d", "6mo"),
            Timeframe::Daily if limit <= 250 => ("1d", "1y"),
            Timeframe::Daily => ("1d", "5y"),
        }
    }

    fn map_request_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout_ms)
        } else if err.is_decode() {
            ProviderError::MalformedData(err.to_string())
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }
}

/// Convert a chart payload into candles, skipping rows with missing prices.
fn parse_chart(body: ChartResponse) -> Result<Vec<Candle>, ProviderError> {
    if let Some(err) = body.chart.error {
        return Err(ProviderError::Unavailable(format!(
            "{}: {}",
            err.code, err.description
        )));
    }

    let Some(result) = body.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Ok(Vec::new());
    };

    let n = result.timestamp.len();
    if [&quote.open, &quote.high, &quote.low, &quote.close]
        .iter()
        .any(|series| series.len() != n)
    {
        return Err(ProviderError::MalformedData(
            "quote arrays do not match timestamp count".into(),
        ));
    }

    let mut candles = Vec::with_capacity(n);
    for (i, ts) in result.timestamp.iter().enumerate() {
        let (Some(open), Some(high), Some(low), Some(close)) =
            (quote.open[i], quote.high[i], quote.low[i], quote.close[i])
        else {
            continue;
        };
        let timestamp = DateTime::<Utc>::from_timestamp(*ts, 0).ok_or_else(|| {
            ProviderError::MalformedData(format!("invalid timestamp {ts}"))
        })?;
        candles.push(Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume: quote.volume.get(i).copied().flatten().unwrap_or(0.0),
        });
    }
    Ok(candles)
}

#[async_trait]
impl DataProvider for YahooProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            intraday: true,
            daily: true,
            orderbook: false,
            prints: false,
        }
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        let ticker = self.ticker(symbol);
        let (interval, range) = Self::query_params(timeframe, limit);
        let url = format!(
            "{}/{}?interval={interval}&range={range}&includePrePost=false",
            self.base_url,
            urlencoding::encode(&ticker),
        );

        debug!(symbol = %ticker, %timeframe, interval, range, "Yahoo chart request");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        match resp.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(symbol = %ticker, "Yahoo rate limit hit");
                return Err(ProviderError::RateLimited(format!("HTTP 429 for {ticker}")));
            }
            StatusCode::NOT_FOUND => {
                return Err(ProviderError::Unavailable(format!("unknown symbol {ticker}")));
            }
            status if !status.is_success() => {
                return Err(ProviderError::Unavailable(format!("HTTP {status} for {ticker}")));
            }
            _ => {}
        }

        let body: ChartResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedData(e.to_string()))?;

        let candles = parse_chart(body)?;
        debug!(symbol = %ticker, bars = candles.len(), "Yahoo chart parsed");
        Ok(keep_last(candles, limit))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
