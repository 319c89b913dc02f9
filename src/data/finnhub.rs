//! Finnhub candle adapter.
//!
//! API: `https://finnhub.io/api/v1/stock/candle`
//! Auth: API key (`token` query parameter), read from the env var named in
//! config. The adapter is only constructed when the key is present.
//! Rate limit: 60 calls/minute on the free tier; HTTP 429 → `RateLimited`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{keep_last, Capabilities, DataProvider, ProviderError};
use crate::types::{Candle, Timeframe};

const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

#[derive(Debug, Deserialize)]
struct CandleResponse {
    /// "ok" or "no_data".
    s: String,
    #[serde(default)]
    t: Vec<i64>,
    #[serde(default)]
    o: Vec<f64>,
    #[serde(default)]
    h: Vec<f64>,
    #[serde(default)]
    l: Vec<f64>,
    #[serde(default)]
    c: Vec<f64>,
    #[serde(default)]
    v: Vec<f64>,
}

pub struct FinnhubProvider {
    http: Client,
    api_key: SecretString,
    base_url: String,
    symbol_suffix: String,
    timeout_ms: u64,
}

impl FinnhubProvider {
    pub fn new(
        api_key: SecretString,
        symbol_suffix: &str,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("RADAR/0.1.0")
            .build()
            .context("Failed to build Finnhub HTTP client")?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
            symbol_suffix: symbol_suffix.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    fn resolution(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::Intraday => "5",
            Timeframe::Daily => "D",
        }
    }

    /// Unix-seconds window wide enough to hold `limit` bars, weekends and
    /// overnight gaps included.
    fn window(timeframe: Timeframe, limit: usize, now: DateTime<Utc>) -> (i64, i64) {
        let to = now.timestamp();
        let span = timeframe.bar_seconds() * limit as i64;
        let padded = match timeframe {
            Timeframe::Intraday => span * 4,
            Timeframe::Daily => span * 3 / 2 + 7 * 86_400,
        };
        (to - padded, to)
    }
}

fn parse_candles(body: CandleResponse) -> Result<Vec<Candle>, ProviderError> {
    match body.s.as_str() {
        "no_data" => return Ok(Vec::new()),
        "ok" => {}
        other => {
            return Err(ProviderError::MalformedData(format!("unexpected status '{other}'")));
        }
    }

    let n = body.t.len();
    if [body.o.len(), body.h.len(), body.l.len(), body.c.len(), body.v.len()]
        .iter()
        .any(|len| *len != n)
    {
        return Err(ProviderError::MalformedData(
            "candle arrays do not match timestamp count".into(),
        ));
    }

    body.t
        .iter()
        .enumerate()
        .map(|(i, ts)| {
            let timestamp = DateTime::<Utc>::from_timestamp(*ts, 0)
                .ok_or_else(|| ProviderError::MalformedData(format!("invalid timestamp {ts}")))?;
            Ok(Candle {
                timestamp,
                open: body.o[i],
                high: body.h[i],
                low: body.l[i],
                close: body.c[i],
                volume: body.v[i],
            })
        })
        .collect()
}

#[async_trait]
impl DataProvider for FinnhubProvider {
    fn name(&self) -> &'static str {
        "finnhub"
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
        let ticker = format!("{symbol}{}", self.symbol_suffix);
        let (from, to) = Self::window(timeframe, limit, Utc::now());
        let url = format!(
            "{}/stock/candle?symbol={}&resolution={}&from={from}&to={to}&token={}",
            self.base_url,
            urlencoding::encode(&ticker),
            Self::resolution(timeframe),
            self.api_key.expose_secret(),
        );

        debug!(symbol = %ticker, %timeframe, "Finnhub candle request");

        let resp = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout_ms)
            } else {
                // Strip the URL so the token never reaches the logs.
                ProviderError::Unavailable(e.without_url().to_string())
            }
        })?;

        match resp.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(symbol = %ticker, "Finnhub rate limit hit");
                return Err(ProviderError::RateLimited(format!("HTTP 429 for {ticker}")));
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProviderError::Unavailable(format!(
                    "access denied for {ticker} (HTTP {})",
                    resp.status()
                )));
            }
            status if !status.is_success() => {
                return Err(ProviderError::Unavailable(format!("HTTP {status} for {ticker}")));
            }
            _ => {}
        }

        let body: CandleResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedData(e.without_url().to_string()))?;

        let candles = parse_candles(body)?;
        debug!(symbol = %ticker, bars = candles.len(), "Finnhub candles parsed");
        Ok(keep_last(candles, limit))
    }
}
