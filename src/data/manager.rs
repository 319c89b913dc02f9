//! Provider manager: prioritized failover with per-adapter health tracking.
//!
//! One priority list per timeframe class. A request walks its list in order,
//! skipping adapters that are DOWN (until their retry window opens) or that
//! lack the needed capability, and returns the first non-empty result.
//! Every call is bounded by a timeout. Callers always get "data or empty";
//! exhaustion is logged and counted here, never propagated.
//!
//! Health is a per-adapter state machine behind one mutex. Each outcome is
//! applied as a single locked update, so concurrent symbol workers can
//! report against the same adapter safely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{validate_candles, validate_prints, validate_snapshots, DataProvider, ProviderError};
use crate::types::{Candle, OrderBookSnapshot, ProviderHealth, RadarError, Timeframe, TradePrint};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Health-transition and timeout policy, shared by all adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthPolicy {
    /// Consecutive failures that take an adapter DOWN.
    pub failure_threshold: u32,
    /// Upper bound on any single provider call.
    pub call_timeout_secs: u64,
    /// How long a DOWN adapter is skipped before one trial call.
    pub down_retry_secs: u64,
    /// Successes slower than this count as degraded.
    pub slow_call_ms: Option<u64>,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            call_timeout_secs: 10,
            down_retry_secs: 300,
            slow_call_ms: None,
        }
    }
}

impl HealthPolicy {
    pub fn validate(&self) -> Result<(), RadarError> {
        if self.failure_threshold == 0 {
            return Err(RadarError::Config("failure_threshold must be > 0".into()));
        }
        if self.call_timeout_secs == 0 {
            return Err(RadarError::Config("call_timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Health records and stats
// ---------------------------------------------------------------------------

/// Reporting view of one adapter's health.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterStatus {
    pub name: String,
    pub health: ProviderHealth,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub last_error: Option<String>,
    pub last_change: Option<DateTime<Utc>>,
    pub down_since: Option<DateTime<Utc>>,
    #[serde(skip)]
    on_trial: bool,
}

impl AdapterStatus {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            health: ProviderHealth::Unknown,
            consecutive_failures: 0,
            total_successes: 0,
            total_failures: 0,
            last_error: None,
            last_change: None,
            down_since: None,
            on_trial: false,
        }
    }

    fn set_health(&mut self, health: ProviderHealth, now: DateTime<Utc>) {
        if self.health != health {
            self.last_change = Some(now);
        }
        self.health = health;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ManagerStats {
    pub requests: u64,
    pub served: u64,
    /// Requests every adapter answered with "no data yet".
    pub empty: u64,
    /// Failed attempts that moved on to the next adapter.
    pub failovers: u64,
    /// Requests no adapter could serve.
    pub exhausted: u64,
}

/// What one adapter call produced.
enum Outcome {
    Success { elapsed: Duration },
    NoData,
    Failure(ProviderError),
}

/// One granted call slot. A trial call on a DOWN adapter that is dropped
/// before its outcome is recorded (cancelled cycle, aborted task) releases
/// the trial flag so the adapter can be tried again.
struct Claim<'a> {
    manager: &'a ProviderManager,
    name: &'static str,
    trial: bool,
}

impl Claim<'_> {
    fn record(mut self, outcome: Outcome, now: DateTime<Utc>) {
        self.trial = false;
        self.manager.record(self.name, outcome, now);
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.trial {
            return;
        }
        if let Some(status) = self.manager.lock_health().get_mut(self.name) {
            status.on_trial = false;
        }
        warn!(provider = self.name, "Trial call abandoned before completion, released");
    }
}

/// Which list and capability a request routes through.
#[derive(Debug, Clone, Copy)]
enum Route {
    Candles(Timeframe),
    OrderBook,
    Prints,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct ProviderManager {
    adapters: HashMap<&'static str, Arc<dyn DataProvider>>,
    intraday: Vec<&'static str>,
    daily: Vec<&'static str>,
    policy: HealthPolicy,
    call_timeout: Duration,
    health: Mutex<HashMap<&'static str, AdapterStatus>>,
    stats: Mutex<ManagerStats>,
}

impl ProviderManager {
    /// Build a manager over `adapters`, routed by the named priority lists.
    ///
    /// Names without a registered adapter (e.g. a keyed provider whose key
    /// is missing) are dropped with a warning. A listed adapter lacking the
    /// list's timeframe capability, or a list left empty, is a config error.
    pub fn new(
        adapters: Vec<Arc<dyn DataProvider>>,
        intraday_priority: &[String],
        daily_priority: &[String],
        policy: HealthPolicy,
    ) -> Result<Self, RadarError> {
        let adapters: HashMap<&'static str, Arc<dyn DataProvider>> =
            adapters.into_iter().map(|a| (a.name(), a)).collect();

        let intraday = Self::resolve(&adapters, intraday_priority, Timeframe::Intraday)?;
        let daily = Self::resolve(&adapters, daily_priority, Timeframe::Daily)?;

        let health = adapters
            .keys()
            .map(|name| (*name, AdapterStatus::new(name)))
            .collect();

        info!(
            intraday = ?intraday,
            daily = ?daily,
            failure_threshold = policy.failure_threshold,
            "Provider manager ready"
        );

        Ok(Self {
            call_timeout: Duration::from_secs(policy.call_timeout_secs),
            adapters,
            intraday,
            daily,
            policy,
            health: Mutex::new(health),
            stats: Mutex::new(ManagerStats::default()),
        })
    }

    /// Override the per-call timeout (finer than whole seconds).
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    fn resolve(
        adapters: &HashMap<&'static str, Arc<dyn DataProvider>>,
        priority: &[String],
        timeframe: Timeframe,
    ) -> Result<Vec<&'static str>, RadarError> {
        let mut resolved = Vec::new();
        for name in priority {
            let Some(adapter) = adapters.get(name.as_str()) else {
                warn!(provider = %name, %timeframe, "Provider not available, dropped from priority list");
                continue;
            };
            if !adapter.capabilities().supports(timeframe) {
                return Err(RadarError::Config(format!(
                    "provider '{name}' does not support {timeframe} data"
                )));
            }
            resolved.push(adapter.name());
        }
        if resolved.is_empty() {
            return Err(RadarError::Config(format!(
                "no usable provider for {timeframe} data"
            )));
        }
        Ok(resolved)
    }

    // -- Public API ----------------------------------------------------------

    /// Candles from the first adapter that has them, or empty.
    pub async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Candle> {
        self.fetch_candles_at(symbol, timeframe, limit, Utc::now()).await
    }

    /// As [`fetch_candles`](Self::fetch_candles) with an explicit clock for
    /// the DOWN retry window.
    pub async fn fetch_candles_at(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<Candle> {
        let result = self
            .walk(Route::Candles(timeframe), symbol, now, validate_candles, |adapter| async move {
                adapter.fetch_candles(symbol, timeframe, limit).await
            })
            .await;
        self.settle(symbol, result)
    }

    /// Recent order-book snapshots, or empty when no adapter serves them.
    pub async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Vec<OrderBookSnapshot> {
        let result = self
            .walk(Route::OrderBook, symbol, Utc::now(), validate_snapshots, |adapter| async move {
                adapter.fetch_order_book(symbol, depth).await
            })
            .await;
        self.settle(symbol, result)
    }

    /// Recent trade prints, or empty when no adapter serves them.
    pub async fn fetch_prints(&self, symbol: &str, window_minutes: u32) -> Vec<TradePrint> {
        let result = self
            .walk(Route::Prints, symbol, Utc::now(), validate_prints, |adapter| async move {
                adapter.fetch_prints(symbol, window_minutes).await
            })
            .await;
        self.settle(symbol, result)
    }

    pub fn health(&self, name: &str) -> ProviderHealth {
        self.lock_health()
            .get(name)
            .map(|s| s.health)
            .unwrap_or(ProviderHealth::Unknown)
    }

    /// Health of every registered adapter, intraday list order first.
    pub fn health_summary(&self) -> Vec<AdapterStatus> {
        let table = self.lock_health();
        let mut names: Vec<&'static str> = self.intraday.clone();
        for name in &self.daily {
            if !names.contains(name) {
                names.push(*name);
            }
        }
        let mut rest: Vec<&'static str> =
            table.keys().filter(|n| !names.contains(*n)).copied().collect();
        rest.sort_unstable();
        names.extend(rest);
        names.iter().filter_map(|n| table.get(n).cloned()).collect()
    }

    pub fn stats(&self) -> ManagerStats {
        self.lock_stats().clone()
    }

    pub fn priority(&self, timeframe: Timeframe) -> &[&'static str] {
        match timeframe {
            Timeframe::Intraday => &self.intraday,
            Timeframe::Daily => &self.daily,
        }
    }

    // -- Failover ------------------------------------------------------------

    /// Walk the route's priority list. `Ok(vec![])` means every eligible
    /// adapter that answered had no data yet; `Err` means none answered.
    async fn walk<T, F, Fut>(
        &self,
        route: Route,
        symbol: &str,
        now: DateTime<Utc>,
        validate: fn(&[T]) -> Result<(), ProviderError>,
        call: F,
    ) -> Result<Vec<T>, RadarError>
    where
        F: Fn(Arc<dyn DataProvider>) -> Fut,
        Fut: Future<Output = Result<Vec<T>, ProviderError>>,
    {
        self.lock_stats().requests += 1;

        let (list, timeframe) = match route {
            Route::Candles(tf) => (self.priority(tf), tf),
            Route::OrderBook | Route::Prints => (self.priority(Timeframe::Intraday), Timeframe::Intraday),
        };

        let mut answered = false;
        for &name in list {
            let Some(adapter) = self.adapters.get(name) else {
                continue;
            };
            let caps = adapter.capabilities();
            let capable = match route {
                Route::Candles(tf) => caps.supports(tf),
                Route::OrderBook => caps.orderbook,
                Route::Prints => caps.prints,
            };
            if !capable {
                continue;
            }
            let Some(claim) = self.claim(name, now) else {
                debug!(provider = name, symbol, "Skipping DOWN provider");
                continue;
            };

            let started = Instant::now();
            let outcome = match tokio::time::timeout(self.call_timeout, call(adapter.clone())).await {
                Err(_) => Err(ProviderError::Timeout(self.call_timeout.as_millis() as u64)),
                Ok(result) => result.and_then(|data| validate(&data).map(|_| data)),
            };

            match outcome {
                Ok(data) if !data.is_empty() => {
                    claim.record(Outcome::Success { elapsed: started.elapsed() }, now);
                    self.lock_stats().served += 1;
                    debug!(provider = name, symbol, ?route, items = data.len(), "Provider served request");
                    return Ok(data);
                }
                Ok(_) => {
                    answered = true;
                    claim.record(Outcome::NoData, now);
                    debug!(provider = name, symbol, ?route, "Provider has no data yet");
                }
                Err(err) => {
                    warn!(provider = name, symbol, ?route, error = %err, "Provider call failed, failing over");
                    claim.record(Outcome::Failure(err), now);
                    self.lock_stats().failovers += 1;
                }
            }
        }

        if answered {
            self.lock_stats().empty += 1;
            Ok(Vec::new())
        } else {
            Err(RadarError::AllProvidersExhausted {
                symbol: symbol.to_string(),
                timeframe,
            })
        }
    }

    fn settle<T>(&self, symbol: &str, result: Result<Vec<T>, RadarError>) -> Vec<T> {
        match result {
            Ok(data) => data,
            Err(err) => {
                self.lock_stats().exhausted += 1;
                warn!(symbol, error = %err, "No provider could serve request");
                Vec::new()
            }
        }
    }

    // -- Health state machine ------------------------------------------------

    /// Permission to call `name` now, or `None`. A DOWN adapter whose retry
    /// window has elapsed is granted exactly one in-flight trial call.
    fn claim(&self, name: &'static str, now: DateTime<Utc>) -> Option<Claim<'_>> {
        let mut table = self.lock_health();
        let status = table.get_mut(name)?;
        if status.health != ProviderHealth::Down {
            return Some(Claim { manager: self, name, trial: false });
        }
        let retry_at = status
            .down_since
            .map(|t| t + chrono::Duration::seconds(self.policy.down_retry_secs as i64));
        match retry_at {
            Some(at) if now >= at && !status.on_trial => {
                status.on_trial = true;
                info!(provider = name, "Trying DOWN provider");
                Some(Claim { manager: self, name, trial: true })
            }
            _ => None,
        }
    }

    fn record(&self, name: &str, outcome: Outcome, now: DateTime<Utc>) {
        let mut table = self.lock_health();
        let Some(status) = table.get_mut(name) else {
            return;
        };
        let before = status.health;
        let was_trial = std::mem::take(&mut status.on_trial);

        match outcome {
            Outcome::Success { elapsed } => {
                status.consecutive_failures = 0;
                status.total_successes += 1;
                status.down_since = None;
                let slow = self
                    .policy
                    .slow_call_ms
                    .is_some_and(|limit| elapsed.as_millis() as u64 > limit);
                let next = if slow { ProviderHealth::Degraded } else { ProviderHealth::Healthy };
                status.set_health(next, now);
            }
            Outcome::NoData => {
                // A trial call that answered empty keeps the adapter DOWN but
                // restarts its retry window.
                if was_trial {
                    status.down_since = Some(now);
                }
            }
            Outcome::Failure(err) => {
                status.consecutive_failures += 1;
                status.total_failures += 1;
                status.last_error = Some(err.attribute(name).to_string());
                if before == ProviderHealth::Down
                    || status.consecutive_failures >= self.policy.failure_threshold
                {
                    status.down_since = Some(now);
                    status.set_health(ProviderHealth::Down, now);
                } else {
                    status.set_health(ProviderHealth::Degraded, now);
                }
            }
        }

        if status.health != before {
            info!(
                provider = name,
                from = %before,
                to = %status.health,
                consecutive_failures = status.consecutive_failures,
                "Provider health changed"
            );
        }
    }

    fn lock_health(&self) -> MutexGuard<'_, HashMap<&'static str, AdapterStatus>> {
        self.health.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_stats(&self) -> MutexGuard<'_, ManagerStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
