//! Scan orchestrator.
//!
//! One `run_cycle` walks the whole universe: fetch candles through the
//! provider manager, apply the liquidity admission filter, pull optional
//! order-book / prints / context, run the strategy pipeline, feed the
//! tracker and dispatch whatever alerts it returns. Symbols are processed
//! concurrently up to `max_concurrency`; a failure on one symbol never
//! touches another.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::data::manager::ProviderManager;
use crate::data::ContextSource;
use crate::engine::tracker::SymbolTracker;
use crate::notify::NotificationDispatcher;
use crate::strategy::features::FeatureInput;
use crate::strategy::Pipeline;
use crate::types::{
    AlertKind, ContextSignals, CycleReport, LiquidityTier, OrderBookSnapshot, Timeframe,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// The slice of `AppConfig` the scanner needs each cycle.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub universe: Vec<String>,
    pub max_concurrency: usize,
    pub intraday_bars: usize,
    pub daily_bars: usize,
    pub min_daily_turnover: f64,
    pub order_book_depth: usize,
    pub prints_window_minutes: u32,
}

impl ScanSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            universe: cfg.scanner.active_universe(),
            max_concurrency: cfg.scanner.max_concurrency,
            intraday_bars: cfg.scanner.intraday_bars,
            daily_bars: cfg.scanner.daily_bars,
            min_daily_turnover: cfg.scanner.min_daily_turnover,
            order_book_depth: cfg.providers.order_book_depth,
            prints_window_minutes: cfg.providers.prints_window_minutes,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-symbol outcome
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum SymbolOutcome {
    /// No intraday candles from any provider; state untouched.
    NoData,
    /// Below the daily turnover admission floor; state untouched.
    Filtered,
    Scored {
        symbol: String,
        composite: f64,
        preparation: usize,
        initiation: usize,
        dispatch_failures: usize,
    },
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct Scanner {
    manager: Arc<ProviderManager>,
    pipeline: Pipeline,
    tracker: Arc<SymbolTracker>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    context: Arc<dyn ContextSource>,
    settings: ScanSettings,
}

impl Scanner {
    pub fn new(
        manager: Arc<ProviderManager>,
        pipeline: Pipeline,
        tracker: Arc<SymbolTracker>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        context: Arc<dyn ContextSource>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            manager,
            pipeline,
            tracker,
            dispatcher,
            context,
            settings,
        }
    }

    pub fn tracker(&self) -> &Arc<SymbolTracker> {
        &self.tracker
    }

    /// Run one pass over the universe and summarise it.
    pub async fn run_cycle(&self, cycle_number: u64, now: DateTime<Utc>) -> CycleReport {
        let started = Instant::now();
        info!(
            cycle = cycle_number,
            symbols = self.settings.universe.len(),
            "Starting scan cycle"
        );

        let outcomes: Vec<SymbolOutcome> = stream::iter(self.settings.universe.iter())
            .map(|symbol| self.scan_symbol(symbol, now))
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;

        let mut report = CycleReport {
            cycle_number,
            started_at: Some(now),
            symbols_total: self.settings.universe.len(),
            ..CycleReport::default()
        };

        for outcome in outcomes {
            match outcome {
                SymbolOutcome::NoData => report.symbols_no_data += 1,
                SymbolOutcome::Filtered => report.symbols_filtered += 1,
                SymbolOutcome::Scored {
                    symbol,
                    composite,
                    preparation,
                    initiation,
                    dispatch_failures,
                } => {
                    report.symbols_scored += 1;
                    report.preparation_alerts += preparation;
                    report.initiation_alerts += initiation;
                    report.dispatch_failures += dispatch_failures;
                    if report.top_symbol.is_none() || composite > report.top_score {
                        report.top_symbol = Some(symbol);
                        report.top_score = composite;
                    }
                }
            }
        }

        report.watchlist_size = self.tracker.watchlist().len();
        report.duration_ms = started.elapsed().as_millis() as u64;
        report
    }

    async fn scan_symbol(&self, symbol: &str, now: DateTime<Utc>) -> SymbolOutcome {
        let s = &self.settings;

        let (intraday, daily) = tokio::join!(
            self.manager
                .fetch_candles_at(symbol, Timeframe::Intraday, s.intraday_bars, now),
            self.manager
                .fetch_candles_at(symbol, Timeframe::Daily, s.daily_bars, now),
        );

        if intraday.is_empty() {
            debug!(symbol, "No intraday data, skipping");
            return SymbolOutcome::NoData;
        }

        let daily_turnover = daily.last().map(|c| c.turnover());
        if let Some(turnover) = daily_turnover {
            if turnover < s.min_daily_turnover {
                debug!(
                    symbol,
                    turnover,
                    floor = s.min_daily_turnover,
                    "Below turnover floor, skipping"
                );
                return SymbolOutcome::Filtered;
            }
        }

        let (order_book, prints, external) = tokio::join!(
            self.manager.fetch_order_book(symbol, s.order_book_depth),
            self.manager.fetch_prints(symbol, s.prints_window_minutes),
            self.context.context_for(symbol),
        );

        let context = self.derived_context(daily_turnover, &order_book).merge(external);
        let input = FeatureInput {
            symbol,
            intraday: &intraday,
            daily: &daily,
            order_book: &order_book,
            prints: &prints,
            context,
        };
        let eval = self.pipeline.evaluate(&input);

        debug!(
            symbol,
            composite = eval.score.composite,
            label = %eval.score.label,
            features = eval.features.available_count(),
            "Scored"
        );

        let alerts = self
            .tracker
            .observe(&eval.score, eval.initiation.as_ref(), now);

        let mut preparation = 0;
        let mut initiation = 0;
        let mut dispatch_failures = 0;
        for alert in &alerts {
            match alert.kind {
                AlertKind::Preparation => preparation += 1,
                AlertKind::Initiation => initiation += 1,
            }
            if let Err(e) = self.dispatcher.dispatch(alert).await {
                warn!(
                    symbol,
                    alert_id = %alert.id,
                    kind = %alert.kind,
                    error = %e,
                    "Alert dispatch failed"
                );
                dispatch_failures += 1;
            }
        }

        SymbolOutcome::Scored {
            symbol: symbol.to_string(),
            composite: eval.score.composite,
            preparation,
            initiation,
            dispatch_failures,
        }
    }

    /// Turnover, spread and liquidity tier computed from market data.
    fn derived_context(
        &self,
        daily_turnover: Option<f64>,
        order_book: &[OrderBookSnapshot],
    ) -> ContextSignals {
        let scoring = self.pipeline.engine().config();
        let liquidity_tier = daily_turnover.map(|t| {
            if t < scoring.illiquid_turnover {
                LiquidityTier::Illiquid
            } else if t < scoring.low_turnover_threshold {
                LiquidityTier::Thin
            } else {
                LiquidityTier::Normal
            }
        });
        ContextSignals {
            daily_turnover,
            spread_pct: order_book.last().and_then(|b| b.spread_pct()),
            liquidity_tier,
            ..ContextSignals::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
