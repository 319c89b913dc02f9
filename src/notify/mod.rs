//! Notification dispatch.
//!
//! The scanner hands every `AlertRecord` to a `NotificationDispatcher`.
//! Delivery, formatting and retries belong to the dispatcher; a failed
//! dispatch is logged by the scanner and never stops a cycle.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::types::{AlertKind, AlertRecord};

/// Sink for structured alerts.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, alert: &AlertRecord) -> Result<()>;
}

/// Emits each alert as a structured `tracing` event.
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, alert: &AlertRecord) -> Result<()> {
        let reasons = alert.reasons.join("; ");
        match alert.kind {
            AlertKind::Preparation => info!(
                alert_id = %alert.id,
                symbol = %alert.symbol,
                kind = %alert.kind,
                score = alert.composite_score,
                label = %alert.label,
                reasons = %reasons,
                caveat = ?alert.caveat,
                "ALERT"
            ),
            AlertKind::Initiation => warn!(
                alert_id = %alert.id,
                symbol = %alert.symbol,
                kind = %alert.kind,
                score = alert.composite_score,
                label = %alert.label,
                reasons = %reasons,
                caveat = ?alert.caveat,
                "ALERT"
            ),
        }
        Ok(())
    }
}

/// Keeps the most recent alerts in memory for the reporting API.
pub struct AlertLog {
    capacity: usize,
    alerts: Mutex<Vec<AlertRecord>>,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            alerts: Mutex::new(Vec::new()),
        }
    }

    /// Newest last.
    pub fn recent(&self) -> Vec<AlertRecord> {
        self.alerts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl NotificationDispatcher for AlertLog {
    async fn dispatch(&self, alert: &AlertRecord) -> Result<()> {
        let mut alerts = self.alerts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        alerts.push(alert.clone());
        if alerts.len() > self.capacity {
            let excess = alerts.len() - self.capacity;
            alerts.drain(..excess);
        }
        Ok(())
    }
}

/// Forwards each alert to every inner dispatcher. Fails if any inner
/// dispatcher fails, after trying all of them.
pub struct FanOut {
    targets: Vec<std::sync::Arc<dyn NotificationDispatcher>>,
}

impl FanOut {
    pub fn new(targets: Vec<std::sync::Arc<dyn NotificationDispatcher>>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl NotificationDispatcher for FanOut {
    async fn dispatch(&self, alert: &AlertRecord) -> Result<()> {
        let mut failures = 0;
        for target in &self.targets {
            if let Err(e) = target.dispatch(alert).await {
                warn!(symbol = %alert.symbol, error = %e, "Dispatcher failed");
                failures += 1;
            }
        }
        if failures > 0 {
            anyhow::bail!("{failures} of {} dispatchers failed", self.targets.len());
        }
        Ok(())
    }
}
