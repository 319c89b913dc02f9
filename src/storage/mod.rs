//! Persistence layer.
//!
//! Saves and loads tracker state to/from a JSON file so a restart resumes
//! phases and cooldown windows instead of starting every symbol at CLEAN.
//! Raw OHLCV history is never persisted.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::types::{RadarError, SymbolState};

/// Default state file path.
pub const DEFAULT_STATE_FILE: &str = "radar_state.json";

/// Everything written to disk between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub cycle_count: u64,
    pub symbols: Vec<SymbolState>,
}

impl PersistedState {
    pub fn new(symbols: Vec<SymbolState>, cycle_count: u64, saved_at: DateTime<Utc>) -> Self {
        Self { saved_at, cycle_count, symbols }
    }
}

/// Save state to a JSON file. Writes to a temp file first, then renames,
/// so a crash mid-write never leaves a truncated state file.
pub fn save_state(state: &PersistedState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json = serde_json::to_string_pretty(state)
        .context("Failed to serialise tracker state")?;

    let tmp = format!("{path}.tmp");
    std::fs::write(&tmp, &json)
        .context(format!("Failed to write state to {tmp}"))?;
    std::fs::rename(&tmp, path)
        .context(format!("Failed to move state into {path}"))?;

    debug!(path, symbols = state.symbols.len(), cycles = state.cycle_count, "State saved");
    Ok(())
}

/// Load state from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_state(path: Option<&str>) -> Result<Option<PersistedState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved state found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read state from {path}"))?;

    let state: PersistedState = serde_json::from_str(&json)
        .map_err(|e| RadarError::Storage(format!("{path}: {e}")))?;

    info!(
        path,
        symbols = state.symbols.len(),
        cycle_count = state.cycle_count,
        saved_at = %state.saved_at,
        "State loaded from disk"
    );

    Ok(Some(state))
}

/// Delete the state file (for testing or reset).
pub fn delete_state(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .context(format!("Failed to delete state file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
