//! Technical indicators over candle series.
//!
//! Pure functions. Series outputs are aligned to the *end* of the input:
//! the last element always describes the most recent bar. Anything that
//! needs more samples than it was given returns `InsufficientHistory`.

use crate::types::{Candle, RadarError};

fn need(needed: usize, available: usize) -> Result<(), RadarError> {
    if available < needed {
        Err(RadarError::InsufficientHistory { needed, available })
    } else {
        Ok(())
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n − 1 denominator).
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Population standard deviation (n denominator).
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// On-balance volume, seeded with the first bar's volume.
pub fn obv(candles: &[Candle]) -> Vec<f64> {
    let mut out = Vec::with_capacity(candles.len());
    let Some(first) = candles.first() else {
        return out;
    };
    let mut acc = first.volume;
    out.push(acc);
    for w in candles.windows(2) {
        if w[1].close > w[0].close {
            acc += w[1].volume;
        } else if w[1].close < w[0].close {
            acc -= w[1].volume;
        }
        out.push(acc);
    }
    out
}

/// Accumulation/distribution line. Zero-range bars contribute nothing.
pub fn adl(candles: &[Candle]) -> Vec<f64> {
    let mut acc = 0.0;
    candles
        .iter()
        .map(|c| {
            let range = c.high - c.low;
            let clv = if range > 0.0 {
                ((c.close - c.low) - (c.high - c.close)) / range
            } else {
                0.0
            };
            acc += clv * c.volume;
            acc
        })
        .collect()
}

/// True range per bar; the first bar has no previous close and uses
/// high − low.
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let hl = c.high - c.low;
            match i.checked_sub(1).map(|p| candles[p].close) {
                Some(prev) => hl.max((c.high - prev).abs()).max((c.low - prev).abs()),
                None => hl,
            }
        })
        .collect()
}

/// Simple rolling mean; output has `len − period + 1` points.
pub fn rolling_mean(values: &[f64], period: usize) -> Result<Vec<f64>, RadarError> {
    need(period.max(1), values.len())?;
    Ok(values.windows(period.max(1)).map(mean).collect())
}

/// Average true range as a simple rolling mean of TR.
pub fn atr(candles: &[Candle], period: usize) -> Result<Vec<f64>, RadarError> {
    need(period.max(1), candles.len())?;
    rolling_mean(&true_range(candles), period)
}

/// ATR expressed as a percentage of the close it ends on.
pub fn atr_pct(candles: &[Candle], period: usize) -> Result<Vec<f64>, RadarError> {
    let atr = atr(candles, period)?;
    let offset = candles.len() - atr.len();
    Ok(atr
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let close = candles[i + offset].close;
            if close > 0.0 { a / close * 100.0 } else { 0.0 }
        })
        .collect())
}

/// Bollinger band width, `(upper − lower) / middle`, with a sample-std band.
pub fn bollinger_width(closes: &[f64], period: usize, num_std: f64) -> Result<Vec<f64>, RadarError> {
    need(period.max(2), closes.len())?;
    Ok(closes
        .windows(period.max(2))
        .map(|w| {
            let middle = mean(w);
            if middle == 0.0 {
                0.0
            } else {
                2.0 * num_std * sample_std(w) / middle
            }
        })
        .collect())
}

/// Least-squares slope against bar index, divided by `|last|` when the
/// last value is non-zero.
pub fn normalized_slope(values: &[f64]) -> Result<f64, RadarError> {
    need(2, values.len())?;
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(values);
    let (mut num, mut den) = (0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    let slope = num / den;
    let last = values[values.len() - 1];
    Ok(if last != 0.0 { slope / last.abs() } else { slope })
}

/// Share of the trailing `window` values (last value included) that lie
/// strictly below the last value, in `[0, 100]`.
pub fn percentile_rank(values: &[f64], window: usize) -> Result<f64, RadarError> {
    need(window.max(1), values.len())?;
    let recent = &values[values.len() - window.max(1)..];
    let last = recent[recent.len() - 1];
    let below = recent.iter().filter(|v| **v < last).count();
    Ok(below as f64 / recent.len() as f64 * 100.0)
}

/// Standard score of `value` against `sample`. A flat sample yields 0.
pub fn zscore(value: f64, sample: &[f64]) -> Result<f64, RadarError> {
    need(2, sample.len())?;
    let sd = sample_std(sample);
    if sd == 0.0 {
        return Ok(0.0);
    }
    Ok((value - mean(sample)) / sd)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
