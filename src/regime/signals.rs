//! Regime signal extraction
//!
//! The scalar sub-analyses behind the detector. Each reduces candle history
//! to a score plus a confidence; short or degenerate input degrades to a
//! neutral read instead of failing.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::calendar::EconomicEvent;
use crate::config::DetectorConfig;
use crate::indicators::{adx, atr, ema};
use crate::types::{Candle, CurrencyPair, VolatilityLevel};

/// Is-trending classification of one pair
#[derive(Debug, Clone, Copy)]
pub struct MarketCondition {
    pub is_trending: bool,
    pub confidence: f64,
}

impl MarketCondition {
    fn neutral() -> Self {
        Self {
            is_trending: false,
            confidence: 0.0,
        }
    }
}

/// Volatility band of one pair relative to its lookback baseline
#[derive(Debug, Clone, Copy)]
pub struct VolatilityRead {
    pub level: VolatilityLevel,
    pub confidence: f64,
    /// Current ATR over its lookback mean
    pub atr_ratio: f64,
}

impl VolatilityRead {
    fn neutral() -> Self {
        Self {
            level: VolatilityLevel::Medium,
            confidence: 0.0,
            atr_ratio: 1.0,
        }
    }
}

/// Trend strength of one pair
///
/// `strength` lives in [0, 1] with 0.5 meaning ambiguous; `direction` is the
/// sign of the fast/slow average separation.
#[derive(Debug, Clone, Copy)]
pub struct TrendRead {
    pub strength: f64,
    pub direction: f64,
}

impl TrendRead {
    fn neutral() -> Self {
        Self {
            strength: 0.5,
            direction: 0.0,
        }
    }
}

/// ADX reading above which strength saturates at 1.0
const ADX_SATURATION: f64 = 50.0;

/// Absolute return over the sentiment window that saturates the score
const SENTIMENT_SATURATION: f64 = 0.02;

/// Bars of history the sentiment breadth read looks back over
const SENTIMENT_BARS: usize = 10;

fn series_parts(candles: &[Candle]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
    (high, low, close)
}

/// Classify whether a pair is in a directional phase
pub fn market_condition(candles: &[Candle], config: &DetectorConfig) -> MarketCondition {
    let warmup = (2 * config.adx_period).max(config.sma_slow);
    if candles.len() < warmup {
        return MarketCondition::neutral();
    }

    let (high, low, close) = series_parts(candles);
    let Some(adx_now) = adx(&high, &low, &close, config.adx_period)
        .last()
        .copied()
        .flatten()
    else {
        return MarketCondition::neutral();
    };

    let is_trending = adx_now > config.adx_trend_threshold;
    let confidence = if config.adx_trend_threshold > 0.0 {
        ((adx_now - config.adx_trend_threshold).abs() / config.adx_trend_threshold).min(1.0)
    } else {
        0.0
    };

    MarketCondition {
        is_trending,
        confidence,
    }
}

/// Classify the volatility band from the current ATR against its lookback mean
pub fn volatility_read(candles: &[Candle], config: &DetectorConfig) -> VolatilityRead {
    if candles.len() < config.atr_period + 2 {
        return VolatilityRead::neutral();
    }

    let (high, low, close) = series_parts(candles);
    let atr_values = atr(&high, &low, &close, config.atr_period);
    let Some(current_atr) = atr_values.last().copied().flatten() else {
        return VolatilityRead::neutral();
    };

    let valid: Vec<f64> = atr_values.iter().filter_map(|&x| x).collect();
    if valid.is_empty() {
        return VolatilityRead::neutral();
    }
    let atr_mean = valid.iter().sum::<f64>() / valid.len() as f64;
    if atr_mean == 0.0 {
        return VolatilityRead::neutral();
    }

    let atr_ratio = current_atr / atr_mean;
    let level = classify_ratio(atr_ratio, config);

    // Confidence grows with distance from the nearest band boundary
    let boundary_distance = [
        config.vol_low_ratio,
        config.vol_high_ratio,
        config.vol_extreme_ratio,
    ]
    .iter()
    .map(|b| (atr_ratio - b).abs())
    .fold(f64::INFINITY, f64::min);
    let confidence = (boundary_distance / 0.4).min(1.0);

    VolatilityRead {
        level,
        confidence,
        atr_ratio,
    }
}

/// Map an ATR ratio onto its volatility band
pub fn classify_ratio(atr_ratio: f64, config: &DetectorConfig) -> VolatilityLevel {
    if atr_ratio >= config.vol_extreme_ratio {
        VolatilityLevel::Extreme
    } else if atr_ratio >= config.vol_high_ratio {
        VolatilityLevel::High
    } else if atr_ratio <= config.vol_low_ratio {
        VolatilityLevel::Low
    } else {
        VolatilityLevel::Medium
    }
}

/// Score trend strength from directional movement, with direction taken from
/// the fast/slow average separation
pub fn trend_read(candles: &[Candle], config: &DetectorConfig) -> TrendRead {
    let warmup = (2 * config.adx_period).max(config.sma_slow);
    if candles.len() < warmup {
        return TrendRead::neutral();
    }

    let (high, low, close) = series_parts(candles);
    let Some(adx_now) = adx(&high, &low, &close, config.adx_period)
        .last()
        .copied()
        .flatten()
    else {
        return TrendRead::neutral();
    };

    let strength = (adx_now / ADX_SATURATION).clamp(0.0, 1.0);

    let fast = ema(&close, config.sma_fast).last().copied().flatten();
    let slow = ema(&close, config.sma_slow).last().copied().flatten();
    let direction = match (fast, slow) {
        (Some(f), Some(s)) if f > s => 1.0,
        (Some(f), Some(s)) if f < s => -1.0,
        _ => 0.0,
    };

    TrendRead {
        strength,
        direction,
    }
}

/// Breadth-based risk appetite score in [0, 1] across the gathered universe.
///
/// Rallying risk pairs (and a weakening yen) push the score above 0.5; a
/// ±2% move over the window saturates a pair's contribution.
pub fn risk_sentiment(series: &HashMap<CurrencyPair, Vec<Candle>>) -> f64 {
    let mut scores = Vec::new();

    for candles in series.values() {
        if candles.len() < SENTIMENT_BARS + 1 {
            continue;
        }
        let window = &candles[candles.len() - SENTIMENT_BARS - 1..];
        let first = window[0].close;
        let last = window[window.len() - 1].close;
        if first == 0.0 {
            continue;
        }
        let ret = (last - first) / first;
        scores.push(0.5 + 0.5 * (ret / SENTIMENT_SATURATION).clamp(-1.0, 1.0));
    }

    if scores.is_empty() {
        0.5
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

/// Proximity of the nearest scheduled release, 1.0 at the release decaying
/// to 0.0 at the window edge
pub fn event_proximity(
    now: DateTime<Utc>,
    events: &[EconomicEvent],
    window_hours: i64,
) -> f64 {
    if window_hours <= 0 {
        return 0.0;
    }
    events
        .iter()
        .map(|e| {
            let hours = (e.timestamp - now).num_hours().abs();
            if hours >= window_hours {
                0.0
            } else {
                1.0 - hours as f64 / window_hours as f64
            }
        })
        .fold(0.0, f64::max)
}
