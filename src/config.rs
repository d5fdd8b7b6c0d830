//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files. Every section
//! carries hard-coded defaults so the engine runs without a config file;
//! a file only needs the sections it overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::types::{CurrencyPair, Timeframe, MAJOR_PAIRS};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub detector: DetectorConfig,
    pub factors: FactorConfig,
    pub events: EventConfig,
    pub regime_performance: RegimePerformanceConfig,
    pub walk_forward: WalkForwardConfig,
    pub strategy: StrategyParams,
    /// Grid search ranges for optimization (optional)
    /// Each key is a strategy param name, value is array of values to test
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<HashMap<String, Vec<f64>>>,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }

    /// Parsed bar interval for candle series
    pub fn timeframe(&self) -> Result<Timeframe> {
        self.data
            .timeframe
            .parse()
            .with_context(|| format!("Invalid timeframe '{}' in data section", self.data.timeframe))
    }
}

/// Data layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: String,
    pub results_dir: String,
    pub timeframe: String,
    pub pairs: Vec<String>,
    /// Account balance used to scale absolute pnl into fractional returns
    pub account_balance: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            data_dir: "data".to_string(),
            results_dir: "results".to_string(),
            timeframe: "4h".to_string(),
            pairs: MAJOR_PAIRS.iter().map(|s| s.to_string()).collect(),
            account_balance: 10_000.0,
        }
    }
}

impl DataConfig {
    pub fn pairs(&self) -> Vec<CurrencyPair> {
        self.pairs.iter().map(CurrencyPair::new).collect()
    }
}

/// Regime detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Candle history gathered per pair, in wall-clock hours
    pub lookback_hours: u32,
    /// Hours until the next scheduled evaluation
    pub evaluation_interval_hours: i64,
    /// Half-width (hours) of the release-proximity window
    pub event_window_hours: i64,
    /// Bounded length of the in-memory detection history
    pub history_limit: usize,
    /// Ambiguous trend-strength band that forces a TRANSITION read
    pub transition_band_low: f64,
    pub transition_band_high: f64,
    /// Sentiment score cutoffs for RISK_ON / RISK_OFF
    pub risk_on_threshold: f64,
    pub risk_off_threshold: f64,
    /// Moving-average periods for the market-condition and trend signals
    pub sma_fast: usize,
    pub sma_slow: usize,
    /// Averaging periods for the volatility and directional indicators
    pub atr_period: usize,
    pub adx_period: usize,
    /// ADX level above which directional movement counts as trending
    pub adx_trend_threshold: f64,
    /// ATR-ratio cutoffs separating the volatility bands
    pub vol_low_ratio: f64,
    pub vol_high_ratio: f64,
    pub vol_extreme_ratio: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            lookback_hours: 800,
            evaluation_interval_hours: 4,
            event_window_hours: 24,
            history_limit: 100,
            transition_band_low: 0.3,
            transition_band_high: 0.7,
            risk_on_threshold: 0.6,
            risk_off_threshold: 0.4,
            sma_fast: 20,
            sma_slow: 50,
            atr_period: 14,
            adx_period: 14,
            adx_trend_threshold: 25.0,
            vol_low_ratio: 0.8,
            vol_high_ratio: 1.2,
            vol_extreme_ratio: 1.8,
        }
    }
}

/// Factor attribution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorConfig {
    /// Window (bars) for momentum and realized-volatility style factors
    pub style_window: usize,
    /// Window (bars) approximating the 52-week position for the value factor
    pub value_window: usize,
    /// Half-width (hours) of the window used for the risk-sentiment proxy
    pub sentiment_window_hours: i64,
    pub major_pairs: Vec<String>,
}

impl Default for FactorConfig {
    fn default() -> Self {
        FactorConfig {
            style_window: 20,
            value_window: 252,
            sentiment_window_hours: 4,
            major_pairs: MAJOR_PAIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FactorConfig {
    pub fn major_pairs(&self) -> Vec<CurrencyPair> {
        self.major_pairs.iter().map(CurrencyPair::new).collect()
    }
}

/// Economic event analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Half-width (hours) of the pre/post window around each release
    pub impact_window_hours: i64,
    /// Weeks between synthesized FOMC decisions
    pub fomc_interval_weeks: i64,
    /// Impact score above which exposure around the event is recommended
    pub increase_threshold: f64,
    /// Impact score below which reduced exposure is recommended
    pub reduce_threshold: f64,
}

impl Default for EventConfig {
    fn default() -> Self {
        EventConfig {
            impact_window_hours: 24,
            fomc_interval_weeks: 6,
            increase_threshold: 0.1,
            reduce_threshold: -0.05,
        }
    }
}

/// Per-trade regime classification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimePerformanceConfig {
    /// Bars in the local classification window ending at the trade
    pub window: usize,
    /// Regime buckets with fewer trades than this are dropped from results
    pub min_trades_per_regime: usize,
    /// Realized volatility above this marks the window high-vol
    pub high_vol_threshold: f64,
    /// Relative price range above this marks the window high-vol
    pub range_threshold: f64,
    /// Relative SMA5/SMA10 separation above this marks the window trending
    pub trend_threshold: f64,
    /// Half-width (hours) of transition windows around volatility spikes
    pub transition_window_hours: i64,
    /// Percentile of bar volatility that seeds transition windows
    pub transition_vol_percentile: f64,
}

impl Default for RegimePerformanceConfig {
    fn default() -> Self {
        RegimePerformanceConfig {
            window: 20,
            min_trades_per_regime: 10,
            high_vol_threshold: 0.01,
            range_threshold: 0.02,
            trend_threshold: 0.001,
            transition_window_hours: 12,
            transition_vol_percentile: 90.0,
        }
    }
}

/// Walk-forward analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    pub training_months: i32,
    pub testing_months: i32,
    pub step_months: i32,
    /// Cap on grid candidates evaluated per regime
    pub max_combinations: usize,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        WalkForwardConfig {
            training_months: 6,
            testing_months: 1,
            step_months: 1,
            max_combinations: 20,
        }
    }
}

/// Parameters of the reference SMA-crossover engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub stop_pips: f64,
    pub target_pips: f64,
    /// Bars after which an open position is closed regardless of price
    pub max_hold_bars: usize,
    /// Units traded per position
    pub position_size: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            fast_period: 10,
            slow_period: 30,
            stop_pips: 40.0,
            target_pips: 80.0,
            max_hold_bars: 48,
            position_size: 10_000.0,
        }
    }
}

impl StrategyParams {
    /// Apply a named override, ignoring unknown keys.
    /// Period-valued params are rounded to whole bars.
    pub fn set(&mut self, name: &str, value: f64) {
        match name {
            "fast_period" => self.fast_period = value.round().max(1.0) as usize,
            "slow_period" => self.slow_period = value.round().max(2.0) as usize,
            "stop_pips" => self.stop_pips = value,
            "target_pips" => self.target_pips = value,
            "max_hold_bars" => self.max_hold_bars = value.round().max(1.0) as usize,
            "position_size" => self.position_size = value,
            _ => {}
        }
    }

    /// Flat view of the tunable parameters, keyed by name
    pub fn as_map(&self) -> HashMap<String, f64> {
        HashMap::from([
            ("fast_period".to_string(), self.fast_period as f64),
            ("slow_period".to_string(), self.slow_period as f64),
            ("stop_pips".to_string(), self.stop_pips),
            ("target_pips".to_string(), self.target_pips),
            ("max_hold_bars".to_string(), self.max_hold_bars as f64),
            ("position_size".to_string(), self.position_size),
        ])
    }
}
