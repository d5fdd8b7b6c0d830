//! CLI subcommand implementations

pub mod analyze;
pub mod backtest;
pub mod detect;
pub mod optimize;
pub mod walkforward;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use fx_attribution::data::{self, synthetic_candles, MarketData};
use fx_attribution::{Config, CurrencyPair};
use std::path::Path;
use tracing::info;

/// Load the config file when it exists, falling back to built-in defaults
pub(crate) fn load_config(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        let config = Config::from_file(path)?;
        info!("Loaded configuration from: {}", path);
        Ok(config)
    } else {
        info!("Config file {} not found, using built-in defaults", path);
        Ok(Config::default())
    }
}

/// Parse a YYYY-MM-DD date into a UTC midnight timestamp
pub(crate) fn parse_date(label: &str, value: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid {label} date '{value}', expected YYYY-MM-DD"))?;
    let naive = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid {label} date '{value}'"))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Parse an optional YYYY-MM-DD argument
pub(crate) fn parse_date_opt(label: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_date(label, v)).transpose()
}

/// Pairs to evaluate: CLI override, else the configured list
pub(crate) fn resolve_pairs(config: &Config, pairs_override: Option<&str>) -> Vec<CurrencyPair> {
    match pairs_override {
        Some(list) => list
            .split(',')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(CurrencyPair::new)
            .collect(),
        None => config.data.pairs(),
    }
}

/// Pair for single-pair commands: CLI override, else the first configured pair
pub(crate) fn resolve_pair(config: &Config, pair_override: Option<&str>) -> Result<CurrencyPair> {
    match pair_override {
        Some(p) => Ok(CurrencyPair::new(p)),
        None => config
            .data
            .pairs()
            .into_iter()
            .next()
            .context("No pairs configured"),
    }
}

/// Load CSV candle data, or generate a synthetic series per pair
pub(crate) fn load_market_data(
    config: &Config,
    pairs: &[CurrencyPair],
    synthetic: bool,
    bars: usize,
    seed: Option<u64>,
) -> Result<MarketData> {
    let timeframe = config.timeframe()?;

    if synthetic {
        info!(
            "Generating synthetic data: {} bars of {} per pair",
            bars,
            timeframe.as_str()
        );
        let step = Duration::seconds(timeframe.seconds() as i64);
        let start = Utc::now() - step * bars as i32;
        let mut market = MarketData::new(timeframe);
        for (i, pair) in pairs.iter().enumerate() {
            // Offset the seed per pair so series differ but stay reproducible
            let pair_seed = seed.map(|s| s.wrapping_add(i as u64));
            market.insert(
                pair.clone(),
                synthetic_candles(pair, timeframe, start, bars, pair_seed),
            );
        }
        return Ok(market);
    }

    info!("Loading data from: {}", config.data.data_dir);
    data::load_multi_pair(&config.data.data_dir, pairs, timeframe)
}

/// Bars covering the given number of calendar days at the config timeframe
pub(crate) fn bars_for_days(config: &Config, days: u64) -> Result<usize> {
    let timeframe = config.timeframe()?;
    Ok(((days * 86_400) / timeframe.seconds().max(1)) as usize)
}

/// Serialize a report to pretty-printed JSON at the given path
pub(crate) fn write_json_report<T: serde::Serialize>(path: &Path, report: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Report written to: {}", path.display());
    Ok(())
}
