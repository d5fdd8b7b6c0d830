//! Data loading and management
//!
//! Handles loading OHLCV candles and executed-trade records from CSV files,
//! the in-memory market data store the analyzers query, and a synthetic
//! random-walk generator for running without historical files.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::types::{Candle, CurrencyPair, ExitReason, Side, Timeframe, Trade};

/// Errors raised by candle sources
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no candle data for {0}")]
    MissingPair(String),

    #[error("candle series for {0} is empty")]
    EmptySeries(String),

    #[error("source holds {actual} data but {requested} was requested")]
    TimeframeMismatch {
        actual: Timeframe,
        requested: Timeframe,
    },
}

/// Read-only access to recent candle history, the seam between the regime
/// detector and whatever feeds it
pub trait CandleSource: Send + Sync {
    /// Most recent `bars` candles for the pair, oldest first
    fn recent_candles(
        &self,
        pair: &CurrencyPair,
        timeframe: Timeframe,
        bars: usize,
    ) -> Result<Vec<Candle>, DataError>;
}

// =============================================================================
// In-memory market data store
// =============================================================================

/// Per-pair candle series, sorted by timestamp, all on one timeframe
#[derive(Debug, Clone)]
pub struct MarketData {
    timeframe: Timeframe,
    series: HashMap<CurrencyPair, Vec<Candle>>,
}

impl MarketData {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            series: HashMap::new(),
        }
    }

    pub fn from_series(
        timeframe: Timeframe,
        series: HashMap<CurrencyPair, Vec<Candle>>,
    ) -> Self {
        let mut data = Self { timeframe, series };
        for candles in data.series.values_mut() {
            candles.sort_by_key(|c| c.datetime);
        }
        data
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn insert(&mut self, pair: CurrencyPair, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.datetime);
        self.series.insert(pair, candles);
    }

    pub fn pairs(&self) -> impl Iterator<Item = &CurrencyPair> {
        self.series.keys()
    }

    pub fn get(&self, pair: &CurrencyPair) -> Option<&[Candle]> {
        self.series.get(pair).map(|v| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(|v| v.is_empty())
    }

    /// Last `bars` candles with timestamps at or before `at`, oldest first
    pub fn window_ending_at(
        &self,
        pair: &CurrencyPair,
        at: DateTime<Utc>,
        bars: usize,
    ) -> Option<&[Candle]> {
        let candles = self.series.get(pair)?;
        let end = candles.partition_point(|c| c.datetime <= at);
        if end == 0 {
            return None;
        }
        let start = end.saturating_sub(bars);
        Some(&candles[start..end])
    }

    /// Candles with timestamps inside [start, end]
    pub fn candles_between(
        &self,
        pair: &CurrencyPair,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> &[Candle] {
        let Some(candles) = self.series.get(pair) else {
            return &[];
        };
        let lo = candles.partition_point(|c| c.datetime < start);
        let hi = candles.partition_point(|c| c.datetime <= end);
        &candles[lo..hi]
    }

    /// Earliest and latest timestamp across all pairs
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let mut span: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
        for candles in self.series.values() {
            let (Some(first), Some(last)) = (candles.first(), candles.last()) else {
                continue;
            };
            span = Some(match span {
                None => (first.datetime, last.datetime),
                Some((lo, hi)) => (lo.min(first.datetime), hi.max(last.datetime)),
            });
        }
        span
    }
}

impl CandleSource for MarketData {
    fn recent_candles(
        &self,
        pair: &CurrencyPair,
        timeframe: Timeframe,
        bars: usize,
    ) -> Result<Vec<Candle>, DataError> {
        if timeframe != self.timeframe {
            return Err(DataError::TimeframeMismatch {
                actual: self.timeframe,
                requested: timeframe,
            });
        }
        let candles = self
            .series
            .get(pair)
            .ok_or_else(|| DataError::MissingPair(pair.to_string()))?;
        if candles.is_empty() {
            return Err(DataError::EmptySeries(pair.to_string()));
        }
        let start = candles.len().saturating_sub(bars);
        Ok(candles[start..].to_vec())
    }
}

// =============================================================================
// CSV loading
// =============================================================================

/// Load OHLCV data from CSV file
/// Expected columns: datetime, open, high, low, close, volume
pub fn load_candles_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let file = std::fs::File::open(path.as_ref())
        .with_context(|| format!("Failed to open CSV file {}", path.as_ref().display()))?;
    parse_candles_csv(file)
}

/// Parse OHLCV rows from any reader (exposed for in-memory tests)
pub fn parse_candles_csv<R: Read>(reader: R) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let datetime = parse_timestamp(dt_str)
            .context(format!("Failed to parse datetime: {}", dt_str))?;

        let open: f64 = record
            .get(1)
            .context("Missing open column")?
            .parse()
            .context("Failed to parse open")?;
        let high: f64 = record
            .get(2)
            .context("Missing high column")?
            .parse()
            .context("Failed to parse high")?;
        let low: f64 = record
            .get(3)
            .context("Missing low column")?
            .parse()
            .context("Failed to parse low")?;
        let close: f64 = record
            .get(4)
            .context("Missing close column")?
            .parse()
            .context("Failed to parse close")?;
        let volume: f64 = record
            .get(5)
            .context("Missing volume column")?
            .parse()
            .context("Failed to parse volume")?;

        candles.push(Candle {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    candles.sort_by_key(|c| c.datetime);
    Ok(candles)
}

/// Load candle data for multiple pairs from `<pair>_<timeframe>.csv` files
pub fn load_multi_pair(
    data_dir: impl AsRef<Path>,
    pairs: &[CurrencyPair],
    timeframe: Timeframe,
) -> Result<MarketData> {
    let mut data = MarketData::new(timeframe);

    for pair in pairs {
        let filename = format!("{}_{}.csv", pair.as_str(), timeframe.as_str());
        let path = data_dir.as_ref().join(&filename);

        if !path.exists() {
            warn!("Data file not found: {}", path.display());
            continue;
        }

        let candles =
            load_candles_csv(&path).context(format!("Failed to load data for {}", pair))?;

        info!("Loaded {} candles for {}", candles.len(), pair);
        data.insert(pair.clone(), candles);
    }

    if data.is_empty() {
        anyhow::bail!("No data loaded for any pair");
    }

    Ok(data)
}

/// Load executed trades from a CSV export.
///
/// Required columns: entry_time, pair, direction, entry_price, position_size.
/// Recognized optional columns: exit_time, exit_price, pnl, pnl_pips,
/// pnl_pct, stop_loss, take_profit, exit_reason. Absent optionals load as
/// None so partially-populated exports still analyze.
pub fn load_trades_csv(path: impl AsRef<Path>) -> Result<Vec<Trade>> {
    let file = std::fs::File::open(path.as_ref())
        .with_context(|| format!("Failed to open trades file {}", path.as_ref().display()))?;
    parse_trades_csv(file)
}

/// Parse trade rows from any reader (exposed for in-memory tests)
pub fn parse_trades_csv<R: Read>(reader: R) -> Result<Vec<Trade>> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers().context("Failed to read trade headers")?;
    let col: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
        .collect();

    let required = |name: &str| -> Result<usize> {
        col.get(name)
            .copied()
            .with_context(|| format!("Missing required column '{name}'"))
    };
    let entry_time_idx = required("entry_time")?;
    let pair_idx = required("pair")?;
    let direction_idx = required("direction")?;
    let entry_price_idx = required("entry_price")?;
    let size_idx = required("position_size")?;

    let opt_f64 = |record: &csv::StringRecord, name: &str| -> Option<f64> {
        col.get(name)
            .and_then(|&i| record.get(i))
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| s.trim().parse().ok())
    };

    let mut trades = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read trade row {}", row_idx + 1))?;

        let entry_time = parse_timestamp(
            record
                .get(entry_time_idx)
                .context("Missing entry_time value")?,
        )
        .context(format!("Bad entry_time in row {}", row_idx + 1))?;
        let pair = CurrencyPair::new(record.get(pair_idx).context("Missing pair value")?);
        let side: Side = record
            .get(direction_idx)
            .context("Missing direction value")?
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .context(format!("Bad direction in row {}", row_idx + 1))?;
        let entry_price: f64 = record
            .get(entry_price_idx)
            .context("Missing entry_price value")?
            .trim()
            .parse()
            .context(format!("Bad entry_price in row {}", row_idx + 1))?;
        let position_size: f64 = record
            .get(size_idx)
            .context("Missing position_size value")?
            .trim()
            .parse()
            .context(format!("Bad position_size in row {}", row_idx + 1))?;

        let exit_time = col
            .get("exit_time")
            .and_then(|&i| record.get(i))
            .filter(|s| !s.trim().is_empty())
            .map(parse_timestamp)
            .transpose()
            .context(format!("Bad exit_time in row {}", row_idx + 1))?;
        let exit_reason = col
            .get("exit_reason")
            .and_then(|&i| record.get(i))
            .filter(|s| !s.trim().is_empty())
            .and_then(parse_exit_reason);

        trades.push(Trade {
            pair,
            side,
            entry_time,
            entry_price,
            position_size,
            stop_loss: opt_f64(&record, "stop_loss"),
            take_profit: opt_f64(&record, "take_profit"),
            exit_time,
            exit_price: opt_f64(&record, "exit_price"),
            pnl: opt_f64(&record, "pnl"),
            pnl_pips: opt_f64(&record, "pnl_pips"),
            pnl_pct: opt_f64(&record, "pnl_pct"),
            exit_reason,
            regime: None,
        });
    }

    trades.sort_by_key(|t| t.entry_time);
    Ok(trades)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Try parsing without timezone and assume UTC
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|nd| {
                DateTime::<Utc>::from_naive_utc_and_offset(
                    nd.and_hms_opt(0, 0, 0).unwrap_or_default(),
                    Utc,
                )
            })
        })
        .map_err(|e| anyhow::anyhow!("unparseable timestamp '{s}': {e}"))
}

fn parse_exit_reason(s: &str) -> Option<ExitReason> {
    match s.trim().to_ascii_uppercase().as_str() {
        "TAKE_PROFIT" | "TP" => Some(ExitReason::TakeProfit),
        "STOP_LOSS" | "SL" => Some(ExitReason::StopLoss),
        "TIME" => Some(ExitReason::Time),
        "MANUAL" => Some(ExitReason::Manual),
        "END_OF_DATA" => Some(ExitReason::EndOfData),
        "NO_ENTRY" => Some(ExitReason::NoEntry),
        _ => None,
    }
}

// =============================================================================
// Synthetic data
// =============================================================================

/// Generate a random-walk candle series for running without historical files.
///
/// Unseeded calls draw from OS entropy, so repeated runs differ; pass a seed
/// for reproducible series in tests.
pub fn synthetic_candles(
    pair: &CurrencyPair,
    timeframe: Timeframe,
    start: DateTime<Utc>,
    bars: usize,
    seed: Option<u64>,
) -> Vec<Candle> {
    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    let pip = pair.pip_size();
    let mut price = if pair.quote() == "JPY" { 150.0 } else { 1.10 };
    let step = chrono::Duration::seconds(timeframe.seconds() as i64);
    let mut candles = Vec::with_capacity(bars);
    let mut datetime = start;

    for _ in 0..bars {
        let drift: f64 = rng.gen_range(-1.0..1.0);
        let noise: f64 = rng.gen_range(0.2..1.5);
        let open = price;
        let close = open + drift * 15.0 * pip;
        let high = open.max(close) + noise * 8.0 * pip;
        let low = open.min(close) - noise * 8.0 * pip;
        let volume = rng.gen_range(500.0..5_000.0);

        candles.push(Candle::new_unchecked(datetime, open, high, low, close, volume));
        price = close;
        datetime += step;
    }

    candles
}
