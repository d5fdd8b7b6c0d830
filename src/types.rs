//! Core data types used across the attribution engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Validation errors for candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    /// Create a candle without validation (for trusted sources or when validation is done separately)
    pub fn new_unchecked(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Validate the candle data
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        // Check for non-positive prices
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        // Check high >= low
        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        // Check volume >= 0
        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        // Check open is within [low, high] range
        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        // Check close is within [low, high] range
        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    /// Check if the candle is valid without returning detailed error
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// The four pairs used as the breadth universe for risk-sentiment scoring
pub const MAJOR_PAIRS: [&str; 4] = ["EURUSD", "GBPUSD", "USDJPY", "AUDUSD"];

/// Currency pair symbol using Arc<str> for cheap cloning
///
/// Pairs are cloned onto every trade, signal, and per-pair result bucket.
/// Using Arc<str> instead of String reduces heap allocations from O(n) to O(1) per clone.
/// Accepts "EURUSD" or "EUR/USD" and normalizes to the compact uppercase form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyPair(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl CurrencyPair {
    pub fn new(s: impl AsRef<str>) -> Self {
        let normalized: String = s
            .as_ref()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        CurrencyPair(std::sync::Arc::from(normalized.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base currency code (first leg), empty for malformed symbols
    pub fn base(&self) -> &str {
        self.0.get(0..3).unwrap_or("")
    }

    /// Quote currency code (second leg), empty for malformed symbols
    pub fn quote(&self) -> &str {
        self.0.get(3..6).unwrap_or("")
    }

    /// Pip size for this pair: 0.01 for JPY quotes, 0.0001 otherwise
    pub fn pip_size(&self) -> f64 {
        if self.quote() == "JPY" {
            0.01
        } else {
            0.0001
        }
    }

    pub fn is_major(&self) -> bool {
        MAJOR_PAIRS.contains(&self.as_str())
    }

    /// The major-pair universe as owned symbols
    pub fn majors() -> Vec<CurrencyPair> {
        MAJOR_PAIRS.iter().map(CurrencyPair::new).collect()
    }
}

impl std::fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bar interval for candle series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    /// Bar length in seconds
    pub fn seconds(&self) -> u64 {
        match self {
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }

    /// Number of bars spanning the given wall-clock hours, at least one
    pub fn bars_for_hours(&self, hours: u32) -> usize {
        ((hours as u64 * 3_600) / self.seconds()).max(1) as usize
    }
}

impl std::str::FromStr for Timeframe {
    type Err = ParseTimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            _ => Err(ParseTimeframeError(s.to_string())),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown timeframe '{0}', expected one of 15m, 30m, 1h, 4h, 1d")]
pub struct ParseTimeframeError(String);

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" | "LONG" => Ok(Side::Buy),
            "SELL" | "SHORT" => Ok(Side::Sell),
            _ => Err(format!("unknown trade direction '{s}'")),
        }
    }
}

/// Why a position was closed (or never opened)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Time,
    Manual,
    /// Forced close on the final candle of a backtest
    EndOfData,
    NoEntry,
}

/// Market regime classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    TrendingHighVol,
    TrendingLowVol,
    RangingHighVol,
    RangingLowVol,
    Transition,
    Uncertain,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::TrendingHighVol => "TRENDING_HIGH_VOL",
            MarketRegime::TrendingLowVol => "TRENDING_LOW_VOL",
            MarketRegime::RangingHighVol => "RANGING_HIGH_VOL",
            MarketRegime::RangingLowVol => "RANGING_LOW_VOL",
            MarketRegime::Transition => "TRANSITION",
            MarketRegime::Uncertain => "UNCERTAIN",
        }
    }

    pub fn is_trending(&self) -> bool {
        matches!(
            self,
            MarketRegime::TrendingHighVol | MarketRegime::TrendingLowVol
        )
    }

    pub fn is_high_vol(&self) -> bool {
        matches!(
            self,
            MarketRegime::TrendingHighVol | MarketRegime::RangingHighVol
        )
    }
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Broad risk appetite read from the major-pair universe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskSentiment {
    RiskOn,
    RiskOff,
    Neutral,
}

impl std::fmt::Display for RiskSentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskSentiment::RiskOn => "RISK_ON",
            RiskSentiment::RiskOff => "RISK_OFF",
            RiskSentiment::Neutral => "NEUTRAL",
        };
        write!(f, "{s}")
    }
}

/// Volatility band relative to the lookback baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityLevel {
    Low,
    Medium,
    High,
    Extreme,
}

impl VolatilityLevel {
    pub fn is_elevated(&self) -> bool {
        matches!(self, VolatilityLevel::High | VolatilityLevel::Extreme)
    }
}

impl std::fmt::Display for VolatilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VolatilityLevel::Low => "LOW",
            VolatilityLevel::Medium => "MEDIUM",
            VolatilityLevel::High => "HIGH",
            VolatilityLevel::Extreme => "EXTREME",
        };
        write!(f, "{s}")
    }
}

/// Outcome of one regime evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeDetectionResult {
    /// Evaluation time (latest candle gathered)
    pub timestamp: DateTime<Utc>,
    pub regime: MarketRegime,
    /// Composite confidence in [0, 1]
    pub confidence: f64,
    /// Signed trend strength in [-1, 1]; the sign carries direction,
    /// the magnitude mirrors the unsigned score used during synthesis
    pub trend_strength: f64,
    pub volatility_level: VolatilityLevel,
    pub risk_sentiment: RiskSentiment,
    pub regime_start_time: DateTime<Utc>,
    pub regime_duration_hours: i64,
    /// Raw sub-analysis scores that produced this classification
    pub contributing_factors: HashMap<String, f64>,
    pub next_evaluation: DateTime<Utc>,
}

/// Completed (or still open) trade record
///
/// Exit-side fields stay None until the position is closed; analyzers
/// operate on closed trades only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub pair: CurrencyPair,
    pub side: Side,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub position_size: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
    pub pnl_pips: Option<f64>,
    pub pnl_pct: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    /// Regime label stamped at entry, when detection was available
    pub regime: Option<MarketRegime>,
}

impl Trade {
    /// Open a new position; exit-side fields are filled by `close`
    pub fn open(
        pair: CurrencyPair,
        side: Side,
        entry_time: DateTime<Utc>,
        entry_price: f64,
        position_size: f64,
    ) -> Self {
        Self {
            pair,
            side,
            entry_time,
            entry_price,
            position_size,
            stop_loss: None,
            take_profit: None,
            exit_time: None,
            exit_price: None,
            pnl: None,
            pnl_pips: None,
            pnl_pct: None,
            exit_reason: None,
            regime: None,
        }
    }

    /// Close the position, deriving pnl, pips, and percentage return
    pub fn close(
        &mut self,
        exit_time: DateTime<Utc>,
        exit_price: f64,
        account_balance: f64,
        reason: ExitReason,
    ) {
        let price_move = match self.side {
            Side::Buy => exit_price - self.entry_price,
            Side::Sell => self.entry_price - exit_price,
        };
        let pnl = price_move * self.position_size;
        self.exit_time = Some(exit_time);
        self.exit_price = Some(exit_price);
        self.pnl = Some(pnl);
        self.pnl_pips = Some(price_move / self.pair.pip_size());
        self.pnl_pct = Some(if account_balance > 0.0 {
            pnl / account_balance
        } else {
            0.0
        });
        self.exit_reason = Some(reason);
    }

    pub fn is_closed(&self) -> bool {
        self.exit_time.is_some() && self.pnl.is_some()
    }

    /// Fractional return for series construction: pnl_pct when present,
    /// otherwise pnl scaled by the account balance, otherwise zero
    pub fn return_fraction(&self, account_balance: f64) -> f64 {
        if let Some(pct) = self.pnl_pct {
            return pct;
        }
        match self.pnl {
            Some(pnl) if account_balance > 0.0 => pnl / account_balance,
            _ => 0.0,
        }
    }

    /// Reward-to-risk ratio from stop/target distances; a zero-distance
    /// stop clamps the divisor to 1 instead of dividing by zero
    pub fn risk_reward_ratio(&self) -> Option<f64> {
        let stop = self.stop_loss?;
        let target = self.take_profit?;
        let risk = (self.entry_price - stop).abs();
        let reward = (target - self.entry_price).abs();
        let divisor = if risk > 0.0 { risk } else { 1.0 };
        Some(reward / divisor)
    }
}

/// Validation errors for proposed trade signals
#[derive(Debug, Error)]
pub enum SignalValidationError {
    #[error("prices must be positive: entry={entry}, stop={stop}, target={target}")]
    NonPositivePrice { entry: f64, stop: f64, target: f64 },

    #[error("{side} stop loss ({stop}) must be {relation} entry price ({entry})")]
    StopOnWrongSide {
        side: &'static str,
        relation: &'static str,
        stop: f64,
        entry: f64,
    },

    #[error("{side} take profit ({target}) must be {relation} entry price ({entry})")]
    TargetOnWrongSide {
        side: &'static str,
        relation: &'static str,
        target: f64,
        entry: f64,
    },
}

/// A proposed trade produced upstream, not yet executed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub timestamp: DateTime<Utc>,
    pub pair: CurrencyPair,
    pub direction: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Check that a signal's stop and target sit on the correct sides of entry.
///
/// A BUY needs stop < entry < target; a SELL needs target < entry < stop.
/// A stop equal to entry is rejected: it carries zero risk distance and
/// breaks position sizing downstream.
pub fn validate_signal_data(signal: &TradeSignal) -> Result<(), SignalValidationError> {
    if signal.entry_price <= 0.0 || signal.stop_loss <= 0.0 || signal.take_profit <= 0.0 {
        return Err(SignalValidationError::NonPositivePrice {
            entry: signal.entry_price,
            stop: signal.stop_loss,
            target: signal.take_profit,
        });
    }

    match signal.direction {
        Side::Buy => {
            if signal.stop_loss >= signal.entry_price {
                return Err(SignalValidationError::StopOnWrongSide {
                    side: "BUY",
                    relation: "below",
                    stop: signal.stop_loss,
                    entry: signal.entry_price,
                });
            }
            if signal.take_profit <= signal.entry_price {
                return Err(SignalValidationError::TargetOnWrongSide {
                    side: "BUY",
                    relation: "above",
                    target: signal.take_profit,
                    entry: signal.entry_price,
                });
            }
        }
        Side::Sell => {
            if signal.stop_loss <= signal.entry_price {
                return Err(SignalValidationError::StopOnWrongSide {
                    side: "SELL",
                    relation: "above",
                    stop: signal.stop_loss,
                    entry: signal.entry_price,
                });
            }
            if signal.take_profit >= signal.entry_price {
                return Err(SignalValidationError::TargetOnWrongSide {
                    side: "SELL",
                    relation: "below",
                    target: signal.take_profit,
                    entry: signal.entry_price,
                });
            }
        }
    }

    Ok(())
}

/// Portfolio statistics over a trade series
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    #[serde(deserialize_with = "null_as_infinity")]
    pub profit_factor: f64,
    pub trades_count: usize,
}

/// serde_json writes non-finite floats as null, and a loss-free series
/// carries an infinite profit factor; reading null back as +infinity keeps
/// serialized metrics round-trippable
fn null_as_infinity<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_candle_validation_rejects_inverted_range() {
        let candle = Candle::new_unchecked(ts(), 1.10, 1.09, 1.11, 1.10, 100.0);
        assert!(matches!(
            candle.validate(),
            Err(CandleValidationError::HighLessThanLow { .. })
        ));
    }

    #[test]
    fn test_candle_validation_accepts_good_bar() {
        assert!(Candle::new(ts(), 1.10, 1.12, 1.09, 1.11, 250.0).is_ok());
    }

    #[test]
    fn test_pair_decomposition() {
        let pair = CurrencyPair::new("eur/usd");
        assert_eq!(pair.as_str(), "EURUSD");
        assert_eq!(pair.base(), "EUR");
        assert_eq!(pair.quote(), "USD");
        assert_eq!(pair.pip_size(), 0.0001);
    }

    #[test]
    fn test_jpy_pip_size() {
        assert_eq!(CurrencyPair::new("USDJPY").pip_size(), 0.01);
    }

    #[test]
    fn test_timeframe_bar_math() {
        let tf: Timeframe = "4h".parse().unwrap();
        assert_eq!(tf, Timeframe::H4);
        assert_eq!(tf.bars_for_hours(800), 200);
        assert!("7h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_buy_signal_with_stop_at_entry_is_rejected() {
        let signal = TradeSignal {
            timestamp: ts(),
            pair: CurrencyPair::new("EURUSD"),
            direction: Side::Buy,
            entry_price: 1.1000,
            stop_loss: 1.1000,
            take_profit: 1.1100,
        };
        assert!(matches!(
            validate_signal_data(&signal),
            Err(SignalValidationError::StopOnWrongSide { .. })
        ));
    }

    #[test]
    fn test_sell_signal_validation() {
        let mut signal = TradeSignal {
            timestamp: ts(),
            pair: CurrencyPair::new("GBPUSD"),
            direction: Side::Sell,
            entry_price: 1.2500,
            stop_loss: 1.2550,
            take_profit: 1.2400,
        };
        assert!(validate_signal_data(&signal).is_ok());

        signal.take_profit = 1.2600;
        assert!(matches!(
            validate_signal_data(&signal),
            Err(SignalValidationError::TargetOnWrongSide { .. })
        ));
    }

    #[test]
    fn test_risk_reward_divisor_clamps_on_zero_risk() {
        let mut trade = Trade::open(CurrencyPair::new("EURUSD"), Side::Buy, ts(), 1.1000, 10_000.0);
        trade.stop_loss = Some(1.1000);
        trade.take_profit = Some(1.1050);
        let rr = trade.risk_reward_ratio().unwrap();
        assert!((rr - 0.005).abs() < 1e-12);
    }

    #[test]
    fn test_trade_close_fills_derived_fields() {
        let mut trade = Trade::open(CurrencyPair::new("EURUSD"), Side::Buy, ts(), 1.1000, 10_000.0);
        trade.close(ts() + chrono::Duration::hours(8), 1.1050, 10_000.0, ExitReason::TakeProfit);
        assert!(trade.is_closed());
        assert!((trade.pnl.unwrap() - 50.0).abs() < 1e-9);
        assert!((trade.pnl_pips.unwrap() - 50.0).abs() < 1e-9);
        assert!((trade.pnl_pct.unwrap() - 0.005).abs() < 1e-12);
    }

    #[test]
    fn test_return_fraction_prefers_pct() {
        let mut trade = Trade::open(CurrencyPair::new("EURUSD"), Side::Buy, ts(), 1.1, 10_000.0);
        trade.pnl = Some(500.0);
        trade.pnl_pct = Some(0.0123);
        assert_eq!(trade.return_fraction(10_000.0), 0.0123);

        trade.pnl_pct = None;
        assert!((trade.return_fraction(10_000.0) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_regime_serde_uses_wire_names() {
        let json = serde_json::to_string(&MarketRegime::TrendingHighVol).unwrap();
        assert_eq!(json, "\"TRENDING_HIGH_VOL\"");
        let back: MarketRegime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MarketRegime::TrendingHighVol);
    }
}
