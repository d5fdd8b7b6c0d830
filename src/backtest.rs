//! Backtest execution seam
//!
//! The walk-forward layer drives any engine implementing `BacktestEngine`.
//! `SmaCrossoverBacktester` is the reference implementation: SMA cross
//! entries, pip-priced stop/target exits, and a time stop, producing closed
//! trades with pip and fractional accounting filled in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::attribution::AnalysisPeriod;
use crate::config::StrategyParams;
use crate::data::{DataError, MarketData};
use crate::indicators;
use crate::metrics::metrics_for_trades;
use crate::types::{Candle, CurrencyPair, ExitReason, PerformanceMetrics, Side, Trade};

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("no candles for {pair} inside the requested period")]
    NoData { pair: CurrencyPair },

    #[error("invalid strategy parameters: {0}")]
    InvalidParameters(String),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Outcome of one backtest execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRun {
    pub parameters: StrategyParams,
    pub period: AnalysisPeriod,
    pub trades: Vec<Trade>,
    pub metrics: PerformanceMetrics,
}

/// Execution engine the walk-forward layer calls into.
///
/// `run` evaluates an explicit parameter set without touching the engine's
/// live parameters; only `set_parameters` changes what the engine trades
/// with.
pub trait BacktestEngine: Send + Sync {
    fn current_parameters(&self) -> StrategyParams;

    fn set_parameters(&mut self, params: StrategyParams);

    fn run(
        &self,
        market_data: &MarketData,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        params: &StrategyParams,
    ) -> Result<BacktestRun, BacktestError>;
}

/// Reference engine: enter on SMA fast/slow crosses, exit on a pip-priced
/// stop or target, a bar-count time stop, or end of data
pub struct SmaCrossoverBacktester {
    pair: CurrencyPair,
    account_balance: f64,
    params: StrategyParams,
}

impl SmaCrossoverBacktester {
    pub fn new(pair: CurrencyPair, account_balance: f64, params: StrategyParams) -> Self {
        Self {
            pair,
            account_balance,
            params,
        }
    }

    fn open_trade(&self, side: Side, candle: &Candle, params: &StrategyParams) -> Trade {
        let pip = self.pair.pip_size();
        let mut trade = Trade::open(
            self.pair.clone(),
            side,
            candle.datetime,
            candle.close,
            params.position_size,
        );
        match side {
            Side::Buy => {
                trade.stop_loss = Some(candle.close - params.stop_pips * pip);
                trade.take_profit = Some(candle.close + params.target_pips * pip);
            }
            Side::Sell => {
                trade.stop_loss = Some(candle.close + params.stop_pips * pip);
                trade.take_profit = Some(candle.close - params.target_pips * pip);
            }
        }
        trade
    }
}

impl BacktestEngine for SmaCrossoverBacktester {
    fn current_parameters(&self) -> StrategyParams {
        self.params.clone()
    }

    fn set_parameters(&mut self, params: StrategyParams) {
        self.params = params;
    }

    fn run(
        &self,
        market_data: &MarketData,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        params: &StrategyParams,
    ) -> Result<BacktestRun, BacktestError> {
        validate_params(params)?;

        let candles = market_data.candles_between(&self.pair, start, end);
        if candles.is_empty() {
            return Err(BacktestError::NoData {
                pair: self.pair.clone(),
            });
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let fast = indicators::sma(&closes, params.fast_period);
        let slow = indicators::sma(&closes, params.slow_period);

        let mut trades: Vec<Trade> = Vec::new();
        let mut open: Option<Trade> = None;
        let mut entry_bar = 0usize;

        for (i, candle) in candles.iter().enumerate().skip(1) {
            // Exits first so a fresh entry is never closed on its own bar
            if let Some(trade) = open.take() {
                match exit_for(&trade, candle, i - entry_bar, params) {
                    Some((price, reason)) => {
                        let mut closed = trade;
                        closed.close(candle.datetime, price, self.account_balance, reason);
                        debug!(
                            pair = %self.pair,
                            reason = ?reason,
                            pnl = closed.pnl.unwrap_or(0.0),
                            "position closed"
                        );
                        trades.push(closed);
                    }
                    None => open = Some(trade),
                }
            }

            if open.is_some() {
                continue;
            }
            let (Some(f_prev), Some(s_prev), Some(f_now), Some(s_now)) =
                (fast[i - 1], slow[i - 1], fast[i], slow[i])
            else {
                continue;
            };

            let side = if f_prev <= s_prev && f_now > s_now {
                Some(Side::Buy)
            } else if f_prev >= s_prev && f_now < s_now {
                Some(Side::Sell)
            } else {
                None
            };
            if let Some(side) = side {
                debug!(pair = %self.pair, side = ?side, price = candle.close, "cross entry");
                entry_bar = i;
                open = Some(self.open_trade(side, candle, params));
            }
        }

        if let Some(mut trade) = open.take() {
            let last = &candles[candles.len() - 1];
            trade.close(
                last.datetime,
                last.close,
                self.account_balance,
                ExitReason::EndOfData,
            );
            trades.push(trade);
        }

        let refs: Vec<&Trade> = trades.iter().collect();
        let metrics = metrics_for_trades(&refs, self.account_balance);
        Ok(BacktestRun {
            parameters: params.clone(),
            period: AnalysisPeriod { start, end },
            trades,
            metrics,
        })
    }
}

fn validate_params(params: &StrategyParams) -> Result<(), BacktestError> {
    if params.fast_period == 0 || params.slow_period == 0 {
        return Err(BacktestError::InvalidParameters(
            "SMA periods must be positive".to_string(),
        ));
    }
    if params.fast_period >= params.slow_period {
        return Err(BacktestError::InvalidParameters(format!(
            "fast period {} must be shorter than slow period {}",
            params.fast_period, params.slow_period
        )));
    }
    if params.stop_pips <= 0.0 || params.target_pips <= 0.0 {
        return Err(BacktestError::InvalidParameters(
            "stop and target distances must be positive pips".to_string(),
        ));
    }
    Ok(())
}

/// Stop checks beat target checks when both trigger inside one bar
fn exit_for(
    trade: &Trade,
    candle: &Candle,
    held_bars: usize,
    params: &StrategyParams,
) -> Option<(f64, ExitReason)> {
    match trade.side {
        Side::Buy => {
            if let Some(stop) = trade.stop_loss {
                if candle.low <= stop {
                    return Some((stop, ExitReason::StopLoss));
                }
            }
            if let Some(target) = trade.take_profit {
                if candle.high >= target {
                    return Some((target, ExitReason::TakeProfit));
                }
            }
        }
        Side::Sell => {
            if let Some(stop) = trade.stop_loss {
                if candle.high >= stop {
                    return Some((stop, ExitReason::StopLoss));
                }
            }
            if let Some(target) = trade.take_profit {
                if candle.low <= target {
                    return Some((target, ExitReason::TakeProfit));
                }
            }
        }
    }
    if held_bars >= params.max_hold_bars {
        return Some((candle.close, ExitReason::Time));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timeframe;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| {
                Candle::new_unchecked(
                    start() + Duration::hours(i as i64),
                    *close,
                    close + 0.0005,
                    close - 0.0005,
                    *close,
                    1_000.0,
                )
            })
            .collect()
    }

    fn market(closes: &[f64]) -> MarketData {
        let mut data = MarketData::new(Timeframe::H1);
        data.insert(CurrencyPair::new("EURUSD"), candles_from_closes(closes));
        data
    }

    fn test_params() -> StrategyParams {
        StrategyParams {
            fast_period: 3,
            slow_period: 5,
            stop_pips: 20.0,
            target_pips: 40.0,
            max_hold_bars: 50,
            position_size: 10_000.0,
        }
    }

    fn engine() -> SmaCrossoverBacktester {
        SmaCrossoverBacktester::new(CurrencyPair::new("EURUSD"), 10_000.0, test_params())
    }

    fn run_over(closes: &[f64], params: &StrategyParams) -> BacktestRun {
        let data = market(closes);
        engine()
            .run(
                &data,
                start(),
                start() + Duration::hours(closes.len() as i64),
                params,
            )
            .unwrap()
    }

    /// Decline then a steady climb: SMA3 crosses above SMA5 and the target hits
    #[test]
    fn test_golden_cross_rides_to_target() {
        let mut closes: Vec<f64> = (0..10).map(|i| 1.1050 - i as f64 * 0.0005).collect();
        closes.extend((1..=20).map(|i| 1.1005 + i as f64 * 0.0020));

        let run = run_over(&closes, &test_params());
        assert!(!run.trades.is_empty());
        let first = &run.trades[0];
        assert_eq!(first.side, Side::Buy);
        assert_eq!(first.exit_reason, Some(ExitReason::TakeProfit));
        assert_relative_eq!(first.pnl_pips.unwrap(), 40.0, epsilon = 1e-6);
        assert!(first.pnl.unwrap() > 0.0);
    }

    /// Brief climb then a plunge: long entry stopped out at the stop price
    #[test]
    fn test_collapse_hits_stop() {
        let mut closes: Vec<f64> = (0..10).map(|i| 1.1050 - i as f64 * 0.0005).collect();
        closes.extend((1..=3).map(|i| 1.1005 + i as f64 * 0.0020));
        closes.extend((1..=10).map(|i| 1.1065 - i as f64 * 0.0030));

        let run = run_over(&closes, &test_params());
        let stopped = run
            .trades
            .iter()
            .find(|t| t.exit_reason == Some(ExitReason::StopLoss))
            .expect("plunge must stop out the long");
        assert_eq!(stopped.side, Side::Buy);
        assert_relative_eq!(stopped.pnl_pips.unwrap(), -20.0, epsilon = 1e-6);
        assert!(stopped.pnl.unwrap() < 0.0);
    }

    #[test]
    fn test_time_stop_closes_stagnant_position() {
        let mut params = test_params();
        params.max_hold_bars = 3;
        params.stop_pips = 500.0;
        params.target_pips = 1_000.0;

        let mut closes: Vec<f64> = (0..10).map(|i| 1.1050 - i as f64 * 0.0005).collect();
        closes.extend((1..=15).map(|i| 1.1005 + i as f64 * 0.0003));

        let run = run_over(&closes, &params);
        let timed = run
            .trades
            .iter()
            .find(|t| t.exit_reason == Some(ExitReason::Time))
            .expect("time stop must fire before the data ends");
        let held = timed.exit_time.unwrap() - timed.entry_time;
        assert_eq!(held, Duration::hours(3));
    }

    #[test]
    fn test_open_position_closed_at_end_of_data() {
        let mut params = test_params();
        params.stop_pips = 500.0;
        params.target_pips = 1_000.0;

        let mut closes: Vec<f64> = (0..10).map(|i| 1.1050 - i as f64 * 0.0005).collect();
        closes.extend((1..=8).map(|i| 1.1005 + i as f64 * 0.0010));

        let run = run_over(&closes, &params);
        assert_eq!(run.trades.len(), 1);
        assert_eq!(run.trades[0].exit_reason, Some(ExitReason::EndOfData));
        assert_eq!(run.metrics.trades_count, 1);
    }

    #[test]
    fn test_inverted_sma_periods_are_rejected() {
        let mut params = test_params();
        params.fast_period = 10;
        params.slow_period = 5;

        let closes: Vec<f64> = (0..30).map(|i| 1.10 + i as f64 * 0.0001).collect();
        let data = market(&closes);
        let result = engine().run(
            &data,
            start(),
            start() + Duration::hours(30),
            &params,
        );
        assert!(matches!(
            result,
            Err(BacktestError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_empty_period_is_no_data() {
        let closes: Vec<f64> = (0..30).map(|i| 1.10 + i as f64 * 0.0001).collect();
        let data = market(&closes);
        let result = engine().run(
            &data,
            start() + Duration::days(365),
            start() + Duration::days(366),
            &test_params(),
        );
        assert!(matches!(result, Err(BacktestError::NoData { .. })));
    }

    #[test]
    fn test_run_ignores_live_parameters() {
        let mut engine = engine();
        let mut tightened = test_params();
        tightened.stop_pips = 10.0;

        let closes: Vec<f64> = (0..40).map(|i| 1.10 + i as f64 * 0.0001).collect();
        let data = market(&closes);
        let run = engine
            .run(&data, start(), start() + Duration::hours(40), &tightened)
            .unwrap();
        assert_eq!(run.parameters.stop_pips, 10.0);
        assert_eq!(engine.current_parameters().stop_pips, 20.0);

        engine.set_parameters(tightened.clone());
        assert_eq!(engine.current_parameters(), tightened);
    }
}
