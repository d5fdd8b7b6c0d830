//! Performance metrics
//!
//! Builds `PerformanceMetrics` from a fractional return series or a trade
//! list. Returns compound multiplicatively; ratios annualize with the 252
//! trading-day convention.

use statrs::statistics::Statistics;

use crate::types::{PerformanceMetrics, Trade};

/// Trading periods per year used for annualization
pub const PERIODS_PER_YEAR: f64 = 252.0;

/// Compute metrics from a per-trade fractional return series.
///
/// An empty series yields zeroed metrics. Degenerate deviations (constant
/// series, single element) zero the affected ratios rather than propagating
/// NaN.
pub fn compute_metrics(returns: &[f64]) -> PerformanceMetrics {
    if returns.is_empty() {
        return PerformanceMetrics::default();
    }

    let total_return = returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;
    let annualized_return =
        (1.0 + total_return).powf(PERIODS_PER_YEAR / returns.len() as f64) - 1.0;

    let mean_return = (&returns[..]).mean();
    let std_return = if returns.len() >= 2 {
        let sd = (&returns[..]).std_dev();
        if sd.is_finite() {
            sd
        } else {
            0.0
        }
    } else {
        0.0
    };

    let volatility = std_return * PERIODS_PER_YEAR.sqrt();
    let sharpe_ratio = if std_return > 0.0 {
        mean_return / std_return * PERIODS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    // Downside deviation over losing periods only
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_dev = if downside.len() >= 2 {
        let sd = (&downside[..]).std_dev();
        if sd.is_finite() {
            sd
        } else {
            0.0
        }
    } else {
        0.0
    };
    let sortino_ratio = if downside_dev > 0.0 {
        mean_return / downside_dev * PERIODS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let max_drawdown = max_drawdown(returns);
    let calmar_ratio = if max_drawdown > 0.0 {
        annualized_return / max_drawdown
    } else {
        0.0
    };

    let winners = returns.iter().filter(|r| **r > 0.0).count();
    let win_rate = winners as f64 / returns.len() as f64;

    let gross_profit: f64 = returns.iter().filter(|r| **r > 0.0).sum();
    let gross_loss: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r.abs()).sum();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    PerformanceMetrics {
        total_return,
        annualized_return,
        volatility,
        sharpe_ratio,
        sortino_ratio,
        calmar_ratio,
        max_drawdown,
        win_rate,
        profit_factor,
        trades_count: returns.len(),
    }
}

/// Worst peak-to-trough decline of the compounded curve, as a positive fraction
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut equity = 1.0;
    let mut peak = 1.0;
    let mut max_dd = 0.0;

    for r in returns {
        equity *= 1.0 + r;
        if equity > peak {
            peak = equity;
        }
        let dd = (peak - equity) / peak;
        if dd > max_dd {
            max_dd = dd;
        }
    }

    max_dd
}

/// Metrics over closed trades, scaling absolute pnl by the account balance
/// where a trade carries no fractional return of its own
pub fn metrics_for_trades(trades: &[&Trade], account_balance: f64) -> PerformanceMetrics {
    let returns: Vec<f64> = trades
        .iter()
        .filter(|t| t.is_closed())
        .map(|t| t.return_fraction(account_balance))
        .collect();
    compute_metrics(&returns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CurrencyPair, ExitReason, Side};
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_total_return_compounds() {
        let metrics = compute_metrics(&[0.01, -0.02, 0.015]);
        assert_relative_eq!(
            metrics.total_return,
            1.01 * 0.98 * 1.015 - 1.0,
            epsilon = 1e-12
        );
        assert_eq!(metrics.trades_count, 3);
    }

    #[test]
    fn test_empty_series_is_zeroed() {
        let metrics = compute_metrics(&[]);
        assert_eq!(metrics.trades_count, 0);
        assert_eq!(metrics.total_return, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_constant_series_has_zero_sharpe() {
        let metrics = compute_metrics(&[0.01, 0.01, 0.01]);
        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert_eq!(metrics.win_rate, 1.0);
    }

    #[test]
    fn test_profit_factor_infinite_without_losses() {
        let metrics = compute_metrics(&[0.01, 0.02]);
        assert!(metrics.profit_factor.is_infinite());
        assert_eq!(metrics.sortino_ratio, 0.0);
    }

    #[test]
    fn test_max_drawdown_running_peak() {
        // Curve: 1.10, 0.99, 1.0395; worst decline from the 1.10 peak
        let dd = max_drawdown(&[0.10, -0.10, 0.05]);
        assert_relative_eq!(dd, 0.10, epsilon = 1e-12);
    }

    #[test]
    fn test_win_rate_is_fractional() {
        let metrics = compute_metrics(&[0.01, -0.01, 0.01, -0.01]);
        assert_relative_eq!(metrics.win_rate, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_metrics_for_trades_uses_return_fraction() {
        let start = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        let mut trades = Vec::new();
        for (i, pnl) in [100.0_f64, -50.0].iter().enumerate() {
            let mut t = crate::types::Trade::open(
                CurrencyPair::new("EURUSD"),
                Side::Buy,
                start + Duration::hours(i as i64),
                1.10,
                10_000.0,
            );
            t.exit_time = Some(start + Duration::hours(i as i64 + 4));
            t.exit_price = Some(1.10 + pnl / 10_000.0);
            t.pnl = Some(*pnl);
            t.exit_reason = Some(ExitReason::Time);
            trades.push(t);
        }
        let refs: Vec<&crate::types::Trade> = trades.iter().collect();
        let metrics = metrics_for_trades(&refs, 10_000.0);
        assert_eq!(metrics.trades_count, 2);
        assert_relative_eq!(metrics.win_rate, 0.5, epsilon = 1e-12);
        assert_relative_eq!(
            metrics.total_return,
            1.01 * 0.995 - 1.0,
            epsilon = 1e-12
        );
    }
}
