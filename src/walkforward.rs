//! Walk-forward analysis
//!
//! `SwingBacktestEngine` slides a training/testing window pair through the
//! data, optionally grid-searching parameters per detected regime inside
//! each training window. Winning parameter sets are recorded and logged but
//! never applied; every out-of-sample run uses whatever parameters the
//! execution engine currently holds.

use chrono::{DateTime, Months, Utc};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::attribution::regime_perf::classify_local_regime;
use crate::attribution::AnalysisPeriod;
use crate::backtest::{BacktestEngine, BacktestError, BacktestRun};
use crate::config::Config;
use crate::data::MarketData;
use crate::optimizer::{
    best_candidate, evaluate_candidates, parameter_grid, OptimizationResult,
};
use crate::types::{CurrencyPair, MarketRegime, PerformanceMetrics};

/// Contiguous stretch of bars sharing one regime label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimePeriod {
    pub regime: MarketRegime,
    pub period: AnalysisPeriod,
    pub bars: usize,
}

/// One training/testing step of the walk-forward
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardPeriod {
    pub training_period: AnalysisPeriod,
    pub testing_period: AnalysisPeriod,
    /// Per-regime grid winners found in the training window; recorded only
    pub optimizations: Vec<OptimizationResult>,
    pub out_of_sample: PerformanceMetrics,
    pub out_of_sample_pnl: f64,
}

/// Aggregation of all out-of-sample periods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub periods: Vec<WalkForwardPeriod>,
    pub combined: PerformanceMetrics,
    pub total_pnl: f64,
    /// Fraction of out-of-sample periods that ended profitable
    pub consistency_score: f64,
}

pub struct SwingBacktestEngine {
    engine: Box<dyn BacktestEngine>,
    market_data: MarketData,
    pair: CurrencyPair,
    config: Config,
}

impl SwingBacktestEngine {
    pub fn new(
        engine: Box<dyn BacktestEngine>,
        market_data: MarketData,
        pair: CurrencyPair,
        config: Config,
    ) -> Self {
        Self {
            engine,
            market_data,
            pair,
            config,
        }
    }

    pub fn market_data(&self) -> &MarketData {
        &self.market_data
    }

    /// One backtest over [start, end] (defaulting to the data span) with the
    /// engine's current parameters
    pub fn run_simple_backtest(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<BacktestRun, BacktestError> {
        let (span_start, span_end) = self.market_data.span().ok_or(BacktestError::NoData {
            pair: self.pair.clone(),
        })?;
        let params = self.engine.current_parameters();
        self.engine.run(
            &self.market_data,
            start.unwrap_or(span_start),
            end.unwrap_or(span_end),
            &params,
        )
    }

    /// Label every bar in [start, end] with its local regime and collapse
    /// runs of equal labels into contiguous periods
    pub fn segment_regimes(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<RegimePeriod> {
        let candles = self.market_data.candles_between(&self.pair, start, end);
        let window = self.config.regime_performance.window;
        if candles.len() < window {
            return Vec::new();
        }

        let mut segments: Vec<RegimePeriod> = Vec::new();
        for i in (window - 1)..candles.len() {
            let regime =
                classify_local_regime(&candles[i + 1 - window..=i], &self.config.regime_performance);
            let ts = candles[i].datetime;
            match segments.last_mut() {
                Some(last) if last.regime == regime => {
                    last.period.end = ts;
                    last.bars += 1;
                }
                _ => segments.push(RegimePeriod {
                    regime,
                    period: AnalysisPeriod { start: ts, end: ts },
                    bars: 1,
                }),
            }
        }
        segments
    }

    /// Grid-search the training range per detected regime. The winner for
    /// each regime is returned and logged; the engine's live parameters are
    /// left untouched.
    pub fn optimize_strategy_by_regime(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        axes: &HashMap<String, Vec<f64>>,
    ) -> Vec<OptimizationResult> {
        self.optimize_by_regime_inner(start, end, axes, None)
    }

    /// Same search with a shared progress bar ticking per candidate run
    pub fn optimize_by_regime_with_progress(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        axes: &HashMap<String, Vec<f64>>,
        progress: &ProgressBar,
    ) -> Vec<OptimizationResult> {
        self.optimize_by_regime_inner(start, end, axes, Some(progress))
    }

    fn optimize_by_regime_inner(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        axes: &HashMap<String, Vec<f64>>,
        progress: Option<&ProgressBar>,
    ) -> Vec<OptimizationResult> {
        let window = self.config.regime_performance.window;
        let segments = self.segment_regimes(start, end);

        // Longest stretch per regime carries the most representative sample
        let mut longest: HashMap<MarketRegime, &RegimePeriod> = HashMap::new();
        for segment in &segments {
            match longest.get(&segment.regime) {
                Some(existing) if existing.bars >= segment.bars => {}
                _ => {
                    longest.insert(segment.regime, segment);
                }
            }
        }

        let base = self.engine.current_parameters();
        let candidates =
            parameter_grid(&base, axes, self.config.walk_forward.max_combinations);

        let mut results = Vec::new();
        for (regime, segment) in longest {
            if segment.bars < 2 * window {
                continue;
            }
            let scored = evaluate_candidates(
                self.engine.as_ref(),
                &self.market_data,
                segment.period,
                &candidates,
                progress,
            );
            if let Some(best) = best_candidate(scored) {
                info!(
                    regime = regime.as_str(),
                    score = best.score,
                    params = ?best.parameters,
                    "recorded best parameters for regime"
                );
                results.push(OptimizationResult {
                    regime,
                    best_parameters: best.parameters,
                    performance_metrics: best.metrics,
                    training_period: segment.period,
                    validation_score: best.score,
                });
            }
        }
        results.sort_by_key(|r| r.regime.as_str());
        results
    }

    /// Training/testing window pairs stepped through [start, end]; generation
    /// stops once a full training+testing span no longer fits
    pub fn walk_forward_periods(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<(AnalysisPeriod, AnalysisPeriod)> {
        let wf = &self.config.walk_forward;
        let training = Months::new(wf.training_months.max(0) as u32);
        let testing = Months::new(wf.testing_months.max(0) as u32);
        let step = Months::new(wf.step_months.max(1) as u32);

        let mut periods = Vec::new();
        let mut current = start;
        loop {
            let Some(train_end) = current.checked_add_months(training) else {
                break;
            };
            let Some(test_end) = train_end.checked_add_months(testing) else {
                break;
            };
            if test_end > end {
                break;
            }
            periods.push((
                AnalysisPeriod {
                    start: current,
                    end: train_end,
                },
                AnalysisPeriod {
                    start: train_end,
                    end: test_end,
                },
            ));
            match current.checked_add_months(step) {
                Some(next) => current = next,
                None => break,
            }
        }
        periods
    }

    /// Slide training/testing windows through the data. Each training window
    /// is optimized per regime when the config carries grid axes; each
    /// testing window runs out-of-sample with the engine's current
    /// parameters.
    pub fn run_walk_forward_analysis(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<WalkForwardResult, BacktestError> {
        let (span_start, span_end) = self.market_data.span().ok_or(BacktestError::NoData {
            pair: self.pair.clone(),
        })?;
        let start = start.unwrap_or(span_start);
        let end = end.unwrap_or(span_end);

        let periods = self.walk_forward_periods(start, end);
        if periods.is_empty() {
            warn!(%start, %end, "range too short for a single walk-forward step");
        }

        let mut period_results = Vec::new();
        for (training, testing) in periods {
            let optimizations = match &self.config.grid {
                Some(axes) if !axes.is_empty() => {
                    self.optimize_strategy_by_regime(training.start, training.end, axes)
                }
                _ => Vec::new(),
            };

            let params = self.engine.current_parameters();
            match self
                .engine
                .run(&self.market_data, testing.start, testing.end, &params)
            {
                Ok(run) => {
                    let pnl: f64 = run.trades.iter().filter_map(|t| t.pnl).sum();
                    info!(
                        start = %testing.start,
                        end = %testing.end,
                        trades = run.metrics.trades_count,
                        pnl,
                        "out-of-sample period complete"
                    );
                    period_results.push(WalkForwardPeriod {
                        training_period: training,
                        testing_period: testing,
                        optimizations,
                        out_of_sample: run.metrics,
                        out_of_sample_pnl: pnl,
                    });
                }
                Err(BacktestError::NoData { .. }) => {
                    warn!(
                        start = %testing.start,
                        end = %testing.end,
                        "no data in testing window; period skipped"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let (combined, total_pnl, consistency_score) = combine_out_of_sample(&period_results);
        Ok(WalkForwardResult {
            periods: period_results,
            combined,
            total_pnl,
            consistency_score,
        })
    }
}

/// PnL sums, return/Sharpe/win-rate averages, worst-case drawdown, and the
/// profitable fraction across out-of-sample periods
fn combine_out_of_sample(periods: &[WalkForwardPeriod]) -> (PerformanceMetrics, f64, f64) {
    if periods.is_empty() {
        return (PerformanceMetrics::default(), 0.0, 0.0);
    }

    let n = periods.len() as f64;
    let avg = |pick: fn(&PerformanceMetrics) -> f64| -> f64 {
        periods.iter().map(|p| pick(&p.out_of_sample)).sum::<f64>() / n
    };

    let combined = PerformanceMetrics {
        total_return: avg(|m| m.total_return),
        annualized_return: avg(|m| m.annualized_return),
        volatility: avg(|m| m.volatility),
        sharpe_ratio: avg(|m| m.sharpe_ratio),
        sortino_ratio: avg(|m| m.sortino_ratio),
        calmar_ratio: avg(|m| m.calmar_ratio),
        max_drawdown: periods
            .iter()
            .map(|p| p.out_of_sample.max_drawdown)
            .fold(0.0, f64::max),
        win_rate: avg(|m| m.win_rate),
        profit_factor: avg(|m| m.profit_factor),
        trades_count: periods.iter().map(|p| p.out_of_sample.trades_count).sum(),
    };

    let total_pnl: f64 = periods.iter().map(|p| p.out_of_sample_pnl).sum();
    let profitable = periods.iter().filter(|p| p.out_of_sample_pnl > 0.0).count();
    (combined, total_pnl, profitable as f64 / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::SmaCrossoverBacktester;
    use crate::config::StrategyParams;
    use crate::data::synthetic_candles;
    use crate::types::{Candle, Timeframe};
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn swing_engine(market_data: MarketData, config: Config) -> SwingBacktestEngine {
        let pair = CurrencyPair::new("EURUSD");
        let engine = SmaCrossoverBacktester::new(pair.clone(), 10_000.0, StrategyParams::default());
        SwingBacktestEngine::new(Box::new(engine), market_data, pair, config)
    }

    fn synthetic_market(bars: usize) -> MarketData {
        let pair = CurrencyPair::new("EURUSD");
        let candles = synthetic_candles(&pair, Timeframe::H4, start(), bars, Some(11));
        let mut data = MarketData::new(Timeframe::H4);
        data.insert(pair, candles);
        data
    }

    #[test]
    fn test_walk_forward_period_generation() {
        let engine = swing_engine(synthetic_market(10), Config::default());
        let end = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        let periods = engine.walk_forward_periods(start(), end);

        // Jan..=May starts fit a 6+1 month span inside 2024
        assert_eq!(periods.len(), 5);
        let (training, testing) = &periods[0];
        assert_eq!(training.start, start());
        assert_eq!(training.end, Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap());
        assert_eq!(testing.start, training.end);
        assert_eq!(testing.end, Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_short_range_yields_no_periods() {
        let engine = swing_engine(synthetic_market(10), Config::default());
        let end = start() + Duration::days(90);
        assert!(engine.walk_forward_periods(start(), end).is_empty());
    }

    #[test]
    fn test_segment_regimes_partitions_the_range() {
        // 60 trending bars then 60 quiet bars, hourly
        let pair = CurrencyPair::new("EURUSD");
        let mut candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 1.1000 + i as f64 * 0.0006;
                Candle::new_unchecked(
                    start() + Duration::hours(i as i64),
                    base,
                    base + 0.0003,
                    base - 0.0003,
                    base,
                    1_000.0,
                )
            })
            .collect();
        candles.extend((0..60).map(|i| {
            let wobble = if i % 2 == 0 { 0.0001 } else { -0.0001 };
            let base = 1.1360 + wobble;
            Candle::new_unchecked(
                start() + Duration::hours(60 + i as i64),
                base,
                base + 0.0003,
                base - 0.0003,
                base,
                1_000.0,
            )
        }));
        let mut data = MarketData::new(Timeframe::H1);
        data.insert(pair, candles);

        let engine = swing_engine(data, Config::default());
        let segments = engine.segment_regimes(start(), start() + Duration::hours(200));

        assert!(!segments.is_empty());
        let total_bars: usize = segments.iter().map(|s| s.bars).sum();
        assert_eq!(total_bars, 120 - 20 + 1);
        assert!(segments.iter().any(|s| s.regime.is_trending()));
        assert!(segments.iter().any(|s| !s.regime.is_trending()));
        for pair in segments.windows(2) {
            assert_ne!(pair[0].regime, pair[1].regime, "adjacent segments must differ");
        }
    }

    #[test]
    fn test_optimization_never_touches_live_parameters() {
        let pair = CurrencyPair::new("EURUSD");
        let candles = synthetic_candles(&pair, Timeframe::H1, start(), 500, Some(3));
        let mut data = MarketData::new(Timeframe::H1);
        data.insert(pair.clone(), candles);

        let inner = SmaCrossoverBacktester::new(pair.clone(), 10_000.0, StrategyParams::default());
        let before = inner.current_parameters();
        let engine = SwingBacktestEngine::new(Box::new(inner), data, pair, Config::default());

        let axes = HashMap::from([
            ("fast_period".to_string(), vec![5.0, 8.0]),
            ("slow_period".to_string(), vec![20.0, 30.0]),
        ]);
        let results =
            engine.optimize_strategy_by_regime(start(), start() + Duration::hours(500), &axes);

        assert_eq!(engine.engine.current_parameters(), before);
        for result in &results {
            assert!(result.validation_score.is_finite());
            assert!(result.best_parameters.fast_period < result.best_parameters.slow_period);
        }
    }

    #[test]
    fn test_walk_forward_combines_out_of_sample_periods() {
        // Two years of 4-hour bars, six per day
        let engine = swing_engine(synthetic_market(6 * 365 * 2), Config::default());
        let result = engine.run_walk_forward_analysis(None, None).unwrap();

        assert!(!result.periods.is_empty());
        assert!((0.0..=1.0).contains(&result.consistency_score));
        let summed: usize = result
            .periods
            .iter()
            .map(|p| p.out_of_sample.trades_count)
            .sum();
        assert_eq!(result.combined.trades_count, summed);
        // No grid axes configured, so no training-window optimization ran
        assert!(result.periods.iter().all(|p| p.optimizations.is_empty()));
    }

    #[test]
    fn test_combine_handles_empty_input() {
        let (metrics, pnl, consistency) = combine_out_of_sample(&[]);
        assert_eq!(metrics.trades_count, 0);
        assert_eq!(pnl, 0.0);
        assert_eq!(consistency, 0.0);
    }
}
