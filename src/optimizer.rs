//! Parameter grid search
//!
//! Generates strategy parameter combinations from a grid specification and
//! scores them in parallel through a `BacktestEngine`. Candidate order is
//! deterministic: grid axes are walked in sorted key order.

use indicatif::ProgressBar;
use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::attribution::AnalysisPeriod;
use crate::backtest::BacktestEngine;
use crate::config::StrategyParams;
use crate::data::MarketData;
use crate::types::{MarketRegime, PerformanceMetrics};

/// Weighted blend of risk-adjusted quality, return, hit rate, and drawdown.
/// Sharpe saturates at 3 and return at 100% so one hot backtest cannot
/// drown the other terms.
pub fn composite_score(metrics: &PerformanceMetrics) -> f64 {
    0.4 * (metrics.sharpe_ratio.min(3.0) / 3.0)
        + 0.3 * metrics.total_return.min(1.0)
        + 0.2 * metrics.win_rate
        + 0.1 * (1.0 - metrics.max_drawdown.abs()).max(0.0)
}

/// Grid axes used when the config supplies none
pub fn default_axes() -> HashMap<String, Vec<f64>> {
    HashMap::from([
        ("fast_period".to_string(), vec![5.0, 10.0]),
        ("slow_period".to_string(), vec![20.0, 30.0, 50.0]),
        ("stop_pips".to_string(), vec![30.0, 40.0]),
        ("target_pips".to_string(), vec![60.0, 80.0]),
    ])
}

/// Cartesian product of the grid axes applied onto `base`, capped at `cap`
/// candidates. Axes are expanded in sorted key order so the same grid always
/// yields the same candidate sequence.
pub fn parameter_grid(
    base: &StrategyParams,
    axes: &HashMap<String, Vec<f64>>,
    cap: usize,
) -> Vec<StrategyParams> {
    let mut keys: Vec<&String> = axes.keys().filter(|k| !axes[*k].is_empty()).collect();
    keys.sort();
    if keys.is_empty() {
        return vec![base.clone()];
    }

    keys.iter()
        .map(|k| axes[*k].iter().copied())
        .multi_cartesian_product()
        .take(cap.max(1))
        .map(|combo| {
            let mut params = base.clone();
            for (key, value) in keys.iter().zip(combo) {
                params.set(key, value);
            }
            params
        })
        .collect()
}

/// One scored grid candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub parameters: StrategyParams,
    pub metrics: PerformanceMetrics,
    pub score: f64,
}

/// Winning parameter set for one regime's training period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub regime: MarketRegime,
    pub best_parameters: StrategyParams,
    pub performance_metrics: PerformanceMetrics,
    pub training_period: AnalysisPeriod,
    pub validation_score: f64,
}

/// Backtest every candidate over the period and score it.
///
/// Candidates the engine rejects (invalid parameter combinations, no data)
/// and runs that produce zero trades are dropped.
pub fn evaluate_candidates(
    engine: &dyn BacktestEngine,
    market_data: &MarketData,
    period: AnalysisPeriod,
    candidates: &[StrategyParams],
    progress: Option<&ProgressBar>,
) -> Vec<CandidateScore> {
    info!(candidates = candidates.len(), "scoring parameter combinations");

    candidates
        .par_iter()
        .filter_map(|params| {
            let run = engine.run(market_data, period.start, period.end, params);
            if let Some(bar) = progress {
                bar.inc(1);
            }
            let run = run.ok()?;
            if run.metrics.trades_count == 0 {
                return None;
            }
            let score = composite_score(&run.metrics);
            Some(CandidateScore {
                parameters: run.parameters,
                metrics: run.metrics,
                score,
            })
        })
        .collect()
}

/// Highest-scoring candidate, if any survived evaluation
pub fn best_candidate(scored: Vec<CandidateScore>) -> Option<CandidateScore> {
    scored
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
}
