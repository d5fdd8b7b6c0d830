//! Attribution orchestrator
//!
//! Resolves the analysis period, runs the four analyzers concurrently over
//! the same read-only inputs, and merges their outputs into one report with
//! rule-based optimization recommendations.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

use crate::calendar::EconomicEventType;
use crate::config::Config;
use crate::data::MarketData;
use crate::metrics::metrics_for_trades;
use crate::types::{MarketRegime, PerformanceMetrics, Trade};

use super::economic::EconomicEventAnalyzer;
use super::factor::FactorAnalyzer;
use super::regime_perf::RegimePerformanceAnalyzer;
use super::session::{SessionAnalyzer, SessionPerformance};
use super::{AnalysisPeriod, AttributionResult};

const SHARPE_FLOOR: f64 = 1.0;
const DRAWDOWN_CEILING: f64 = 0.15;
const WIN_RATE_FLOOR: f64 = 0.4;
const DOMINANT_FACTOR_THRESHOLD: f64 = 0.3;
const SESSION_SHARPE_TARGET: f64 = 1.5;

#[derive(Debug, Error)]
pub enum AttributionError {
    #[error("analysis period is inverted: start {start} is after end {end}")]
    InvalidPeriod {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

pub struct PerformanceAttributionEngine {
    regime_perf: RegimePerformanceAnalyzer,
    factor: FactorAnalyzer,
    economic: EconomicEventAnalyzer,
    session: SessionAnalyzer,
    account_balance: f64,
}

impl PerformanceAttributionEngine {
    pub fn new(config: &Config) -> Self {
        let balance = config.data.account_balance;
        Self {
            regime_perf: RegimePerformanceAnalyzer::new(config.regime_performance.clone(), balance),
            factor: FactorAnalyzer::new(config.factors.clone(), balance),
            economic: EconomicEventAnalyzer::new(config.events.clone()),
            session: SessionAnalyzer::new(balance),
            account_balance: balance,
        }
    }

    /// Full attribution over trades entered inside [start, end].
    ///
    /// Missing bounds default to the trade span, then the market data span.
    /// A period that filters every trade away still succeeds with zeroed
    /// metrics; only an inverted period is an error.
    pub async fn analyze_performance(
        &self,
        trades: &[Trade],
        market_data: &MarketData,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<AttributionResult, AttributionError> {
        let period = resolve_period(trades, market_data, start, end)?;
        let filtered: Vec<Trade> = trades
            .iter()
            .filter(|t| t.entry_time >= period.start && t.entry_time <= period.end)
            .cloned()
            .collect();

        info!(
            trades = filtered.len(),
            start = %period.start,
            end = %period.end,
            "running performance attribution"
        );

        let closed: Vec<&Trade> = filtered.iter().filter(|t| t.is_closed()).collect();
        let overall = metrics_for_trades(&closed, self.account_balance);

        let (
            regime_attribution,
            transition_performance,
            factor_attribution,
            economic_impact,
            session_attribution,
            session_transitions,
            weekend_gap,
        ) = tokio::join!(
            self.regime_perf.analyze_regime_performance(&filtered, market_data),
            self.regime_perf.analyze_transition_performance(&filtered, market_data),
            self.factor.analyze_factor_attribution(&filtered, market_data),
            self.economic.analyze_economic_impact(&filtered),
            self.session.analyze_session_performance(&filtered),
            self.session.analyze_session_transitions(&filtered),
            self.session.analyze_weekend_gaps(&filtered),
        );

        let optimization_recommendations = self.build_recommendations(
            &overall,
            &regime_attribution,
            &factor_attribution,
            &economic_impact,
            &session_attribution,
        );

        Ok(AttributionResult {
            timestamp: Utc::now(),
            analysis_period: period,
            overall_performance: overall,
            regime_attribution,
            transition_performance,
            factor_attribution,
            economic_impact,
            session_attribution,
            weekend_gap,
            session_transitions,
            optimization_recommendations,
        })
    }

    /// Rule-based recommendations, evaluated in a fixed order with every
    /// applicable rule firing
    fn build_recommendations(
        &self,
        overall: &PerformanceMetrics,
        regimes: &HashMap<MarketRegime, PerformanceMetrics>,
        factors: &HashMap<String, f64>,
        events: &HashMap<EconomicEventType, f64>,
        sessions: &HashMap<String, SessionPerformance>,
    ) -> Vec<String> {
        let mut recommendations = Vec::new();

        if overall.trades_count > 0 {
            if overall.sharpe_ratio < SHARPE_FLOOR {
                recommendations.push(format!(
                    "Sharpe ratio {:.2} is below 1.0; tighten entries or cut position sizes to lift risk-adjusted returns",
                    overall.sharpe_ratio
                ));
            }
            if overall.max_drawdown > DRAWDOWN_CEILING {
                recommendations.push(format!(
                    "Max drawdown {:.1}% breaches the 15% ceiling; tighten stops or stagger position entries",
                    overall.max_drawdown * 100.0
                ));
            }
            if overall.win_rate < WIN_RATE_FLOOR {
                recommendations.push(format!(
                    "Win rate {:.1}% sits under 40%; review entry criteria before scaling up",
                    overall.win_rate * 100.0
                ));
            }
        }

        let best_regime = regimes
            .iter()
            .max_by(|a, b| a.1.sharpe_ratio.total_cmp(&b.1.sharpe_ratio));
        if let Some((best, best_metrics)) = best_regime {
            recommendations.push(format!(
                "Best risk-adjusted results come in {} (Sharpe {:.2}); consider shifting allocation toward it",
                best.as_str(),
                best_metrics.sharpe_ratio
            ));
            let worst_regime = regimes
                .iter()
                .min_by(|a, b| a.1.sharpe_ratio.total_cmp(&b.1.sharpe_ratio));
            if let Some((worst, worst_metrics)) = worst_regime {
                if worst != best {
                    recommendations.push(format!(
                        "{} drags performance (Sharpe {:.2}); reduce exposure while it persists",
                        worst.as_str(),
                        worst_metrics.sharpe_ratio
                    ));
                }
            }
        }

        // Name tie-break: exactly tied factors (a single pair's two currency
        // legs) must not leave the pick to HashMap iteration order
        let dominant = factors
            .iter()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()).then_with(|| a.0.cmp(b.0)));
        if let Some((name, value)) = dominant {
            if value.abs() > DOMINANT_FACTOR_THRESHOLD {
                recommendations.push(format!(
                    "Returns lean heavily on the {name} factor ({value:+.2}); diversify entries to soften single-factor risk"
                ));
            }
        }

        recommendations.extend(self.economic.recommendations(events));

        let best_session = sessions
            .iter()
            .max_by(|a, b| a.1.metrics.sharpe_ratio.total_cmp(&b.1.metrics.sharpe_ratio));
        if let Some((name, perf)) = best_session {
            if perf.metrics.sharpe_ratio > SESSION_SHARPE_TARGET {
                recommendations.push(format!(
                    "The {} session delivers Sharpe {:.2}; concentrate trading there",
                    name, perf.metrics.sharpe_ratio
                ));
            }
        }

        for recommendation in &recommendations {
            info!(recommendation = %recommendation);
        }
        recommendations
    }
}

/// Bounds default to the trade span, then the market data span
fn resolve_period(
    trades: &[Trade],
    market_data: &MarketData,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<AnalysisPeriod, AttributionError> {
    let span = market_data.span();
    let first_entry = trades.iter().map(|t| t.entry_time).min();
    let last_exit = trades
        .iter()
        .map(|t| t.exit_time.unwrap_or(t.entry_time))
        .max();

    let start = start
        .or(first_entry)
        .or(span.map(|(s, _)| s))
        .unwrap_or_else(Utc::now);
    let end = end.or(last_exit).or(span.map(|(_, e)| e)).unwrap_or(start);

    if start > end {
        return Err(AttributionError::InvalidPeriod { start, end });
    }
    Ok(AnalysisPeriod { start, end })
}
