//! Analyze command implementation

use anyhow::Result;
use fx_attribution::attribution::PerformanceAttributionEngine;
use fx_attribution::backtest::SmaCrossoverBacktester;
use fx_attribution::walkforward::SwingBacktestEngine;
use fx_attribution::{data, Trade};
use std::path::PathBuf;
use tracing::info;

pub async fn run(
    config_path: String,
    trades_path: Option<String>,
    start: Option<String>,
    end: Option<String>,
    output: Option<PathBuf>,
    synthetic: bool,
    seed: Option<u64>,
) -> Result<()> {
    info!("Starting performance attribution");

    let config = super::load_config(&config_path)?;
    let start = super::parse_date_opt("start", start.as_deref())?;
    let end = super::parse_date_opt("end", end.as_deref())?;

    let pairs = super::resolve_pairs(&config, None);
    let bars = super::bars_for_days(&config, 730)?;
    let market = super::load_market_data(&config, &pairs, synthetic, bars, seed)?;

    let trades: Vec<Trade> = match trades_path {
        Some(path) => {
            let trades = data::load_trades_csv(&path)?;
            info!("Loaded {} trades from {}", trades.len(), path);
            trades
        }
        None => {
            info!("No trades file given, running the reference strategy to produce trades");
            let pair = super::resolve_pair(&config, None)?;
            let backtester = SmaCrossoverBacktester::new(
                pair.clone(),
                config.data.account_balance,
                config.strategy.clone(),
            );
            let engine = SwingBacktestEngine::new(
                Box::new(backtester),
                market.clone(),
                pair,
                config.clone(),
            );
            let run = engine.run_simple_backtest(start, end)?;
            info!("Reference backtest produced {} trades", run.trades.len());
            run.trades
        }
    };

    let engine = PerformanceAttributionEngine::new(&config);
    let result = engine
        .analyze_performance(&trades, &market, start, end)
        .await?;

    let overall = &result.overall_performance;
    println!("\n{}", "=".repeat(60));
    println!("PERFORMANCE ATTRIBUTION");
    println!("{}", "=".repeat(60));
    println!(
        "Period:             {} -> {}",
        result.analysis_period.start.format("%Y-%m-%d %H:%M"),
        result.analysis_period.end.format("%Y-%m-%d %H:%M")
    );
    println!("Trades Analyzed:    {}", overall.trades_count);
    println!("Total Return:       {:.2}%", overall.total_return * 100.0);
    println!(
        "Annualized Return:  {:.2}%",
        overall.annualized_return * 100.0
    );
    println!("Sharpe Ratio:       {:.2}", overall.sharpe_ratio);
    println!("Sortino Ratio:      {:.2}", overall.sortino_ratio);
    println!("Calmar Ratio:       {:.2}", overall.calmar_ratio);
    println!("Max Drawdown:       {:.2}%", overall.max_drawdown * 100.0);
    println!("Win Rate:           {:.2}%", overall.win_rate * 100.0);
    println!("Profit Factor:      {:.2}", overall.profit_factor);

    println!("{}", "-".repeat(60));
    println!("Regime Attribution:");
    let mut regimes: Vec<_> = result.regime_attribution.iter().collect();
    regimes.sort_by_key(|(regime, _)| regime.as_str());
    for (regime, metrics) in regimes {
        println!(
            "  {:<20} trades {:>4}  return {:>7.2}%  sharpe {:>5.2}  win {:>5.1}%",
            regime.as_str(),
            metrics.trades_count,
            metrics.total_return * 100.0,
            metrics.sharpe_ratio,
            metrics.win_rate * 100.0
        );
    }
    if let Some(transition) = &result.transition_performance {
        println!(
            "  {:<20} trades {:>4}  return {:>7.2}%  windows {}",
            "TRANSITION_WINDOWS",
            transition.transition_trades,
            transition.metrics.total_return * 100.0,
            transition.transition_windows
        );
    }

    println!("{}", "-".repeat(60));
    println!("Factor Attribution:");
    let mut factors: Vec<_> = result.factor_attribution.iter().collect();
    factors.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap_or(std::cmp::Ordering::Equal));
    for (factor, weight) in factors {
        println!("  {:<26} {:>+8.3}", factor, weight);
    }

    println!("{}", "-".repeat(60));
    println!("Economic Event Impact:");
    let mut events: Vec<_> = result.economic_impact.iter().collect();
    events.sort_by_key(|(event, _)| event.as_str());
    for (event, impact) in events {
        println!("  {:<26} {:>+8.3}", event.as_str(), impact);
    }

    println!("{}", "-".repeat(60));
    println!("Session Attribution:");
    let mut sessions: Vec<_> = result.session_attribution.iter().collect();
    sessions.sort_by(|a, b| a.0.cmp(b.0));
    for (name, perf) in sessions {
        let best = perf
            .best_pair
            .as_ref()
            .map(|p| p.as_str())
            .unwrap_or("-");
        println!(
            "  {:<20} trades {:>4}  pnl {:>+9.2}  sharpe {:>5.2}  best {}",
            name, perf.metrics.trades_count, perf.total_pnl, perf.metrics.sharpe_ratio, best
        );
    }
    let mut transitions: Vec<_> = result.session_transitions.iter().collect();
    transitions.sort_by(|a, b| a.0.cmp(b.0));
    for (name, metrics) in transitions {
        println!(
            "  {:<20} trades {:>4}  return {:>7.2}%  win {:>5.1}%",
            name,
            metrics.trades_count,
            metrics.total_return * 100.0,
            metrics.win_rate * 100.0
        );
    }
    println!(
        "Weekend-Affected:   {} trades, avg pnl delta {:+.2}, win rate delta {:+.1}%",
        result.weekend_gap.weekend_affected_trades,
        result.weekend_gap.avg_pnl_delta,
        result.weekend_gap.win_rate_delta * 100.0
    );

    println!("{}", "-".repeat(60));
    println!("Recommendations:");
    if result.optimization_recommendations.is_empty() {
        println!("  (none)");
    }
    for (i, recommendation) in result.optimization_recommendations.iter().enumerate() {
        println!("  {}. {}", i + 1, recommendation);
    }
    println!("{}", "=".repeat(60));

    if let Some(path) = output {
        super::write_json_report(&path, &result)?;
    }

    info!("Performance attribution completed successfully");

    Ok(())
}
