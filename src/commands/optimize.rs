//! Optimize command implementation with progress tracking and grid overrides

use anyhow::{Context, Result};
use fx_attribution::backtest::SmaCrossoverBacktester;
use fx_attribution::optimizer;
use fx_attribution::walkforward::SwingBacktestEngine;
use fx_attribution::MarketRegime;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use tracing::info;

/// Parse a grid override of the form name=v1,v2,...
fn parse_grid_override(s: &str) -> Result<(String, Vec<f64>)> {
    let (name, values) = s
        .split_once('=')
        .with_context(|| format!("Invalid grid override '{s}', expected name=v1,v2"))?;
    let parsed: Vec<f64> = values
        .split(',')
        .filter_map(|x| x.trim().parse().ok())
        .collect();
    if parsed.is_empty() {
        anyhow::bail!("Grid override '{s}' has no numeric values");
    }
    Ok((name.trim().to_string(), parsed))
}

#[allow(clippy::too_many_arguments)]
pub async fn run(
    config_path: String,
    pair_override: Option<String>,
    start: Option<String>,
    end: Option<String>,
    grid_overrides: Vec<String>,
    top: usize,
    synthetic: bool,
    seed: Option<u64>,
) -> Result<()> {
    info!("Starting regime-scoped optimization");

    let config = super::load_config(&config_path)?;
    let pair = super::resolve_pair(&config, pair_override.as_deref())?;
    let start = super::parse_date_opt("start", start.as_deref())?;
    let end = super::parse_date_opt("end", end.as_deref())?;

    let bars = super::bars_for_days(&config, 730)?;
    let market =
        super::load_market_data(&config, std::slice::from_ref(&pair), synthetic, bars, seed)?;
    let (span_start, span_end) = market.span().context("No candle data loaded")?;
    let start = start.unwrap_or(span_start);
    let end = end.unwrap_or(span_end);

    // Search ranges: config grid when present, else the built-in axes,
    // with CLI overrides layered on top
    let mut axes = config
        .grid
        .clone()
        .filter(|g| !g.is_empty())
        .unwrap_or_else(optimizer::default_axes);
    for override_str in &grid_overrides {
        let (name, values) = parse_grid_override(override_str)?;
        info!("Grid override: {} = {:?}", name, values);
        axes.insert(name, values);
    }

    let backtester = SmaCrossoverBacktester::new(
        pair.clone(),
        config.data.account_balance,
        config.strategy.clone(),
    );
    let engine = SwingBacktestEngine::new(Box::new(backtester), market, pair.clone(), config.clone());

    let candidates = optimizer::parameter_grid(
        &config.strategy,
        &axes,
        config.walk_forward.max_combinations,
    );
    let window = config.regime_performance.window;
    let eligible: HashSet<MarketRegime> = engine
        .segment_regimes(start, end)
        .iter()
        .filter(|s| s.bars >= 2 * window)
        .map(|s| s.regime)
        .collect();
    let total_runs = candidates.len() * eligible.len();

    info!("Parameter combinations: {}", candidates.len());
    info!("Eligible regimes: {}", eligible.len());

    if total_runs == 0 {
        info!("No regime segment is long enough to optimize. Check data coverage.");
        println!("\nNo regime segment is long enough to optimize.");
        return Ok(());
    }

    println!("\n{}", "=".repeat(70));
    println!("OPTIMIZATION SUMMARY");
    println!("{}", "=".repeat(70));
    println!("  Pair:          {}", pair);
    println!(
        "  Period:        {} -> {}",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    );
    println!("  Parameters:    {} combinations", candidates.len());
    println!("  Regimes:       {}", eligible.len());
    println!("  Total tests:   {}", total_runs);
    println!("{}\n", "=".repeat(70));

    // Single progress bar (tqdm style), ticked per candidate backtest
    let pb = ProgressBar::new(total_runs as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}]")
            .unwrap()
            .progress_chars("█░ "),
    );

    let results = engine.optimize_by_regime_with_progress(start, end, &axes, &pb);

    pb.finish_with_message("done");
    println!();

    if results.is_empty() {
        info!("No valid results found.");
        println!("No parameter set produced trades in any regime segment.");
        return Ok(());
    }

    let mut results = results;
    results.sort_by(|a, b| {
        b.validation_score
            .partial_cmp(&a.validation_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let display_count = top.min(results.len());
    println!("\n{}", "=".repeat(100));
    println!("TOP {} REGIME OPTIMIZATION RESULTS", display_count);
    println!("{}", "=".repeat(100));
    println!(
        "{:<4} {:>6} {:>7} {:>8} {:>7} {:>6} | {:<18} | Parameters",
        "Rank", "Score", "Sharpe", "Return%", "WinR%", "Trades", "Regime"
    );
    println!("{}", "-".repeat(100));

    for (i, result) in results.iter().take(top).enumerate() {
        let params_str = format!(
            "SMA:{}/{} Stop:{:.0} Tgt:{:.0} Hold:{}",
            result.best_parameters.fast_period,
            result.best_parameters.slow_period,
            result.best_parameters.stop_pips,
            result.best_parameters.target_pips,
            result.best_parameters.max_hold_bars
        );

        println!(
            "{:<4} {:>6.3} {:>7.2} {:>8.2} {:>7.2} {:>6} | {:<18} | {}",
            i + 1,
            result.validation_score,
            result.performance_metrics.sharpe_ratio,
            result.performance_metrics.total_return * 100.0,
            result.performance_metrics.win_rate * 100.0,
            result.performance_metrics.trades_count,
            result.regime.as_str(),
            params_str
        );
    }
    println!("{}", "=".repeat(100));
    println!("Best parameters are recorded for review only; live parameters are unchanged.");

    info!("Optimization completed successfully");

    Ok(())
}
