//! Backtest command implementation

use anyhow::Result;
use fx_attribution::backtest::SmaCrossoverBacktester;
use fx_attribution::walkforward::SwingBacktestEngine;
use tracing::{debug, info};

pub async fn run(
    config_path: String,
    pair_override: Option<String>,
    start: Option<String>,
    end: Option<String>,
    synthetic: bool,
    seed: Option<u64>,
) -> Result<()> {
    info!("Starting backtest");

    let config = super::load_config(&config_path)?;
    let pair = super::resolve_pair(&config, pair_override.as_deref())?;
    let start = super::parse_date_opt("start", start.as_deref())?;
    let end = super::parse_date_opt("end", end.as_deref())?;
    debug!("Pair: {}, period override: {:?} -> {:?}", pair, start, end);

    let bars = super::bars_for_days(&config, 730)?;
    let market =
        super::load_market_data(&config, std::slice::from_ref(&pair), synthetic, bars, seed)?;

    let params = config.strategy.clone();
    info!(
        "Running SMA {}/{} crossover on {}",
        params.fast_period, params.slow_period, pair
    );
    let backtester =
        SmaCrossoverBacktester::new(pair.clone(), config.data.account_balance, params.clone());
    let engine = SwingBacktestEngine::new(Box::new(backtester), market, pair.clone(), config.clone());
    let result = engine.run_simple_backtest(start, end)?;

    let total_pnl: f64 = result.trades.iter().filter_map(|t| t.pnl).sum();
    let wins = result
        .trades
        .iter()
        .filter(|t| t.pnl.is_some_and(|p| p > 0.0))
        .count();
    let losses = result.trades.len().saturating_sub(wins);

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("Pair:               {}", pair);
    println!(
        "Period:             {} -> {}",
        result.period.start.format("%Y-%m-%d"),
        result.period.end.format("%Y-%m-%d")
    );
    println!(
        "Parameters:         SMA {}/{}, stop {:.0} pips, target {:.0} pips",
        result.parameters.fast_period,
        result.parameters.slow_period,
        result.parameters.stop_pips,
        result.parameters.target_pips
    );
    println!("Account Balance:    {:.2}", config.data.account_balance);
    println!("Total PnL:          {:+.2}", total_pnl);
    println!(
        "Total Return:       {:.2}%",
        result.metrics.total_return * 100.0
    );
    println!(
        "Annualized Return:  {:.2}%",
        result.metrics.annualized_return * 100.0
    );
    println!("Sharpe Ratio:       {:.2}", result.metrics.sharpe_ratio);
    println!("Sortino Ratio:      {:.2}", result.metrics.sortino_ratio);
    println!("Calmar Ratio:       {:.2}", result.metrics.calmar_ratio);
    println!(
        "Max Drawdown:       {:.2}%",
        result.metrics.max_drawdown * 100.0
    );
    println!("Win Rate:           {:.2}%", result.metrics.win_rate * 100.0);
    println!("Profit Factor:      {:.2}", result.metrics.profit_factor);
    println!("Total Trades:       {}", result.metrics.trades_count);
    println!("Winning Trades:     {}", wins);
    println!("Losing Trades:      {}", losses);
    println!("{}", "=".repeat(60));

    info!("Backtest completed successfully");

    Ok(())
}
