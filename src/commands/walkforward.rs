//! Walk-forward command implementation

use anyhow::Result;
use fx_attribution::backtest::SmaCrossoverBacktester;
use fx_attribution::walkforward::SwingBacktestEngine;
use std::path::PathBuf;
use tracing::info;

pub async fn run(
    config_path: String,
    pair_override: Option<String>,
    start: Option<String>,
    end: Option<String>,
    output: Option<PathBuf>,
    synthetic: bool,
    seed: Option<u64>,
) -> Result<()> {
    info!("Starting walk-forward analysis");

    let config = super::load_config(&config_path)?;
    let pair = super::resolve_pair(&config, pair_override.as_deref())?;
    let start = super::parse_date_opt("start", start.as_deref())?;
    let end = super::parse_date_opt("end", end.as_deref())?;

    let bars = super::bars_for_days(&config, 730)?;
    let market =
        super::load_market_data(&config, std::slice::from_ref(&pair), synthetic, bars, seed)?;

    info!(
        "Windows: {} months training, {} months testing, {} month step",
        config.walk_forward.training_months,
        config.walk_forward.testing_months,
        config.walk_forward.step_months
    );
    let backtester = SmaCrossoverBacktester::new(
        pair.clone(),
        config.data.account_balance,
        config.strategy.clone(),
    );
    let engine = SwingBacktestEngine::new(Box::new(backtester), market, pair.clone(), config.clone());
    let result = engine.run_walk_forward_analysis(start, end)?;

    println!("\n{}", "=".repeat(100));
    println!("WALK-FORWARD ANALYSIS");
    println!("{}", "=".repeat(100));
    println!("Pair:               {}", pair);
    println!("Periods:            {}", result.periods.len());
    println!(
        "Consistency:        {:.1}% of periods profitable",
        result.consistency_score * 100.0
    );
    println!("Total OOS PnL:      {:+.2}", result.total_pnl);
    println!("{}", "-".repeat(100));
    println!(
        "{:<7} {:<26} {:<26} {:>8} {:>7} {:>7} {:>10}",
        "Period", "Training", "Testing", "Return%", "Sharpe", "Trades", "PnL"
    );
    println!("{}", "-".repeat(100));
    for (i, period) in result.periods.iter().enumerate() {
        println!(
            "{:<7} {:<26} {:<26} {:>8.2} {:>7.2} {:>7} {:>+10.2}",
            i + 1,
            format!(
                "{} -> {}",
                period.training_period.start.format("%Y-%m-%d"),
                period.training_period.end.format("%Y-%m-%d")
            ),
            format!(
                "{} -> {}",
                period.testing_period.start.format("%Y-%m-%d"),
                period.testing_period.end.format("%Y-%m-%d")
            ),
            period.out_of_sample.total_return * 100.0,
            period.out_of_sample.sharpe_ratio,
            period.out_of_sample.trades_count,
            period.out_of_sample_pnl
        );
    }
    println!("{}", "-".repeat(100));
    println!("COMBINED OUT-OF-SAMPLE");
    println!(
        "Avg Return:         {:.2}%",
        result.combined.total_return * 100.0
    );
    println!("Avg Sharpe:         {:.2}", result.combined.sharpe_ratio);
    println!(
        "Avg Win Rate:       {:.2}%",
        result.combined.win_rate * 100.0
    );
    println!(
        "Worst Drawdown:     {:.2}%",
        result.combined.max_drawdown * 100.0
    );
    println!("Total Trades:       {}", result.combined.trades_count);
    println!("{}", "=".repeat(100));

    if let Some(path) = output {
        super::write_json_report(&path, &result)?;
    }

    info!("Walk-forward analysis completed successfully");

    Ok(())
}
