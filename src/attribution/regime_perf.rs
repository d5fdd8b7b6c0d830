//! Per-regime performance breakdown
//!
//! Classifies the market window around each trade entry into one of the four
//! trend/volatility regimes, then aggregates trade metrics per regime.
//! Trades caught inside regime transition windows, the hours around
//! volatility spikes, are scored separately.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};
use std::collections::HashMap;
use tracing::debug;

use crate::config::RegimePerformanceConfig;
use crate::data::MarketData;
use crate::indicators;
use crate::metrics::metrics_for_trades;
use crate::types::{Candle, MarketRegime, PerformanceMetrics, Trade};

/// Performance of trades entered inside transition windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionPerformance {
    pub metrics: PerformanceMetrics,
    pub transition_trades: usize,
    pub transition_windows: usize,
}

/// Classify a candle window into one of the four base regimes.
///
/// Undersized windows are Uncertain. High volatility is either elevated
/// realized volatility or a wide relative price range; trending is a
/// fast/slow SMA separation beyond the threshold.
pub fn classify_local_regime(candles: &[Candle], config: &RegimePerformanceConfig) -> MarketRegime {
    if candles.len() < config.window {
        return MarketRegime::Uncertain;
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let last_close = closes[closes.len() - 1];
    if last_close <= 0.0 {
        return MarketRegime::Uncertain;
    }

    let volatility = indicators::std_dev(&indicators::returns(&closes));
    let high = candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let low = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let price_range = (high - low) / last_close;
    let high_vol = volatility > config.high_vol_threshold || price_range > config.range_threshold;

    let sma_fast = (&closes[closes.len().saturating_sub(5)..]).mean();
    let sma_slow = (&closes[closes.len().saturating_sub(10)..]).mean();
    let trending = ((sma_fast - sma_slow) / last_close).abs() > config.trend_threshold;

    match (trending, high_vol) {
        (true, true) => MarketRegime::TrendingHighVol,
        (true, false) => MarketRegime::TrendingLowVol,
        (false, true) => MarketRegime::RangingHighVol,
        (false, false) => MarketRegime::RangingLowVol,
    }
}

pub struct RegimePerformanceAnalyzer {
    config: RegimePerformanceConfig,
    account_balance: f64,
}

impl RegimePerformanceAnalyzer {
    pub fn new(config: RegimePerformanceConfig, account_balance: f64) -> Self {
        Self {
            config,
            account_balance,
        }
    }

    /// Regime the market was in when this trade was entered.
    ///
    /// Falls back to the regime stamped on the trade when no candle window
    /// is available.
    pub fn regime_for_trade(&self, trade: &Trade, market_data: &MarketData) -> MarketRegime {
        match market_data.window_ending_at(&trade.pair, trade.entry_time, self.config.window) {
            Some(window) => classify_local_regime(window, &self.config),
            None => trade.regime.unwrap_or(MarketRegime::Uncertain),
        }
    }

    /// Trade metrics bucketed by entry-time regime.
    ///
    /// Buckets with fewer than `min_trades_per_regime` trades are dropped;
    /// a thin sample says nothing reliable about the regime.
    pub async fn analyze_regime_performance(
        &self,
        trades: &[Trade],
        market_data: &MarketData,
    ) -> HashMap<MarketRegime, PerformanceMetrics> {
        let mut buckets: HashMap<MarketRegime, Vec<&Trade>> = HashMap::new();
        for trade in trades.iter().filter(|t| t.is_closed()) {
            let regime = self.regime_for_trade(trade, market_data);
            buckets.entry(regime).or_default().push(trade);
        }

        let mut attribution = HashMap::new();
        for (regime, members) in buckets {
            if members.len() < self.config.min_trades_per_regime {
                debug!(
                    regime = regime.as_str(),
                    trades = members.len(),
                    "dropping thin regime bucket"
                );
                continue;
            }
            attribution.insert(regime, metrics_for_trades(&members, self.account_balance));
        }
        attribution
    }

    /// Performance of trades entered within the transition windows around
    /// top-percentile volatility bars. None when no window holds a trade.
    pub async fn analyze_transition_performance(
        &self,
        trades: &[Trade],
        market_data: &MarketData,
    ) -> Option<TransitionPerformance> {
        let spikes = self.volatility_spikes(market_data);
        if spikes.is_empty() {
            return None;
        }

        let half = Duration::hours(self.config.transition_window_hours);
        let members: Vec<&Trade> = trades
            .iter()
            .filter(|t| t.is_closed())
            .filter(|t| {
                spikes
                    .iter()
                    .any(|spike| t.entry_time >= *spike - half && t.entry_time <= *spike + half)
            })
            .collect();
        if members.is_empty() {
            return None;
        }

        Some(TransitionPerformance {
            metrics: metrics_for_trades(&members, self.account_balance),
            transition_trades: members.len(),
            transition_windows: spikes.len(),
        })
    }

    /// Bar timestamps whose rolling volatility clears the configured
    /// percentile within their own pair's series
    fn volatility_spikes(&self, market_data: &MarketData) -> Vec<chrono::DateTime<chrono::Utc>> {
        let mut spikes = Vec::new();
        for pair in market_data.pairs() {
            let Some(candles) = market_data.get(pair) else {
                continue;
            };
            let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
            let bar_returns = indicators::returns(&closes);
            let vols = indicators::rolling_std(&bar_returns, self.config.window);
            let mut samples: Vec<(chrono::DateTime<chrono::Utc>, f64)> = Vec::new();
            // Return index i describes candle i+1
            for (i, vol) in vols.iter().enumerate() {
                if let Some(v) = vol {
                    samples.push((candles[i + 1].datetime, *v));
                }
            }
            if samples.is_empty() {
                continue;
            }

            let mut pair_vols = Data::new(samples.iter().map(|(_, v)| *v).collect::<Vec<f64>>());
            let threshold =
                pair_vols.percentile(self.config.transition_vol_percentile.round() as usize);
            spikes.extend(
                samples
                    .into_iter()
                    .filter(|(_, v)| *v >= threshold)
                    .map(|(ts, _)| ts),
            );
        }
        spikes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CurrencyPair, ExitReason, Side, Timeframe};
    use chrono::{DateTime, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    fn candle_at(i: usize, close: f64, spread: f64) -> Candle {
        Candle::new_unchecked(
            start() + Duration::hours(i as i64),
            close,
            close + spread,
            close - spread,
            close,
            1_000.0,
        )
    }

    fn trending_quiet(bars: usize) -> Vec<Candle> {
        (0..bars)
            .map(|i| candle_at(i, 1.1000 + i as f64 * 0.0005, 0.0002))
            .collect()
    }

    fn ranging_quiet(bars: usize) -> Vec<Candle> {
        (0..bars)
            .map(|i| {
                let wobble = if i % 2 == 0 { 0.0001 } else { -0.0001 };
                candle_at(i, 1.1000 + wobble, 0.0002)
            })
            .collect()
    }

    fn ranging_wild(bars: usize) -> Vec<Candle> {
        // Period-5 cycle keeps SMA5 and SMA10 pinned to the same mean
        let cycle = [0.02, -0.02, 0.01, -0.01, 0.0];
        (0..bars)
            .map(|i| candle_at(i, 1.1000 * (1.0 + cycle[i % 5]), 0.005))
            .collect()
    }

    fn closed_trade(pair: &CurrencyPair, entry: DateTime<Utc>, pnl: f64) -> Trade {
        let mut trade = Trade::open(pair.clone(), Side::Buy, entry, 1.10, 10_000.0);
        trade.exit_time = Some(entry + Duration::hours(2));
        trade.exit_price = Some(1.101);
        trade.pnl = Some(pnl);
        trade.pnl_pct = Some(pnl / 10_000.0);
        trade.exit_reason = Some(ExitReason::Time);
        trade
    }

    fn analyzer() -> RegimePerformanceAnalyzer {
        RegimePerformanceAnalyzer::new(RegimePerformanceConfig::default(), 10_000.0)
    }

    #[test]
    fn test_classify_trending_quiet_window() {
        let config = RegimePerformanceConfig::default();
        let regime = classify_local_regime(&trending_quiet(20), &config);
        assert_eq!(regime, MarketRegime::TrendingLowVol);
    }

    #[test]
    fn test_classify_ranging_windows() {
        let config = RegimePerformanceConfig::default();
        assert_eq!(
            classify_local_regime(&ranging_quiet(20), &config),
            MarketRegime::RangingLowVol
        );
        assert_eq!(
            classify_local_regime(&ranging_wild(20), &config),
            MarketRegime::RangingHighVol
        );
    }

    #[test]
    fn test_classify_short_window_is_uncertain() {
        let config = RegimePerformanceConfig::default();
        assert_eq!(
            classify_local_regime(&trending_quiet(5), &config),
            MarketRegime::Uncertain
        );
    }

    #[tokio::test]
    async fn test_thin_regime_buckets_are_dropped() {
        let pair = CurrencyPair::new("EURUSD");
        let mut data = MarketData::new(Timeframe::H1);
        // 60 trending bars then 60 choppy bars
        let mut candles = trending_quiet(60);
        let tail: Vec<Candle> = (0..60)
            .map(|i| {
                let swing = if i % 2 == 0 { 0.02 } else { -0.02 };
                candle_at(60 + i, 1.13 * (1.0 + swing), 0.005)
            })
            .collect();
        candles.extend(tail);
        data.insert(pair.clone(), candles);

        // 12 trades in the trending phase, 3 in the wild phase
        let mut trades: Vec<Trade> = (0..12)
            .map(|i| closed_trade(&pair, start() + Duration::hours(30 + i as i64), 10.0))
            .collect();
        trades.extend(
            (0..3).map(|i| closed_trade(&pair, start() + Duration::hours(100 + i as i64), -5.0)),
        );

        let attribution = analyzer().analyze_regime_performance(&trades, &data).await;
        assert_eq!(attribution.len(), 1);
        let (regime, metrics) = attribution.iter().next().unwrap();
        assert!(regime.is_trending());
        assert_eq!(metrics.trades_count, 12);
    }

    #[tokio::test]
    async fn test_transition_windows_catch_burst_trades() {
        let pair = CurrencyPair::new("EURUSD");
        let mut candles = ranging_quiet(120);
        // Volatility burst across bars 60..=70
        for (offset, candle) in candles[60..=70].iter_mut().enumerate() {
            let swing = if offset % 2 == 0 { 0.018 } else { -0.018 };
            let close = 1.1000 * (1.0 + swing);
            candle.close = close;
            candle.open = close;
            candle.high = close + 0.004;
            candle.low = close - 0.004;
        }
        let mut data = MarketData::new(Timeframe::H1);
        data.insert(pair.clone(), candles);

        let inside = closed_trade(&pair, start() + Duration::hours(66), -20.0);
        let outside = closed_trade(&pair, start() + Duration::hours(10), 15.0);

        let result = analyzer()
            .analyze_transition_performance(&[inside, outside], &data)
            .await
            .unwrap();
        assert_eq!(result.transition_trades, 1);
        assert!(result.transition_windows > 0);
        assert_eq!(result.metrics.trades_count, 1);
    }

    #[tokio::test]
    async fn test_spike_thresholds_are_per_pair() {
        let calm = CurrencyPair::new("EURUSD");
        let wild = CurrencyPair::new("GBPUSD");

        // Quiet series with one clear burst across bars 60..=70
        let mut calm_candles = ranging_quiet(120);
        for (offset, candle) in calm_candles[60..=70].iter_mut().enumerate() {
            let swing = if offset % 2 == 0 { 0.009 } else { -0.009 };
            let close = 1.1000 * (1.0 + swing);
            candle.close = close;
            candle.open = close;
            candle.high = close + 0.002;
            candle.low = close - 0.002;
        }
        // Steadily growing swings keep this pair's loudest bars at the end,
        // far above anything the calm pair ever prints
        let wild_candles: Vec<Candle> = (0..120)
            .map(|i| {
                let amp = 0.02 + 0.0015 * i as f64;
                let swing = if i % 2 == 0 { amp } else { -amp };
                candle_at(i, 1.2700 * (1.0 + swing), 0.006)
            })
            .collect();

        let mut data = MarketData::new(Timeframe::H1);
        data.insert(calm.clone(), calm_candles);
        data.insert(wild.clone(), wild_candles);

        // Entered squarely inside the calm pair's burst
        let trade = closed_trade(&calm, start() + Duration::hours(72), -30.0);

        let result = analyzer()
            .analyze_transition_performance(&[trade], &data)
            .await
            .unwrap();
        assert_eq!(result.transition_trades, 1);
        assert_eq!(result.metrics.trades_count, 1);
    }

    #[tokio::test]
    async fn test_no_transition_result_without_spiking_trades() {
        let pair = CurrencyPair::new("EURUSD");
        let mut data = MarketData::new(Timeframe::H1);
        data.insert(pair.clone(), ranging_quiet(40));

        let result = analyzer().analyze_transition_performance(&[], &data).await;
        assert!(result.is_none());
    }
}
