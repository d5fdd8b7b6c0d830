//! Factor attribution analysis
//!
//! Builds per-trade exposure series for currency, style, and macro factors,
//! then attributes the strategy's return series across them. Exposures with
//! zero variance contribute nothing; final attributions are normalized so
//! their absolute values sum to one.

use statrs::statistics::Statistics;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::config::FactorConfig;
use crate::data::MarketData;
use crate::types::{Side, Trade};

/// Correlation between two factor exposure series
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FactorCorrelation {
    pub factor_a: String,
    pub factor_b: String,
    pub correlation: f64,
}

pub struct FactorAnalyzer {
    config: FactorConfig,
    account_balance: f64,
}

impl FactorAnalyzer {
    pub fn new(config: FactorConfig, account_balance: f64) -> Self {
        Self {
            config,
            account_balance,
        }
    }

    /// Attribute strategy returns across factor exposures.
    ///
    /// Returns an empty map when there are no closed trades; otherwise every
    /// factor appears, zero-attribution ones included.
    pub async fn analyze_factor_attribution(
        &self,
        trades: &[Trade],
        market_data: &MarketData,
    ) -> HashMap<String, f64> {
        let closed: Vec<&Trade> = trades.iter().filter(|t| t.is_closed()).collect();
        if closed.is_empty() {
            return HashMap::new();
        }

        let returns: Vec<f64> = closed
            .iter()
            .map(|t| t.return_fraction(self.account_balance))
            .collect();
        let exposures = self.exposure_series(&closed, market_data);
        if exposures.is_empty() {
            return HashMap::new();
        }

        let return_std = sample_std(&returns);
        let mut attribution: HashMap<String, f64> = HashMap::new();
        for (name, series) in &exposures {
            let corr = correlation(&returns, series);
            let value = corr * (&series[..]).mean() * return_std;
            attribution.insert(name.clone(), if value.is_finite() { value } else { 0.0 });
        }

        // Sum in sorted-name order: summing in HashMap iteration order would
        // let the divisor's float rounding vary from run to run
        let mut names: Vec<&String> = attribution.keys().collect();
        names.sort();
        let total: f64 = names.iter().map(|name| attribution[*name].abs()).sum();
        if total > 0.0 {
            for value in attribution.values_mut() {
                *value /= total;
            }
        }

        debug!(factors = attribution.len(), trades = closed.len(), "factor attribution computed");
        attribution
    }

    /// Pairwise correlations between factor exposure series
    pub async fn analyze_factor_correlation(
        &self,
        trades: &[Trade],
        market_data: &MarketData,
    ) -> Vec<FactorCorrelation> {
        let closed: Vec<&Trade> = trades.iter().filter(|t| t.is_closed()).collect();
        if closed.is_empty() {
            return Vec::new();
        }

        let exposures = self.exposure_series(&closed, market_data);
        let mut names: Vec<&String> = exposures.keys().collect();
        names.sort();

        let mut matrix = Vec::new();
        for (i, a) in names.iter().enumerate() {
            for b in names.iter().skip(i + 1) {
                matrix.push(FactorCorrelation {
                    factor_a: (*a).clone(),
                    factor_b: (*b).clone(),
                    correlation: correlation(&exposures[*a], &exposures[*b]),
                });
            }
        }
        matrix
    }

    /// One exposure value per factor per trade, aligned to the trade order
    fn exposure_series(
        &self,
        closed: &[&Trade],
        market_data: &MarketData,
    ) -> HashMap<String, Vec<f64>> {
        let mut series: HashMap<String, Vec<f64>> = HashMap::new();
        let n = closed.len();

        // Currency exposures from pair decomposition
        let currencies: BTreeSet<String> = closed
            .iter()
            .flat_map(|t| [t.pair.base().to_string(), t.pair.quote().to_string()])
            .filter(|c| !c.is_empty())
            .collect();
        for currency in &currencies {
            let mut values = Vec::with_capacity(n);
            for trade in closed {
                let sign = match trade.side {
                    Side::Buy => 1.0,
                    Side::Sell => -1.0,
                };
                let exposure = if trade.pair.base() == currency {
                    sign * trade.position_size
                } else if trade.pair.quote() == currency {
                    -sign * trade.position_size
                } else {
                    0.0
                };
                values.push(exposure);
            }
            series.insert(format!("currency_{currency}"), values);
        }

        // Style factors from candle windows ending at each trade
        let mut momentum = Vec::with_capacity(n);
        let mut volatility = Vec::with_capacity(n);
        let mut value_factor = Vec::with_capacity(n);
        for trade in closed {
            momentum.push(self.momentum_at(trade, market_data));
            volatility.push(self.volatility_at(trade, market_data));
            value_factor.push(self.value_at(trade, market_data));
        }
        series.insert("momentum".to_string(), momentum);
        series.insert("volatility".to_string(), volatility);
        series.insert("value".to_string(), value_factor);
        // Carry needs rate data the engine does not ingest yet
        series.insert("carry".to_string(), vec![0.0; n]);

        // Macro factors
        let mut sentiment = Vec::with_capacity(n);
        for trade in closed {
            sentiment.push(self.sentiment_proxy_at(trade, market_data));
        }
        series.insert("risk_sentiment".to_string(), sentiment);
        // Rate differential pending external economic data
        series.insert("rate_differential".to_string(), vec![0.0; n]);

        series
    }

    fn momentum_at(&self, trade: &Trade, market_data: &MarketData) -> f64 {
        let window = self.config.style_window;
        let Some(candles) =
            market_data.window_ending_at(&trade.pair, trade.entry_time, window + 1)
        else {
            return 0.0;
        };
        if candles.len() < 2 {
            return 0.0;
        }
        let first = candles[0].close;
        let last = candles[candles.len() - 1].close;
        if first == 0.0 {
            return 0.0;
        }
        (last - first) / first
    }

    fn volatility_at(&self, trade: &Trade, market_data: &MarketData) -> f64 {
        let window = self.config.style_window;
        let Some(candles) =
            market_data.window_ending_at(&trade.pair, trade.entry_time, window + 1)
        else {
            return 0.0;
        };
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        sample_std(&crate::indicators::returns(&closes))
    }

    /// Inverse position of price inside the long-window low/high range
    fn value_at(&self, trade: &Trade, market_data: &MarketData) -> f64 {
        let Some(candles) =
            market_data.window_ending_at(&trade.pair, trade.entry_time, self.config.value_window)
        else {
            return 0.0;
        };
        let Some(last) = candles.last() else {
            return 0.0;
        };
        let low = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let high = candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let range = high - low;
        if range <= 0.0 {
            return 0.5;
        }
        1.0 - (last.close - low) / range
    }

    /// Mean realized volatility across the major pairs around the trade
    fn sentiment_proxy_at(&self, trade: &Trade, market_data: &MarketData) -> f64 {
        let half = chrono::Duration::hours(self.config.sentiment_window_hours);
        let mut readings = Vec::new();
        for pair in self.config.major_pairs() {
            let candles =
                market_data.candles_between(&pair, trade.entry_time - half, trade.entry_time + half);
            if candles.len() < 3 {
                continue;
            }
            let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
            readings.push(sample_std(&crate::indicators::returns(&closes)));
        }
        if readings.is_empty() {
            0.0
        } else {
            readings.iter().sum::<f64>() / readings.len() as f64
        }
    }
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sd = (&values[..]).std_dev();
    if sd.is_finite() {
        sd
    } else {
        0.0
    }
}

/// Pearson correlation; zero when either series has no variance
fn correlation(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() != ys.len() || xs.len() < 2 {
        return 0.0;
    }
    let mean_x = (&xs[..]).mean();
    let mean_y = (&ys[..]).mean();
    let mut cov = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mean_x) * (y - mean_y);
    }
    cov /= (xs.len() - 1) as f64;

    let sx = sample_std(xs);
    let sy = sample_std(ys);
    if sx == 0.0 || sy == 0.0 {
        return 0.0;
    }
    (cov / (sx * sy)).clamp(-1.0, 1.0)
}
