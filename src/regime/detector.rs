//! Market regime detector
//!
//! Gathers recent candle history per pair, runs the sub-analyses
//! concurrently, and synthesizes a regime classification with confidence.
//! Detection never fails outward: when no usable history can be gathered the
//! detector reports a well-formed UNCERTAIN result instead.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

use crate::calendar::{EventCalendar, SyntheticCalendar};
use crate::config::DetectorConfig;
use crate::data::CandleSource;
use crate::regime::signals::{self, MarketCondition, TrendRead, VolatilityRead};
use crate::types::{
    Candle, CurrencyPair, MarketRegime, RegimeDetectionResult, RiskSentiment, Timeframe,
    VolatilityLevel,
};

/// Inputs to the regime synthesis rule, aggregated across pairs
#[derive(Debug, Clone, Copy)]
pub(crate) struct SynthesisInputs {
    pub is_trending: bool,
    pub market_confidence: f64,
    pub volatility_level: VolatilityLevel,
    pub volatility_confidence: f64,
    /// Unsigned trend strength in [0, 1]; 0.5 reads as ambiguous
    pub trend_strength: f64,
    pub sentiment_score: f64,
}

/// Combine the sub-analysis reads into (regime, sentiment, confidence).
///
/// Trending/ranging and the volatility split set the base regime; an
/// ambiguous trend strength overrides everything to TRANSITION. Confidence
/// weights: trend 0.3, volatility 0.25, market condition 0.25, sentiment 0.2.
pub(crate) fn synthesize(
    inputs: &SynthesisInputs,
    config: &DetectorConfig,
) -> (MarketRegime, RiskSentiment, f64) {
    let base = match (inputs.is_trending, inputs.volatility_level.is_elevated()) {
        (true, true) => MarketRegime::TrendingHighVol,
        (true, false) => MarketRegime::TrendingLowVol,
        (false, true) => MarketRegime::RangingHighVol,
        (false, false) => MarketRegime::RangingLowVol,
    };

    let regime = if inputs.trend_strength >= config.transition_band_low
        && inputs.trend_strength <= config.transition_band_high
    {
        MarketRegime::Transition
    } else {
        base
    };

    let sentiment = if inputs.sentiment_score > config.risk_on_threshold {
        RiskSentiment::RiskOn
    } else if inputs.sentiment_score < config.risk_off_threshold {
        RiskSentiment::RiskOff
    } else {
        RiskSentiment::Neutral
    };

    let trend_conf = ((inputs.trend_strength - 0.5).abs() * 2.0).clamp(0.0, 1.0);
    let sentiment_conf = ((inputs.sentiment_score - 0.5).abs() * 2.0).clamp(0.0, 1.0);
    let confidence = (0.3 * trend_conf
        + 0.25 * inputs.volatility_confidence
        + 0.25 * inputs.market_confidence
        + 0.2 * sentiment_conf)
        .clamp(0.0, 1.0);

    (regime, sentiment, confidence)
}

/// Stateful regime detector with a bounded in-memory history
pub struct RegimeDetector {
    config: DetectorConfig,
    calendar: Box<dyn EventCalendar>,
    current_regime: Option<MarketRegime>,
    regime_start: Option<DateTime<Utc>>,
    history: VecDeque<RegimeDetectionResult>,
}

impl RegimeDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self::with_calendar(config, Box::new(SyntheticCalendar::default()))
    }

    pub fn with_calendar(config: DetectorConfig, calendar: Box<dyn EventCalendar>) -> Self {
        Self {
            config,
            calendar,
            current_regime: None,
            regime_start: None,
            history: VecDeque::new(),
        }
    }

    /// Classify the current market regime across the given pairs.
    ///
    /// The evaluation time is the latest gathered candle timestamp, keeping
    /// repeated calls over frozen data identical.
    pub async fn detect_current_regime(
        &mut self,
        source: &dyn CandleSource,
        pairs: &[CurrencyPair],
        timeframe: Timeframe,
    ) -> RegimeDetectionResult {
        let bars = timeframe.bars_for_hours(self.config.lookback_hours);

        let mut series: HashMap<CurrencyPair, Vec<Candle>> = HashMap::new();
        for pair in pairs {
            match source.recent_candles(pair, timeframe, bars) {
                Ok(candles) if !candles.is_empty() => {
                    series.insert(pair.clone(), candles);
                }
                Ok(_) => debug!(%pair, "no candles returned, skipping pair"),
                Err(e) => warn!(%pair, error = %e, "candle fetch failed, skipping pair"),
            }
        }

        if series.is_empty() {
            warn!("no candle history available, reporting UNCERTAIN");
            let now = Utc::now();
            return self.finish(
                now,
                MarketRegime::Uncertain,
                RiskSentiment::Neutral,
                0.0,
                0.0,
                VolatilityLevel::Medium,
                HashMap::new(),
            );
        }

        let now = series
            .values()
            .filter_map(|candles| candles.last())
            .map(|c| c.datetime)
            .max()
            .unwrap_or_else(Utc::now);

        let window = Duration::hours(self.config.event_window_hours.max(0));
        let events = self.calendar.events_between(now - window, now + window);

        let config = &self.config;
        let (market, volatility, trend, sentiment_score, event_impact) = tokio::join!(
            async { aggregate_market(&series, config) },
            async { aggregate_volatility(&series, config) },
            async { aggregate_trend(&series, config) },
            async { signals::risk_sentiment(&series) },
            async { signals::event_proximity(now, &events, config.event_window_hours) },
        );

        let inputs = SynthesisInputs {
            is_trending: market.is_trending,
            market_confidence: market.confidence,
            volatility_level: volatility.level,
            volatility_confidence: volatility.confidence,
            trend_strength: trend.strength,
            sentiment_score,
        };
        let (regime, sentiment, confidence) = synthesize(&inputs, &self.config);

        debug!(
            %regime,
            confidence,
            trend_strength = trend.strength,
            atr_ratio = volatility.atr_ratio,
            sentiment_score,
            event_impact,
            "regime synthesis"
        );

        let contributing_factors = HashMap::from([
            ("trend_strength".to_string(), trend.strength),
            ("volatility_ratio".to_string(), volatility.atr_ratio),
            ("sentiment_score".to_string(), sentiment_score),
            ("event_impact".to_string(), event_impact),
        ]);

        self.finish(
            now,
            regime,
            sentiment,
            confidence,
            trend.direction * trend.strength,
            volatility.level,
            contributing_factors,
        )
    }

    /// Update transition state, build the result, and record it in history
    #[allow(clippy::too_many_arguments)]
    fn finish(
        &mut self,
        now: DateTime<Utc>,
        regime: MarketRegime,
        sentiment: RiskSentiment,
        confidence: f64,
        trend_strength: f64,
        volatility_level: VolatilityLevel,
        contributing_factors: HashMap<String, f64>,
    ) -> RegimeDetectionResult {
        if self.current_regime != Some(regime) {
            match self.current_regime {
                Some(previous) => {
                    info!(from = %previous, to = %regime, confidence, "market regime transition")
                }
                None => info!(%regime, confidence, "initial market regime"),
            }
            self.current_regime = Some(regime);
            self.regime_start = Some(now);
        }

        let regime_start_time = self.regime_start.unwrap_or(now);
        let result = RegimeDetectionResult {
            timestamp: now,
            regime,
            confidence: confidence.clamp(0.0, 1.0),
            trend_strength: trend_strength.clamp(-1.0, 1.0),
            volatility_level,
            risk_sentiment: sentiment,
            regime_start_time,
            regime_duration_hours: (now - regime_start_time).num_hours(),
            contributing_factors,
            next_evaluation: now + Duration::hours(self.config.evaluation_interval_hours),
        };

        if self.history.len() >= self.config.history_limit.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(result.clone());
        result
    }

    pub fn current_regime(&self) -> Option<MarketRegime> {
        self.current_regime
    }

    /// How long the current regime has held, in hours
    pub fn regime_duration(&self, now: DateTime<Utc>) -> i64 {
        self.regime_start
            .map(|start| (now - start).num_hours())
            .unwrap_or(0)
    }

    /// Recorded detections, oldest first, bounded by the configured limit
    pub fn history(&self) -> impl Iterator<Item = &RegimeDetectionResult> {
        self.history.iter()
    }
}

fn aggregate_market(
    series: &HashMap<CurrencyPair, Vec<Candle>>,
    config: &DetectorConfig,
) -> MarketCondition {
    let reads: Vec<MarketCondition> = series
        .values()
        .map(|candles| signals::market_condition(candles, config))
        .collect();
    if reads.is_empty() {
        return MarketCondition {
            is_trending: false,
            confidence: 0.0,
        };
    }
    let trending = reads.iter().filter(|r| r.is_trending).count();
    MarketCondition {
        is_trending: trending * 2 > reads.len(),
        confidence: reads.iter().map(|r| r.confidence).sum::<f64>() / reads.len() as f64,
    }
}

fn aggregate_volatility(
    series: &HashMap<CurrencyPair, Vec<Candle>>,
    config: &DetectorConfig,
) -> VolatilityRead {
    let reads: Vec<VolatilityRead> = series
        .values()
        .map(|candles| signals::volatility_read(candles, config))
        .collect();
    if reads.is_empty() {
        return VolatilityRead {
            level: VolatilityLevel::Medium,
            confidence: 0.0,
            atr_ratio: 1.0,
        };
    }
    let atr_ratio = reads.iter().map(|r| r.atr_ratio).sum::<f64>() / reads.len() as f64;
    VolatilityRead {
        level: signals::classify_ratio(atr_ratio, config),
        confidence: reads.iter().map(|r| r.confidence).sum::<f64>() / reads.len() as f64,
        atr_ratio,
    }
}

fn aggregate_trend(
    series: &HashMap<CurrencyPair, Vec<Candle>>,
    config: &DetectorConfig,
) -> TrendRead {
    let reads: Vec<TrendRead> = series
        .values()
        .map(|candles| signals::trend_read(candles, config))
        .collect();
    if reads.is_empty() {
        return TrendRead {
            strength: 0.5,
            direction: 0.0,
        };
    }
    let strength = reads.iter().map(|r| r.strength).sum::<f64>() / reads.len() as f64;
    let signed = reads.iter().map(|r| r.direction * r.strength).sum::<f64>() / reads.len() as f64;
    TrendRead {
        strength,
        direction: if signed > 0.0 {
            1.0
        } else if signed < 0.0 {
            -1.0
        } else {
            0.0
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{synthetic_candles, MarketData};
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn cfg() -> DetectorConfig {
        DetectorConfig::default()
    }

    fn inputs(trend_strength: f64) -> SynthesisInputs {
        SynthesisInputs {
            is_trending: true,
            market_confidence: 0.6,
            volatility_level: VolatilityLevel::High,
            volatility_confidence: 0.8,
            trend_strength,
            sentiment_score: 0.9,
        }
    }

    #[test]
    fn test_ambiguous_trend_strength_forces_transition() {
        for strength in [0.3, 0.5, 0.7] {
            let (regime, _, _) = synthesize(&inputs(strength), &cfg());
            assert_eq!(regime, MarketRegime::Transition, "strength {strength}");
        }
    }

    #[test]
    fn test_strong_trend_keeps_base_regime() {
        let (regime, sentiment, _) = synthesize(&inputs(0.9), &cfg());
        assert_eq!(regime, MarketRegime::TrendingHighVol);
        assert_eq!(sentiment, RiskSentiment::RiskOn);

        let mut quiet = inputs(0.1);
        quiet.is_trending = false;
        quiet.volatility_level = VolatilityLevel::Low;
        quiet.sentiment_score = 0.2;
        let (regime, sentiment, _) = synthesize(&quiet, &cfg());
        assert_eq!(regime, MarketRegime::RangingLowVol);
        assert_eq!(sentiment, RiskSentiment::RiskOff);
    }

    #[test]
    fn test_confidence_weighting() {
        // trend_conf = |1.0-0.5|*2 = 1, sentiment_conf = |0.9-0.5|*2 = 0.8
        let (_, _, confidence) = synthesize(&inputs(1.0), &cfg());
        assert_relative_eq!(
            confidence,
            0.3 * 1.0 + 0.25 * 0.8 + 0.25 * 0.6 + 0.2 * 0.8,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_confidence_is_clamped() {
        let mut maxed = inputs(1.0);
        maxed.volatility_confidence = 1.0;
        maxed.market_confidence = 1.0;
        maxed.sentiment_score = 1.0;
        let (_, _, confidence) = synthesize(&maxed, &cfg());
        assert!(confidence <= 1.0);
        assert!(confidence >= 0.0);
    }

    #[tokio::test]
    async fn test_missing_data_reports_uncertain() {
        let mut detector = RegimeDetector::new(cfg());
        let data = MarketData::new(Timeframe::H4);
        let result = detector
            .detect_current_regime(&data, &[CurrencyPair::new("EURUSD")], Timeframe::H4)
            .await;
        assert_eq!(result.regime, MarketRegime::Uncertain);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.risk_sentiment, RiskSentiment::Neutral);
        assert_eq!(detector.current_regime(), Some(MarketRegime::Uncertain));
    }

    #[tokio::test]
    async fn test_detection_is_repeatable_over_frozen_data() {
        let pair = CurrencyPair::new("EURUSD");
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut data = MarketData::new(Timeframe::H4);
        data.insert(
            pair.clone(),
            synthetic_candles(&pair, Timeframe::H4, start, 300, Some(11)),
        );

        let mut detector = RegimeDetector::new(cfg());
        let first = detector
            .detect_current_regime(&data, &[pair.clone()], Timeframe::H4)
            .await;
        let second = detector
            .detect_current_regime(&data, &[pair], Timeframe::H4)
            .await;

        assert_eq!(first.regime, second.regime);
        assert_eq!(first.confidence, second.confidence);
        assert_eq!(first.trend_strength, second.trend_strength);
        // Same evaluation timestamp, so the regime clock does not advance
        assert_eq!(second.regime_duration_hours, 0);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let pair = CurrencyPair::new("EURUSD");
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut data = MarketData::new(Timeframe::H4);
        data.insert(
            pair.clone(),
            synthetic_candles(&pair, Timeframe::H4, start, 250, Some(3)),
        );

        let mut config = cfg();
        config.history_limit = 3;
        let mut detector = RegimeDetector::new(config);
        for _ in 0..5 {
            detector
                .detect_current_regime(&data, std::slice::from_ref(&pair), Timeframe::H4)
                .await;
        }
        assert_eq!(detector.history().count(), 3);
    }
}
