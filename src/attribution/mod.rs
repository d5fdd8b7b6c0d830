//! Performance attribution
//!
//! Decomposes a strategy's trade history into regime, factor, economic
//! event, and session buckets, and merges the views into one report.

pub mod economic;
pub mod engine;
pub mod factor;
pub mod regime_perf;
pub mod session;

pub use engine::{AttributionError, PerformanceAttributionEngine};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::calendar::EconomicEventType;
use crate::types::{MarketRegime, PerformanceMetrics};

/// Inclusive time range an attribution run covered
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Whole-run attribution report; read-only once produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionResult {
    pub timestamp: DateTime<Utc>,
    pub analysis_period: AnalysisPeriod,
    pub overall_performance: PerformanceMetrics,
    pub regime_attribution: HashMap<MarketRegime, PerformanceMetrics>,
    /// Performance inside volatility-spike transition windows vs overall
    pub transition_performance: Option<regime_perf::TransitionPerformance>,
    pub factor_attribution: HashMap<String, f64>,
    pub economic_impact: HashMap<EconomicEventType, f64>,
    pub session_attribution: HashMap<String, session::SessionPerformance>,
    pub weekend_gap: session::WeekendGapAnalysis,
    pub session_transitions: HashMap<String, PerformanceMetrics>,
    pub optimization_recommendations: Vec<String>,
}
