//! Trading session attribution
//!
//! Buckets trades into the major forex sessions by UTC entry hour, scores
//! the hand-off windows between sessions, and measures weekend gap exposure.
//! The Asian session wraps midnight, so its window test differs from the
//! daytime sessions.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::metrics::metrics_for_trades;
use crate::types::{CurrencyPair, PerformanceMetrics, Trade};

/// UTC session windows as [start, end) hours; Asian wraps midnight
const SESSIONS: [(&str, u32, u32); 4] = [
    ("asian", 21, 6),
    ("european", 7, 16),
    ("american", 13, 22),
    ("london_ny_overlap", 13, 16),
];

/// Inclusive UTC hour ranges around each session hand-off
const TRANSITIONS: [(&str, u32, u32); 3] = [
    ("asian_to_european", 6, 8),
    ("european_to_american", 12, 14),
    ("american_to_asian", 21, 23),
];

/// Session-level trade statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPerformance {
    pub metrics: PerformanceMetrics,
    pub total_pnl: f64,
    pub best_pair: Option<CurrencyPair>,
    pub worst_pair: Option<CurrencyPair>,
}

/// Weekend-spanning trades against the weekday-only baseline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeekendGapAnalysis {
    pub weekend_affected: PerformanceMetrics,
    pub weekday_only: PerformanceMetrics,
    pub weekend_affected_trades: usize,
    pub avg_pnl_delta: f64,
    pub win_rate_delta: f64,
}

pub struct SessionAnalyzer {
    account_balance: f64,
}

impl SessionAnalyzer {
    pub fn new(account_balance: f64) -> Self {
        Self { account_balance }
    }

    /// Per-session performance keyed by session name.
    ///
    /// A trade lands in every session whose window covers its entry hour,
    /// so the London/New York overlap double-counts by construction.
    /// Sessions with no trades are omitted.
    pub async fn analyze_session_performance(
        &self,
        trades: &[Trade],
    ) -> HashMap<String, SessionPerformance> {
        let closed: Vec<&Trade> = trades.iter().filter(|t| t.is_closed()).collect();
        let mut attribution = HashMap::new();

        for (name, start, end) in SESSIONS {
            let members: Vec<&Trade> = closed
                .iter()
                .copied()
                .filter(|t| in_window(t.entry_time.hour(), start, end))
                .collect();
            if members.is_empty() {
                continue;
            }

            let total_pnl: f64 = members.iter().filter_map(|t| t.pnl).sum();
            let (best_pair, worst_pair) = pair_extremes(&members);
            attribution.insert(
                name.to_string(),
                SessionPerformance {
                    metrics: metrics_for_trades(&members, self.account_balance),
                    total_pnl,
                    best_pair,
                    worst_pair,
                },
            );
        }

        debug!(sessions = attribution.len(), trades = closed.len(), "session attribution computed");
        attribution
    }

    /// Performance inside the hand-off hours between consecutive sessions
    pub async fn analyze_session_transitions(
        &self,
        trades: &[Trade],
    ) -> HashMap<String, PerformanceMetrics> {
        let closed: Vec<&Trade> = trades.iter().filter(|t| t.is_closed()).collect();
        let mut transitions = HashMap::new();

        for (name, first, last) in TRANSITIONS {
            let members: Vec<&Trade> = closed
                .iter()
                .copied()
                .filter(|t| {
                    let hour = t.entry_time.hour();
                    hour >= first && hour <= last
                })
                .collect();
            if members.is_empty() {
                continue;
            }
            transitions.insert(
                name.to_string(),
                metrics_for_trades(&members, self.account_balance),
            );
        }

        transitions
    }

    /// Compare trades whose holding period touches a weekend against the rest
    pub async fn analyze_weekend_gaps(&self, trades: &[Trade]) -> WeekendGapAnalysis {
        let closed: Vec<&Trade> = trades.iter().filter(|t| t.is_closed()).collect();
        let (affected, unaffected): (Vec<&Trade>, Vec<&Trade>) = closed
            .iter()
            .copied()
            .partition(|t| touches_weekend(t.entry_time, t.exit_time.unwrap_or(t.entry_time)));

        let avg_pnl = |group: &[&Trade]| -> f64 {
            if group.is_empty() {
                return 0.0;
            }
            group.iter().filter_map(|t| t.pnl).sum::<f64>() / group.len() as f64
        };

        let weekend_affected = metrics_for_trades(&affected, self.account_balance);
        let weekday_only = metrics_for_trades(&unaffected, self.account_balance);
        WeekendGapAnalysis {
            avg_pnl_delta: avg_pnl(&affected) - avg_pnl(&unaffected),
            win_rate_delta: weekend_affected.win_rate - weekday_only.win_rate,
            weekend_affected_trades: affected.len(),
            weekend_affected,
            weekday_only,
        }
    }
}

/// Wrapping-aware window test over UTC hours
fn in_window(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// Any calendar day from entry through exit inclusive falling on Sat/Sun
fn touches_weekend(entry: DateTime<Utc>, exit: DateTime<Utc>) -> bool {
    let mut day = entry.date_naive();
    let last = exit.date_naive().max(day);
    while day <= last {
        if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            return true;
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    false
}

/// Pairs with the highest and lowest summed PnL inside one session
fn pair_extremes(trades: &[&Trade]) -> (Option<CurrencyPair>, Option<CurrencyPair>) {
    let mut by_pair: HashMap<&CurrencyPair, f64> = HashMap::new();
    for trade in trades {
        if let Some(pnl) = trade.pnl {
            *by_pair.entry(&trade.pair).or_insert(0.0) += pnl;
        }
    }

    let best = by_pair
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(pair, _)| (*pair).clone());
    let worst = by_pair
        .iter()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(pair, _)| (*pair).clone());
    (best, worst)
}
