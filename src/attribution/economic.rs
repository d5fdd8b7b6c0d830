//! Economic event impact analysis
//!
//! Scores each scheduled event type by comparing trade outcomes in the
//! windows immediately before and after its releases.

use chrono::Duration;
use std::collections::HashMap;
use tracing::debug;

use crate::calendar::{EconomicEventType, EventCalendar, SyntheticCalendar};
use crate::config::EventConfig;
use crate::types::Trade;

/// Trade outcomes inside one side of an event window
#[derive(Debug, Clone, Copy, Default)]
struct WindowStats {
    total_pnl: f64,
    win_rate: f64,
    trades: usize,
}

impl WindowStats {
    fn from_trades(trades: &[&Trade]) -> Self {
        if trades.is_empty() {
            return Self::default();
        }
        let total_pnl: f64 = trades.iter().filter_map(|t| t.pnl).sum();
        let wins = trades
            .iter()
            .filter(|t| t.pnl.is_some_and(|p| p > 0.0))
            .count();
        Self {
            total_pnl,
            win_rate: wins as f64 / trades.len() as f64,
            trades: trades.len(),
        }
    }
}

pub struct EconomicEventAnalyzer {
    config: EventConfig,
    calendar: Box<dyn EventCalendar>,
}

impl EconomicEventAnalyzer {
    pub fn new(config: EventConfig) -> Self {
        let calendar = SyntheticCalendar::new(config.fomc_interval_weeks);
        Self::with_calendar(config, Box::new(calendar))
    }

    pub fn with_calendar(config: EventConfig, calendar: Box<dyn EventCalendar>) -> Self {
        Self { config, calendar }
    }

    /// Average impact per event type across the releases inside the trade
    /// span.
    ///
    /// Impact for one release weighs the PnL shift per trade at 0.7 against
    /// the win-rate shift at 0.3. Releases with no trades in either window
    /// stay out of the average; a type whose releases all scored no trades
    /// reports zero impact.
    pub async fn analyze_economic_impact(
        &self,
        trades: &[Trade],
    ) -> HashMap<EconomicEventType, f64> {
        let closed: Vec<&Trade> = trades.iter().filter(|t| t.is_closed()).collect();
        if closed.is_empty() {
            return HashMap::new();
        }

        let window = Duration::hours(self.config.impact_window_hours);
        let span_start = closed.iter().map(|t| t.entry_time).min();
        let span_end = closed
            .iter()
            .map(|t| t.exit_time.unwrap_or(t.entry_time))
            .max();
        let (Some(start), Some(end)) = (span_start, span_end) else {
            return HashMap::new();
        };

        let events = self.calendar.events_between(start, end);
        debug!(events = events.len(), trades = closed.len(), "scoring economic events");

        let mut sums: HashMap<EconomicEventType, (f64, usize)> = HashMap::new();
        for event in &events {
            let pre: Vec<&Trade> = closed
                .iter()
                .copied()
                .filter(|t| t.entry_time >= event.timestamp - window && t.entry_time < event.timestamp)
                .collect();
            let post: Vec<&Trade> = closed
                .iter()
                .copied()
                .filter(|t| t.entry_time >= event.timestamp && t.entry_time <= event.timestamp + window)
                .collect();

            let pre_stats = WindowStats::from_trades(&pre);
            let post_stats = WindowStats::from_trades(&post);
            // Seeding the entry keeps unscored types in the result at zero
            let entry = sums.entry(event.event_type).or_insert((0.0, 0));

            let scored = pre_stats.trades + post_stats.trades;
            if scored == 0 {
                continue;
            }

            let impact = 0.7 * (post_stats.total_pnl - pre_stats.total_pnl) / scored as f64
                + 0.3 * (post_stats.win_rate - pre_stats.win_rate);
            entry.0 += impact;
            entry.1 += 1;
        }

        sums.into_iter()
            .map(|(event_type, (sum, count))| {
                let impact = if count > 0 { sum / count as f64 } else { 0.0 };
                (event_type, impact)
            })
            .collect()
    }

    /// Position-sizing guidance per scored event type
    pub fn recommendations(&self, impact: &HashMap<EconomicEventType, f64>) -> Vec<String> {
        let mut scored: Vec<(&EconomicEventType, &f64)> = impact.iter().collect();
        scored.sort_by_key(|(event_type, _)| event_type.as_str());

        let mut recommendations = Vec::new();
        for (event_type, value) in scored {
            if *value > self.config.increase_threshold {
                recommendations.push(format!(
                    "Performance improves after {} releases (impact {:+.2}); consider increasing position sizes in the post-event window",
                    event_type.as_str(),
                    value
                ));
            } else if *value < self.config.reduce_threshold {
                recommendations.push(format!(
                    "Performance degrades around {} releases (impact {:+.2}); reduce exposure inside the event window",
                    event_type.as_str(),
                    value
                ));
            }
        }
        recommendations
    }
}
