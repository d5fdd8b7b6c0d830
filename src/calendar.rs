//! Economic event calendar
//!
//! Release schedules for the macro events the engine studies. The synthetic
//! calendar reconstructs timestamps from the published cadences; a real feed
//! can replace it behind the trait.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Macro release kinds the engine tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EconomicEventType {
    NonFarmPayrolls,
    CpiRelease,
    FomcDecision,
    EcbDecision,
}

impl EconomicEventType {
    pub const ALL: [EconomicEventType; 4] = [
        EconomicEventType::NonFarmPayrolls,
        EconomicEventType::CpiRelease,
        EconomicEventType::FomcDecision,
        EconomicEventType::EcbDecision,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EconomicEventType::NonFarmPayrolls => "NON_FARM_PAYROLLS",
            EconomicEventType::CpiRelease => "CPI_RELEASE",
            EconomicEventType::FomcDecision => "FOMC_DECISION",
            EconomicEventType::EcbDecision => "ECB_DECISION",
        }
    }

    /// Currency whose pairs the release moves hardest
    pub fn currency(&self) -> &'static str {
        match self {
            EconomicEventType::EcbDecision => "EUR",
            _ => "USD",
        }
    }
}

impl std::fmt::Display for EconomicEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A scheduled release instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicEvent {
    pub event_type: EconomicEventType,
    pub timestamp: DateTime<Utc>,
}

/// Source of scheduled releases
pub trait EventCalendar: Send + Sync {
    /// Events scheduled inside [start, end], ordered by time
    fn events_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<EconomicEvent>;
}

/// Calendar synthesized from published release cadences:
/// NFP on the first Friday of the month, CPI on the 10th, FOMC decisions on
/// a six-week cycle, ECB decisions on the first Thursday.
#[derive(Debug, Clone)]
pub struct SyntheticCalendar {
    fomc_interval_weeks: i64,
}

/// 2024-01-31 decision, the fixed point the six-week FOMC cycle steps from.
/// Anchoring to a real date keeps the schedule identical across query ranges.
const FOMC_ANCHOR: (i32, u32, u32) = (2024, 1, 31);

const NFP_HOUR: (u32, u32) = (13, 30);
const CPI_HOUR: (u32, u32) = (13, 30);
const FOMC_HOUR: (u32, u32) = (19, 0);
const ECB_HOUR: (u32, u32) = (12, 45);

impl SyntheticCalendar {
    pub fn new(fomc_interval_weeks: i64) -> Self {
        Self {
            fomc_interval_weeks: fomc_interval_weeks.max(1),
        }
    }
}

impl Default for SyntheticCalendar {
    fn default() -> Self {
        Self::new(6)
    }
}

impl EventCalendar for SyntheticCalendar {
    fn events_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<EconomicEvent> {
        let mut events = Vec::new();
        if start > end {
            return events;
        }

        // Monthly releases
        let mut month_cursor =
            NaiveDate::from_ymd_opt(start.year(), start.month(), 1).unwrap_or_default();
        let last_month = NaiveDate::from_ymd_opt(end.year(), end.month(), 1).unwrap_or_default();
        while month_cursor <= last_month {
            let year = month_cursor.year();
            let month = month_cursor.month();

            if let Some(day) = first_weekday_of_month(year, month, Weekday::Fri) {
                events.push(EconomicEvent {
                    event_type: EconomicEventType::NonFarmPayrolls,
                    timestamp: at_time(day, NFP_HOUR),
                });
            }
            events.push(EconomicEvent {
                event_type: EconomicEventType::CpiRelease,
                timestamp: at_time(clamped_day(year, month, 10), CPI_HOUR),
            });
            if let Some(day) = first_weekday_of_month(year, month, Weekday::Thu) {
                events.push(EconomicEvent {
                    event_type: EconomicEventType::EcbDecision,
                    timestamp: at_time(day, ECB_HOUR),
                });
            }

            month_cursor = match month_cursor.checked_add_months(Months::new(1)) {
                Some(next) => next,
                None => break,
            };
        }

        // FOMC cycle, stepped out from the fixed anchor
        let anchor = at_time(
            NaiveDate::from_ymd_opt(FOMC_ANCHOR.0, FOMC_ANCHOR.1, FOMC_ANCHOR.2)
                .unwrap_or_default(),
            FOMC_HOUR,
        );
        let interval = Duration::weeks(self.fomc_interval_weeks);
        let steps_to_start = (start - anchor).num_weeks().div_euclid(self.fomc_interval_weeks);
        let mut fomc = anchor + interval * steps_to_start as i32;
        while fomc >= start + interval {
            fomc -= interval;
        }
        while fomc <= end {
            if fomc >= start {
                events.push(EconomicEvent {
                    event_type: EconomicEventType::FomcDecision,
                    timestamp: fomc,
                });
            }
            fomc += interval;
        }

        events.retain(|e| e.timestamp >= start && e.timestamp <= end);
        events.sort_by_key(|e| e.timestamp);
        events
    }
}

fn first_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    (1..=7).find_map(|day| {
        NaiveDate::from_ymd_opt(year, month, day).filter(|d| d.weekday() == weekday)
    })
}

/// Day-of-month clamped to the month's length
fn clamped_day(year: i32, month: u32, day: u32) -> NaiveDate {
    (0..4)
        .filter_map(|back| NaiveDate::from_ymd_opt(year, month, day.saturating_sub(back).max(1)))
        .next()
        .unwrap_or_default()
}

fn at_time(date: NaiveDate, (hour, minute): (u32, u32)) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(hour, minute, 0).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn range(y1: i32, m1: u32, d1: u32, y2: i32, m2: u32, d2: u32) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(y1, m1, d1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(y2, m2, d2, 23, 59, 59).unwrap(),
        )
    }

    #[test]
    fn test_nfp_lands_on_first_friday() {
        let calendar = SyntheticCalendar::default();
        let (start, end) = range(2024, 3, 1, 2024, 3, 31);
        let events = calendar.events_between(start, end);
        let nfp = events
            .iter()
            .find(|e| e.event_type == EconomicEventType::NonFarmPayrolls)
            .unwrap();
        assert_eq!(nfp.timestamp.day(), 1);
        assert_eq!(nfp.timestamp.weekday(), Weekday::Fri);
        assert_eq!(nfp.timestamp.hour(), 13);
    }

    #[test]
    fn test_ecb_lands_on_first_thursday() {
        let calendar = SyntheticCalendar::default();
        let (start, end) = range(2024, 3, 1, 2024, 3, 31);
        let events = calendar.events_between(start, end);
        let ecb = events
            .iter()
            .find(|e| e.event_type == EconomicEventType::EcbDecision)
            .unwrap();
        assert_eq!(ecb.timestamp.day(), 7);
        assert_eq!(ecb.timestamp.weekday(), Weekday::Thu);
    }

    #[test]
    fn test_cpi_on_the_tenth() {
        let calendar = SyntheticCalendar::default();
        let (start, end) = range(2024, 2, 1, 2024, 2, 29);
        let events = calendar.events_between(start, end);
        let cpi = events
            .iter()
            .find(|e| e.event_type == EconomicEventType::CpiRelease)
            .unwrap();
        assert_eq!(cpi.timestamp.day(), 10);
    }

    #[test]
    fn test_fomc_cycle_spacing() {
        let calendar = SyntheticCalendar::default();
        let (start, end) = range(2024, 1, 1, 2024, 12, 31);
        let fomc: Vec<_> = calendar
            .events_between(start, end)
            .into_iter()
            .filter(|e| e.event_type == EconomicEventType::FomcDecision)
            .collect();
        assert!(fomc.len() >= 8, "a year holds at least eight six-week cycles");
        for pair in fomc.windows(2) {
            assert_eq!((pair[1].timestamp - pair[0].timestamp).num_days(), 42);
        }
        assert!(fomc.iter().any(|e| e.timestamp.day() == 31 && e.timestamp.month() == 1));
    }

    #[test]
    fn test_events_respect_bounds_and_order() {
        let calendar = SyntheticCalendar::default();
        let (start, end) = range(2024, 3, 5, 2024, 4, 20);
        let events = calendar.events_between(start, end);
        assert!(!events.is_empty());
        for pair in events.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        assert!(events.iter().all(|e| e.timestamp >= start && e.timestamp <= end));
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let calendar = SyntheticCalendar::default();
        let (start, end) = range(2024, 3, 1, 2024, 3, 31);
        assert!(calendar.events_between(end, start).is_empty());
    }
}
