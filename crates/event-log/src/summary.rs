//! Driving score summary over recent log entries

use chrono::{Days, NaiveDate, NaiveTime};
use sensors::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::LogEntry;

/// Days covered by the published summary
pub const SUMMARY_DAYS: u64 = 30;

/// Points deducted per logged event on a day
const PENALTY_PER_EVENT: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyScore {
    /// `YYYY-MM-DD`
    pub date: String,
    pub score: u32,
    /// Day of month
    pub day: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub sudden_stop: usize,
    pub sudden_acceleration: usize,
    pub drowsiness: usize,
}

/// Summary served to the report screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSummary {
    pub total_events: usize,
    pub drowsiness_count: usize,
    pub sudden_acceleration_count: usize,
    pub sudden_stop_count: usize,
    pub monthly_score: u32,
    pub daily_scores: Vec<DailyScore>,
    pub event_counts: EventCounts,
}

impl Default for LogSummary {
    fn default() -> Self {
        Self {
            total_events: 0,
            drowsiness_count: 0,
            sudden_acceleration_count: 0,
            sudden_stop_count: 0,
            monthly_score: 100,
            daily_scores: Vec::new(),
            event_counts: EventCounts::default(),
        }
    }
}

fn window_start(today: NaiveDate, days: u64) -> NaiveDate {
    today.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

/// Earliest timestamp [`summarize`] can count for `today`
pub fn summary_cutoff(today: NaiveDate, days: u64) -> Timestamp {
    window_start(today, days).and_time(NaiveTime::MIN).and_utc()
}

/// Summarize entries dated from `today - days` through `today` inclusive
///
/// Program start/quit markers are not driving events and are left out.
/// Only days with at least one event get a daily score; the monthly score is
/// the truncated mean of those, or 100 with no events.
pub fn summarize(entries: &[LogEntry], today: NaiveDate, days: u64) -> LogSummary {
    let start = window_start(today, days);

    let mut per_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    let mut counts = EventCounts::default();
    let mut total = 0;

    for entry in entries {
        let date = entry.at.date_naive();
        if date < start || date > today || entry.is_lifecycle() {
            continue;
        }
        total += 1;
        *per_day.entry(date).or_default() += 1;
        match entry.label().as_str() {
            "drowsiness" => counts.drowsiness += 1,
            "sudden_acceleration" => counts.sudden_acceleration += 1,
            "sudden_stop" => counts.sudden_stop += 1,
            _ => {}
        }
    }

    let daily_scores: Vec<DailyScore> = per_day
        .iter()
        .map(|(date, events)| DailyScore {
            date: date.format("%Y-%m-%d").to_string(),
            score: 100u32.saturating_sub(events.saturating_mul(PENALTY_PER_EVENT)),
            day: chrono::Datelike::day(date),
        })
        .collect();

    let monthly_score = if daily_scores.is_empty() {
        100
    } else {
        daily_scores.iter().map(|d| d.score).sum::<u32>() / daily_scores.len() as u32
    };

    LogSummary {
        total_events: total,
        drowsiness_count: counts.drowsiness,
        sudden_acceleration_count: counts.sudden_acceleration,
        sudden_stop_count: counts.sudden_stop,
        monthly_score,
        daily_scores,
        event_counts: counts,
    }
}
