use crate::config::EngineConfig;
use crate::metrics::{self, trend};
use crate::session::SessionSummary;
use crate::time_series::TrendPoint;
use crate::util::mean;
use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// The most recent session summaries, oldest first.
///
/// Every session is kept verbatim; sessions with an implausible speed are left out of every
/// trend, and partial ones out of the speed and accuracy trends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHistory {
    sessions: VecDeque<SessionSummary>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &SessionSummary> {
        self.sessions.iter()
    }

    pub fn latest(&self) -> Option<&SessionSummary> {
        self.sessions.back()
    }

    pub fn push(&mut self, summary: SessionSummary, limit: usize) {
        self.sessions.push_back(summary);
        self.truncate(limit);
    }

    /// Drop the oldest entries beyond `limit` (at least one is always kept).
    pub fn truncate(&mut self, limit: usize) {
        while self.sessions.len() > limit.max(1) {
            self.sessions.pop_front();
        }
    }

    /// The latest complete session with a plausible speed; the baseline for comparisons.
    pub fn previous_plausible(&self, config: &EngineConfig) -> Option<&SessionSummary> {
        self.sessions.iter().rev().find(|s| counts_for_speed(s, config))
    }

    fn per_day(
        &self,
        keep: impl Fn(&SessionSummary) -> bool,
        value: impl Fn(&SessionSummary) -> f64,
    ) -> Vec<(NaiveDate, Vec<f64>)> {
        let days = self
            .sessions
            .iter()
            .filter(|s| keep(s))
            .sorted_by_key(|s| s.started_at)
            .chunk_by(|s| s.started_at.date_naive());
        let grouped = days
            .into_iter()
            .map(|(day, sessions)| (day, sessions.map(&value).collect()))
            .collect();
        grouped
    }

    /// Mean WPM per day over plausible sessions.
    pub fn wpm_trend(&self, config: &EngineConfig) -> Vec<TrendPoint> {
        let series = daily_means(self.per_day(|s| counts_for_speed(s, config), |s| s.wpm));
        trend(&series, config.trend_window)
    }

    /// Mean accuracy per day over plausible sessions long enough to measure it.
    pub fn accuracy_trend(&self, config: &EngineConfig) -> Vec<TrendPoint> {
        let series = daily_means(self.per_day(
            |s| counts_for_speed(s, config) && s.total_chars >= config.min_chars_for_accuracy,
            |s| s.accuracy_pct,
        ));
        trend(&series, config.trend_window)
    }

    /// Minutes practised per day, partial sessions included.
    pub fn practice_time_trend(&self, config: &EngineConfig) -> Vec<TrendPoint> {
        let series: Vec<(NaiveDate, f64)> = self
            .per_day(
                |s| config.is_plausible_wpm(s.wpm),
                |s| s.duration_ms as f64 / 60_000.0,
            )
            .into_iter()
            .map(|(day, minutes)| (day, minutes.iter().sum()))
            .collect();
        trend(&series, config.trend_window)
    }
}

fn counts_for_speed(summary: &SessionSummary, config: &EngineConfig) -> bool {
    !summary.partial && metrics::is_plausible_wpm(summary.wpm, config.wpm_floor, config.wpm_ceiling)
}

fn daily_means(days: Vec<(NaiveDate, Vec<f64>)>) -> Vec<(NaiveDate, f64)> {
    days.into_iter()
        .filter_map(|(day, values)| mean(&values).map(|m| (day, m)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    const DAY_MS: i64 = 86_400_000;

    fn session(day: i64, wpm: f64, accuracy_pct: f64, duration_ms: i64) -> SessionSummary {
        SessionSummary {
            session_id: format!("s{day}-{wpm}"),
            content_id: "c".into(),
            difficulty: None,
            started_at: DateTime::<Utc>::from_timestamp_millis(day * DAY_MS + 3_600_000).unwrap(),
            duration_ms,
            wpm,
            accuracy_pct,
            total_chars: 100,
            errors: 0,
            consistency: 0.0,
            improvement_from_prev: None,
            milestones_achieved: vec![],
            partial: false,
        }
    }

    #[test]
    fn bounded_to_limit() {
        let mut h = SessionHistory::new();
        for day in 0..5 {
            h.push(session(day, 20.0, 90.0, 60_000), 3);
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.iter().next().unwrap().session_id, "s2-20");
    }

    #[test]
    fn previous_plausible_skips_anomalies() {
        let cfg = EngineConfig::default();
        let mut h = SessionHistory::new();
        assert!(h.previous_plausible(&cfg).is_none());
        h.push(session(0, 25.0, 90.0, 60_000), 10);
        h.push(session(1, 900.0, 90.0, 60_000), 10);
        let mut partial = session(2, 40.0, 90.0, 60_000);
        partial.partial = true;
        h.push(partial, 10);
        assert_eq!(h.previous_plausible(&cfg).map(|s| s.wpm), Some(25.0));
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn wpm_trend_averages_per_day_and_excludes_implausible() {
        let cfg = EngineConfig {
            trend_window: 2,
            ..EngineConfig::default()
        };
        let mut h = SessionHistory::new();
        h.push(session(0, 20.0, 90.0, 60_000), 10);
        h.push(session(0, 30.0, 90.0, 60_000), 10);
        h.push(session(1, 500.0, 90.0, 60_000), 10);
        h.push(session(2, 35.0, 90.0, 60_000), 10);

        let points = h.wpm_trend(&cfg);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value, 25.0);
        assert_eq!(points[1].value, 35.0);
        assert_eq!(points[1].moving_average, 30.0);
        assert_eq!(points[1].date, NaiveDate::from_ymd_opt(1970, 1, 3).unwrap());
    }

    #[test]
    fn practice_time_sums_per_day() {
        let mut h = SessionHistory::new();
        h.push(session(0, 20.0, 90.0, 60_000), 10);
        let mut partial = session(0, 30.0, 90.0, 120_000);
        partial.partial = true;
        h.push(partial, 10);
        h.push(session(0, 900.0, 90.0, 600_000), 10);
        h.push(session(1, 20.0, 90.0, 30_000), 10);
        let points = h.practice_time_trend(&EngineConfig::default());
        assert_eq!(points.iter().map(|p| p.value).collect::<Vec<_>>(), vec![3.0, 0.5]);
    }

    #[test]
    fn implausible_session_is_kept_but_left_out_of_every_trend() {
        let cfg = EngineConfig::default();
        let mut h = SessionHistory::new();
        h.push(session(0, 350.0, 100.0, 60_000), 10);
        assert!(h.wpm_trend(&cfg).is_empty());
        assert!(h.accuracy_trend(&cfg).is_empty());
        assert!(h.practice_time_trend(&cfg).is_empty());
        assert_eq!(h.len(), 1);

        h.push(session(1, 30.0, 95.0, 60_000), 10);
        assert_eq!(h.accuracy_trend(&cfg).len(), 1);
        assert_eq!(h.practice_time_trend(&cfg)[0].value, 1.0);
    }

    #[test]
    fn accuracy_trend_needs_enough_characters() {
        let mut h = SessionHistory::new();
        let mut short = session(0, 20.0, 50.0, 60_000);
        short.total_chars = 5;
        h.push(short, 10);
        h.push(session(0, 20.0, 96.0, 60_000), 10);
        let points = h.accuracy_trend(&EngineConfig::default());
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 96.0);
    }

    #[test]
    fn serializes_as_plain_list() {
        let mut h = SessionHistory::new();
        h.push(session(0, 20.0, 90.0, 60_000), 10);
        let json = serde_json::to_value(&h).unwrap();
        assert!(json.is_array());
        let back: SessionHistory = serde_json::from_value(json).unwrap();
        assert_eq!(back, h);
    }
}
