use crate::session::SessionSummary;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Running totals across every session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub total_sessions: u32,
    pub total_words: u64,
    pub total_practice_ms: i64,
    pub streak_days: u32,
    pub last_practice_date: Option<NaiveDate>,
    /// Best WPM among sessions that passed the plausibility guard.
    pub best_wpm: f64,
    /// Words fed to the pet, mirrored here so the pet record can be cross-checked on load.
    /// Absent in records written before the ledger existed.
    #[serde(default)]
    pub words_fed: Option<u64>,
}

impl Progress {
    /// Fold a finished session in. A session whose speed is implausible has an untrustworthy
    /// clock, so its duration is not added to practice time and its WPM never becomes the best.
    pub fn record_session(
        &mut self,
        summary: &SessionSummary,
        today: NaiveDate,
        plausible_wpm: bool,
    ) {
        self.total_sessions = self.total_sessions.saturating_add(1);
        self.total_words = self.total_words.saturating_add(summary.words());
        if plausible_wpm {
            let duration_ms = summary.duration_ms.max(0);
            self.total_practice_ms = self.total_practice_ms.saturating_add(duration_ms);
        }

        self.streak_days = match self.last_practice_date {
            Some(last) if last == today => self.streak_days.max(1),
            Some(last) if last.succ_opt() == Some(today) => self.streak_days + 1,
            _ => 1,
        };
        self.last_practice_date = Some(today);

        if plausible_wpm && !summary.partial && summary.wpm > self.best_wpm {
            self.best_wpm = summary.wpm;
        }
    }

    pub fn practice_minutes(&self) -> u64 {
        (self.total_practice_ms.max(0) / 60_000) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRecord;
    use crate::metrics::KeypressEvent;

    fn summary(chars: usize, wpm_span_ms: i64) -> SessionSummary {
        let keypresses: Vec<KeypressEvent> = (0..chars)
            .map(|i| KeypressEvent::new('a', true, i as i64 * wpm_span_ms / (chars as i64 - 1)))
            .collect();
        SessionSummary::from_record(
            &SessionRecord {
                id: "s".into(),
                content_id: "c".into(),
                started_at_ms: 0,
                ended_at_ms: Some(wpm_span_ms),
                keypresses,
            },
            None,
            false,
        )
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn totals_accumulate() {
        let mut p = Progress::default();
        p.record_session(&summary(50, 60_000), day(1), true);
        p.record_session(&summary(100, 60_000), day(1), true);
        assert_eq!(p.total_sessions, 2);
        assert_eq!(p.total_words, 30);
        assert_eq!(p.practice_minutes(), 2);
        assert_eq!(p.best_wpm, 20.0);
    }

    #[test]
    fn streak_extends_on_consecutive_days_and_resets_on_gap() {
        let mut p = Progress::default();
        let s = summary(10, 10_000);
        p.record_session(&s, day(1), true);
        assert_eq!(p.streak_days, 1);
        p.record_session(&s, day(1), true);
        assert_eq!(p.streak_days, 1);
        p.record_session(&s, day(2), true);
        p.record_session(&s, day(3), true);
        assert_eq!(p.streak_days, 3);
        p.record_session(&s, day(5), true);
        assert_eq!(p.streak_days, 1);
    }

    #[test]
    fn implausible_wpm_does_not_set_best() {
        let mut p = Progress::default();
        p.record_session(&summary(50, 60_000), day(1), false);
        assert_eq!(p.best_wpm, 0.0);
    }

    #[test]
    fn implausible_sessions_add_no_practice_time() {
        let mut p = Progress::default();
        let mut runaway = summary(50, 60_000);
        runaway.duration_ms = i64::MAX - 1_000;
        p.record_session(&runaway, day(1), false);
        p.record_session(&runaway, day(1), false);
        assert_eq!(p.total_sessions, 2);
        assert_eq!(p.total_practice_ms, 0);

        p.total_practice_ms = i64::MAX - 10;
        p.record_session(&summary(50, 60_000), day(1), true);
        assert_eq!(p.total_practice_ms, i64::MAX);
    }

    #[test]
    fn partial_sessions_count_time_but_not_best_wpm() {
        let mut p = Progress::default();
        let mut partial = summary(50, 60_000);
        partial.partial = true;
        p.record_session(&partial, day(1), true);
        assert_eq!(p.practice_minutes(), 1);
        assert_eq!(p.best_wpm, 0.0);
    }
}
