use crate::clock::Clock;
use crate::content::Difficulty;
use crate::error::{EngineError, Result};
use crate::journal::{ActiveSession, BatchJournal};
use crate::metrics::{self, KeypressEvent};
use crate::util::percent_change;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum SessionPhase {
    Idle,
    Active,
    Ended,
}

/// Raw keypresses of one practice session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub content_id: String,
    pub started_at_ms: i64,
    pub keypresses: Vec<KeypressEvent>,
    pub ended_at_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub content_id: String,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub wpm: f64,
    pub accuracy_pct: f64,
    pub total_chars: usize,
    pub errors: usize,
    /// Std dev of correct characters per second.
    #[serde(default)]
    pub consistency: f64,
    /// Percent change against the previous session's WPM.
    pub improvement_from_prev: Option<f64>,
    #[serde(default)]
    pub milestones_achieved: Vec<String>,
    /// Synthesized from a cancelled or crashed session.
    #[serde(default)]
    pub partial: bool,
}

impl SessionSummary {
    /// Build a summary from a finished (or abandoned) record.
    pub fn from_record(record: &SessionRecord, previous_wpm: Option<f64>, partial: bool) -> Self {
        let keys = &record.keypresses;
        let wpm = metrics::compute_wpm(keys, None);
        let errors = keys.iter().filter(|k| !k.correct).count();
        let ended_at_ms = record.ended_at_ms.unwrap_or(record.started_at_ms);

        Self {
            session_id: record.id.clone(),
            content_id: record.content_id.clone(),
            difficulty: None,
            started_at: DateTime::from_timestamp_millis(record.started_at_ms).unwrap_or_default(),
            duration_ms: ended_at_ms.saturating_sub(record.started_at_ms).max(0),
            wpm,
            accuracy_pct: metrics::compute_accuracy(keys),
            total_chars: keys.len(),
            errors,
            consistency: metrics::consistency(keys),
            improvement_from_prev: previous_wpm.and_then(|prev| percent_change(prev, wpm)),
            milestones_achieved: Vec::new(),
            partial,
        }
    }

    /// Standard words (5 characters) typed correctly.
    pub fn words(&self) -> u64 {
        ((self.total_chars - self.errors) as f64 / metrics::CHARS_PER_WORD) as u64
    }

    pub fn with_difficulty(mut self, difficulty: Option<Difficulty>) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_milestones(mut self, milestones: Vec<String>) -> Self {
        self.milestones_achieved = milestones;
        self
    }
}

fn new_session_id(started_at_ms: i64) -> String {
    let salt: u16 = rand::thread_rng().gen();
    format!("{started_at_ms:x}-{salt:04x}")
}

/// Owns the lifecycle of one practice session at a time.
pub struct SessionTracker<C: Clock> {
    clock: C,
    phase: SessionPhase,
    record: Option<SessionRecord>,
    batch_size: usize,
    pending: Vec<KeypressEvent>,
    batches_sent: usize,
    correct: usize,
    journal: Option<BatchJournal>,
}

impl<C: Clock> SessionTracker<C> {
    pub fn new(clock: C, batch_size: usize) -> Self {
        Self {
            clock,
            phase: SessionPhase::Idle,
            record: None,
            batch_size: batch_size.max(1),
            pending: Vec::new(),
            batches_sent: 0,
            correct: 0,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: BatchJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn record(&self) -> Option<&SessionRecord> {
        self.record.as_ref()
    }

    pub fn journal(&self) -> Option<&BatchJournal> {
        self.journal.as_ref()
    }

    pub fn start_session(&mut self, content_id: &str) -> Result<&SessionRecord> {
        if self.phase == SessionPhase::Active {
            return Err(EngineError::InvalidState {
                operation: "start_session",
                phase: self.phase,
            });
        }

        let started_at_ms = self.clock.now_ms();
        let record = SessionRecord {
            id: new_session_id(started_at_ms),
            content_id: content_id.to_string(),
            started_at_ms,
            keypresses: Vec::new(),
            ended_at_ms: None,
        };
        if let Some(journal) = &self.journal {
            journal.begin(ActiveSession {
                session_id: record.id.clone(),
                content_id: record.content_id.clone(),
                started_at_ms,
            });
        }
        info!(session = %record.id, content = content_id, "session started");

        self.pending.clear();
        self.batches_sent = 0;
        self.correct = 0;
        self.phase = SessionPhase::Active;
        Ok(self.record.insert(record))
    }

    /// Append a keypress. A timestamp that goes backwards is replaced by a local one so the
    /// session can carry on.
    pub fn record_keypress(
        &mut self,
        key: char,
        correct: bool,
        timestamp_ms: i64,
    ) -> Result<KeypressEvent> {
        let phase = self.phase;
        let record = match (phase, self.record.as_mut()) {
            (SessionPhase::Active, Some(record)) => record,
            _ => {
                return Err(EngineError::InvalidState {
                    operation: "record_keypress",
                    phase,
                })
            }
        };

        let previous = record.keypresses.last().map(|k| k.timestamp_ms);
        let timestamp_ms = match previous {
            Some(previous) if timestamp_ms < previous => {
                let err = EngineError::TimestampInvalid {
                    got: timestamp_ms,
                    previous,
                };
                warn!(session = %record.id, error = %err, "substituting local timestamp");
                self.clock.now_ms().max(previous)
            }
            None if timestamp_ms < 0 => {
                let err = EngineError::TimestampInvalid {
                    got: timestamp_ms,
                    previous: 0,
                };
                warn!(session = %record.id, error = %err, "substituting local timestamp");
                self.clock.now_ms().max(0)
            }
            _ => timestamp_ms,
        };

        let event = KeypressEvent::new(key, correct, timestamp_ms);
        record.keypresses.push(event);
        if correct {
            self.correct += 1;
        }

        self.pending.push(event);
        if self.pending.len() >= self.batch_size {
            self.hand_off_batch();
        }
        Ok(event)
    }

    fn hand_off_batch(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        if let (Some(journal), Some(record)) = (&self.journal, &self.record) {
            journal.append(&record.id, self.batches_sent, batch);
            self.batches_sent += 1;
        }
    }

    /// Close the active session and summarize it.
    pub fn end_session(&mut self, previous_wpm: Option<f64>) -> Result<SessionSummary> {
        self.finish(previous_wpm, false)
            .ok_or(EngineError::InvalidState {
                operation: "end_session",
                phase: self.phase,
            })
    }

    /// Best-effort summary of whatever was typed, for sessions abandoned part way.
    pub fn cancel_session(&mut self, previous_wpm: Option<f64>) -> Option<SessionSummary> {
        self.finish(previous_wpm, true)
    }

    fn finish(&mut self, previous_wpm: Option<f64>, partial: bool) -> Option<SessionSummary> {
        if self.phase != SessionPhase::Active {
            return None;
        }
        self.hand_off_batch();
        let now = self.clock.now_ms();
        let record = self.record.as_mut()?;
        self.phase = SessionPhase::Ended;

        let last_key = record.keypresses.last().map(|k| k.timestamp_ms).unwrap_or(now);
        record.ended_at_ms = Some(now.max(last_key));

        if let Some(journal) = &self.journal {
            journal.finish(&record.id, self.batches_sent);
        }

        let summary = SessionSummary::from_record(record, previous_wpm, partial);
        info!(
            session = %summary.session_id,
            wpm = summary.wpm,
            accuracy = summary.accuracy_pct,
            partial,
            "session ended"
        );
        Some(summary)
    }

    /// Accuracy of the active session so far.
    pub fn live_accuracy(&self) -> Option<f64> {
        let record = self.record.as_ref().filter(|_| self.phase == SessionPhase::Active)?;
        let total = record.keypresses.len();
        (total > 0).then(|| self.correct as f64 * 100.0 / total as f64)
    }

    /// WPM over the trailing `window_ms` of the active session.
    pub fn live_wpm(&self, window_ms: i64) -> Option<f64> {
        let record = self.record.as_ref().filter(|_| self.phase == SessionPhase::Active)?;
        Some(metrics::compute_wpm(&record.keypresses, Some(window_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;

    fn tracker(clock: &ManualClock) -> SessionTracker<ManualClock> {
        SessionTracker::new(clock.clone(), 4)
    }

    #[test]
    fn lifecycle_idle_active_ended() {
        let clock = ManualClock::new(10_000);
        let mut t = tracker(&clock);
        assert_eq!(t.phase(), SessionPhase::Idle);

        let id = t.start_session("story-1").unwrap().id.clone();
        assert_eq!(t.phase(), SessionPhase::Active);

        t.record_keypress('h', true, 10_000).unwrap();
        t.record_keypress('i', true, 10_500).unwrap();
        clock.advance(1_000);

        let summary = t.end_session(None).unwrap();
        assert_eq!(t.phase(), SessionPhase::Ended);
        assert_eq!(summary.session_id, id);
        assert_eq!(summary.content_id, "story-1");
        assert_eq!(summary.total_chars, 2);
        assert_eq!(summary.duration_ms, 1_000);
        assert_eq!(summary.improvement_from_prev, None);
        assert!(!summary.partial);
    }

    #[test]
    fn keypress_outside_active_is_invalid_state() {
        let clock = ManualClock::new(0);
        let mut t = tracker(&clock);
        assert_matches!(
            t.record_keypress('a', true, 0),
            Err(EngineError::InvalidState { phase: SessionPhase::Idle, .. })
        );

        t.start_session("c").unwrap();
        t.end_session(None).unwrap();
        assert_matches!(
            t.record_keypress('a', true, 0),
            Err(EngineError::InvalidState { phase: SessionPhase::Ended, .. })
        );
    }

    #[test]
    fn second_end_is_invalid_state() {
        let clock = ManualClock::new(0);
        let mut t = tracker(&clock);
        t.start_session("c").unwrap();
        t.end_session(None).unwrap();
        assert_matches!(
            t.end_session(None),
            Err(EngineError::InvalidState { operation: "end_session", .. })
        );
    }

    #[test]
    fn cannot_start_twice_but_can_restart_after_end() {
        let clock = ManualClock::new(0);
        let mut t = tracker(&clock);
        t.start_session("a").unwrap();
        assert_matches!(t.start_session("b"), Err(EngineError::InvalidState { .. }));
        t.end_session(None).unwrap();
        assert_eq!(t.start_session("b").unwrap().content_id, "b");
    }

    #[test]
    fn backwards_timestamp_is_replaced() {
        let clock = ManualClock::new(5_000);
        let mut t = tracker(&clock);
        t.start_session("c").unwrap();
        t.record_keypress('a', true, 4_000).unwrap();
        let fixed = t.record_keypress('b', true, 3_000).unwrap();
        assert_eq!(fixed.timestamp_ms, 5_000);

        clock.set(1_000);
        let fixed = t.record_keypress('c', true, 10).unwrap();
        assert_eq!(fixed.timestamp_ms, 5_000);

        let keys = &t.record().unwrap().keypresses;
        assert!(keys.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
    }

    #[test]
    fn negative_first_timestamp_is_replaced() {
        let clock = ManualClock::new(7_000);
        let mut t = tracker(&clock);
        t.start_session("c").unwrap();
        assert_eq!(t.record_keypress('a', true, -5).unwrap().timestamp_ms, 7_000);
    }

    #[test]
    fn improvement_against_previous_wpm() {
        let clock = ManualClock::new(0);
        let mut t = tracker(&clock);
        t.start_session("c").unwrap();
        // 25 correct chars over 30s = 10 wpm
        for i in 0..25 {
            t.record_keypress('a', true, i * 1_250).unwrap();
        }
        clock.set(30_000);
        let summary = t.end_session(Some(8.0)).unwrap();
        assert_eq!(summary.wpm, 10.0);
        assert_eq!(summary.improvement_from_prev, Some(25.0));
        assert_eq!(summary.words(), 5);
    }

    #[test]
    fn cancel_synthesizes_partial_summary() {
        let clock = ManualClock::new(0);
        let mut t = tracker(&clock);
        assert!(t.cancel_session(None).is_none());

        t.start_session("c").unwrap();
        t.record_keypress('a', true, 0).unwrap();
        t.record_keypress('b', false, 100).unwrap();
        let summary = t.cancel_session(None).unwrap();
        assert!(summary.partial);
        assert_eq!(summary.total_chars, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.accuracy_pct, 50.0);
        assert_eq!(t.phase(), SessionPhase::Ended);
    }

    #[test]
    fn live_accuracy_tracks_counters() {
        let clock = ManualClock::new(0);
        let mut t = tracker(&clock);
        assert_eq!(t.live_accuracy(), None);
        t.start_session("c").unwrap();
        assert_eq!(t.live_accuracy(), None);
        t.record_keypress('a', true, 0).unwrap();
        t.record_keypress('a', true, 10).unwrap();
        t.record_keypress('a', false, 20).unwrap();
        t.record_keypress('a', true, 30).unwrap();
        assert_eq!(t.live_accuracy(), Some(75.0));
    }

    #[test]
    fn batches_are_journaled_every_n_keypresses() {
        let clock = ManualClock::new(0);
        let store = MemoryStore::new();
        let journal = BatchJournal::spawn(Box::new(store.clone()));
        let mut t = SessionTracker::new(clock.clone(), 4).with_journal(journal);

        let id = t.start_session("c").unwrap().id.clone();
        for i in 0..9 {
            t.record_keypress('a', true, i * 100).unwrap();
        }
        t.journal().unwrap().flush();
        let (recovered, batches) = crate::journal::recover(&store).unwrap().unwrap();
        assert_eq!(recovered.id, id);
        assert_eq!(batches, 2);
        // the ninth keypress is still in the partial batch
        assert_eq!(recovered.keypresses.len(), 8);

        t.end_session(None).unwrap();
        t.journal().unwrap().flush();
        assert!(store.keys().is_empty());
    }
}
