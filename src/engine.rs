//! The public façade: one `Typingotchi` per player wires sessions, the pet and the
//! achievement engine together and keeps their records checkpointed.

use crate::accessory;
use crate::achievements::{Achievement, AchievementBook, AchievementEngine};
use crate::celebration::CelebrationEvent;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::content::{ContentItem, Difficulty};
use crate::error::{EngineError, Result};
use crate::history::SessionHistory;
use crate::journal::{self, BatchJournal};
use crate::metrics::{self, KeyErrorRate, KeypressEvent};
use crate::personal_best::PersonalBests;
use crate::pet::{
    EmotionalState, EvolutionCheck, EvolutionForm, PetState, PetStateMachine, PetTuning, Reaction,
};
use crate::progress::Progress;
use crate::session::{SessionPhase, SessionRecord, SessionSummary, SessionTracker};
use crate::store::{MemoryStore, SqliteStore, Store, StoreError, WriteBehind};
use crate::time_series::TrendPoint;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info, warn};

pub const PET_KEY: &str = "pet";
pub const ACHIEVEMENTS_KEY: &str = "achievements";
pub const PERSONAL_BESTS_KEY: &str = "personal_bests";
pub const PROGRESS_KEY: &str = "progress";
pub const KEY_STATS_KEY: &str = "key_stats";
pub const HISTORY_KEY: &str = "history";

/// Trailing window used to rate typing while a session is running.
const LIVE_WPM_WINDOW_MS: i64 = 10_000;
/// Performance assumed when there is nothing to measure yet.
const NEUTRAL_PERFORMANCE: f64 = 0.5;

/// What a single feed did, enough for a UI to pick an animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedingResult {
    pub word_accepted: bool,
    pub happiness_change: f64,
    pub new_emotional_state: EmotionalState,
    pub reaction: Option<Reaction>,
    /// The form the pet grew into, if this word made it evolve.
    pub evolution_triggered: Option<EvolutionForm>,
    pub celebration_queued: bool,
}

pub struct Typingotchi<C: Clock> {
    config: EngineConfig,
    clock: C,
    records: WriteBehind,
    tracker: SessionTracker<C>,
    difficulty: Option<Difficulty>,
    pet: PetStateMachine,
    achievements: AchievementEngine,
    progress: Progress,
    key_stats: BTreeMap<char, KeyErrorRate>,
    history: SessionHistory,
}

fn load_or_default<T: DeserializeOwned + Default>(records: &WriteBehind, key: &str) -> T {
    match records.load::<T>(key) {
        Ok(Some(record)) => record,
        Ok(None) => T::default(),
        Err(err) => {
            error!(key, error = %err, "unreadable record, starting from defaults");
            T::default()
        }
    }
}

fn stage<T: Serialize>(records: &mut WriteBehind, key: &str, record: &T) {
    if let Err(err) = records.stage(key, record) {
        error!(key, error = %err, "could not encode record");
    }
}

fn flush(records: &mut WriteBehind) {
    if let Err(err) = records.flush() {
        warn!(error = %err, pending = records.pending(), "checkpoint failed, will retry");
    }
}

impl Typingotchi<SystemClock> {
    /// Open (or create) the SQLite database at `path`, with a journal on its own connection.
    pub fn open_sqlite<P: AsRef<Path>>(
        path: P,
        config: EngineConfig,
    ) -> std::result::Result<Self, StoreError> {
        let store = SqliteStore::open(path.as_ref())?;
        let journal = BatchJournal::spawn(Box::new(SqliteStore::open(path.as_ref())?));
        Ok(Self::open(Box::new(store), Some(journal), config, SystemClock))
    }
}

impl<C: Clock> Typingotchi<C> {
    /// A throwaway engine backed by a [`MemoryStore`].
    pub fn in_memory(config: EngineConfig, clock: C) -> Self {
        let store = MemoryStore::new();
        let journal = BatchJournal::spawn(Box::new(store.clone()));
        Self::open(Box::new(store), Some(journal), config, clock)
    }

    /// Load every record from `store`. Missing or unreadable records start fresh, and a
    /// session interrupted by a crash is folded in as a partial one.
    pub fn open(
        store: Box<dyn Store>,
        journal: Option<BatchJournal>,
        config: EngineConfig,
        clock: C,
    ) -> Self {
        let records = WriteBehind::new(store);
        let tuning = PetTuning::from(&config);

        let pet = match records.load::<PetState>(PET_KEY) {
            Ok(Some(state)) => PetStateMachine::restore(state, tuning),
            Ok(None) => PetStateMachine::new(tuning),
            Err(err) => {
                error!(key = PET_KEY, error = %err, "unreadable pet, hatching a new one");
                PetStateMachine::new(tuning)
            }
        };
        let progress: Progress = load_or_default(&records, PROGRESS_KEY);
        let book: AchievementBook = load_or_default(&records, ACHIEVEMENTS_KEY);
        let bests: PersonalBests = load_or_default(&records, PERSONAL_BESTS_KEY);
        let key_stats = load_or_default(&records, KEY_STATS_KEY);
        let mut history: SessionHistory = load_or_default(&records, HISTORY_KEY);
        history.truncate(config.history_limit);

        let mut tracker = SessionTracker::new(clock.clone(), config.batch_size);
        if let Some(journal) = journal {
            tracker = tracker.with_journal(journal);
        }

        let mut engine = Self {
            achievements: AchievementEngine::new(book, bests, &progress),
            config,
            clock,
            records,
            tracker,
            difficulty: None,
            pet,
            progress,
            key_stats,
            history,
        };
        engine.reconcile_fed_words();
        engine.recover_interrupted();
        info!(
            sessions = engine.progress.total_sessions,
            form = %engine.pet.state().evolution_form,
            "typingotchi ready"
        );
        engine
    }

    fn recover_interrupted(&mut self) {
        let (record, batches) = match journal::recover(self.records.store()) {
            Ok(Some(found)) => found,
            Ok(None) => return,
            Err(err) => {
                error!(error = %err, "could not read the session journal");
                return;
            }
        };
        warn!(
            session = %record.id,
            keypresses = record.keypresses.len(),
            "recovering interrupted session"
        );

        if !record.keypresses.is_empty() {
            let previous = self.previous_baseline();
            let summary = SessionSummary::from_record(&record, previous.map(|(_, wpm)| wpm), true);
            self.complete_session(summary, &record, previous);
        }
        if let Err(err) = journal::clear(self.records.store(), &record.id, batches) {
            warn!(session = %record.id, error = %err, "could not clear recovered journal");
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session_phase(&self) -> SessionPhase {
        self.tracker.phase()
    }

    pub fn current_session(&self) -> Option<&SessionRecord> {
        self.tracker.record().filter(|_| self.tracker.phase() == SessionPhase::Active)
    }

    pub fn start_session(&mut self, content: &ContentItem) -> Result<&SessionRecord> {
        let record = self.tracker.start_session(&content.id)?;
        self.difficulty = Some(content.difficulty);
        Ok(record)
    }

    pub fn record_keypress(
        &mut self,
        key: char,
        correct: bool,
        timestamp_ms: i64,
    ) -> Result<KeypressEvent> {
        self.tracker.record_keypress(key, correct, timestamp_ms)
    }

    /// (accuracy, wpm) of the latest plausible session.
    fn previous_baseline(&self) -> Option<(f64, f64)> {
        self.history
            .previous_plausible(&self.config)
            .map(|s| (s.accuracy_pct, s.wpm))
    }

    pub fn end_session(&mut self) -> Result<SessionSummary> {
        let previous = self.previous_baseline();
        let summary = self
            .tracker
            .end_session(previous.map(|(_, wpm)| wpm))?
            .with_difficulty(self.difficulty.take());
        Ok(self.complete_ended(summary, previous))
    }

    /// Abandon the active session. Whatever was typed still counts, as a partial session.
    pub fn cancel_session(&mut self) -> Option<SessionSummary> {
        let previous = self.previous_baseline();
        let summary = self
            .tracker
            .cancel_session(previous.map(|(_, wpm)| wpm))?
            .with_difficulty(self.difficulty.take());
        if summary.total_chars == 0 {
            debug!(session = %summary.session_id, "cancelled before any keypress");
            return Some(summary);
        }
        Some(self.complete_ended(summary, previous))
    }

    fn complete_ended(
        &mut self,
        summary: SessionSummary,
        previous: Option<(f64, f64)>,
    ) -> SessionSummary {
        match self.tracker.record().cloned() {
            Some(record) => self.complete_session(summary, &record, previous),
            None => summary,
        }
    }

    /// Fold a finished session into progress, milestones, achievements, personal bests, the
    /// pet's mood, key stats and history, then checkpoint everything.
    fn complete_session(
        &mut self,
        summary: SessionSummary,
        record: &SessionRecord,
        previous: Option<(f64, f64)>,
    ) -> SessionSummary {
        // Streaks, bests and trends all date a session by the UTC day it started.
        let day = summary.started_at.date_naive();
        let now = self.clock.now();
        let plausible = self.config.is_plausible_wpm(summary.wpm);
        if !plausible {
            warn!(
                session = %summary.session_id,
                wpm = summary.wpm,
                "implausible WPM, left out of aggregates"
            );
        }
        let measured = plausible && !summary.partial;

        self.progress.record_session(&summary, day, plausible);
        let milestones = self.achievements.check_milestones(&self.progress);
        let summary = summary.with_milestones(milestones.iter().map(ToString::to_string).collect());
        self.achievements
            .check_achievements(&summary, &self.progress, &self.config, now);
        self.achievements
            .update_personal_bests(&summary, &self.progress, &self.config, day);

        if let (true, Some(previous)) = (measured, previous) {
            let delta = metrics::performance_delta(
                (summary.accuracy_pct, summary.wpm),
                previous,
                self.config.reference_wpm,
            );
            let change = self
                .pet
                .adjust_happiness(delta * self.config.session_happiness_swing, self.clock.now_ms());
            debug!(delta, change, "session mood adjustment");
        }

        for (key, rate) in metrics::key_error_rates(&record.keypresses) {
            self.key_stats.entry(key).or_default().merge(&rate);
        }
        self.history.push(summary.clone(), self.config.history_limit);
        self.checkpoint_all();
        summary
    }

    fn checkpoint_all(&mut self) {
        let records = &mut self.records;
        stage(records, PET_KEY, self.pet.state());
        stage(records, ACHIEVEMENTS_KEY, self.achievements.book());
        stage(records, PERSONAL_BESTS_KEY, self.achievements.personal_bests());
        stage(records, PROGRESS_KEY, &self.progress);
        stage(records, KEY_STATS_KEY, &self.key_stats);
        stage(records, HISTORY_KEY, &self.history);
        flush(records);
    }

    fn checkpoint_pet(&mut self) {
        if let Err(err) = self.records.checkpoint(PET_KEY, self.pet.state()) {
            warn!(
                key = PET_KEY,
                error = %err,
                pending = self.records.pending(),
                "checkpoint failed, will retry"
            );
        }
    }

    /// Stage the pet and the fed-words ledger without touching the store. They are written
    /// with the next checkpoint: session end, an accessory change, `flush` or drop.
    fn stage_fed(&mut self) {
        let fed = self.pet.state().words_fed_total;
        self.progress.words_fed = Some(fed);
        stage(&mut self.records, PET_KEY, self.pet.state());
        stage(&mut self.records, PROGRESS_KEY, &self.progress);
    }

    /// Cross-check the pet's word count against the ledger kept in progress. The two records
    /// are written separately, so a failed write can leave them apart.
    fn reconcile_fed_words(&mut self) {
        let fed = self.pet.state().words_fed_total;
        match self.progress.words_fed {
            Some(ledger) if ledger != fed => {
                warn!(pet = fed, ledger, "pet and progress disagree on words fed");
                if self.pet.reconcile_words(ledger).is_err() {
                    self.progress.words_fed = Some(fed);
                }
            }
            Some(_) => {}
            None => self.progress.words_fed = Some(fed),
        }
    }

    /// Accuracy-weighted score of the typing that is feeding the pet right now.
    fn current_performance(&self) -> f64 {
        let reference = self.config.reference_wpm;
        if let (Some(accuracy), Some(wpm)) = (
            self.tracker.live_accuracy(),
            self.tracker.live_wpm(LIVE_WPM_WINDOW_MS),
        ) {
            return metrics::performance_score(accuracy, wpm, reference);
        }
        self.history
            .latest()
            .map(|s| metrics::performance_score(s.accuracy_pct, s.wpm, reference))
            .unwrap_or(NEUTRAL_PERFORMANCE)
    }

    /// Feed one typed word to the pet. Any evolution it unlocks is committed immediately.
    pub fn feed(&mut self, word: &str, is_correct: bool) -> FeedingResult {
        let now_ms = self.clock.now_ms();
        let performance = self.current_performance();
        let outcome = self.pet.feed(word, is_correct, performance, now_ms);

        let mut evolution_triggered = None;
        let mut celebration_queued = false;
        if outcome.word_accepted {
            while self.pet.check_evolution_trigger().can_evolve {
                let from = self.pet.state().evolution_form;
                match self.pet.evolve_to_next_form() {
                    Ok(to) => {
                        evolution_triggered = Some(to);
                        let outcome = self.achievements.celebrate_evolution(from, to);
                        celebration_queued |= outcome.is_queued();
                    }
                    Err(err) => {
                        warn!(error = %err, "evolution refused");
                        break;
                    }
                }
            }
            self.stage_fed();
        }

        FeedingResult {
            word_accepted: outcome.word_accepted,
            happiness_change: outcome.happiness_change,
            new_emotional_state: outcome.emotional_state,
            reaction: outcome.reaction,
            evolution_triggered,
            celebration_queued,
        }
    }

    /// Put on an unlocked accessory, replacing whatever was worn in its category.
    pub fn equip_accessory(&mut self, accessory_id: &str) -> Result<Option<String>> {
        let accessory = accessory::find(accessory_id)
            .ok_or_else(|| EngineError::UnknownAccessory(accessory_id.to_string()))?;
        if !self.achievements.is_accessory_unlocked(accessory.id) {
            return Err(EngineError::AccessoryLocked(accessory_id.to_string()));
        }
        let previous = self.pet.equip(accessory.category, accessory.id);
        info!(
            accessory = accessory.id,
            category = %accessory.category,
            ?previous,
            "accessory equipped"
        );
        self.checkpoint_pet();
        Ok(previous)
    }

    /// Take an accessory off. Returns whether it was being worn.
    pub fn unequip_accessory(&mut self, accessory_id: &str) -> Result<bool> {
        let accessory = accessory::find(accessory_id)
            .ok_or_else(|| EngineError::UnknownAccessory(accessory_id.to_string()))?;
        let worn = self.pet.state().accessories_equipped.get(&accessory.category);
        if worn.map(String::as_str) != Some(accessory.id) {
            return Ok(false);
        }
        self.pet.unequip(accessory.category);
        info!(accessory = accessory.id, category = %accessory.category, "accessory removed");
        self.checkpoint_pet();
        Ok(true)
    }

    pub fn unlocked_accessories(&self) -> Vec<&'static accessory::Accessory> {
        accessory::ACCESSORIES
            .iter()
            .filter(|a| self.achievements.is_accessory_unlocked(a.id))
            .collect()
    }

    pub fn next_celebration(&self) -> Option<&CelebrationEvent> {
        self.achievements.queue().next_celebration()
    }

    pub fn mark_shown(&mut self, id: u64) -> Option<CelebrationEvent> {
        self.achievements.queue_mut().mark_shown(id)
    }

    pub fn take_celebration(&mut self) -> Option<CelebrationEvent> {
        self.achievements.queue_mut().take_next()
    }

    pub fn pending_celebrations(&self) -> usize {
        self.achievements.queue().len()
    }

    pub fn pet(&self) -> &PetState {
        self.pet.state()
    }

    pub fn mood(&self) -> EmotionalState {
        self.pet.emotional_state(self.clock.now_ms())
    }

    pub fn evolution_check(&self) -> EvolutionCheck {
        self.pet.check_evolution_trigger()
    }

    pub fn achievements(&self) -> Vec<Achievement> {
        self.achievements.achievements()
    }

    pub fn personal_bests(&self) -> &PersonalBests {
        self.achievements.personal_bests()
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    pub fn key_stats(&self) -> &BTreeMap<char, KeyErrorRate> {
        &self.key_stats
    }

    pub fn challenging_keys(&self) -> Vec<(char, KeyErrorRate)> {
        metrics::challenging_keys(
            &self.key_stats,
            self.config.min_key_attempts,
            self.config.challenging_error_rate,
        )
    }

    pub fn wpm_trend(&self) -> Vec<TrendPoint> {
        self.history.wpm_trend(&self.config)
    }

    pub fn accuracy_trend(&self) -> Vec<TrendPoint> {
        self.history.accuracy_trend(&self.config)
    }

    pub fn practice_time_trend(&self) -> Vec<TrendPoint> {
        self.history.practice_time_trend(&self.config)
    }

    /// Wait for the journal to drain and retry pending checkpoints.
    pub fn flush(&mut self) -> std::result::Result<(), StoreError> {
        if let Some(journal) = self.tracker.journal() {
            let stuck = journal.flush();
            if stuck > 0 {
                warn!(stuck, "journal writes still waiting for the store");
            }
        }
        self.records.flush()
    }
}

impl<C: Clock> Drop for Typingotchi<C> {
    fn drop(&mut self) {
        if self.records.pending() > 0 {
            flush(&mut self.records);
        }
    }
}
