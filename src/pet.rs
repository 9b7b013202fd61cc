//! The Typingotchi itself: happiness, mood and evolution.

use crate::accessory::AccessoryCategory;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info};

/// Growth stages, in order. Evolution only ever moves forward one step at a time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    strum_macros::Display,
)]
pub enum EvolutionForm {
    Egg,
    Baby,
    Child,
    Teen,
    Adult,
}

impl EvolutionForm {
    pub const ALL: [EvolutionForm; 5] = [
        EvolutionForm::Egg,
        EvolutionForm::Baby,
        EvolutionForm::Child,
        EvolutionForm::Teen,
        EvolutionForm::Adult,
    ];

    /// Words fed needed to reach this form.
    pub fn threshold(self) -> u64 {
        match self {
            EvolutionForm::Egg => 0,
            EvolutionForm::Baby => 100,
            EvolutionForm::Child => 500,
            EvolutionForm::Teen => 1_500,
            EvolutionForm::Adult => 5_000,
        }
    }

    pub fn next(self) -> Option<EvolutionForm> {
        match self {
            EvolutionForm::Egg => Some(EvolutionForm::Baby),
            EvolutionForm::Baby => Some(EvolutionForm::Child),
            EvolutionForm::Child => Some(EvolutionForm::Teen),
            EvolutionForm::Teen => Some(EvolutionForm::Adult),
            EvolutionForm::Adult => None,
        }
    }

    /// The most advanced form a words total qualifies for.
    pub fn for_words(words: u64) -> EvolutionForm {
        Self::ALL
            .into_iter()
            .rev()
            .find(|form| words >= form.threshold())
            .unwrap_or(EvolutionForm::Egg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum EmotionalState {
    Ecstatic,
    Happy,
    Neutral,
    Sad,
    Distressed,
}

impl EmotionalState {
    pub fn from_happiness(happiness: f64) -> Self {
        match happiness {
            h if h >= 85.0 => EmotionalState::Ecstatic,
            h if h >= 65.0 => EmotionalState::Happy,
            h if h >= 40.0 => EmotionalState::Neutral,
            h if h >= 20.0 => EmotionalState::Sad,
            _ => EmotionalState::Distressed,
        }
    }
}

/// Animation cue for a single feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum Reaction {
    Eating,
    Sad,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetState {
    pub happiness: f64,
    pub emotional_state: EmotionalState,
    pub evolution_form: EvolutionForm,
    pub words_fed_total: u64,
    #[serde(default)]
    pub accessories_equipped: BTreeMap<AccessoryCategory, String>,
    #[serde(default)]
    pub sad_until_ms: Option<i64>,
}

impl Default for PetState {
    fn default() -> Self {
        Self {
            happiness: 50.0,
            emotional_state: EmotionalState::Neutral,
            evolution_form: EvolutionForm::Egg,
            words_fed_total: 0,
            accessories_equipped: BTreeMap::new(),
            sad_until_ms: None,
        }
    }
}

impl PetState {
    /// Check the invariants a loaded record must hold.
    pub fn validate(&self) -> Result<()> {
        if !self.happiness.is_finite() || !(0.0..=100.0).contains(&self.happiness) {
            return Err(EngineError::StateCorruption(format!(
                "happiness {} outside 0-100",
                self.happiness
            )));
        }
        let earned = EvolutionForm::for_words(self.words_fed_total);
        if self.evolution_form > earned {
            return Err(EngineError::StateCorruption(format!(
                "{} requires {} words but only {} were fed",
                self.evolution_form,
                self.evolution_form.threshold(),
                self.words_fed_total
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PetTuning {
    pub min_feed_gain: f64,
    pub max_feed_gain: f64,
    pub incorrect_penalty: f64,
    pub sad_pulse_ms: i64,
}

impl Default for PetTuning {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for PetTuning {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            min_feed_gain: cfg.min_feed_gain,
            max_feed_gain: cfg.max_feed_gain,
            incorrect_penalty: cfg.incorrect_penalty,
            sad_pulse_ms: cfg.sad_pulse_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedOutcome {
    pub word_accepted: bool,
    pub happiness_change: f64,
    pub reaction: Option<Reaction>,
    pub emotional_state: EmotionalState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EvolutionCheck {
    pub can_evolve: bool,
    pub words_remaining: u64,
    pub current_form: EvolutionForm,
    pub next_form: Option<EvolutionForm>,
}

#[derive(Debug, Clone)]
pub struct PetStateMachine {
    state: PetState,
    tuning: PetTuning,
}

impl PetStateMachine {
    pub fn new(tuning: PetTuning) -> Self {
        Self {
            state: PetState::default(),
            tuning,
        }
    }

    /// Adopt a loaded record, falling back to a fresh pet if it breaks an invariant.
    pub fn restore(state: PetState, tuning: PetTuning) -> Self {
        match state.validate() {
            Ok(()) => Self { state, tuning },
            Err(err) => {
                error!(error = %err, "resetting pet to defaults");
                Self::new(tuning)
            }
        }
    }

    pub fn state(&self) -> &PetState {
        &self.state
    }

    fn set_happiness(&mut self, happiness: f64) -> f64 {
        let before = self.state.happiness;
        self.state.happiness = if happiness.is_nan() {
            before
        } else {
            happiness.clamp(0.0, 100.0)
        };
        self.state.happiness - before
    }

    /// Feed one typed word. `performance` is the accuracy-weighted score in `[0, 1]`
    /// of the typing that produced it.
    pub fn feed(
        &mut self,
        word: &str,
        is_correct: bool,
        performance: f64,
        now_ms: i64,
    ) -> FeedOutcome {
        if word.trim().is_empty() {
            return FeedOutcome {
                word_accepted: false,
                happiness_change: 0.0,
                reaction: None,
                emotional_state: self.emotional_state(now_ms),
            };
        }

        let (change, reaction) = if is_correct {
            let performance = if performance.is_finite() {
                performance.clamp(0.0, 1.0)
            } else {
                0.0
            };
            let gain = self.tuning.min_feed_gain
                + (self.tuning.max_feed_gain - self.tuning.min_feed_gain) * performance;
            (self.set_happiness(self.state.happiness + gain), Reaction::Eating)
        } else {
            self.state.sad_until_ms = Some(now_ms + self.tuning.sad_pulse_ms);
            (
                self.set_happiness(self.state.happiness - self.tuning.incorrect_penalty),
                Reaction::Sad,
            )
        };

        self.state.words_fed_total = self.state.words_fed_total.saturating_add(1);
        let emotional_state = self.emotional_state(now_ms);
        self.state.emotional_state = emotional_state;

        FeedOutcome {
            word_accepted: true,
            happiness_change: change,
            reaction: Some(reaction),
            emotional_state,
        }
    }

    /// Shift happiness by `delta`, clamped. Returns the applied change.
    pub fn adjust_happiness(&mut self, delta: f64, now_ms: i64) -> f64 {
        let change = self.set_happiness(self.state.happiness + delta);
        self.state.emotional_state = self.emotional_state(now_ms);
        change
    }

    /// Current mood: a recent wrong word overrides the happiness-derived baseline for a while.
    pub fn emotional_state(&self, now_ms: i64) -> EmotionalState {
        match self.state.sad_until_ms {
            Some(until) if now_ms < until => EmotionalState::Sad,
            _ => EmotionalState::from_happiness(self.state.happiness),
        }
    }

    pub fn check_evolution_trigger(&self) -> EvolutionCheck {
        let current_form = self.state.evolution_form;
        let next_form = current_form.next();
        let words_remaining = next_form
            .map(|next| next.threshold().saturating_sub(self.state.words_fed_total))
            .unwrap_or(0);

        EvolutionCheck {
            can_evolve: next_form.is_some() && words_remaining == 0,
            words_remaining,
            current_form,
            next_form,
        }
    }

    pub fn evolve_to_next_form(&mut self) -> Result<EvolutionForm> {
        let check = self.check_evolution_trigger();
        match check.next_form {
            Some(next) if check.can_evolve && next > check.current_form => {
                self.state.evolution_form = next;
                info!(from = %check.current_form, to = %next, "pet evolved");
                Ok(next)
            }
            _ => Err(EngineError::InvalidEvolution {
                from: check.current_form,
                words_remaining: check.words_remaining,
            }),
        }
    }

    /// Apply a recount of fed words. A recount that would undo the current form is refused.
    pub fn reconcile_words(&mut self, total: u64) -> Result<()> {
        if EvolutionForm::for_words(total) < self.state.evolution_form {
            let err = EngineError::StateCorruption(format!(
                "recount of {total} words would regress {}",
                self.state.evolution_form
            ));
            error!(error = %err, "keeping current words total");
            return Err(err);
        }
        self.state.words_fed_total = total;
        Ok(())
    }

    /// Equip an accessory, replacing whatever was in its category.
    pub fn equip(&mut self, category: AccessoryCategory, accessory_id: &str) -> Option<String> {
        self.state
            .accessories_equipped
            .insert(category, accessory_id.to_string())
    }

    pub fn unequip(&mut self, category: AccessoryCategory) -> Option<String> {
        self.state.accessories_equipped.remove(&category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn pet_with_words(words: u64) -> PetStateMachine {
        PetStateMachine::restore(
            PetState {
                words_fed_total: words,
                ..PetState::default()
            },
            PetTuning::default(),
        )
    }

    #[test]
    fn thresholds_and_transition_table() {
        assert_eq!(EvolutionForm::for_words(0), EvolutionForm::Egg);
        assert_eq!(EvolutionForm::for_words(99), EvolutionForm::Egg);
        assert_eq!(EvolutionForm::for_words(100), EvolutionForm::Baby);
        assert_eq!(EvolutionForm::for_words(1_499), EvolutionForm::Child);
        assert_eq!(EvolutionForm::for_words(5_000), EvolutionForm::Adult);
        for pair in EvolutionForm::ALL.windows(2) {
            assert_eq!(pair[0].next(), Some(pair[1]));
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(EvolutionForm::Adult.next(), None);
    }

    #[test]
    fn emotional_thresholds_partition_range() {
        assert_eq!(EmotionalState::from_happiness(100.0), EmotionalState::Ecstatic);
        assert_eq!(EmotionalState::from_happiness(85.0), EmotionalState::Ecstatic);
        assert_eq!(EmotionalState::from_happiness(84.9), EmotionalState::Happy);
        assert_eq!(EmotionalState::from_happiness(40.0), EmotionalState::Neutral);
        assert_eq!(EmotionalState::from_happiness(20.0), EmotionalState::Sad);
        assert_eq!(EmotionalState::from_happiness(0.0), EmotionalState::Distressed);
    }

    #[test]
    fn correct_word_makes_pet_eat() {
        let mut pet = PetStateMachine::new(PetTuning::default());
        let outcome = pet.feed("cat", true, 1.0, 0);
        assert!(outcome.word_accepted);
        assert_eq!(outcome.reaction, Some(Reaction::Eating));
        assert_eq!(outcome.happiness_change, 5.0);
        assert_eq!(pet.state().happiness, 55.0);
        assert_eq!(pet.state().words_fed_total, 1);

        let outcome = pet.feed("dog", true, 0.0, 0);
        assert_eq!(outcome.happiness_change, 1.0);
    }

    #[test]
    fn wrong_word_pulses_sadness_then_recovers() {
        let mut pet = PetStateMachine::restore(
            PetState {
                happiness: 90.0,
                ..PetState::default()
            },
            PetTuning::default(),
        );
        let outcome = pet.feed("cta", false, 1.0, 1_000);
        assert_eq!(outcome.reaction, Some(Reaction::Sad));
        assert_eq!(outcome.happiness_change, -3.0);
        assert_eq!(outcome.emotional_state, EmotionalState::Sad);
        assert_eq!(pet.emotional_state(3_999), EmotionalState::Sad);
        assert_eq!(pet.emotional_state(4_000), EmotionalState::Ecstatic);
        assert_eq!(pet.state().words_fed_total, 1);
    }

    #[test]
    fn blank_word_is_ignored() {
        let mut pet = PetStateMachine::new(PetTuning::default());
        let outcome = pet.feed("   ", true, 1.0, 0);
        assert!(!outcome.word_accepted);
        assert_eq!(outcome.reaction, None);
        assert_eq!(pet.state(), &PetState::default());
    }

    #[test]
    fn happiness_stays_clamped() {
        let mut pet = PetStateMachine::new(PetTuning {
            min_feed_gain: 1_000.0,
            max_feed_gain: 1_000.0,
            incorrect_penalty: 1_000.0,
            sad_pulse_ms: 0,
        });
        pet.feed("a", true, 1.0, 0);
        assert_eq!(pet.state().happiness, 100.0);
        pet.feed("b", false, 1.0, 0);
        assert_eq!(pet.state().happiness, 0.0);
        assert_eq!(pet.adjust_happiness(f64::INFINITY, 0), 100.0);
        assert_eq!(pet.adjust_happiness(f64::NAN, 0), 0.0);
        assert_eq!(pet.adjust_happiness(-1e300, 0), -100.0);
        assert_eq!(pet.state().happiness, 0.0);
    }

    #[test]
    fn check_then_evolve() {
        let mut pet = pet_with_words(99);
        let check = pet.check_evolution_trigger();
        assert!(!check.can_evolve);
        assert_eq!(check.words_remaining, 1);
        assert_eq!(check.next_form, Some(EvolutionForm::Baby));

        assert_matches!(
            pet.evolve_to_next_form(),
            Err(EngineError::InvalidEvolution { from: EvolutionForm::Egg, words_remaining: 1 })
        );
        assert_eq!(pet.state().evolution_form, EvolutionForm::Egg);

        pet.feed("word", true, 1.0, 0);
        assert!(pet.check_evolution_trigger().can_evolve);
        assert_eq!(pet.evolve_to_next_form().unwrap(), EvolutionForm::Baby);
        assert!(!pet.check_evolution_trigger().can_evolve);
    }

    #[test]
    fn adult_never_evolves() {
        let mut pet = PetStateMachine::restore(
            PetState {
                words_fed_total: 9_000,
                evolution_form: EvolutionForm::Adult,
                ..PetState::default()
            },
            PetTuning::default(),
        );
        let check = pet.check_evolution_trigger();
        assert!(!check.can_evolve);
        assert_eq!(check.next_form, None);
        assert!(pet.evolve_to_next_form().is_err());
    }

    #[test]
    fn evolution_is_monotonic_over_feeds() {
        let mut pet = PetStateMachine::new(PetTuning::default());
        let mut last = pet.state().evolution_form;
        for i in 0..600u64 {
            pet.feed("w", i % 3 != 0, 0.5, i as i64);
            if pet.check_evolution_trigger().can_evolve {
                pet.evolve_to_next_form().unwrap();
            }
            assert!(pet.state().evolution_form >= last);
            last = pet.state().evolution_form;
        }
        assert_eq!(last, EvolutionForm::Child);
    }

    #[test]
    fn corrupted_record_resets_to_default() {
        let pet = PetStateMachine::restore(
            PetState {
                evolution_form: EvolutionForm::Teen,
                words_fed_total: 200,
                ..PetState::default()
            },
            PetTuning::default(),
        );
        assert_eq!(pet.state(), &PetState::default());

        let pet = PetStateMachine::restore(
            PetState {
                happiness: 140.0,
                ..PetState::default()
            },
            PetTuning::default(),
        );
        assert_eq!(pet.state().happiness, 50.0);
    }

    #[test]
    fn downward_recount_is_refused() {
        let mut pet = pet_with_words(120);
        pet.evolve_to_next_form().unwrap();
        assert_matches!(pet.reconcile_words(50), Err(EngineError::StateCorruption(_)));
        assert_eq!(pet.state().words_fed_total, 120);
        assert_eq!(pet.state().evolution_form, EvolutionForm::Baby);

        pet.reconcile_words(110).unwrap();
        assert_eq!(pet.state().words_fed_total, 110);
    }

    #[test]
    fn equipping_replaces_within_category() {
        let mut pet = PetStateMachine::new(PetTuning::default());
        assert_eq!(pet.equip(AccessoryCategory::Hat, "party-hat"), None);
        assert_eq!(
            pet.equip(AccessoryCategory::Hat, "crown"),
            Some("party-hat".to_string())
        );
        pet.equip(AccessoryCategory::Eyewear, "star-glasses");

        let equipped = &pet.state().accessories_equipped;
        assert_eq!(equipped.len(), 2);
        assert_eq!(equipped[&AccessoryCategory::Hat], "crown");

        assert_eq!(pet.unequip(AccessoryCategory::Hat), Some("crown".to_string()));
        assert_eq!(pet.state().accessories_equipped.len(), 1);
    }
}
