//! Achievement catalog, milestone tracking and personal bests, all feeding one celebration queue.

use crate::accessory;
use crate::celebration::{CelebrationPayload, CelebrationQueue, InsertOutcome, Priority};
use crate::config::EngineConfig;
use crate::milestones::{Milestone, MilestoneTracker};
use crate::personal_best::{PersonalBestCategory, PersonalBestUpdate, PersonalBests};
use crate::pet::EvolutionForm;
use crate::progress::Progress;
use crate::session::SessionSummary;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
pub enum AchievementCategory {
    Practice,
    Speed,
    Accuracy,
    Volume,
    Dedication,
    Growth,
}

/// What has to be true for an achievement to unlock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    SessionsCompleted(u32),
    WpmAtLeast(f64),
    /// Percent, over a session of at least `min_chars_for_accuracy` keypresses.
    AccuracyAtLeast(f64),
    WordsTotal(u64),
    StreakDays(u32),
    PracticeMinutes(u64),
    /// Percent WPM gain over the previous session.
    ImprovementAtLeast(f64),
}

impl Criterion {
    /// Performance criteria only look at complete sessions with a plausible speed.
    pub fn is_met(
        &self,
        summary: &SessionSummary,
        progress: &Progress,
        config: &EngineConfig,
    ) -> bool {
        let measured = !summary.partial && config.is_plausible_wpm(summary.wpm);
        match *self {
            Criterion::SessionsCompleted(n) => progress.total_sessions >= n,
            Criterion::WpmAtLeast(wpm) => measured && summary.wpm >= wpm,
            Criterion::AccuracyAtLeast(pct) => {
                measured
                    && summary.total_chars >= config.min_chars_for_accuracy
                    && summary.accuracy_pct >= pct
            }
            Criterion::WordsTotal(n) => progress.total_words >= n,
            Criterion::StreakDays(n) => progress.streak_days >= n,
            Criterion::PracticeMinutes(n) => progress.practice_minutes() >= n,
            Criterion::ImprovementAtLeast(pct) => {
                measured && summary.improvement_from_prev.is_some_and(|gain| gain >= pct)
            }
        }
    }

    pub fn describe(&self) -> String {
        match *self {
            Criterion::SessionsCompleted(1) => "Finish your first practice session".to_string(),
            Criterion::SessionsCompleted(n) => format!("Finish {n} practice sessions"),
            Criterion::WpmAtLeast(wpm) => format!("Type at {wpm} WPM or faster"),
            Criterion::AccuracyAtLeast(pct) => format!("Finish a session with {pct}% accuracy"),
            Criterion::WordsTotal(n) => format!("Type {n} words in total"),
            Criterion::StreakDays(n) => format!("Practice {n} days in a row"),
            Criterion::PracticeMinutes(n) => format!("Practice for {n} minutes in total"),
            Criterion::ImprovementAtLeast(pct) => {
                format!("Beat your last session's speed by {pct}%")
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AchievementDef {
    pub id: &'static str,
    pub name: &'static str,
    pub category: AchievementCategory,
    pub criterion: Criterion,
    /// Accessory unlocked along with the achievement.
    pub reward: Option<&'static str>,
}

const fn def(
    id: &'static str,
    name: &'static str,
    category: AchievementCategory,
    criterion: Criterion,
    reward: Option<&'static str>,
) -> AchievementDef {
    AchievementDef {
        id,
        name,
        category,
        criterion,
        reward,
    }
}

use AchievementCategory::*;

pub const CATALOG: &[AchievementDef] = &[
    def("first-steps", "First Steps", Practice, Criterion::SessionsCompleted(1), Some("party-hat")),
    def("regular", "Regular", Practice, Criterion::SessionsCompleted(5), None),
    def("devoted", "Devoted", Practice, Criterion::SessionsCompleted(25), Some("crown")),
    def("speed-10", "Warming Up", Speed, Criterion::WpmAtLeast(10.0), None),
    def("speed-20", "Quick Fingers", Speed, Criterion::WpmAtLeast(20.0), None),
    def("speed-30", "Speedy", Speed, Criterion::WpmAtLeast(30.0), Some("rocket-goggles")),
    def("speed-40", "Lightning", Speed, Criterion::WpmAtLeast(40.0), None),
    def("sharp-eye", "Sharp Eye", Accuracy, Criterion::AccuracyAtLeast(95.0), Some("star-glasses")),
    def("flawless", "Flawless", Accuracy, Criterion::AccuracyAtLeast(100.0), Some("bow-tie")),
    def("wordsmith", "Wordsmith", Volume, Criterion::WordsTotal(100), None),
    def("bookworm", "Bookworm", Volume, Criterion::WordsTotal(1_000), None),
    def("three-day-streak", "On a Roll", Dedication, Criterion::StreakDays(3), Some("cozy-scarf")),
    def("week-streak", "Week Warrior", Dedication, Criterion::StreakDays(7), Some("rainbow-sky")),
    def("hour-of-practice", "Hour of Power", Dedication, Criterion::PracticeMinutes(60), None),
    def("big-leap", "Big Leap", Growth, Criterion::ImprovementAtLeast(25.0), None),
];

pub fn find(id: &str) -> Option<&'static AchievementDef> {
    CATALOG.iter().find(|a| a.id == id)
}

/// Read-only view of a catalog entry combined with the player's unlock state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Achievement {
    pub id: &'static str,
    pub name: &'static str,
    pub category: AchievementCategory,
    pub description: String,
    pub reward: Option<&'static str>,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AchievementUnlock {
    pub id: &'static str,
    pub name: &'static str,
    pub reward: Option<&'static str>,
    pub unlocked_at: DateTime<Utc>,
}

/// Persisted unlock state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AchievementBook {
    #[serde(default)]
    pub unlocked: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub accessories: BTreeSet<String>,
    /// Absent until the first check, so an existing player is primed instead of flooded.
    #[serde(default)]
    pub milestones: Option<MilestoneTracker>,
}

pub struct AchievementEngine {
    book: AchievementBook,
    personal_bests: PersonalBests,
    queue: CelebrationQueue,
}

impl AchievementEngine {
    pub fn new(
        mut book: AchievementBook,
        personal_bests: PersonalBests,
        progress: &Progress,
    ) -> Self {
        if book.milestones.is_none() {
            book.milestones = Some(MilestoneTracker::primed(progress));
        }
        // Rewards granted by achievements unlocked before the accessory existed.
        for id in book.unlocked.keys() {
            if let Some(reward) = find(id).and_then(|a| a.reward) {
                book.accessories.insert(reward.to_string());
            }
        }
        Self {
            book,
            personal_bests,
            queue: CelebrationQueue::new(),
        }
    }

    pub fn book(&self) -> &AchievementBook {
        &self.book
    }

    pub fn personal_bests(&self) -> &PersonalBests {
        &self.personal_bests
    }

    pub fn queue(&self) -> &CelebrationQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut CelebrationQueue {
        &mut self.queue
    }

    pub fn is_unlocked(&self, id: &str) -> bool {
        self.book.unlocked.contains_key(id)
    }

    pub fn is_accessory_unlocked(&self, accessory_id: &str) -> bool {
        self.book.accessories.contains(accessory_id)
    }

    pub fn achievements(&self) -> Vec<Achievement> {
        CATALOG
            .iter()
            .map(|def| {
                let unlocked_at = self.book.unlocked.get(def.id).copied();
                Achievement {
                    id: def.id,
                    name: def.name,
                    category: def.category,
                    description: def.criterion.describe(),
                    reward: def.reward,
                    unlocked: unlocked_at.is_some(),
                    unlocked_at,
                }
            })
            .collect()
    }

    /// Unlock every locked achievement the session satisfies. Already unlocked ones never fire
    /// again.
    pub fn check_achievements(
        &mut self,
        summary: &SessionSummary,
        progress: &Progress,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Vec<AchievementUnlock> {
        let newly: Vec<&'static AchievementDef> = CATALOG
            .iter()
            .filter(|def| !self.is_unlocked(def.id))
            .filter(|def| def.criterion.is_met(summary, progress, config))
            .collect();

        newly
            .into_iter()
            .map(|def| {
                self.book.unlocked.insert(def.id.to_string(), now);
                if let Some(reward) = def.reward {
                    if accessory::find(reward).is_some() {
                        self.book.accessories.insert(reward.to_string());
                    }
                }
                info!(id = def.id, reward = ?def.reward, "achievement unlocked");
                self.queue.push(
                    Priority::High,
                    CelebrationPayload::Achievement {
                        id: def.id.to_string(),
                        name: def.name.to_string(),
                        reward: def.reward.map(str::to_string),
                    },
                );
                AchievementUnlock {
                    id: def.id,
                    name: def.name,
                    reward: def.reward,
                    unlocked_at: now,
                }
            })
            .collect()
    }

    pub fn check_milestones(&mut self, progress: &Progress) -> Vec<Milestone> {
        let tracker = self
            .book
            .milestones
            .get_or_insert_with(MilestoneTracker::default);
        let fired = tracker.check_milestones(progress);
        for milestone in &fired {
            info!(%milestone, "milestone reached");
            self.queue.push(Priority::Low, CelebrationPayload::Milestone(*milestone));
        }
        fired
    }

    /// Record a candidate best. Beating an earlier best is celebrated; setting the first one
    /// is not.
    pub fn update_personal_best(
        &mut self,
        category: PersonalBestCategory,
        value: f64,
        date: NaiveDate,
    ) -> PersonalBestUpdate {
        let update = self.personal_bests.update(category, value, date);
        if update.updated && update.previous.is_some() {
            self.queue.push(
                Priority::Medium,
                CelebrationPayload::PersonalBest {
                    category,
                    value,
                    improvement_pct: update.improvement_pct,
                },
            );
        }
        update
    }

    /// Offer every category a session can move.
    pub fn update_personal_bests(
        &mut self,
        summary: &SessionSummary,
        progress: &Progress,
        config: &EngineConfig,
        date: NaiveDate,
    ) -> Vec<(PersonalBestCategory, PersonalBestUpdate)> {
        let mut candidates = vec![
            (PersonalBestCategory::Streak, progress.streak_days as f64),
            (PersonalBestCategory::WordsTotal, progress.total_words as f64),
        ];
        // A session with an implausible speed had a misbehaving clock: its timing says nothing.
        if !summary.partial && config.is_plausible_wpm(summary.wpm) {
            candidates.push((PersonalBestCategory::Wpm, summary.wpm));
            if summary.total_chars >= config.min_chars_for_accuracy {
                candidates.push((PersonalBestCategory::Accuracy, summary.accuracy_pct));
            }
            let seconds = summary.duration_ms as f64 / 1000.0;
            candidates.push((PersonalBestCategory::SessionTime, seconds));
        }

        candidates
            .into_iter()
            .map(|(category, value)| (category, self.update_personal_best(category, value, date)))
            .filter(|(_, update)| update.updated)
            .collect()
    }

    pub fn celebrate_evolution(&mut self, from: EvolutionForm, to: EvolutionForm) -> InsertOutcome {
        self.queue
            .push(Priority::High, CelebrationPayload::Evolution { from, to })
    }
}
