use crate::progress::Progress;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const WORDS_STEP: u64 = 100;
pub const WPM_STEP: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum MilestoneKind {
    Words,
    WpmTier,
    Streak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Milestone {
    pub kind: MilestoneKind,
    pub threshold: u64,
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            MilestoneKind::Words => "words",
            MilestoneKind::WpmTier => "wpm",
            MilestoneKind::Streak => "streak",
        };
        write!(f, "{prefix}-{}", self.threshold)
    }
}

/// Highest threshold already celebrated per kind.
///
/// Created primed with the progress that existed before tracking began, so thresholds
/// crossed earlier are never celebrated after the fact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneTracker {
    words: u64,
    wpm: u64,
    streak: u64,
}

fn crossed(kind: MilestoneKind, marker: &mut u64, reached: u64, step: u64) -> Vec<Milestone> {
    let reached = reached / step * step;
    if reached <= *marker {
        return Vec::new();
    }
    let first = *marker / step * step + step;
    let fired = (first..=reached)
        .step_by(step as usize)
        .map(|threshold| Milestone { kind, threshold })
        .collect();
    *marker = reached;
    fired
}

impl MilestoneTracker {
    pub fn primed(progress: &Progress) -> Self {
        let mut tracker = Self::default();
        tracker.check_milestones(progress);
        tracker
    }

    /// Thresholds newly crossed since the last check, one milestone per threshold.
    pub fn check_milestones(&mut self, progress: &Progress) -> Vec<Milestone> {
        let mut fired = crossed(
            MilestoneKind::Words,
            &mut self.words,
            progress.total_words,
            WORDS_STEP,
        );
        fired.extend(crossed(
            MilestoneKind::WpmTier,
            &mut self.wpm,
            progress.best_wpm.max(0.0) as u64,
            WPM_STEP,
        ));
        fired.extend(crossed(
            MilestoneKind::Streak,
            &mut self.streak,
            progress.streak_days as u64,
            1,
        ));
        fired
    }
}
