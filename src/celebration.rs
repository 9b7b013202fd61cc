//! Bounded, priority-tiered queue of celebrations waiting to be shown.

use crate::milestones::Milestone;
use crate::personal_best::PersonalBestCategory;
use crate::pet::EvolutionForm;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

pub const CELEBRATION_CAPACITY: usize = 5;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    strum_macros::Display,
)]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum CelebrationKind {
    Achievement,
    Milestone,
    PersonalBest,
    Evolution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CelebrationPayload {
    Achievement {
        id: String,
        name: String,
        reward: Option<String>,
    },
    Milestone(Milestone),
    PersonalBest {
        category: PersonalBestCategory,
        value: f64,
        improvement_pct: f64,
    },
    Evolution {
        from: EvolutionForm,
        to: EvolutionForm,
    },
}

impl CelebrationPayload {
    pub fn kind(&self) -> CelebrationKind {
        match self {
            CelebrationPayload::Achievement { .. } => CelebrationKind::Achievement,
            CelebrationPayload::Milestone(_) => CelebrationKind::Milestone,
            CelebrationPayload::PersonalBest { .. } => CelebrationKind::PersonalBest,
            CelebrationPayload::Evolution { .. } => CelebrationKind::Evolution,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CelebrationEvent {
    pub id: u64,
    pub priority: Priority,
    pub payload: CelebrationPayload,
}

impl CelebrationEvent {
    pub fn kind(&self) -> CelebrationKind {
        self.payload.kind()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Queued(u64),
    /// Queued after pushing out an older, less important event.
    QueuedWithEviction { id: u64, evicted: CelebrationEvent },
    /// The queue was full of events at least as important.
    Dropped,
}

impl InsertOutcome {
    pub fn is_queued(&self) -> bool {
        !matches!(self, InsertOutcome::Dropped)
    }
}

/// Three FIFO tiers, consumed High first. Never holds more than [`CELEBRATION_CAPACITY`].
#[derive(Debug, Default)]
pub struct CelebrationQueue {
    high: VecDeque<CelebrationEvent>,
    medium: VecDeque<CelebrationEvent>,
    low: VecDeque<CelebrationEvent>,
    next_id: u64,
}

impl CelebrationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn tier(&self, priority: Priority) -> &VecDeque<CelebrationEvent> {
        match priority {
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        }
    }

    fn tier_mut(&mut self, priority: Priority) -> &mut VecDeque<CelebrationEvent> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Medium => &mut self.medium,
            Priority::Low => &mut self.low,
        }
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lowest non-empty tier that may give up a slot to an event of `incoming` priority.
    fn eviction_tier(&self, incoming: Priority) -> Option<Priority> {
        [Priority::Low, Priority::Medium]
            .into_iter()
            .find(|p| !self.tier(*p).is_empty())
            .filter(|victim| *victim <= incoming)
    }

    pub fn push(&mut self, priority: Priority, payload: CelebrationPayload) -> InsertOutcome {
        let mut evicted = None;
        if self.len() >= CELEBRATION_CAPACITY {
            match self.eviction_tier(priority) {
                Some(tier) => evicted = self.tier_mut(tier).pop_front(),
                None => {
                    warn!(
                        %priority,
                        kind = %payload.kind(),
                        "celebration queue full, dropping event"
                    );
                    return InsertOutcome::Dropped;
                }
            }
        }

        self.next_id += 1;
        let id = self.next_id;
        debug!(id, %priority, kind = %payload.kind(), "celebration queued");
        self.tier_mut(priority).push_back(CelebrationEvent {
            id,
            priority,
            payload,
        });

        match evicted {
            Some(evicted) => InsertOutcome::QueuedWithEviction { id, evicted },
            None => InsertOutcome::Queued(id),
        }
    }

    /// The event that should be shown next, without consuming it.
    pub fn next_celebration(&self) -> Option<&CelebrationEvent> {
        self.high
            .front()
            .or_else(|| self.medium.front())
            .or_else(|| self.low.front())
    }

    /// Acknowledge an event as displayed; it is removed for good.
    pub fn mark_shown(&mut self, id: u64) -> Option<CelebrationEvent> {
        for tier in [&mut self.high, &mut self.medium, &mut self.low] {
            if let Some(pos) = tier.iter().position(|e| e.id == id) {
                return tier.remove(pos);
            }
        }
        None
    }

    pub fn take_next(&mut self) -> Option<CelebrationEvent> {
        let id = self.next_celebration()?.id;
        self.mark_shown(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CelebrationEvent> {
        self.high.iter().chain(&self.medium).chain(&self.low)
    }
}
