use serde::Serialize;

use crate::error::{BattleError, Result};

use super::action::{ActionCategory, QueuedAction};
use super::state::SideId;

/// Per-battle buffer holding at most one action per side
#[derive(Debug, Default, Clone)]
pub struct ActionQueue {
    slots: [Option<QueuedAction>; 2],
}

/// Diagnostic view of one queued entry
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueueEntryView {
    pub side: SideId,
    pub category: ActionCategory,
    pub priority: i8,
    pub speed: u32,
    pub summary: String,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an action; `incapacitated` is the submitting combatant's state
    pub fn add_action(&mut self, queued: QueuedAction, incapacitated: bool) -> Result<()> {
        let side = queued.side;
        if incapacitated {
            return Err(BattleError::Incapacitated(side));
        }
        let slot = &mut self.slots[side.ordinal() as usize];
        if slot.is_some() {
            return Err(BattleError::DuplicateSubmission(side));
        }
        *slot = Some(queued);
        Ok(())
    }

    pub fn has_action(&self, side: SideId) -> bool {
        self.slots[side.ordinal() as usize].is_some()
    }

    pub fn are_all_actions_ready(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every queued action, player1 first
    pub fn drain(&mut self) -> Vec<QueuedAction> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }

    pub fn clear(&mut self) {
        self.slots = [None, None];
    }

    pub fn breakdown(&self) -> Vec<QueueEntryView> {
        self.slots
            .iter()
            .flatten()
            .map(|q| QueueEntryView {
                side: q.side,
                category: q.category,
                priority: q.priority,
                speed: q.speed,
                summary: q.action.kind.summary(),
            })
            .collect()
    }
}
