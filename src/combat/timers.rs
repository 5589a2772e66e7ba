//! Explicit per-battle timer set.
//!
//! The engine arms timers here; the runtime that drives the engine (the
//! `BattleManager`, or a test harness) schedules them and reports back through
//! `BattleEngine::on_timer`. Everything is cancelled in one step on each phase
//! transition, so a late firing finds its id gone and is ignored.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::task::AbortHandle;

use super::state::SideId;

pub type TimerId = u64;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(tag = "timer", content = "side", rename_all = "snake_case")]
pub enum TimerKind {
    IntroElapsed,
    AiThink(SideId),
    SelectionTimeout,
    NextAttacker,
    KoCheck,
    KoStep,
}

#[derive(Debug)]
struct ArmedTimer {
    kind: TimerKind,
    delay: Duration,
    abort: Option<AbortHandle>,
    scheduled: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ArmedTimerView {
    pub id: TimerId,
    pub kind: TimerKind,
    pub delay_ms: u64,
}

#[derive(Debug, Default)]
pub struct TimerSet {
    next_id: TimerId,
    armed: BTreeMap<TimerId, ArmedTimer>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, kind: TimerKind, delay: Duration) -> TimerId {
        self.next_id += 1;
        let id = self.next_id;
        self.armed.insert(id, ArmedTimer { kind, delay, abort: None, scheduled: false });
        id
    }

    /// Timers armed since the last call, marked as scheduled
    pub fn take_unscheduled(&mut self) -> Vec<(TimerId, Duration)> {
        self.armed
            .iter_mut()
            .filter(|(_, timer)| !timer.scheduled)
            .map(|(id, timer)| {
                timer.scheduled = true;
                (*id, timer.delay)
            })
            .collect()
    }

    /// Attach the task handle that realizes a timer; aborts it if the timer is already gone
    pub fn attach(&mut self, id: TimerId, handle: AbortHandle) {
        match self.armed.get_mut(&id) {
            Some(timer) => timer.abort = Some(handle),
            None => handle.abort(),
        }
    }

    /// Consume a fired timer; None for stale ids
    pub fn fire(&mut self, id: TimerId) -> Option<TimerKind> {
        self.armed.remove(&id).map(|timer| timer.kind)
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in std::mem::take(&mut self.armed) {
            if let Some(handle) = timer.abort {
                handle.abort();
            }
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.values().any(|timer| timer.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    /// Earliest timer by delay, then arming order
    pub fn next_due(&self) -> Option<(TimerId, TimerKind)> {
        self.armed
            .iter()
            .min_by_key(|(id, timer)| (timer.delay, **id))
            .map(|(id, timer)| (*id, timer.kind))
    }

    pub fn pending(&self) -> Vec<ArmedTimerView> {
        self.armed
            .iter()
            .map(|(id, timer)| ArmedTimerView {
                id: *id,
                kind: timer.kind,
                delay_ms: timer.delay.as_millis() as u64,
            })
            .collect()
    }
}
