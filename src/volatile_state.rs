use serenity::all::ScheduledEventId;
use std::collections::{HashMap, HashSet};

/// State which is lost across restarts
pub struct VolatileState {
    pub lifecycle: LifecycleState,
}

impl VolatileState {
    pub async fn new() -> Self {
        Self {
            lifecycle: LifecycleState::new(),
        }
    }
}

/// Where a session is in its life.  Tracked here rather than mirroring
/// Discord's own event status, because an event Discord reports as ended may
/// still be one we consider in progress and want back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Scheduled,
    Warned,
    Active,
    Ended,
    Cancelled,
}

/// Per-process session bookkeeping.  Rebuilt from Discord's event list after
/// a restart; losing the warned set only risks a repeated reminder, which is
/// harmless.
pub struct LifecycleState {
    statuses: HashMap<ScheduledEventId, SessionStatus>,
    warned: HashSet<ScheduledEventId>,
    tearing_down: bool,
}

impl LifecycleState {
    pub fn new() -> Self {
        Self {
            statuses: HashMap::new(),
            warned: HashSet::new(),
            tearing_down: false,
        }
    }

    pub fn status(&self, event_id: ScheduledEventId) -> Option<SessionStatus> {
        self.statuses.get(&event_id).copied()
    }

    pub fn set_status(&mut self, event_id: ScheduledEventId, status: SessionStatus) {
        self.statuses.insert(event_id, status);
    }

    /// Drop all bookkeeping for a session.
    pub fn forget(&mut self, event_id: ScheduledEventId) {
        self.statuses.remove(&event_id);
        self.warned.remove(&event_id);
    }

    /// Check-and-insert into the warned set.  True exactly once per session
    /// per process run.
    pub fn mark_warned(&mut self, event_id: ScheduledEventId) -> bool {
        self.warned.insert(event_id)
    }

    /// True while some session is running.
    pub fn scrim_active(&self) -> bool {
        self.statuses
            .values()
            .any(|status| *status == SessionStatus::Active)
    }

    pub fn begin_teardown(&mut self) {
        self.tearing_down = true;
    }

    pub fn end_teardown(&mut self) {
        self.tearing_down = false;
    }

    pub fn tearing_down(&self) -> bool {
        self.tearing_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_warned_is_true_exactly_once() {
        let mut lifecycle = LifecycleState::new();
        let id = ScheduledEventId::new(5);

        assert!(lifecycle.mark_warned(id));
        assert!(!lifecycle.mark_warned(id));
        assert!(lifecycle.mark_warned(ScheduledEventId::new(6)));
    }

    #[test]
    fn scrim_active_follows_statuses() {
        let mut lifecycle = LifecycleState::new();
        let id = ScheduledEventId::new(5);
        assert!(!lifecycle.scrim_active());

        lifecycle.set_status(id, SessionStatus::Scheduled);
        assert!(!lifecycle.scrim_active());

        lifecycle.set_status(id, SessionStatus::Active);
        assert!(lifecycle.scrim_active());

        lifecycle.set_status(id, SessionStatus::Ended);
        assert!(!lifecycle.scrim_active());
    }

    #[test]
    fn forget_clears_status_and_warning() {
        let mut lifecycle = LifecycleState::new();
        let id = ScheduledEventId::new(5);

        lifecycle.set_status(id, SessionStatus::Active);
        lifecycle.mark_warned(id);
        lifecycle.forget(id);

        assert_eq!(lifecycle.status(id), None);
        assert!(lifecycle.mark_warned(id));
    }
}
