use std::collections::HashMap;
use std::time::Duration;

use tracing::trace;

use crate::core::MailboxId;

/// Work a timer stands for. Mailboxes are referenced by id and looked up
/// again when the timer fires, so a deleted mailbox just makes it a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    /// The closing message of an awake cycle is overdue
    PendingTimeout(MailboxId),
    /// Fleet-wide health check
    Rollcall,
}

/// One-shot deadlines in monotonic milliseconds
#[derive(Debug, Default)]
pub struct Scheduler {
    deadlines: HashMap<Action, u64>,
}

impl Scheduler {
    /// Creates an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `action` to fire at `deadline_ms`, replacing any earlier arming
    pub fn arm(&mut self, action: Action, deadline_ms: u64) {
        trace!(?action, deadline_ms, "timer armed");
        self.deadlines.insert(action, deadline_ms);
    }

    /// Arms `action` to fire `after` from `now_ms`
    pub fn arm_in(&mut self, action: Action, now_ms: u64, after: Duration) {
        self.arm(action, now_ms.saturating_add(after.as_millis() as u64));
    }

    /// Cancels `action`; returns whether it was armed
    pub fn disarm(&mut self, action: Action) -> bool {
        self.deadlines.remove(&action).is_some()
    }

    /// True if `action` is waiting to fire
    pub fn is_armed(&self, action: Action) -> bool {
        self.deadlines.contains_key(&action)
    }

    /// When `action` will fire
    pub fn deadline(&self, action: Action) -> Option<u64> {
        self.deadlines.get(&action).copied()
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<u64> {
        self.deadlines.values().min().copied()
    }

    /// Removes and returns every action due at `now_ms`, earliest first
    pub fn due(&mut self, now_ms: u64) -> Vec<Action> {
        let mut due: Vec<(u64, Action)> = self
            .deadlines
            .iter()
            .filter(|&(_, &deadline)| deadline <= now_ms)
            .map(|(&action, &deadline)| (deadline, action))
            .collect();
        due.sort();
        for (_, action) in &due {
            self.deadlines.remove(action);
        }
        due.into_iter().map(|(_, action)| action).collect()
    }

    /// Number of armed timers
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// True if nothing is armed
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> MailboxId {
        MailboxId::new(n).unwrap()
    }

    #[test]
    fn test_due_in_deadline_order() {
        let mut scheduler = Scheduler::new();
        scheduler.arm(Action::Rollcall, 300);
        scheduler.arm(Action::PendingTimeout(id(2)), 100);
        scheduler.arm(Action::PendingTimeout(id(1)), 200);

        assert_eq!(scheduler.next_deadline(), Some(100));
        assert_eq!(
            scheduler.due(250),
            vec![Action::PendingTimeout(id(2)), Action::PendingTimeout(id(1))]
        );
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.due(250).is_empty());
        assert_eq!(scheduler.due(300), vec![Action::Rollcall]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_rearm_replaces_deadline() {
        let mut scheduler = Scheduler::new();
        let action = Action::PendingTimeout(id(3));
        scheduler.arm_in(action, 1_000, Duration::from_secs(35));
        scheduler.arm_in(action, 5_000, Duration::from_secs(35));
        assert_eq!(scheduler.deadline(action), Some(40_000));
        assert!(scheduler.due(36_000).is_empty());
    }

    #[test]
    fn test_disarm_before_firing() {
        let mut scheduler = Scheduler::new();
        let action = Action::PendingTimeout(id(4));
        scheduler.arm(action, 10);
        assert!(scheduler.disarm(action));
        assert!(!scheduler.disarm(action));
        assert!(!scheduler.is_armed(action));
        assert!(scheduler.due(1_000).is_empty());
    }
}
