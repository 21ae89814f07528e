use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use crate::core::{Config, Error, MailboxId, Result};
use crate::protocol::Frame;
use crate::time::{Action, Scheduler};
use super::alarm::Alarm;
use super::notify::Notifier;
use super::state::{Applied, MailboxState};
use super::store::{record_name, Store};

/// Which alarms an acknowledgement clears
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckTarget {
    /// Every mailbox
    All,
    /// A single mailbox
    One(MailboxId),
}

/// Sole owner of every mailbox the receiver knows about.
///
/// Mailboxes are keyed by id, so iteration is id-ordered. Timers live in the
/// registry's [`Scheduler`] and name mailboxes by id; a timer firing for a
/// deleted mailbox does nothing.
pub struct MailboxRegistry {
    config: Config,
    store: Box<dyn Store + Send>,
    notifier: Box<dyn Notifier + Send>,
    mailboxes: BTreeMap<MailboxId, MailboxState>,
    scheduler: Scheduler,
    global_alarm: Alarm,
    persistence_degraded: bool,
}

impl MailboxRegistry {
    /// Creates an empty registry; call [`load_all`](Self::load_all) to restore
    /// persisted mailboxes
    pub fn new(config: Config, store: Box<dyn Store + Send>, notifier: Box<dyn Notifier + Send>) -> Self {
        MailboxRegistry {
            config,
            store,
            notifier,
            mailboxes: BTreeMap::new(),
            scheduler: Scheduler::new(),
            global_alarm: Alarm::None,
            persistence_degraded: false,
        }
    }

    /// Probes every valid id for a persisted record. Malformed or unreadable
    /// records are skipped. Returns how many mailboxes were restored.
    pub fn load_all(&mut self) -> usize {
        let mut loaded = 0;
        for id in MailboxId::all() {
            let name = record_name(id);
            if !self.store.exists(&name) {
                continue;
            }
            match self
                .store
                .read(&name)
                .and_then(|record| MailboxState::from_record(id, &record))
            {
                Ok(state) => {
                    debug!(mailbox = %id, "Loaded mailbox {}", state.name());
                    self.mailboxes.insert(id, state);
                    loaded += 1;
                }
                Err(e) => warn!(mailbox = %id, error = %e, "Skipping mailbox record"),
            }
        }
        info!(count = loaded, "Mailboxes loaded");
        self.recompute_global_alarm();
        loaded
    }

    /// Returns the mailbox, registering and persisting it first if unknown.
    /// Id 0 (the receiver itself) and ids above 15 are rejected.
    pub fn lookup_or_create(&mut self, id: u8) -> Result<&MailboxState> {
        let id = MailboxId::new(id)?;
        self.ensure(id);
        self.mailboxes
            .get(&id)
            .ok_or_else(|| Error::invalid_state(format!("mailbox {} vanished", id)))
    }

    fn ensure(&mut self, id: MailboxId) {
        if !self.mailboxes.contains_key(&id) {
            info!(mailbox = %id, "Registering new mailbox");
            self.mailboxes.insert(id, MailboxState::new(id));
            self.save(id);
        }
    }

    pub fn get(&self, id: MailboxId) -> Option<&MailboxState> {
        self.mailboxes.get(&id)
    }

    /// Forgets a mailbox and its persisted record; returns whether it existed
    pub fn delete(&mut self, id: MailboxId) -> bool {
        let Some(state) = self.mailboxes.remove(&id) else {
            return false;
        };
        self.scheduler.disarm(Action::PendingTimeout(id));
        match self.store.remove(&record_name(id)) {
            Ok(()) => self.persistence_ok(),
            Err(e) => self.persistence_failed(id, &e),
        }
        info!(mailbox = %id, "Deleted mailbox {}", state.name());
        self.recompute_global_alarm();
        true
    }

    /// Routes an accepted frame to its mailbox, registering it if needed.
    ///
    /// Arms the pending timeout while the sender stays online and disarms it
    /// otherwise.
    pub fn dispatch(&mut self, frame: &Frame, now_ms: u64, now: Option<DateTime<Utc>>) -> Result<Applied> {
        let id = frame.mailbox_id()?;
        self.ensure(id);
        let state = self
            .mailboxes
            .get_mut(&id)
            .ok_or_else(|| Error::invalid_state(format!("mailbox {} vanished", id)))?;
        let applied = state.apply(frame, now, &self.config, &*self.notifier);
        self.save(id);

        let action = Action::PendingTimeout(id);
        if applied.online {
            self.scheduler.arm_in(action, now_ms, self.config.pending_timeout());
        } else {
            self.scheduler.disarm(action);
        }

        self.recompute_global_alarm();
        Ok(applied)
    }

    /// Highest alarm over all mailboxes
    pub fn recompute_global_alarm(&mut self) -> Alarm {
        let alarm = self
            .mailboxes
            .values()
            .map(MailboxState::alarm)
            .max()
            .unwrap_or(Alarm::None);
        if alarm != self.global_alarm {
            debug!(from = %self.global_alarm, to = %alarm, "global alarm changed");
        }
        self.global_alarm = alarm;
        alarm
    }

    pub fn global_alarm(&self) -> Alarm {
        self.global_alarm
    }

    /// Clears alarms on behalf of `actor`; returns the highest severity
    /// cleared so the caller can report it
    pub fn acknowledge(&mut self, actor: &str, target: AckTarget) -> Result<Alarm> {
        let cleared = match target {
            AckTarget::All => self
                .mailboxes
                .values_mut()
                .map(MailboxState::reset_alarm)
                .max()
                .unwrap_or(Alarm::None),
            AckTarget::One(id) => self
                .mailboxes
                .get_mut(&id)
                .ok_or_else(|| Error::invalid_state(format!("No mailbox {}", id)))?
                .reset_alarm(),
        };
        match target {
            AckTarget::All => info!(actor, alarm = %cleared, "All alarms acknowledged"),
            AckTarget::One(id) => info!(actor, mailbox = %id, alarm = %cleared, "Alarm acknowledged"),
        }
        self.recompute_global_alarm();
        Ok(cleared)
    }

    /// Health check over every mailbox; returns true if all are fine
    pub fn rollcall(&mut self, now: Option<DateTime<Utc>>) -> bool {
        debug!(count = self.mailboxes.len(), "rollcall");
        let mut all_ok = true;
        for state in self.mailboxes.values_mut() {
            all_ok &= state.is_ok(now, &self.config, &*self.notifier);
        }
        self.recompute_global_alarm();
        all_ok
    }

    /// Arms the next periodic rollcall
    pub fn schedule_rollcall(&mut self, now_ms: u64) {
        self.scheduler.arm_in(Action::Rollcall, now_ms, self.config.rollcall_interval);
    }

    /// Fires every due timer. Returns the actions that fired.
    pub fn service_timers(&mut self, now_ms: u64, now: Option<DateTime<Utc>>) -> Vec<Action> {
        let due = self.scheduler.due(now_ms);
        for action in &due {
            match *action {
                Action::PendingTimeout(id) => match self.mailboxes.get_mut(&id) {
                    Some(state) => {
                        state.on_pending_timeout();
                    }
                    None => trace!(mailbox = %id, "pending timeout for deleted mailbox"),
                },
                Action::Rollcall => {
                    self.rollcall(now);
                    self.schedule_rollcall(now_ms);
                }
            }
        }
        if !due.is_empty() {
            self.recompute_global_alarm();
        }
        due
    }

    /// Renames a mailbox and persists it
    pub fn set_label(&mut self, id: MailboxId, label: &str) -> Result<()> {
        let state = self
            .mailboxes
            .get_mut(&id)
            .ok_or_else(|| Error::invalid_state(format!("No mailbox {}", id)))?;
        state.set_label(label);
        self.save(id);
        Ok(())
    }

    /// Mailboxes in id order
    pub fn iter(&self) -> impl Iterator<Item = &MailboxState> {
        self.mailboxes.values()
    }

    pub fn len(&self) -> usize {
        self.mailboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mailboxes.is_empty()
    }

    /// True since the last failed write, until one succeeds
    pub fn persistence_degraded(&self) -> bool {
        self.persistence_degraded
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn notifier(&self) -> &dyn Notifier {
        &*self.notifier
    }

    fn save(&mut self, id: MailboxId) {
        let Some(state) = self.mailboxes.get(&id) else {
            return;
        };
        let record = state.to_record();
        match self.store.write(&record_name(id), &record) {
            Ok(()) => self.persistence_ok(),
            Err(e) => self.persistence_failed(id, &e),
        }
    }

    fn persistence_ok(&mut self) {
        if self.persistence_degraded {
            info!("Mailbox storage recovered");
            self.persistence_degraded = false;
        }
    }

    fn persistence_failed(&mut self, id: MailboxId, error: &Error) {
        warn!(mailbox = %id, error = %error, "Mailbox storage degraded; keeping state in memory");
        self.persistence_degraded = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::notify::{Notification, RecordingNotifier};
    use crate::mailbox::store::{FileStore, MemoryStore};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::Arc;

    fn id(n: u8) -> MailboxId {
        MailboxId::new(n).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap()
    }

    fn registry() -> (MailboxRegistry, MemoryStore, Arc<RecordingNotifier>) {
        let store = MemoryStore::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let registry = MailboxRegistry::new(
            Config::default(),
            Box::new(store.clone()),
            Box::new(notifier.clone()),
        );
        (registry, store, notifier)
    }

    fn door_open(mailbox: u8, sequence: u16) -> Frame {
        let mut frame = Frame::new(1, mailbox);
        frame.sequence = sequence;
        frame.door = true;
        frame.online = true;
        frame.battery = 80;
        frame
    }

    fn door_closed(mailbox: u8, sequence: u16) -> Frame {
        let mut frame = Frame::new(1, mailbox);
        frame.sequence = sequence;
        frame.uptime = 20_000;
        frame
    }

    #[test]
    fn test_dispatch_registers_and_persists() {
        let (mut registry, store, _) = registry();
        registry.dispatch(&door_open(3, 5), 0, Some(now())).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(id(3)).unwrap().alarm(), Alarm::DoorOpenNow);
        assert_eq!(registry.global_alarm(), Alarm::DoorOpenNow);
        assert_eq!(
            store.records().get("mailbox3.cfg").map(String::as_str),
            Some(format!("\n{}\n80\n", now().timestamp()).as_str())
        );
        assert_eq!(
            registry.scheduler().deadline(Action::PendingTimeout(id(3))),
            Some(35_000)
        );
    }

    #[test]
    fn test_lookup_rejects_reserved_id() {
        let (mut registry, store, _) = registry();
        assert!(matches!(registry.lookup_or_create(0), Err(Error::InvalidMailboxId(0))));
        assert!(registry.lookup_or_create(16).is_err());
        assert!(registry.is_empty());

        assert_eq!(registry.lookup_or_create(4).unwrap().id(), id(4));
        assert!(store.records().contains_key("mailbox4.cfg"));
        let mut frame = door_open(4, 1);
        frame.mailbox = 0;
        assert!(registry.dispatch(&frame, 0, None).is_err());
    }

    #[test]
    fn test_closing_frame_disarms_timeout() {
        let (mut registry, _, _) = registry();
        registry.dispatch(&door_open(3, 5), 0, None).unwrap();
        registry.dispatch(&door_closed(3, 6), 10_000, None).unwrap();

        assert!(!registry.scheduler().is_armed(Action::PendingTimeout(id(3))));
        assert!(registry.service_timers(60_000, None).is_empty());
        assert_eq!(registry.get(id(3)).unwrap().alarm(), Alarm::DoorFlipped);
    }

    #[test]
    fn test_pending_timeout_fires_through_scheduler() {
        let (mut registry, _, _) = registry();
        registry.dispatch(&door_open(3, 5), 1_000, None).unwrap();

        assert!(registry.service_timers(35_999, None).is_empty());
        assert_eq!(
            registry.service_timers(36_000, None),
            vec![Action::PendingTimeout(id(3))]
        );
        let state = registry.get(id(3)).unwrap();
        assert_eq!(state.alarm(), Alarm::DoorFlipped);
        assert_eq!(state.mailbox().sequence, 6);
        assert_eq!(state.lost(), 1);
        assert_eq!(registry.global_alarm(), Alarm::DoorFlipped);
    }

    #[test]
    fn test_delete_drops_record_and_timer() {
        let (mut registry, store, _) = registry();
        registry.dispatch(&door_open(3, 5), 0, None).unwrap();
        registry.dispatch(&door_open(2, 1), 0, None).unwrap();

        assert!(registry.delete(id(3)));
        assert!(!registry.delete(id(3)));
        assert!(!store.records().contains_key("mailbox3.cfg"));
        assert!(registry.get(id(3)).is_none());

        let fired = registry.service_timers(100_000, None);
        assert_eq!(fired, vec![Action::PendingTimeout(id(2))]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_scenario_rollcall_marks_absent() {
        let (mut registry, store, notifier) = registry();
        let seen = now() - ChronoDuration::days(4);
        store.insert("mailbox5.cfg", &format!("Shed\n{}\n80\n", seen.timestamp()));
        assert_eq!(registry.load_all(), 1);

        // No wall clock yet: absence is not evaluated
        assert!(registry.rollcall(None));
        assert_eq!(registry.global_alarm(), Alarm::None);

        assert!(!registry.rollcall(Some(now())));
        assert_eq!(registry.get(id(5)).unwrap().alarm(), Alarm::Absent);
        assert_eq!(registry.global_alarm(), Alarm::Absent);
        assert_eq!(notifier.events().len(), 1);
    }

    #[test]
    fn test_scenario_acknowledge_all() {
        let (mut registry, store, _) = registry();
        store.insert("mailbox2.cfg", "Side\n0\n10\n");
        registry.load_all();
        registry.dispatch(&door_open(1, 3), 0, Some(now())).unwrap();
        registry.rollcall(Some(now()));

        assert_eq!(registry.get(id(1)).unwrap().alarm(), Alarm::DoorOpenNow);
        assert_eq!(registry.get(id(2)).unwrap().alarm(), Alarm::LowBattery);
        assert_eq!(registry.global_alarm(), Alarm::DoorOpenNow);

        assert_eq!(registry.acknowledge("web", AckTarget::All).unwrap(), Alarm::DoorOpenNow);
        assert!(registry.iter().all(|s| s.alarm() == Alarm::None));
        assert_eq!(registry.global_alarm(), Alarm::None);
    }

    #[test]
    fn test_acknowledge_one() {
        let (mut registry, _, _) = registry();
        registry.dispatch(&door_open(1, 3), 0, None).unwrap();
        registry.dispatch(&door_closed(2, 4), 0, None).unwrap();

        assert_eq!(registry.acknowledge("telegram", AckTarget::One(id(1))).unwrap(), Alarm::DoorOpenNow);
        assert_eq!(registry.global_alarm(), Alarm::DoorFlipped);
        assert!(registry.acknowledge("telegram", AckTarget::One(id(9))).is_err());

        // The timeout still does its accounting but leaves the alarm cleared
        registry.service_timers(100_000, None);
        let state = registry.get(id(1)).unwrap();
        assert_eq!(state.alarm(), Alarm::None);
        assert_eq!(state.lost(), 1);
    }

    #[test]
    fn test_persistence_degraded_and_recovered() {
        let (mut registry, store, _) = registry();
        store.set_fail_writes(true);
        registry.dispatch(&door_open(3, 5), 0, None).unwrap();
        assert!(registry.persistence_degraded());
        assert_eq!(registry.get(id(3)).unwrap().alarm(), Alarm::DoorOpenNow);

        store.set_fail_writes(false);
        registry.dispatch(&door_closed(3, 6), 0, None).unwrap();
        assert!(!registry.persistence_degraded());
        assert!(store.records().contains_key("mailbox3.cfg"));
    }

    #[test]
    fn test_load_skips_malformed_records() {
        let (mut registry, store, _) = registry();
        store.insert("mailbox1.cfg", "Front\n0\n55\n");
        store.insert("mailbox2.cfg", "Broken\nnot-a-time\n55\n");
        store.insert("mailbox3.cfg", "Back\n0\n127\n");
        store.insert("mailbox0.cfg", "Receiver\n0\n55\n");

        assert_eq!(registry.load_all(), 2);
        let ids: Vec<u8> = registry.iter().map(|s| s.id().get()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_set_label_persists() {
        let (mut registry, store, _) = registry();
        registry.lookup_or_create(7).unwrap();
        registry.set_label(id(7), "Front\ngate").unwrap();

        assert_eq!(registry.get(id(7)).unwrap().name(), "7 (Front gate)");
        assert_eq!(store.records()["mailbox7.cfg"], "Front gate\n0\n127\n");
        assert!(registry.set_label(id(8), "x").is_err());
    }

    #[test]
    fn test_rollcall_rearms_itself() {
        let (mut registry, store, notifier) = registry();
        store.insert("mailbox4.cfg", "\n0\n12\n");
        registry.load_all();
        registry.schedule_rollcall(0);

        let hour = 60 * 60 * 1000;
        assert_eq!(registry.service_timers(hour, Some(now())), vec![Action::Rollcall]);
        assert_eq!(registry.scheduler().deadline(Action::Rollcall), Some(2 * hour));
        assert!(notifier
            .notifications()
            .contains(&Notification::LowBattery { mailbox: id(4), battery: Some(12) }));
    }

    #[test]
    fn test_file_store_survives_restart() {
        let dir = std::env::temp_dir().join(format!("mailbox_link_registry_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let notifier = Arc::new(RecordingNotifier::new());

        let mut registry = MailboxRegistry::new(
            Config::default(),
            Box::new(FileStore::open(&dir).unwrap()),
            Box::new(notifier.clone()),
        );
        registry.dispatch(&door_open(6, 1), 0, Some(now())).unwrap();
        registry.set_label(id(6), "Porch").unwrap();

        let mut restarted = MailboxRegistry::new(
            Config::default(),
            Box::new(FileStore::open(&dir).unwrap()),
            Box::new(notifier),
        );
        assert_eq!(restarted.load_all(), 1);
        let state = restarted.get(id(6)).unwrap();
        assert_eq!(state.label(), "Porch");
        assert_eq!(state.last_seen(), Some(now()));
        assert_eq!(state.mailbox().battery, 80);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
