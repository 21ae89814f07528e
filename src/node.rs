//! The receiver node: one cooperative loop servicing the link, the timers
//! and the fleet rollcall

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::{Config, MailboxId, Result};
use crate::link::ByteSource;
use crate::mailbox::{AckTarget, Applied, MailboxRegistry, Notifier, Store};
use crate::protocol::{Frame, FrameFault, FrameReceiver};
use crate::time::{Action, Clock};

/// Requests from the outside (web page, chat bot) to the receiver loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Clear alarms
    Acknowledge { actor: String, target: AckTarget },
    /// Rename a mailbox
    SetLabel { id: MailboxId, label: String },
    /// Forget a mailbox
    Delete(MailboxId),
    /// Stop the loop
    Shutdown,
}

/// What one pass of the loop did
#[derive(Debug, Default)]
pub struct PollReport {
    /// Frames applied, with their outcome
    pub applied: Vec<(Frame, Applied)>,
    /// Frames dropped by the receiver
    pub faults: Vec<FrameFault>,
    /// Timers that fired
    pub fired: Vec<Action>,
}

/// Receiver node tying the link, the frame receiver and the registry together
pub struct ReceiverNode<S, C> {
    link: S,
    clock: C,
    receiver: FrameReceiver,
    registry: MailboxRegistry,
    poll_interval: Duration,
    started: bool,
    wall_clock_seen: bool,
}

impl<S: ByteSource, C: Clock> ReceiverNode<S, C> {
    pub fn new(config: Config, link: S, clock: C, store: Box<dyn Store + Send>, notifier: Box<dyn Notifier + Send>) -> Self {
        let receiver = FrameReceiver::new(config.receiver_id, config.receive_timeout);
        let poll_interval = config.poll_interval;
        ReceiverNode {
            link,
            clock,
            receiver,
            registry: MailboxRegistry::new(config, store, notifier),
            poll_interval,
            started: false,
            wall_clock_seen: false,
        }
    }

    /// Restores persisted mailboxes, announces the boot and schedules the
    /// first rollcall. Runs once; later calls do nothing.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let loaded = self.registry.load_all();
        info!(mailboxes = loaded, receiver = self.registry.config().receiver_id.get(), "Receiver started");
        self.registry.notifier().notify_boot();
        self.registry.schedule_rollcall(self.clock.monotonic_ms());
    }

    /// One pass of the loop. Never blocks.
    pub fn poll(&mut self) -> PollReport {
        self.start();
        let now_ms = self.clock.monotonic_ms();
        let now = self.clock.wall_clock();
        let mut report = PollReport::default();

        // Absence can only be judged once the wall clock is known
        if !self.wall_clock_seen && now.is_some() {
            self.wall_clock_seen = true;
            info!("Wall clock available, checking mailboxes");
            self.registry.rollcall(now);
        }

        loop {
            report.faults.extend(self.receiver.update(&mut self.link, now_ms));
            let Some(frame) = self.receiver.take_message(true) else {
                break;
            };
            match self.registry.dispatch(&frame, now_ms, now) {
                Ok(applied) => report.applied.push((frame, applied)),
                Err(e) => warn!(error = %e, %frame, "Message ignored"),
            }
        }

        report.fired = self.registry.service_timers(now_ms, now);
        report
    }

    /// Applies an outside request; returns false for [`Command::Shutdown`]
    pub fn handle(&mut self, command: Command) -> Result<bool> {
        debug!(?command, "command");
        match command {
            Command::Acknowledge { actor, target } => {
                self.registry.acknowledge(&actor, target)?;
            }
            Command::SetLabel { id, label } => self.registry.set_label(id, &label)?,
            Command::Delete(id) => {
                if !self.registry.delete(id) {
                    warn!(mailbox = %id, "No such mailbox to delete");
                }
            }
            Command::Shutdown => return Ok(false),
        }
        Ok(true)
    }

    /// Polls every `poll_interval` and serves commands until shutdown or
    /// until every command sender is gone
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) -> Result<()> {
        self.start();
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll();
                }

                command = commands.recv() => {
                    let Some(command) = command else {
                        info!("Command channel closed, stopping receiver");
                        return Ok(());
                    };
                    match self.handle(command) {
                        Ok(true) => {}
                        Ok(false) => {
                            info!("Stopping receiver");
                            return Ok(());
                        }
                        Err(e) => warn!(error = %e, "Command failed"),
                    }
                }
            }
        }
    }

    pub fn registry(&self) -> &MailboxRegistry {
        &self.registry
    }

    pub fn receiver(&self) -> &FrameReceiver {
        &self.receiver
    }

    pub fn link(&self) -> &S {
        &self.link
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MemoryLink;
    use crate::mailbox::{Alarm, MemoryStore, Notification, RecordingNotifier};
    use crate::time::ManualClock;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::Arc;

    fn frame(mailbox: u8, sequence: u16, door: bool) -> Frame {
        let mut frame = Frame::new(1, mailbox);
        frame.sequence = sequence;
        frame.door = door;
        frame.online = door;
        frame.battery = 90;
        frame.uptime = if door { 100 } else { 8_000 };
        frame
    }

    struct Harness {
        node: ReceiverNode<MemoryLink, ManualClock>,
        air: MemoryLink,
        clock: ManualClock,
        store: MemoryStore,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(wall_clock: bool) -> Harness {
        let air = MemoryLink::new();
        let start = Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap();
        let clock = ManualClock::new(if wall_clock { Some(start) } else { None });
        let store = MemoryStore::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let node = ReceiverNode::new(
            Config::default(),
            air.clone(),
            clock.clone(),
            Box::new(store.clone()),
            Box::new(notifier.clone()),
        );
        Harness { node, air, clock, store, notifier }
    }

    #[test]
    fn test_poll_applies_frames_and_boots_once() {
        let mut h = harness(true);
        h.air.push(&frame(3, 5, true).encode());
        h.air.push(&frame(3, 6, false).encode());

        let report = h.node.poll();
        assert_eq!(report.applied.len(), 2);
        assert!(report.faults.is_empty());
        assert_eq!(h.node.registry().global_alarm(), Alarm::DoorFlipped);
        assert!(h.store.records().contains_key("mailbox3.cfg"));

        h.node.poll();
        let boots = h
            .notifier
            .notifications()
            .iter()
            .filter(|n| **n == Notification::Boot)
            .count();
        assert_eq!(boots, 1);
    }

    #[test]
    fn test_corrupted_frame_is_reported_not_applied() {
        let mut h = harness(true);
        let mut bytes = frame(2, 1, true).encode();
        bytes[3] ^= 0x01;
        h.air.push(&bytes);
        h.air.push(&frame(2, 1, true).encode());

        let report = h.node.poll();
        assert!(matches!(report.faults[..], [FrameFault::ChecksumMismatch { .. }]));
        assert_eq!(report.applied.len(), 1);
        assert_eq!(h.node.receiver().stats().checksum_mismatches, 1);
    }

    #[test]
    fn test_pending_timeout_serviced_by_poll() {
        let mut h = harness(true);
        h.air.push(&frame(4, 1, true).encode());
        h.node.poll();

        h.clock.advance(Duration::from_secs(34));
        assert!(h.node.poll().fired.is_empty());
        h.clock.advance(Duration::from_secs(1));
        assert_eq!(h.node.poll().fired, vec![Action::PendingTimeout(MailboxId::new(4).unwrap())]);
        assert_eq!(h.node.registry().global_alarm(), Alarm::DoorFlipped);
    }

    #[test]
    fn test_rollcall_deferred_until_wall_clock() {
        let mut h = harness(false);
        let start = Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap();
        let seen = start - ChronoDuration::days(4);
        h.store.insert("mailbox5.cfg", &format!("Shed\n{}\n80\n", seen.timestamp()));

        h.node.poll();
        assert_eq!(h.node.registry().global_alarm(), Alarm::None);

        h.clock.set_wall_clock(Some(start));
        h.node.poll();
        assert_eq!(h.node.registry().global_alarm(), Alarm::Absent);
    }

    #[test]
    fn test_commands() {
        let mut h = harness(true);
        h.air.push(&frame(3, 5, true).encode());
        h.node.poll();
        let id = MailboxId::new(3).unwrap();

        assert!(h
            .node
            .handle(Command::SetLabel { id, label: "Front".into() })
            .unwrap());
        assert!(h
            .node
            .handle(Command::Acknowledge { actor: "test".into(), target: AckTarget::All })
            .unwrap());
        assert_eq!(h.node.registry().global_alarm(), Alarm::None);
        assert_eq!(h.node.registry().get(id).unwrap().name(), "3 (Front)");

        assert!(h.node.handle(Command::Delete(id)).unwrap());
        assert!(h.node.registry().is_empty());
        assert!(h.node.handle(Command::SetLabel { id, label: "x".into() }).is_err());
        assert!(!h.node.handle(Command::Shutdown).unwrap());
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let mut h = harness(true);
        h.air.push(&frame(7, 1, true).encode());
        let (tx, rx) = mpsc::channel(4);

        let handle = tokio::spawn(async move {
            h.node.run(rx).await.unwrap();
            h.node
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(Command::Shutdown).await.unwrap();
        let node = handle.await.unwrap();
        assert_eq!(
            node.registry().get(MailboxId::new(7).unwrap()).unwrap().alarm(),
            Alarm::DoorOpenNow
        );
    }

    #[test]
    fn test_run_stops_when_senders_drop() {
        let mut h = harness(true);
        let (tx, rx) = mpsc::channel::<Command>(1);
        drop(tx);
        tokio_test::block_on(h.node.run(rx)).unwrap();
        assert!(h.notifier.notifications().contains(&Notification::Boot));
    }
}
