use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::core::MailboxId;
use crate::util::plural;
use super::alarm::Alarm;
use super::snapshot::Mailbox;

/// A momentary mailbox event, ready to be rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxEvent {
    /// Mailbox the event belongs to
    pub mailbox: MailboxId,
    /// Alarm after the event
    pub alarm: Alarm,
    /// Sensor uptime when it reported, 0 for receiver-side events
    pub remote_time_ms: u16,
    /// Battery level, if known
    pub battery: Option<u8>,
    /// One-line description, e.g. "Mailbox 3 (Front) closed after 12 seconds"
    pub text: String,
}

/// Where mailbox notifications go. Delivery failures stay inside the sink.
pub trait Notifier {
    /// The receiver node started
    fn notify_boot(&self);

    /// A mailbox fell to the low battery level
    fn notify_low_battery(&self, mailbox: &Mailbox);

    /// Whole door events (open/close pairs) were lost on the air
    fn notify_lost_messages(&self, count: u32);

    /// An alarm-affecting event happened
    fn notify_event(&self, event: &MailboxEvent);

    /// Voice announcement of a door opening; returns whether it was delivered
    fn announce_opening(&self, _mailbox: &Mailbox) -> bool {
        false
    }
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify_boot(&self) {
        (**self).notify_boot()
    }

    fn notify_low_battery(&self, mailbox: &Mailbox) {
        (**self).notify_low_battery(mailbox)
    }

    fn notify_lost_messages(&self, count: u32) {
        (**self).notify_lost_messages(count)
    }

    fn notify_event(&self, event: &MailboxEvent) {
        (**self).notify_event(event)
    }

    fn announce_opening(&self, mailbox: &Mailbox) -> bool {
        (**self).announce_opening(mailbox)
    }
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify_boot(&self) {
        (**self).notify_boot()
    }

    fn notify_low_battery(&self, mailbox: &Mailbox) {
        (**self).notify_low_battery(mailbox)
    }

    fn notify_lost_messages(&self, count: u32) {
        (**self).notify_lost_messages(count)
    }

    fn notify_event(&self, event: &MailboxEvent) {
        (**self).notify_event(event)
    }

    fn announce_opening(&self, mailbox: &Mailbox) -> bool {
        (**self).announce_opening(mailbox)
    }
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_boot(&self) {
        info!("Mailbox receiver started");
    }

    fn notify_low_battery(&self, mailbox: &Mailbox) {
        match mailbox.battery_level() {
            Some(level) => warn!(mailbox = %mailbox.id(), "Mailbox {} is low on battery ({}%)", mailbox.name(), level),
            None => warn!(mailbox = %mailbox.id(), "Mailbox {} is low on battery", mailbox.name()),
        }
    }

    fn notify_lost_messages(&self, count: u32) {
        warn!(count, "Detected loss of {} beforehand", plural(count as u64, "event"));
    }

    fn notify_event(&self, event: &MailboxEvent) {
        info!(mailbox = %event.mailbox, alarm = %event.alarm, "{} {}", event.alarm.icon(), event.text);
    }
}

/// What a [`RecordingNotifier`] saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Boot,
    LowBattery { mailbox: MailboxId, battery: Option<u8> },
    LostMessages(u32),
    Event(MailboxEvent),
    Opening(MailboxId),
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    log: Mutex<Vec<Notification>>,
    voice_delivers: bool,
}

impl RecordingNotifier {
    /// Recorder whose voice announcements fail
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder whose voice announcements succeed
    pub fn with_voice() -> Self {
        RecordingNotifier {
            log: Mutex::new(Vec::new()),
            voice_delivers: true,
        }
    }

    /// Everything recorded so far
    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().clone()
    }

    /// Only the recorded events
    pub fn events(&self) -> Vec<MailboxEvent> {
        self.lock()
            .iter()
            .filter_map(|n| match n {
                Notification::Event(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forgets what was recorded
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn push(&self, notification: Notification) {
        self.lock().push(notification);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Notifier for RecordingNotifier {
    fn notify_boot(&self) {
        self.push(Notification::Boot);
    }

    fn notify_low_battery(&self, mailbox: &Mailbox) {
        self.push(Notification::LowBattery {
            mailbox: mailbox.id(),
            battery: mailbox.battery_level(),
        });
    }

    fn notify_lost_messages(&self, count: u32) {
        self.push(Notification::LostMessages(count));
    }

    fn notify_event(&self, event: &MailboxEvent) {
        self.push(Notification::Event(event.clone()));
    }

    fn announce_opening(&self, mailbox: &Mailbox) -> bool {
        self.push(Notification::Opening(mailbox.id()));
        self.voice_delivers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier() {
        let notifier = Arc::new(RecordingNotifier::with_voice());
        let shared: Box<dyn Notifier> = Box::new(notifier.clone());
        let mut mb = Mailbox::new(MailboxId::new(4).unwrap());
        mb.battery = 15;

        shared.notify_boot();
        shared.notify_low_battery(&mb);
        shared.notify_lost_messages(2);
        assert!(shared.announce_opening(&mb));

        assert_eq!(
            notifier.notifications(),
            vec![
                Notification::Boot,
                Notification::LowBattery { mailbox: mb.id(), battery: Some(15) },
                Notification::LostMessages(2),
                Notification::Opening(mb.id()),
            ]
        );
        assert!(notifier.events().is_empty());
        notifier.clear();
        assert!(notifier.notifications().is_empty());
    }

    #[test]
    fn test_log_notifier_has_no_voice() {
        let mb = Mailbox::new(MailboxId::new(1).unwrap());
        assert!(!LogNotifier.announce_opening(&mb));
    }
}
