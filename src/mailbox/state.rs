use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::core::serde::{from_unix_seconds, unix_seconds};
use crate::core::{
    Config, Error, MailboxId, Result, BATTERY_LEVEL_FULL, BATTERY_LEVEL_UNKNOWN,
    RADIO_RELIABILITY_BAD, SEQUENCE_UNKNOWN,
};
use crate::protocol::{next_sequence, Frame};
use crate::time::util::{elapsed, whole_days};
use crate::util::{battery_text, plural};
use super::alarm::Alarm;
use super::notify::{MailboxEvent, Notifier};
use super::snapshot::Mailbox;

/// Outcome of applying one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Alarm before the frame
    pub previous_alarm: Alarm,
    /// Alarm after the frame
    pub alarm: Alarm,
    /// Messages missing between the previous frame and this one
    pub lost: u16,
    /// Whole door events missing
    pub lost_events: u32,
    /// Sequence gap was implausible and loss accounting was skipped
    pub desync: bool,
    /// Sender stays awake, so its closing frame is pending
    pub online: bool,
}

/// Receiver-side view of one mailbox: its last snapshot plus the alarm
/// engine and loss accounting
#[derive(Debug, Clone)]
pub struct MailboxState {
    mailbox: Mailbox,
    last_seen: Option<DateTime<Utc>>,
    received: u32,
    lost: u32,
    alarm: Alarm,
    pending: bool,
    battery_reported: bool,
    opening_reported: bool,
}

impl MailboxState {
    /// Never-seen mailbox
    pub fn new(id: MailboxId) -> Self {
        MailboxState {
            mailbox: Mailbox::new(id),
            last_seen: None,
            received: 0,
            lost: 0,
            alarm: Alarm::None,
            pending: false,
            battery_reported: false,
            opening_reported: false,
        }
    }

    /// Mailbox rebuilt from its persisted fields
    pub fn restore(id: MailboxId, label: &str, last_seen: Option<DateTime<Utc>>, battery: u8) -> Self {
        let mut state = Self::new(id);
        state.mailbox.set_label(label);
        state.mailbox.battery = battery;
        state.last_seen = last_seen;
        state
    }

    pub fn id(&self) -> MailboxId {
        self.mailbox.id()
    }

    /// Last-known snapshot
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn name(&self) -> String {
        self.mailbox.name()
    }

    pub fn label(&self) -> &str {
        self.mailbox.label()
    }

    pub fn set_label(&mut self, label: &str) {
        self.mailbox.set_label(label);
    }

    /// When the last frame arrived, if ever (and the wall clock was known)
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    /// Messages estimated as sent by the mailbox
    pub fn sent(&self) -> u32 {
        self.mailbox.sent
    }

    /// Messages actually received
    pub fn received(&self) -> u32 {
        self.received
    }

    /// Messages inferred as lost, from sequence gaps and pending timeouts
    pub fn lost(&self) -> u32 {
        self.lost
    }

    pub fn alarm(&self) -> Alarm {
        self.alarm
    }

    /// The closing frame of an awake cycle is awaited
    pub fn pending_timeout_armed(&self) -> bool {
        self.pending
    }

    /// Low battery was already notified since the last reset
    pub fn battery_reported(&self) -> bool {
        self.battery_reported
    }

    /// The current opening was already announced by voice
    pub fn opening_reported(&self) -> bool {
        self.opening_reported
    }

    /// Received over estimated-sent messages (%), `None` before any message
    pub fn radio_reliability(&self) -> Option<u8> {
        let sent = self.mailbox.sent as u64;
        if sent == 0 {
            return None;
        }
        Some((100 * self.received as u64 / sent).min(100) as u8)
    }

    /// True if the radio link of this mailbox loses too much
    pub fn radio_bad(&self) -> bool {
        self.radio_reliability()
            .map_or(false, |r| r <= RADIO_RELIABILITY_BAD)
    }

    /// Applies an accepted frame from this mailbox.
    ///
    /// Runs loss accounting, updates the snapshot, moves the alarm and
    /// notifies. Arming the pending timeout is up to the caller, using
    /// [`Applied::online`].
    pub fn apply(
        &mut self,
        frame: &Frame,
        now: Option<DateTime<Utc>>,
        config: &Config,
        notifier: &dyn Notifier,
    ) -> Applied {
        let id = self.id();
        let previous_seq = self.mailbox.sequence;

        // Messages lost during a reboot are exempt
        let mut lost: u16 = 0;
        let mut desync = false;
        if previous_seq != SEQUENCE_UNKNOWN && !frame.boot {
            let expected = next_sequence(previous_seq);
            let mut gap = frame.sequence.wrapping_sub(expected);
            if frame.sequence < expected {
                // 0 and 1 are never sent
                gap = gap.saturating_sub(2);
            }
            if gap <= config.lost_message_max {
                lost = gap;
                self.mailbox.sent = self.mailbox.sent.wrapping_add(gap as u32);
                self.lost = self.lost.saturating_add(gap as u32);
                if gap > 0 {
                    warn!(mailbox = %id, lost = gap, seq = frame.sequence, "Lost {}!", plural(gap as u64, "message"));
                }
            } else {
                desync = true;
                warn!(mailbox = %id, expected, seq = frame.sequence, "Message counter is out of sync; resetting");
            }
        }

        self.mailbox.sent = self.mailbox.sent.wrapping_add(1);
        self.received = self.received.wrapping_add(1);
        if now.is_some() {
            self.last_seen = now;
        }
        self.mailbox.sequence = frame.sequence;
        self.mailbox.boot = frame.boot;
        self.mailbox.online = frame.online;
        self.mailbox.door = frame.door;
        if let Some(level) = frame.battery_level() {
            self.mailbox.battery = level.min(BATTERY_LEVEL_FULL);
        }

        let previous_alarm = self.alarm;
        self.alarm = if frame.boot {
            Alarm::Booted
        } else if frame.door {
            if previous_alarm == Alarm::DoorOpenNow {
                Alarm::DoorLeftOpen
            } else {
                Alarm::DoorOpenNow
            }
        } else {
            Alarm::DoorFlipped
        };

        let event = self.event(frame.uptime, now);
        info!(
            mailbox = %id,
            seq = frame.sequence,
            "({}) {}; battery {}",
            frame.sequence,
            event.text,
            battery_text(self.mailbox.battery_level())
        );
        notifier.notify_event(&event);
        self.announce(frame.uptime, notifier);

        // Events come as odd (start) and even (end) pairs
        let lost_events = if previous_seq == SEQUENCE_UNKNOWN || lost > 0 {
            let parity = (frame.sequence as i64 + 1) % 2;
            ((lost as i64 - parity) / 2).max(0) as u32
        } else {
            0
        };
        if lost_events > 0 {
            notifier.notify_lost_messages(lost_events);
        }

        self.pending = self.mailbox.online;

        Applied {
            previous_alarm,
            alarm: self.alarm,
            lost,
            lost_events,
            desync,
            online: self.mailbox.online,
        }
    }

    fn announce(&mut self, remote_time_ms: u16, notifier: &dyn Notifier) {
        if self.opening_reported {
            self.opening_reported = false;
            return;
        }
        if self.alarm.is_door() {
            if self.alarm == Alarm::DoorFlipped && remote_time_ms / 1000 == 0 {
                // Bounce: opened and closed within the same wake-up
                self.opening_reported = true;
            } else {
                self.opening_reported = notifier.announce_opening(&self.mailbox) && self.mailbox.online;
            }
        }
    }

    /// The closing frame never came: assumes it was sent and lost.
    ///
    /// Returns whether the alarm was moved. An acknowledged mailbox keeps
    /// its cleared alarm and a booted one stays `Booted`.
    pub fn on_pending_timeout(&mut self) -> bool {
        self.pending = false;
        self.mailbox.sequence = next_sequence(self.mailbox.sequence);
        self.mailbox.sent = self.mailbox.sent.wrapping_add(1);
        self.lost = self.lost.saturating_add(1);
        self.opening_reported = false;
        warn!(
            mailbox = %self.id(),
            seq = self.mailbox.sequence,
            "Mailbox {} door closure event timed out; potentially lost 1 message",
            self.name()
        );

        // A booting node reported no door event
        if self.alarm == Alarm::None || self.mailbox.boot {
            return false;
        }
        self.alarm = Alarm::DoorFlipped;
        true
    }

    /// Health check: absence and low battery. Returns false while the
    /// mailbox is absent or low on battery.
    ///
    /// Absence is only evaluated when the wall clock is known. Neither
    /// condition lowers a higher alarm.
    pub fn is_ok(&mut self, now: Option<DateTime<Utc>>, config: &Config, notifier: &dyn Notifier) -> bool {
        let mut ok = true;

        if let (Some(now), Some(seen)) = (now, self.last_seen) {
            if elapsed(now, seen).map_or(false, |e| e >= config.absence_window) {
                ok = false;
                if self.alarm < Alarm::Absent {
                    self.alarm = Alarm::Absent;
                    info!(mailbox = %self.id(), "Marking mailbox {} as absent", self.name());
                    notifier.notify_event(&self.event(0, Some(now)));
                }
            }
        }

        let low = self
            .mailbox
            .battery_level()
            .map_or(false, |level| level <= config.low_battery_threshold);
        if low {
            ok = false;
            if self.alarm < Alarm::LowBattery {
                self.alarm = Alarm::LowBattery;
            }
            if !self.battery_reported {
                warn!(mailbox = %self.id(), "Mailbox {} is low on battery", self.name());
                notifier.notify_low_battery(&self.mailbox);
                self.battery_reported = true;
            }
        }

        ok
    }

    /// Acknowledges the alarm; returns the severity that was cleared.
    /// Loss counters and last-seen are kept.
    pub fn reset_alarm(&mut self) -> Alarm {
        let cleared = self.alarm;
        self.alarm = Alarm::None;
        self.battery_reported = false;
        debug!(mailbox = %self.id(), alarm = %cleared, "alarm reset");
        cleared
    }

    /// One-line description of the current alarm as a momentary event
    pub fn describe(&self, remote_time_ms: u16, now: Option<DateTime<Utc>>) -> String {
        let secs = (remote_time_ms / 1000) as u64;
        let what = match self.alarm {
            Alarm::None => "has no event".to_string(),
            Alarm::Booted if self.mailbox.online => "rebooted".to_string(),
            Alarm::Booted => "sleeping after reboot".to_string(),
            Alarm::LowBattery => format!("is low on battery ({})", battery_text(self.mailbox.battery_level())),
            Alarm::Absent => match (now, self.last_seen) {
                (Some(now), Some(seen)) => format!(
                    "haven't reported back for {}",
                    plural(whole_days(now, seen) as u64, "day")
                ),
                _ => "is absent".to_string(),
            },
            Alarm::DoorFlipped if secs > 0 => format!("closed after {}", plural(secs, "second")),
            Alarm::DoorFlipped => "bounced".to_string(),
            Alarm::DoorLeftOpen => "door left open".to_string(),
            Alarm::DoorOpenNow => "door opened".to_string(),
        };
        format!("Mailbox {} {}", self.name(), what)
    }

    fn event(&self, remote_time_ms: u16, now: Option<DateTime<Utc>>) -> MailboxEvent {
        MailboxEvent {
            mailbox: self.id(),
            alarm: self.alarm,
            remote_time_ms,
            battery: self.mailbox.battery_level(),
            text: self.describe(remote_time_ms, now),
        }
    }

    /// Persisted form: label, last-seen Unix seconds (0 = never), battery
    pub fn to_record(&self) -> String {
        format!(
            "{}\n{}\n{}\n",
            self.mailbox.label(),
            unix_seconds(self.last_seen),
            self.mailbox.battery
        )
    }

    /// Rebuilds a mailbox from its persisted form
    pub fn from_record(id: MailboxId, record: &str) -> Result<Self> {
        let mut lines = record.lines();
        let label = lines
            .next()
            .ok_or_else(|| Error::malformed(id.get(), "empty record"))?;
        let last_seen = lines
            .next()
            .ok_or_else(|| Error::malformed(id.get(), "missing last seen time"))?
            .trim()
            .parse::<i64>()
            .map_err(|e| Error::malformed(id.get(), format!("last seen time: {}", e)))?;
        let battery = lines
            .next()
            .ok_or_else(|| Error::malformed(id.get(), "missing battery level"))?
            .trim()
            .parse::<u8>()
            .map_err(|e| Error::malformed(id.get(), format!("battery level: {}", e)))?;
        if battery > BATTERY_LEVEL_FULL && battery != BATTERY_LEVEL_UNKNOWN {
            return Err(Error::malformed(id.get(), format!("battery level {} out of range", battery)));
        }
        if last_seen < 0 {
            return Err(Error::malformed(id.get(), "negative last seen time"));
        }
        Ok(Self::restore(id, label, from_unix_seconds(last_seen), battery))
    }
}
