use crate::core::{MailboxId, BATTERY_LEVEL_UNKNOWN, SEQUENCE_UNKNOWN};
use crate::protocol::Frame;

/// Identity and last-known status of a mailbox, as either node sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    id: MailboxId,
    label: String,
    /// Last boot was not a wake from deep sleep
    pub boot: bool,
    /// Node stays awake after its last message
    pub online: bool,
    /// Battery level (%), 127 when unknown
    pub battery: u8,
    /// Door open
    pub door: bool,
    /// Current through message number
    pub sequence: u16,
    /// Messages counted as sent (the receiver's estimate on that side)
    pub sent: u32,
}

impl Mailbox {
    /// Mailbox with no label and unknown battery
    pub fn new(id: MailboxId) -> Self {
        Mailbox {
            id,
            label: String::new(),
            boot: false,
            online: false,
            battery: BATTERY_LEVEL_UNKNOWN,
            door: false,
            sequence: SEQUENCE_UNKNOWN,
            sent: 0,
        }
    }

    /// Mailbox id
    pub fn id(&self) -> MailboxId {
        self.id
    }

    /// Free-text label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Replaces the label; line breaks become spaces so records stay line-delimited
    pub fn set_label(&mut self, label: &str) {
        self.label = label
            .trim()
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
    }

    /// "3" or "3 (Front gate)"
    pub fn name(&self) -> String {
        if self.label.is_empty() {
            self.id.to_string()
        } else {
            format!("{} ({})", self.id, self.label)
        }
    }

    /// Door open
    pub fn door_open(&self) -> bool {
        self.door
    }

    /// Door closed
    pub fn door_closed(&self) -> bool {
        !self.door
    }

    /// Battery level, `None` when unknown
    pub fn battery_level(&self) -> Option<u8> {
        if self.battery == BATTERY_LEVEL_UNKNOWN {
            None
        } else {
            Some(self.battery)
        }
    }

    /// Copies the status fields into an outgoing frame
    pub fn stamp(&self, frame: &mut Frame) {
        frame.mailbox = self.id.get();
        frame.sequence = self.sequence;
        frame.boot = self.boot;
        frame.online = self.online;
        frame.battery = self.battery;
        frame.door = self.door;
    }
}
