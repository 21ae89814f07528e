use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// Identifies a mailbox reporting to a receiver (1-15)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct MailboxId(u8);

impl MailboxId {
    /// Creates a mailbox id, rejecting the reserved 0 and anything above 15
    pub fn new(id: u8) -> Result<Self> {
        if (super::MAILBOX_ID_MIN..=super::MAILBOX_ID_MAX).contains(&id) {
            Ok(MailboxId(id))
        } else {
            Err(Error::InvalidMailboxId(id))
        }
    }

    /// Returns the raw id
    pub fn get(&self) -> u8 {
        self.0
    }

    /// Every valid id, in ascending order
    pub fn all() -> impl Iterator<Item = MailboxId> {
        (super::MAILBOX_ID_MIN..=super::MAILBOX_ID_MAX).map(MailboxId)
    }
}

impl Default for MailboxId {
    fn default() -> Self {
        MailboxId(super::MAILBOX_ID_MIN)
    }
}

impl TryFrom<u8> for MailboxId {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        MailboxId::new(id)
    }
}

impl From<MailboxId> for u8 {
    fn from(id: MailboxId) -> u8 {
        id.0
    }
}

impl fmt::Display for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiver address on a channel (0 is broadcast)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ReceiverId(u8);

impl ReceiverId {
    /// The broadcast address every receiver accepts
    pub const ANY: ReceiverId = ReceiverId(super::RECEIVER_ID_ANY);

    /// Creates a receiver id (0-15)
    pub fn new(id: u8) -> Result<Self> {
        if id <= super::RECEIVER_ID_MAX {
            Ok(ReceiverId(id))
        } else {
            Err(Error::config(format!("receiver id {} is out of range 0-15", id)))
        }
    }

    /// Returns the raw id
    pub fn get(&self) -> u8 {
        self.0
    }

    /// True if a frame addressed to `addr` is meant for this receiver
    pub fn accepts(&self, addr: u8) -> bool {
        addr == self.0 || addr == super::RECEIVER_ID_ANY
    }
}

impl TryFrom<u8> for ReceiverId {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        ReceiverId::new(id)
    }
}

impl From<ReceiverId> for u8 {
    fn from(id: ReceiverId) -> u8 {
        id.0
    }
}

/// Configuration for the receiver node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// This receiver's address
    pub receiver_id: ReceiverId,
    /// Serial device the RF module is attached to
    pub serial_device: String,
    /// RF link speed; must match the radio module's configured mode
    pub baud_rate: u32,
    /// Maximum time to assemble one frame once its first byte arrived
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub receive_timeout: Duration,
    /// Longest time a sensor node stays awake after the door opened
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub awake_window: Duration,
    /// Extra wait on top of the awake window before the closing message is deemed lost
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub pending_slack: Duration,
    /// Silence after which a mailbox is declared absent
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub absence_window: Duration,
    /// Battery level at or below which a mailbox is low (%)
    pub low_battery_threshold: u8,
    /// Fleet health check cadence
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub rollcall_interval: Duration,
    /// Sequence gap above which the counter is considered out of sync
    pub lost_message_max: u16,
    /// Directory holding one record per mailbox
    pub store_dir: PathBuf,
    /// Cooperative loop period
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            receiver_id: ReceiverId(1),
            serial_device: "/dev/ttyUSB0".to_string(),
            baud_rate: 1200,
            receive_timeout: Duration::from_secs(2),
            awake_window: Duration::from_secs(30),
            pending_slack: Duration::from_secs(5),
            absence_window: Duration::from_secs(3 * 24 * 60 * 60),
            low_battery_threshold: super::BATTERY_LEVEL_LOW,
            rollcall_interval: Duration::from_secs(60 * 60),
            lost_message_max: 1000,
            store_dir: PathBuf::from("mailboxes"),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl Config {
    /// Parses a JSON configuration; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Checks value ranges
    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(Error::config("baud_rate must be positive"));
        }
        if self.receive_timeout.is_zero() {
            return Err(Error::config("receive_timeout must be positive"));
        }
        if self.awake_window.is_zero() {
            return Err(Error::config("awake_window must be positive"));
        }
        if self.absence_window < Duration::from_secs(24 * 60 * 60) {
            return Err(Error::config("absence_window must be at least one day"));
        }
        if self.low_battery_threshold > super::BATTERY_LEVEL_FULL {
            return Err(Error::config("low_battery_threshold must be 0-100"));
        }
        if self.rollcall_interval.is_zero() || self.poll_interval.is_zero() {
            return Err(Error::config("rollcall_interval and poll_interval must be positive"));
        }
        Ok(())
    }

    /// Time after an "online" frame before the closing frame is deemed lost
    pub fn pending_timeout(&self) -> Duration {
        self.awake_window + self.pending_slack
    }
}
