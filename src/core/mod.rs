//! Core types and traits for the mailbox link
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{Error, Result};
pub use self::types::{Config, MailboxId, ReceiverId};

/// Protocol version (0-15). Version 0 is reserved for development
pub const PROTOCOL_VERSION: u8 = 2;

/// Broadcast receiver address
pub const RECEIVER_ID_ANY: u8 = 0;

/// Highest receiver address
pub const RECEIVER_ID_MAX: u8 = 15;

/// Reserved "unknown" sequence number
pub const SEQUENCE_UNKNOWN: u16 = 0;

/// Lowest mailbox id (0 means the receiver itself)
pub const MAILBOX_ID_MIN: u8 = 1;

/// Highest mailbox id
pub const MAILBOX_ID_MAX: u8 = 15;

/// Fully discharged battery (%)
pub const BATTERY_LEVEL_DEAD: u8 = 0;

/// Default low battery alert level (%)
pub const BATTERY_LEVEL_LOW: u8 = 20;

/// Fully charged battery (%)
pub const BATTERY_LEVEL_FULL: u8 = 100;

/// Reserved "unknown" battery level
pub const BATTERY_LEVEL_UNKNOWN: u8 = 127;

/// Radio reliability at or below which the link is considered bad (%)
pub const RADIO_RELIABILITY_BAD: u8 = 89;
