use std::io;
use thiserror::Error;

/// Custom error types for the mailbox link
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol version mismatch: got {found}, expected {expected}")]
    VersionMismatch { found: u8, expected: u8 },

    #[error("Receiver address mismatch: got {found}, expected {expected} or broadcast")]
    AddressMismatch { found: u8, expected: u8 },

    #[error("Checksum mismatch: computed {expected:#04x}, frame carries {found:#04x}")]
    ChecksumMismatch { expected: u8, found: u8 },

    #[error("Invalid mailbox id: {0}")]
    InvalidMailboxId(u8),

    #[error("Malformed record for mailbox {id}: {reason}")]
    MalformedRecord { id: u8, reason: String },

    #[error("Link error: {0}")]
    Link(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new link error
    pub fn link(msg: impl Into<String>) -> Self {
        Error::Link(msg.into())
    }

    /// Creates a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Creates a malformed persisted record error
    pub fn malformed(id: u8, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            id,
            reason: reason.into(),
        }
    }
}
