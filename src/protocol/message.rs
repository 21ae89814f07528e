//! The 8-byte mailbox frame
//!
//! ```text
//!  byte  bits  field
//!  0     0-3   protocol version
//!  0     4-7   receiver address (0 = any receiver)
//!  1     0-3   mailbox id (1-15)
//!  1     4     boot (0 = woke from deep sleep, 1 = any other boot)
//!  1     5     online (1 = staying awake after this message)
//!  1     6     door (1 = open)
//!  1     7     reserved
//!  2-3         sequence number, big-endian (0 = unknown)
//!  4-5         sender uptime in ms, big-endian, wraps
//!  6     0-6   battery level 0-100 (127 = unknown)
//!  6     7     reserved
//!  7           XOR of bytes 0-6
//! ```

use std::fmt;

use crate::core::{Error, MailboxId, Result, BATTERY_LEVEL_UNKNOWN, PROTOCOL_VERSION, SEQUENCE_UNKNOWN};

/// Frame size on the wire
pub const FRAME_SIZE: usize = 8;

const OFF_HEADER: usize = 0;
const OFF_STATUS: usize = 1;
const OFF_SEQUENCE: usize = 2;
const OFF_UPTIME: usize = 4;
const OFF_BATTERY: usize = 6;
const OFF_CHECKSUM: usize = 7;

const BOOT_BIT: u8 = 1 << 4;
const ONLINE_BIT: u8 = 1 << 5;
const DOOR_BIT: u8 = 1 << 6;

/// XOR of every byte except the trailing checksum byte
pub fn checksum(bytes: &[u8; FRAME_SIZE]) -> u8 {
    bytes[..OFF_CHECKSUM].iter().fold(0, |sum, b| sum ^ b)
}

/// True if the trailing byte matches the recomputed checksum
pub fn checksum_ok(bytes: &[u8; FRAME_SIZE]) -> bool {
    bytes[OFF_CHECKSUM] == checksum(bytes)
}

/// Protocol version carried in a header byte
pub fn header_version(header: u8) -> u8 {
    header & 0x0F
}

/// Receiver address carried in a header byte
pub fn header_receiver(header: u8) -> u8 {
    header >> 4
}

/// True if the header byte carries the supported protocol version
pub fn version_ok(header: u8) -> bool {
    header_version(header) == PROTOCOL_VERSION
}

/// Next sequence number after `current`, never returning the reserved 0.
///
/// On wrap the value 0 is skipped together with 1, so odd numbers keep
/// marking event starts and even numbers event ends.
pub fn next_sequence(current: u16) -> u16 {
    let next = current.wrapping_add(1);
    if next == SEQUENCE_UNKNOWN {
        next.wrapping_add(2)
    } else {
        next
    }
}

/// Raw frame rendered as dotted hex, e.g. `12.31.00.05.00.c8.50.d7`
pub fn raw_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(".")
}

/// Decoded mailbox status frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Protocol version (0-15)
    pub version: u8,
    /// Receiver address (0-15, 0 = any)
    pub receiver: u8,
    /// Mailbox id (1-15)
    pub mailbox: u8,
    /// Cold (or other non deep-sleep) boot
    pub boot: bool,
    /// Sender stays awake after this frame
    pub online: bool,
    /// Door open
    pub door: bool,
    /// Through message number
    pub sequence: u16,
    /// Sender uptime in ms, truncated to 16 bits
    pub uptime: u16,
    /// Battery level (%), 127 when unknown
    pub battery: u8,
}

impl Frame {
    /// Empty frame of the current protocol version
    pub fn new(receiver: u8, mailbox: u8) -> Self {
        Frame {
            version: PROTOCOL_VERSION,
            receiver,
            mailbox,
            boot: false,
            online: false,
            door: false,
            sequence: SEQUENCE_UNKNOWN,
            uptime: 0,
            battery: BATTERY_LEVEL_UNKNOWN,
        }
    }

    /// Stores uptime the way the wire does: modulo 65536 ms
    pub fn set_uptime_ms(&mut self, ms: u64) {
        self.uptime = (ms & 0xFFFF) as u16;
    }

    /// Packs the frame and appends its checksum
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[OFF_HEADER] = (self.version & 0x0F) | ((self.receiver & 0x0F) << 4);

        let mut status = self.mailbox & 0x0F;
        if self.boot {
            status |= BOOT_BIT;
        }
        if self.online {
            status |= ONLINE_BIT;
        }
        if self.door {
            status |= DOOR_BIT;
        }
        bytes[OFF_STATUS] = status;

        bytes[OFF_SEQUENCE..OFF_SEQUENCE + 2].copy_from_slice(&self.sequence.to_be_bytes());
        bytes[OFF_UPTIME..OFF_UPTIME + 2].copy_from_slice(&self.uptime.to_be_bytes());
        bytes[OFF_BATTERY] = self.battery & 0x7F;
        bytes[OFF_CHECKSUM] = checksum(&bytes);
        bytes
    }

    /// Unpacks a frame, checking protocol version first and checksum second
    pub fn decode(bytes: &[u8; FRAME_SIZE]) -> Result<Self> {
        let header = bytes[OFF_HEADER];
        if !version_ok(header) {
            return Err(Error::VersionMismatch {
                found: header_version(header),
                expected: PROTOCOL_VERSION,
            });
        }
        let expected = checksum(bytes);
        if bytes[OFF_CHECKSUM] != expected {
            return Err(Error::ChecksumMismatch {
                expected,
                found: bytes[OFF_CHECKSUM],
            });
        }

        let status = bytes[OFF_STATUS];
        Ok(Frame {
            version: header_version(header),
            receiver: header_receiver(header),
            mailbox: status & 0x0F,
            boot: status & BOOT_BIT != 0,
            online: status & ONLINE_BIT != 0,
            door: status & DOOR_BIT != 0,
            sequence: u16::from_be_bytes([bytes[OFF_SEQUENCE], bytes[OFF_SEQUENCE + 1]]),
            uptime: u16::from_be_bytes([bytes[OFF_UPTIME], bytes[OFF_UPTIME + 1]]),
            battery: bytes[OFF_BATTERY] & 0x7F,
        })
    }

    /// Sender mailbox id, if valid
    pub fn mailbox_id(&self) -> Result<MailboxId> {
        MailboxId::new(self.mailbox)
    }

    /// Battery level, `None` when the sender does not know it
    pub fn battery_level(&self) -> Option<u8> {
        if self.battery == BATTERY_LEVEL_UNKNOWN {
            None
        } else {
            Some(self.battery)
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mailbox={}, msgnum={}, time={}, battery={}, coldboot={}, online={}, door={}",
            self.mailbox,
            self.sequence,
            self.uptime,
            self.battery,
            if self.boot { "yes" } else { "no" },
            if self.online { "yes" } else { "no" },
            if self.door { "open" } else { "closed" },
        )
    }
}
