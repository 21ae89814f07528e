//! Byte-level transports for the half-duplex RF link
//!
//! The radio module behaves like a serial line: whatever is written on one
//! side shows up, possibly damaged or not at all, on the other. Readers never
//! block; they take what is buffered and return.

mod memory;
mod serial;

pub use self::memory::{LossyLink, MemoryLink};
pub use self::serial::SerialLink;

use std::io;

use crate::core::Result;

/// Non-blocking byte input
pub trait ByteSource {
    /// Returns the next buffered byte, or `None` if nothing is pending
    fn read_byte(&mut self) -> io::Result<Option<u8>>;
}

/// Byte output
pub trait ByteSink {
    /// Writes all of `bytes`
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Pushes buffered output to the wire
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).read_byte()
    }
}

impl<T: ByteSink + ?Sized> ByteSink for Box<T> {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_bytes(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Control line of the radio module (the HC-12 "SET" pin).
/// Pulling it low puts the module in command mode.
pub trait RadioControl {
    /// Drives the control pin high (`true`) or low (`false`)
    fn set_control_pin(&mut self, high: bool) -> Result<()>;
}

/// Radio without a control line
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRadio;

impl RadioControl for NullRadio {
    fn set_control_pin(&mut self, _high: bool) -> Result<()> {
        Ok(())
    }
}
