use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{DataBits, Parity, SerialPort, StopBits};
use tracing::info;

use crate::core::{Error, Result};
use super::{ByteSink, ByteSource};

/// RF module attached to a serial port (8N1)
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Opens the serial device at the RF link speed
    pub fn open(device_path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(device_path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| Error::link(format!("Failed to open {}: {}", device_path, e)))?;

        info!(device = device_path, baud_rate, "RF serial link open");
        Ok(SerialLink { port })
    }

    /// Wraps an already configured port
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        SerialLink { port }
    }
}

impl ByteSource for SerialLink {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if self.port.bytes_to_read()? == 0 {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Ok(Some(byte[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl ByteSink for SerialLink {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}
