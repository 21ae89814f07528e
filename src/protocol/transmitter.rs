use std::time::Duration;

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tokio_util::codec::Encoder;
use tracing::{debug, info};

use crate::core::Result;
use crate::link::{ByteSink, RadioControl};
use crate::mailbox::Mailbox;
use crate::time::Delay;
use super::codec::MessageCodec;
use super::message::{next_sequence, raw_hex, Frame};

/// AT command putting the radio module to sleep
const SLEEP_COMMAND: &[u8] = b"AT+SLEEP\r\n";

/// Settle times; they depend on the radio module's configured mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmitterTimings {
    /// Wait after writing a frame so it is fully on air
    #[serde(serialize_with = "crate::core::serde::serialize_duration")]
    #[serde(deserialize_with = "crate::core::serde::deserialize_duration")]
    pub post_send: Duration,
    /// Wait around the sleep command
    #[serde(serialize_with = "crate::core::serde::serialize_duration")]
    #[serde(deserialize_with = "crate::core::serde::deserialize_duration")]
    pub sleep_settle: Duration,
    /// Length of the wake pulse on the control pin
    #[serde(serialize_with = "crate::core::serde::serialize_duration")]
    #[serde(deserialize_with = "crate::core::serde::deserialize_duration")]
    pub wake_pulse: Duration,
    /// Wait for the module to come up after the wake pulse
    #[serde(serialize_with = "crate::core::serde::serialize_duration")]
    #[serde(deserialize_with = "crate::core::serde::deserialize_duration")]
    pub wake_settle: Duration,
}

impl Default for TransmitterTimings {
    fn default() -> Self {
        TransmitterTimings {
            post_send: Duration::from_millis(1500),
            sleep_settle: Duration::from_millis(250),
            wake_pulse: Duration::from_millis(10),
            wake_settle: Duration::from_millis(400),
        }
    }
}

/// Sender side of the link, used by the sleepy sensor node
pub struct FrameTransmitter<L, R, D> {
    link: L,
    radio: R,
    delay: D,
    receiver: u8,
    timings: TransmitterTimings,
    codec: MessageCodec,
    buffer: BytesMut,
}

impl<L: ByteSink, R: RadioControl, D: Delay> FrameTransmitter<L, R, D> {
    /// Creates a transmitter addressing `receiver` (0 for any receiver)
    pub fn new(link: L, radio: R, delay: D, receiver: u8, timings: TransmitterTimings) -> Self {
        FrameTransmitter {
            link,
            radio,
            delay,
            receiver,
            timings,
            codec: MessageCodec::new(),
            buffer: BytesMut::with_capacity(16),
        }
    }

    /// Leaves the radio in transparent (data) mode
    pub fn begin(&mut self) -> Result<()> {
        info!(receiver = self.receiver, "Initializing RF transmitter");
        self.radio.set_control_pin(true)
    }

    /// Sends the mailbox status as the next message in its sequence
    pub fn send(&mut self, mailbox: &mut Mailbox, uptime_ms: u64) -> Result<Frame> {
        mailbox.sequence = next_sequence(mailbox.sequence);
        mailbox.sent = mailbox.sent.wrapping_add(1);

        let mut frame = Frame::new(self.receiver, mailbox.id().get());
        mailbox.stamp(&mut frame);
        frame.set_uptime_ms(uptime_ms);

        self.buffer.clear();
        self.codec.encode(frame, &mut self.buffer)?;
        self.link.write_bytes(&self.buffer)?;
        self.link.flush()?;
        debug!(%frame, raw = %raw_hex(&self.buffer), "Sending message");

        self.delay.delay(self.timings.post_send);
        Ok(frame)
    }

    /// Puts the radio module to sleep
    pub fn sleep(&mut self) -> Result<()> {
        info!("Putting transmitter to sleep");
        self.radio.set_control_pin(false)?;
        self.delay.delay(self.timings.sleep_settle);
        self.link.write_bytes(SLEEP_COMMAND)?;
        self.link.flush()?;
        self.delay.delay(self.timings.sleep_settle);
        self.radio.set_control_pin(true)
    }

    /// Wakes the radio module up
    pub fn wakeup(&mut self) -> Result<()> {
        info!("Waking transmitter up");
        self.radio.set_control_pin(false)?;
        self.delay.delay(self.timings.wake_pulse);
        self.radio.set_control_pin(true)?;
        self.delay.delay(self.timings.wake_settle);
        Ok(())
    }

    /// The underlying link
    pub fn link(&self) -> &L {
        &self.link
    }
}
