//! The sleepy transmitting node inside the mailbox
//!
//! Opening the door powers the node up. It reports the open door, stays
//! awake until the door closes or the awake window runs out, reports again
//! and goes back to deep sleep. Retained memory carries the sequence number
//! and battery estimate from one wake-up to the next.

pub mod battery;
pub mod retained;

pub use self::battery::BatteryEstimator;
pub use self::retained::{InMemoryRetained, RetainedMemory};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::{MailboxId, ReceiverId, Result, BATTERY_LEVEL_FULL, BATTERY_LEVEL_UNKNOWN};
use crate::link::{ByteSink, RadioControl};
use crate::mailbox::Mailbox;
use crate::protocol::{Frame, FrameTransmitter, TransmitterTimings};
use crate::time::Delay;
use self::retained::{SLOT_BATTERY, SLOT_SEQUENCE};

/// Why the node is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    /// Woken from deep sleep; retained memory is valid
    DeepSleepWake,
    /// Power-on or any other reset
    ColdBoot,
}

/// Door switch and supply voltage
pub trait SensorHardware {
    /// Reads the reed switch
    fn door_open(&mut self) -> bool;

    /// Reads the supply voltage ADC
    fn battery_reading(&mut self) -> u16;
}

/// Fixed hardware readings, for hosts and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticHardware {
    pub door: bool,
    pub vcc: u16,
}

impl SensorHardware for StaticHardware {
    fn door_open(&mut self) -> bool {
        self.door
    }

    fn battery_reading(&mut self) -> u16 {
        self.vcc
    }
}

/// Sensor node settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub mailbox_id: MailboxId,
    /// Receiver to address, 0 for any
    pub receiver_id: ReceiverId,
    pub battery_ref_empty: u16,
    pub battery_ref_full: u16,
    pub battery_weight: i16,
    /// Longest time to stay awake after the door opened
    #[serde(serialize_with = "crate::core::serde::serialize_duration")]
    #[serde(deserialize_with = "crate::core::serde::deserialize_duration")]
    pub awake_window: Duration,
    pub timings: TransmitterTimings,
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            mailbox_id: MailboxId::default(),
            receiver_id: ReceiverId::ANY,
            battery_ref_empty: battery::VCC_REF_EMPTY,
            battery_ref_full: battery::VCC_REF_FULL,
            battery_weight: battery::CHANGE_WEIGHT,
            awake_window: Duration::from_secs(30),
            timings: TransmitterTimings::default(),
        }
    }
}

/// The mailbox's own node: door state, battery estimate and transmitter
pub struct SensorNode<L, R, D, M> {
    mailbox: Mailbox,
    transmitter: FrameTransmitter<L, R, D>,
    retained: M,
    estimator: BatteryEstimator,
    awake_window_ms: u64,
}

impl<L: ByteSink, R: RadioControl, D: Delay, M: RetainedMemory> SensorNode<L, R, D, M> {
    pub fn new(config: &SensorConfig, link: L, radio: R, delay: D, retained: M) -> Result<Self> {
        let estimator = BatteryEstimator::new(
            config.battery_ref_empty,
            config.battery_ref_full,
            config.battery_weight,
        )?;
        let transmitter = FrameTransmitter::new(
            link,
            radio,
            delay,
            config.receiver_id.get(),
            config.timings.clone(),
        );
        Ok(SensorNode {
            mailbox: Mailbox::new(config.mailbox_id),
            transmitter,
            retained,
            estimator,
            awake_window_ms: config.awake_window.as_millis() as u64,
        })
    }

    /// Starts a wake cycle and sends the opening report
    pub fn begin(&mut self, cause: ResetCause, hw: &mut dyn SensorHardware, uptime_ms: u64) -> Result<Frame> {
        self.mailbox.boot = cause == ResetCause::ColdBoot;
        self.mailbox.online = true;

        if !self.mailbox.boot {
            if let Some(slots) = self.retained.load() {
                self.mailbox.sequence = slots[SLOT_SEQUENCE] as u16;
                let battery = slots[SLOT_BATTERY];
                self.mailbox.battery = if battery <= BATTERY_LEVEL_FULL as u32 {
                    battery as u8
                } else {
                    BATTERY_LEVEL_UNKNOWN
                };
            }
        }
        info!(
            mailbox = %self.mailbox.id(),
            ?cause,
            seq = self.mailbox.sequence,
            "Initializing mailbox"
        );

        self.update(hw);
        self.update_battery(hw);
        self.transmitter.begin()?;
        self.transmitter.wakeup()?;
        self.transmitter.send(&mut self.mailbox, uptime_ms)
    }

    /// Re-reads the door switch
    pub fn update(&mut self, hw: &mut dyn SensorHardware) {
        self.mailbox.door = hw.door_open();
    }

    /// Folds a fresh voltage reading into the battery estimate
    pub fn update_battery(&mut self, hw: &mut dyn SensorHardware) -> u8 {
        let reading = hw.battery_reading();
        self.mailbox.battery = self
            .estimator
            .update(self.mailbox.battery, reading, self.mailbox.boot);
        debug!(reading, battery = self.mailbox.battery, "battery updated");
        self.mailbox.battery
    }

    /// Sends the current status
    pub fn report(&mut self, online: bool, uptime_ms: u64) -> Result<Frame> {
        self.mailbox.online = online;
        self.transmitter.send(&mut self.mailbox, uptime_ms)
    }

    /// Time to sleep: the door closed, or the node stayed awake long enough
    pub fn should_sleep(&self, uptime_ms: u64) -> bool {
        self.mailbox.door_closed() || uptime_ms >= self.awake_window_ms
    }

    /// Sends the closing report, puts the radio to sleep and saves what
    /// the next wake-up needs
    pub fn prepare_sleep(&mut self, hw: &mut dyn SensorHardware, uptime_ms: u64) -> Result<Frame> {
        info!(
            mailbox = %self.mailbox.id(),
            "{}",
            if self.mailbox.door_closed() { "Door closed" } else { "Awake timeout reached" }
        );
        self.update_battery(hw);
        let frame = self.report(false, uptime_ms)?;
        self.transmitter.sleep()?;
        self.retained
            .store([self.mailbox.sequence as u32, self.mailbox.battery as u32])?;
        info!(mailbox = %self.mailbox.id(), "Putting mailbox to sleep");
        Ok(frame)
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn retained(&self) -> &M {
        &self.retained
    }

    /// Hands back the retained memory, as deep sleep keeps it while the
    /// rest of the node powers down
    pub fn into_retained(self) -> M {
        self.retained
    }
}
