use crate::core::{Error, Result, BATTERY_LEVEL_FULL, BATTERY_LEVEL_UNKNOWN};

/// ADC reading at 0% battery, measured for the reference schematic
pub const VCC_REF_EMPTY: u16 = 3625;

/// ADC reading at 100% battery
pub const VCC_REF_FULL: u16 = 3925;

/// Each new reading moves the stored level by 1/5 of the difference
pub const CHANGE_WEIGHT: i16 = 5;

/// Smooths noisy supply-voltage readings into a battery percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryEstimator {
    ref_empty: u16,
    ref_full: u16,
    weight: i16,
}

impl Default for BatteryEstimator {
    fn default() -> Self {
        BatteryEstimator {
            ref_empty: VCC_REF_EMPTY,
            ref_full: VCC_REF_FULL,
            weight: CHANGE_WEIGHT,
        }
    }
}

impl BatteryEstimator {
    /// Creates an estimator; `ref_full` must be above `ref_empty`
    pub fn new(ref_empty: u16, ref_full: u16, weight: i16) -> Result<Self> {
        if ref_full <= ref_empty {
            return Err(Error::config(format!(
                "battery reference {} must be above {}",
                ref_full, ref_empty
            )));
        }
        if weight <= 0 {
            return Err(Error::config("battery change weight must be positive"));
        }
        Ok(BatteryEstimator {
            ref_empty,
            ref_full,
            weight,
        })
    }

    /// Maps a raw reading onto 0-100, clamping outside the reference range
    pub fn level(&self, reading: u16) -> u8 {
        let vcc = reading.clamp(self.ref_empty, self.ref_full) as u32;
        let span = (self.ref_full - self.ref_empty) as u32;
        (100 * (vcc - self.ref_empty as u32) / span) as u8
    }

    /// Blends a fresh level into the stored one. An unknown stored level
    /// takes the fresh level as its baseline.
    pub fn blend(&self, stored: u8, level: u8) -> u8 {
        if stored == BATTERY_LEVEL_UNKNOWN {
            return level;
        }
        let diff = (level as i16 - stored as i16) / self.weight;
        (stored as i16 + diff).clamp(0, BATTERY_LEVEL_FULL as i16) as u8
    }

    /// New stored level after a reading. Cold-boot readings are off while
    /// the radio and capacitors power up, so they are discarded.
    pub fn update(&self, stored: u8, reading: u16, cold_boot: bool) -> u8 {
        if cold_boot {
            return stored;
        }
        self.blend(stored, self.level(reading))
    }
}
