use std::fmt;

/// Mailbox alarm severity, lowest first.
///
/// Ordering matters: absence and low battery only ever raise an alarm that
/// is strictly below them, while door and boot alarms replace anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Alarm {
    /// Nothing to report
    #[default]
    None = 0,
    /// Sensor node rebooted
    Booted = 1,
    /// Battery at or below the alert level
    LowBattery = 2,
    /// Not heard from within the absence window
    Absent = 3,
    /// Door was opened and closed again
    DoorFlipped = 4,
    /// Door was opened and left open
    DoorLeftOpen = 5,
    /// Door is open right now
    DoorOpenNow = 6,
}

impl Alarm {
    /// Every severity, lowest first
    pub const ALL: [Alarm; 7] = [
        Alarm::None,
        Alarm::Booted,
        Alarm::LowBattery,
        Alarm::Absent,
        Alarm::DoorFlipped,
        Alarm::DoorLeftOpen,
        Alarm::DoorOpenNow,
    ];

    /// Numeric severity
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Human-readable name
    pub fn label(self) -> &'static str {
        match self {
            Alarm::None => "No event",
            Alarm::Booted => "Rebooted",
            Alarm::LowBattery => "Low battery",
            Alarm::Absent => "Absent",
            Alarm::DoorFlipped => "Door flipped",
            Alarm::DoorLeftOpen => "Door left open",
            Alarm::DoorOpenNow => "Door opened NOW",
        }
    }

    /// Emoji shown next to the label
    pub fn icon(self) -> &'static str {
        match self {
            Alarm::None => "\u{1f4ea}",
            Alarm::Booted => "\u{1f4a5}",
            Alarm::LowBattery => "\u{1f50b}",
            Alarm::Absent => "\u{1f6ab}",
            Alarm::DoorFlipped => "\u{1f4eb}",
            Alarm::DoorLeftOpen => "\u{1f4ec}",
            Alarm::DoorOpenNow => "\u{1f4ed}",
        }
    }

    /// True for alarms produced by door movement
    pub fn is_door(self) -> bool {
        self >= Alarm::DoorFlipped
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        for pair in Alarm::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{:?} < {:?}", pair[0], pair[1]);
        }
        assert_eq!(Alarm::None.level(), 0);
        assert_eq!(Alarm::DoorOpenNow.level(), 6);
        assert_eq!(Alarm::ALL.iter().max(), Some(&Alarm::DoorOpenNow));
        assert_eq!(Alarm::default(), Alarm::None);
    }

    #[test]
    fn test_labels() {
        assert_eq!(Alarm::DoorLeftOpen.to_string(), "Door left open");
        assert_eq!(Alarm::Absent.icon(), "\u{1f6ab}");
        assert!(Alarm::DoorFlipped.is_door());
        assert!(!Alarm::Absent.is_door());
    }
}
