use std::fmt;

use rppal::gpio::Level;

/// Position of the door as last read from the reed switch.
///
/// `Unknown` stands for a failed read. It is neither open nor closed as far
/// as the alert policy is concerned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DoorState {
    Open,
    Closed,
    Unknown,
}

impl From<Level> for DoorState {
    // The switch is wired to a pulled-down input: the magnet closes it while the
    // door is shut, driving the pin high.
    fn from(level: Level) -> Self {
        match level {
            Level::Low => DoorState::Open,
            Level::High => DoorState::Closed,
        }
    }
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoorState::Open => f.write_str("Open"),
            DoorState::Closed => f.write_str("Closed"),
            DoorState::Unknown => f.write_str("Unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_level_means_open() {
        assert_eq!(DoorState::from(Level::Low), DoorState::Open);
        assert_eq!(DoorState::from(Level::High), DoorState::Closed);
    }

    #[test]
    fn display_names() {
        assert_eq!(DoorState::Open.to_string(), "Open");
        assert_eq!(DoorState::Closed.to_string(), "Closed");
        assert_eq!(DoorState::Unknown.to_string(), "Unknown");
    }
}
