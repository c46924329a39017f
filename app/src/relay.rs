use std::error::Error;
use std::fmt;
use std::thread;
use std::time::Duration;

use log::{error, info};
use rppal::gpio::OutputPin;

pub const PULSE_ON: Duration = Duration::from_millis(500);
pub const PULSE_SETTLE: Duration = Duration::from_millis(100);

/// The relay driver failed part way through a pulse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorFault(pub String);

impl fmt::Display for ActuatorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "relay drive failed: {}", self.0)
    }
}

impl Error for ActuatorFault {}

/// A physical output that can be driven to its active or inactive level.
pub trait RelayOutput {
    fn set_active(&mut self) -> Result<(), ActuatorFault>;
    fn set_inactive(&mut self) -> Result<(), ActuatorFault>;
}

pub struct GpioRelay {
    pin: OutputPin,
    active_low: bool,
}

impl GpioRelay {
    pub fn new(pin: OutputPin, active_low: bool) -> Self {
        GpioRelay { pin, active_low }
    }
}

impl RelayOutput for GpioRelay {
    fn set_active(&mut self) -> Result<(), ActuatorFault> {
        if self.active_low {
            self.pin.set_low()
        } else {
            self.pin.set_high()
        }
        Ok(())
    }

    fn set_inactive(&mut self) -> Result<(), ActuatorFault> {
        if self.active_low {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        }
        Ok(())
    }
}

/// Momentary relay that simulates a press of the door button.
///
/// The output is left inactive after every pulse, whether or not the driver
/// failed, and again when the relay is dropped. Pulses block the caller for
/// `on + settle` and must not overlap: callers serialise access.
pub struct Relay<O: RelayOutput> {
    output: O,
    on: Duration,
    settle: Duration,
}

impl<O: RelayOutput> Relay<O> {
    /// Take ownership of the output and drive it inactive.
    pub fn new(output: O, on: Duration, settle: Duration) -> Result<Self, ActuatorFault> {
        let mut relay = Relay { output, on, settle };
        relay.output.set_inactive()?;
        Ok(relay)
    }

    pub fn trigger(&mut self) -> Result<(), ActuatorFault> {
        self.pulse(self.on, self.settle)
    }

    pub fn pulse(&mut self, on: Duration, settle: Duration) -> Result<(), ActuatorFault> {
        info!("pulsing relay for {:?}", on);
        let result = self.drive(on);
        if let Err(err) = &result {
            error!("{}, forcing relay inactive", err);
            self.release();
        }
        thread::sleep(settle);
        result
    }

    fn drive(&mut self, on: Duration) -> Result<(), ActuatorFault> {
        self.output.set_active()?;
        thread::sleep(on);
        self.output.set_inactive()
    }

    /// Force the inactive level, retrying once. Failures are only logged.
    pub fn release(&mut self) {
        if self.output.set_inactive().is_err() {
            if let Err(err) = self.output.set_inactive() {
                error!("unable to release relay: {}", err);
            }
        }
    }
}

impl<O: RelayOutput> Drop for Relay<O> {
    fn drop(&mut self) {
        self.release();
    }
}
