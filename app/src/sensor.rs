use std::error::Error;
use std::fmt;
use std::sync::Mutex;

use rppal::gpio::InputPin;

use crate::DoorState;

/// A failed read of the door sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorFault(pub String);

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sensor read failed: {}", self.0)
    }
}

impl Error for SensorFault {}

/// Binary door position input.
///
/// Implementations return only `Open` or `Closed`, reporting anything else as
/// a fault. They hold no state and do not retry.
pub trait SensorReader {
    fn read(&self) -> Result<DoorState, SensorFault>;
}

/// Reed switch on a GPIO input, shared between the monitor and status requests.
pub struct GpioSensor(Mutex<InputPin>);

impl GpioSensor {
    pub fn new(pin: InputPin) -> Self {
        GpioSensor(Mutex::new(pin))
    }
}

impl SensorReader for GpioSensor {
    fn read(&self) -> Result<DoorState, SensorFault> {
        let pin = self
            .0
            .lock()
            .map_err(|_| SensorFault("input pin lock poisoned".into()))?;
        Ok(pin.read().into())
    }
}
