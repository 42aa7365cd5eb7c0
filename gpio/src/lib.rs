pub mod claims;
pub mod keypad;
pub mod raw;
pub mod sim;

use std::fmt::Debug;
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

/// Specifies the function of a GPIO pin.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioMode {
    #[default] Input,
    Output,
}

/// Specifies the electrical level of a GPIO pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GpioLevel {
    Low,
    High,
}

impl GpioLevel {
    pub fn is_low(self) -> bool {
        self == GpioLevel::Low
    }
}

impl From<bool> for GpioLevel {
    fn from(high: bool) -> Self {
        if high { GpioLevel::High } else { GpioLevel::Low }
    }
}

/// Specifies the bias of the GPIO pin.
///
/// You can use this to enable pull-up or pull-down resistors.
/// Only meaningful while the pin is an input.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioBias {
    #[default] None,
    PullUp,
    PullDown,
}

/// Pin-level access to a GPIO controller.
///
/// Pins are addressed by their index on the backend. All operations take `&self`;
/// backends synchronize (or refuse to be shared) internally.
pub trait GpioDriver: Debug {
    /// Gets the amount of GPIO pins available.
    fn count(&self) -> GpioResult<usize>;

    /// Marks the pin as owned by a caller.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the pin does not exist.
    /// - `GpioError::AlreadyInUse` if the pin is already claimed.
    fn claim(&self, index: usize) -> GpioResult<()>;

    /// Gives up ownership of a previously claimed pin. Releasing an unclaimed pin is a no-op.
    fn release(&self, index: usize);

    /// Sets the pin function to input or output.
    fn set_mode(&self, index: usize, mode: GpioMode) -> GpioResult<()>;

    /// Sets the pull resistor of the pin.
    fn set_bias(&self, index: usize, bias: GpioBias) -> GpioResult<()>;

    /// Drives an output pin to the given level.
    fn write(&self, index: usize, level: GpioLevel) -> GpioResult<()>;

    /// Reads the level of an input pin.
    fn read(&self, index: usize) -> GpioResult<GpioLevel>;

    /// Blocks for the given duration.
    ///
    /// Goes through the driver so that simulated backends can keep their own clock.
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}
