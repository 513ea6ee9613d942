use embedded_hal::digital::{ErrorType, OutputPin};

pub struct NoPin;

impl ErrorType for NoPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

pub trait CellularConfig {
    type ResetPin: OutputPin;

    /// Report verbose `+CME ERROR` strings instead of suppressing error
    /// codes entirely (`AT+CMEE=2` vs `AT+CMEE=0`).
    const VERBOSE_ERRORS: bool = false;

    /// DNS servers handed to the module during the attach sequence.
    const DNS_SERVERS: (&'static str, &'static str) = ("8.8.8.8", "8.8.4.4");

    /// While asleep the module's serial interface is disabled; the reset
    /// line is the only way to get it talking again.
    fn reset_pin(&mut self) -> Option<&mut Self::ResetPin>;
}

/// Config for setups without any control lines wired up.
pub struct NoPinConfig;

impl CellularConfig for NoPinConfig {
    type ResetPin = NoPin;

    fn reset_pin(&mut self) -> Option<&mut Self::ResetPin> {
        None
    }
}
