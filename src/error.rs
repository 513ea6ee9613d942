#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The module never answered the AT autosensing probe.
    BaudDetection,

    /// Reading from or writing to the serial stream failed.
    Transport,

    /// The deadline elapsed before any of the expected terminators
    /// arrived. Callers decide whether to retry.
    Timeout,

    /// The module answered `ERROR`, `+CME ERROR` or `+CMS ERROR`.
    Command,

    /// `+CIPSTART` completed with something other than `CONNECT OK`.
    ConnectFailed,

    /// A response arrived but its payload could not be parsed.
    InvalidResponse,

    /// Slot index out of range, or no socket registered for the slot.
    InvalidSocket,

    /// The SIM requires a PIN/PUK this driver was not given.
    Pin,

    /// The socket is not connected.
    SocketClosed,

    /// A configured control pin could not be driven.
    IoPin,
}
