//! Capability surfaces of the driver, one trait per concern. The
//! protocol engine in `client` depends on none of them; they all reduce
//! to "send a command, classify the response".

pub mod battery;
pub mod clock;
pub mod gprs;
pub mod modem;
pub mod network;
pub mod sockets;

pub use battery::{Battery, BatteryStatus};
pub use clock::{Clock, NetworkTime};
pub use gprs::Gprs;
pub use modem::{Modem, SimStatus};
pub use network::{Network, RegistrationStatus};
pub use sockets::SocketTransport;
