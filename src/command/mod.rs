//! AT commands understood by the Cavli C16QS.
//!
//! The C16QS speaks a SIMCom-flavoured command set with a handful of
//! vendor extensions (`^SIMSWAP`, `$QCSLEEP`, `+TCPFMT`). Responses are
//! not modelled here; they are classified and parsed by the response
//! engine in `client`.

use core::fmt::Write;

use heapless::String;

/// Rendered command length bound. `+CIPSTART` with a long hostname is the
/// largest command we emit.
pub const CMD_BUF_LEN: usize = 192;

/// `AT+CFUN` power level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Functionality {
    Minimum = 0,
    Full = 1,
    /// Transmit and receive RF circuits disabled.
    DisableRf = 4,
}

/// `AT$QCSLEEP` power saving mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SleepMode {
    Hibernate = 1,
    Sleep2 = 2,
    Sleep1 = 3,
    Off = 4,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    At,
    EchoOff,
    FactoryDefaults,
    StoreConfiguration,
    GetModelId,
    SetErrorReporting {
        verbose: bool,
    },
    /// Select the external SIM on the Cavli SIM mux.
    SimSwap,
    GetPinStatus,
    SetPin {
        pin: &'a str,
    },
    GetCcid,
    SetFunctionality {
        fun: Functionality,
        reset: bool,
    },
    SetSleepMode {
        mode: SleepMode,
    },
    GetRegistrationStatus,
    GetConnectionStatus,
    GetLocalIp,
    SetGprsAttached {
        attach: bool,
    },
    GetGprsAttached,
    SetAuthentication {
        user: &'a str,
        password: &'a str,
    },
    DefinePdpContext {
        apn: &'a str,
    },
    ActivatePdpContext,
    SetMultiplexing,
    /// Raw TCP payload format; without it the module drops NUL bytes.
    SetRawTcpFormat,
    SetDnsServers {
        primary: &'a str,
        secondary: &'a str,
    },
    ShutConnections,
    StartConnection {
        host: &'a str,
        port: u16,
        ssl: bool,
    },
    SendData {
        mux: u8,
        length: usize,
    },
    CloseConnection {
        mux: u8,
    },
    GetClock,
    GetBatteryStatus,
}

impl Command<'_> {
    /// Render the command, without the trailing CRLF (the write path
    /// appends it).
    pub fn as_str(&self) -> String<CMD_BUF_LEN> {
        let mut buffer = String::new();
        match self {
            Command::At => buffer.push_str("AT").unwrap(),
            Command::EchoOff => buffer.push_str("ATE0").unwrap(),
            Command::FactoryDefaults => buffer.push_str("AT&F").unwrap(),
            Command::StoreConfiguration => buffer.push_str("AT&W").unwrap(),
            Command::GetModelId => buffer.push_str("AT+CGMM").unwrap(),
            Command::SetErrorReporting { verbose } => {
                write!(buffer, "AT+CMEE={}", if *verbose { 2 } else { 0 }).unwrap()
            }
            Command::SimSwap => buffer.push_str("AT^SIMSWAP=1").unwrap(),
            Command::GetPinStatus => buffer.push_str("AT+CPIN?").unwrap(),
            Command::SetPin { pin } => write!(buffer, "AT+CPIN=\"{}\"", pin).unwrap(),
            Command::GetCcid => buffer.push_str("AT+ICCID").unwrap(),
            Command::SetFunctionality { fun, reset } => {
                write!(buffer, "AT+CFUN={}", *fun as u8).unwrap();
                if *reset {
                    buffer.push_str(",1").unwrap();
                }
            }
            Command::SetSleepMode { mode } => {
                write!(buffer, "AT$QCSLEEP={}", *mode as u8).unwrap()
            }
            Command::GetRegistrationStatus => buffer.push_str("AT+CREG?").unwrap(),
            Command::GetConnectionStatus => buffer.push_str("AT+CSCON?").unwrap(),
            Command::GetLocalIp => buffer.push_str("AT+CGPADDR=1").unwrap(),
            Command::SetGprsAttached { attach } => {
                write!(buffer, "AT+CGATT={}", u8::from(*attach)).unwrap()
            }
            Command::GetGprsAttached => buffer.push_str("AT+CGATT?").unwrap(),
            Command::SetAuthentication { user, password } => {
                write!(buffer, "AT+CGAUTH=1,0,\"{}\",\"{}\"", user, password).unwrap()
            }
            Command::DefinePdpContext { apn } => {
                write!(buffer, "AT+CGDCONT=1,\"IP\",\"{}\"", apn).unwrap()
            }
            Command::ActivatePdpContext => buffer.push_str("AT+CGACT=1,1").unwrap(),
            Command::SetMultiplexing => buffer.push_str("AT+CIPMUX=1").unwrap(),
            Command::SetRawTcpFormat => buffer.push_str("AT+TCPFMT=2").unwrap(),
            Command::SetDnsServers { primary, secondary } => {
                write!(buffer, "AT+CDNSCFG=\"{}\",\"{}\"", primary, secondary).unwrap()
            }
            Command::ShutConnections => buffer.push_str("AT+CIPSHUT").unwrap(),
            Command::StartConnection { host, port, ssl } => write!(
                buffer,
                "AT+CIPSTART=\"TCP\",\"{}\",{},{}",
                host,
                port,
                u8::from(*ssl)
            )
            .unwrap(),
            Command::SendData { mux, length } => {
                write!(buffer, "AT+CIPSEND={},{}", mux, length).unwrap()
            }
            Command::CloseConnection { mux } => {
                write!(buffer, "AT+CIPCLOSE={}", mux).unwrap()
            }
            Command::GetClock => buffer.push_str("AT+CCLK?").unwrap(),
            Command::GetBatteryStatus => buffer.push_str("AT+CBC").unwrap(),
        };
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_plain_commands() {
        assert_eq!(Command::At.as_str(), "AT");
        assert_eq!(Command::EchoOff.as_str(), "ATE0");
        assert_eq!(Command::GetClock.as_str(), "AT+CCLK?");
    }

    #[test]
    fn renders_parameterized_commands() {
        assert_eq!(
            Command::StartConnection {
                host: "broker.example.com",
                port: 8883,
                ssl: true
            }
            .as_str(),
            "AT+CIPSTART=\"TCP\",\"broker.example.com\",8883,1"
        );
        assert_eq!(
            Command::SetFunctionality {
                fun: Functionality::Full,
                reset: true
            }
            .as_str(),
            "AT+CFUN=1,1"
        );
        assert_eq!(
            Command::SendData { mux: 3, length: 42 }.as_str(),
            "AT+CIPSEND=3,42"
        );
        assert_eq!(
            Command::SetDnsServers {
                primary: "8.8.8.8",
                secondary: "8.8.4.4"
            }
            .as_str(),
            "AT+CDNSCFG=\"8.8.8.8\",\"8.8.4.4\""
        );
    }
}
