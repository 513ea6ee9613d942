//! Registration state and network-level queries.

use embassy_time::{Duration, Instant, Timer};
use embedded_io_async::{Read, Write};
use no_std_net::IpAddr;

use crate::client::{CavliClient, DEFAULT_TERMINATORS};
use crate::command::Command;
use crate::config::CellularConfig;
use crate::error::Error;
use crate::module_timing::command_timeout;

/// `+CREG` registration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistrationStatus {
    Unregistered,
    RegisteredHome,
    Searching,
    Denied,
    Unknown,
    RegisteredRoaming,
}

impl RegistrationStatus {
    pub fn is_registered(&self) -> bool {
        matches!(
            self,
            RegistrationStatus::RegisteredHome | RegistrationStatus::RegisteredRoaming
        )
    }
}

impl From<i32> for RegistrationStatus {
    fn from(stat: i32) -> Self {
        match stat {
            0 => RegistrationStatus::Unregistered,
            1 => RegistrationStatus::RegisteredHome,
            2 => RegistrationStatus::Searching,
            3 => RegistrationStatus::Denied,
            5 => RegistrationStatus::RegisteredRoaming,
            _ => RegistrationStatus::Unknown,
        }
    }
}

pub trait Network {
    async fn registration_status(&mut self) -> Result<RegistrationStatus, Error>;

    async fn is_network_connected(&mut self) -> Result<bool, Error>;

    /// Poll registration until it succeeds or `timeout` runs out.
    async fn wait_for_network(&mut self, timeout: Duration) -> Result<(), Error>;

    /// Whether the module currently holds an RRC connection, plus the
    /// service mode. The C16QS only does Cat1.bis, so a live connection
    /// is reported as mode 99 (a value no SIMCom module uses).
    async fn network_system_mode(&mut self) -> Result<(bool, i16), Error>;

    async fn local_ip(&mut self) -> Result<IpAddr, Error>;
}

impl<W, C, const N: usize, const L: usize> Network for CavliClient<W, C, N, L>
where
    W: Read + Write,
    C: CellularConfig,
{
    async fn registration_status(&mut self) -> Result<RegistrationStatus, Error> {
        self.send_at(&Command::GetRegistrationStatus).await?;
        if self
            .wait_response_in(command_timeout(), &["\r\n+CREG:"])
            .await
            != Ok(0)
        {
            return Err(Error::InvalidResponse);
        }
        let _mode = self.read_int_before(command_timeout(), b',').await?;
        let stat = self.read_int_before(command_timeout(), b'\n').await?;
        let _ = self.wait_response(command_timeout()).await;
        Ok(RegistrationStatus::from(stat))
    }

    async fn is_network_connected(&mut self) -> Result<bool, Error> {
        Ok(self.registration_status().await?.is_registered())
    }

    async fn wait_for_network(&mut self, timeout: Duration) -> Result<(), Error> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(status) = self.registration_status().await {
                if status.is_registered() {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            Timer::after(Duration::from_millis(250)).await;
        }
    }

    async fn network_system_mode(&mut self) -> Result<(bool, i16), Error> {
        self.send_at(&Command::GetConnectionStatus).await?;
        if self
            .wait_response_in(command_timeout(), &["\r\n+CSCON:"])
            .await
            != Ok(0)
        {
            return Err(Error::InvalidResponse);
        }
        let reporting = self.read_int_before(command_timeout(), b',').await?;
        let mut mode = self.read_int_before(command_timeout(), b'\n').await? as i16;
        if mode == 1 {
            mode = 99;
        }
        let _ = self.wait_response(command_timeout()).await;
        Ok((reporting != 0, mode))
    }

    async fn local_ip(&mut self) -> Result<IpAddr, Error> {
        self.send_at(&Command::GetLocalIp).await?;
        let (index, data) = self
            .wait_response_capture(Duration::from_secs(10), DEFAULT_TERMINATORS)
            .await?;
        if index != 0 {
            return Err(Error::Command);
        }

        // `+CGPADDR: 1,10.20.30.40`
        let text = core::str::from_utf8(&data).map_err(|_| Error::InvalidResponse)?;
        let start = text.find(',').ok_or(Error::InvalidResponse)? + 1;
        let rest = &text[start..];
        let end = rest.find('\r').unwrap_or(rest.len());
        rest[..end]
            .trim()
            .trim_matches('"')
            .parse::<IpAddr>()
            .map_err(|_| Error::InvalidResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NoPinConfig;
    use crate::test_helpers::MockSerial;

    type Client = CavliClient<MockSerial, NoPinConfig, 8, 64>;

    fn client(script: &[u8]) -> Client {
        CavliClient::new(MockSerial::script(script), NoPinConfig)
    }

    #[tokio::test]
    async fn parses_registration_status() {
        let mut at = client(b"\r\n+CREG: 0,1\r\n\r\nOK\r\n");
        let status = at.registration_status().await.unwrap();
        assert_eq!(status, RegistrationStatus::RegisteredHome);
        assert!(status.is_registered());
    }

    #[tokio::test]
    async fn roaming_counts_as_registered() {
        let mut at = client(b"\r\n+CREG: 0,5\r\n\r\nOK\r\n");
        assert!(at.is_network_connected().await.unwrap());
    }

    #[tokio::test]
    async fn searching_is_not_registered() {
        let mut at = client(b"\r\n+CREG: 0,2\r\n\r\nOK\r\n");
        assert!(!at.is_network_connected().await.unwrap());
    }

    #[tokio::test]
    async fn connected_system_mode_maps_to_99() {
        let mut at = client(b"\r\n+CSCON: 1,1\r\n\r\nOK\r\n");
        assert_eq!(at.network_system_mode().await, Ok((true, 99)));
    }

    #[tokio::test]
    async fn parses_local_ip() {
        let mut at = client(b"\r\n+CGPADDR: 1,10.20.30.40\r\n\r\nOK\r\n");
        assert_eq!(
            at.local_ip().await,
            Ok(IpAddr::V4(no_std_net::Ipv4Addr::new(10, 20, 30, 40)))
        );
    }
}
