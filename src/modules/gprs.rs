//! Packet data attach and the TCP/IP stack preamble.

use embedded_io_async::{Read, Write};

use crate::client::CavliClient;
use crate::command::Command;
use crate::config::CellularConfig;
use crate::error::Error;
use crate::module_timing::{attach_timeout, command_timeout};

pub trait Gprs {
    /// Attach to packet data and prepare the module's TCP/IP stack:
    /// multi-connection mode, raw payload format, DNS servers.
    async fn attach(&mut self, apn: &str, user: &str, password: &str) -> Result<(), Error>;

    /// Close every connection and detach from packet data.
    async fn detach(&mut self) -> Result<(), Error>;

    async fn is_attached(&mut self) -> Result<bool, Error>;
}

impl<W, C, const N: usize, const L: usize> Gprs for CavliClient<W, C, N, L>
where
    W: Read + Write,
    C: CellularConfig,
{
    async fn attach(&mut self, apn: &str, user: &str, password: &str) -> Result<(), Error> {
        let _ = self.detach().await;

        self.command_ok(&Command::SetGprsAttached { attach: true }, attach_timeout())
            .await?;

        let _ = self
            .command(&Command::SetAuthentication { user, password }, command_timeout())
            .await;
        let _ = self
            .command(&Command::DefinePdpContext { apn }, command_timeout())
            .await;
        let _ = self
            .command(&Command::ActivatePdpContext, attach_timeout())
            .await;

        self.command_ok(&Command::SetMultiplexing, command_timeout())
            .await?;
        // Without raw mode the module silently drops NUL payload bytes.
        self.command_ok(&Command::SetRawTcpFormat, command_timeout())
            .await?;

        let (primary, secondary) = C::DNS_SERVERS;
        self.command_ok(
            &Command::SetDnsServers { primary, secondary },
            command_timeout(),
        )
        .await?;

        Ok(())
    }

    async fn detach(&mut self) -> Result<(), Error> {
        // CIPSHUT closes *all* open connections.
        self.command_ok(&Command::ShutConnections, attach_timeout())
            .await?;
        self.command_ok(&Command::SetGprsAttached { attach: false }, attach_timeout())
            .await
    }

    async fn is_attached(&mut self) -> Result<bool, Error> {
        self.send_at(&Command::GetGprsAttached).await?;
        if self
            .wait_response_in(command_timeout(), &["\r\n+CGATT:"])
            .await
            != Ok(0)
        {
            return Err(Error::InvalidResponse);
        }
        let state = self.read_int_before(command_timeout(), b'\n').await?;
        let _ = self.wait_response(command_timeout()).await;
        Ok(state == 1)
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
    async fn attach_runs_full_sequence() {
        // CIPSHUT fails fast (nothing attached yet), everything else OK.
        let mut at = client(
            b"\r\nERROR\r\n\
              OK\r\nOK\r\nOK\r\nOK\r\nOK\r\nOK\r\nOK\r\n",
        );
        assert_eq!(at.attach("internet", "user", "pass").await, Ok(()));

        let written = std::str::from_utf8(at.stream.written()).unwrap();
        assert!(written.contains("AT+CIPSHUT\r\n"));
        assert!(written.contains("AT+CGATT=1\r\n"));
        assert!(written.contains("AT+CGAUTH=1,0,\"user\",\"pass\"\r\n"));
        assert!(written.contains("AT+CGDCONT=1,\"IP\",\"internet\"\r\n"));
        assert!(written.contains("AT+CGACT=1,1\r\n"));
        assert!(written.contains("AT+CIPMUX=1\r\n"));
        assert!(written.contains("AT+TCPFMT=2\r\n"));
        assert!(written.ends_with("AT+CDNSCFG=\"8.8.8.8\",\"8.8.4.4\"\r\n"));
    }

    #[tokio::test]
    async fn detach_shuts_connections_first() {
        let mut at = client(b"\r\nOK\r\nOK\r\n");
        assert_eq!(at.detach().await, Ok(()));
        assert_eq!(
            std::str::from_utf8(at.stream.written()).unwrap(),
            "AT+CIPSHUT\r\nAT+CGATT=0\r\n"
        );
    }

    #[tokio::test]
    async fn reports_attach_state() {
        let mut at = client(b"\r\n+CGATT: 1\r\n\r\nOK\r\n");
        assert_eq!(at.is_attached().await, Ok(true));

        let mut at = client(b"\r\n+CGATT: 0\r\n\r\nOK\r\n");
        assert_eq!(at.is_attached().await, Ok(false));
    }
}
