//! Slot-indexed TCP connections over the module's multiplexed stack.
//!
//! Callers pick a slot and keep using it; the module-assigned connection
//! id is captured from the `+CIPSTART` response and every later
//! transport-level command is addressed through the translation table.

use embassy_time::Duration;
use embedded_io_async::{Read, Write};

use crate::client::CavliClient;
use crate::command::Command;
use crate::config::CellularConfig;
use crate::error::Error;
use crate::module_timing::{close_timeout, command_timeout};

const CIPSTART_TAG: &str = "+CIPSTART:";

/// Outcomes of a `+CIPSTART` exchange, in the order they are matched.
const CONNECT_TERMINATORS: &[&str] = &[
    "CONNECT OK\r\n",
    "CONNECT FAIL\r\n",
    "ALREADY CONNECT\r\n",
    "ERROR\r\n",
    "CLOSE OK\r\n",
];

pub trait SocketTransport {
    /// Attach a receive buffer to `slot`. Must happen before `connect`;
    /// inbound data for slots without one is discarded.
    fn register_socket(&mut self, slot: usize) -> Result<(), Error>;

    fn deregister_socket(&mut self, slot: usize) -> Result<(), Error>;

    fn is_connected(&self, slot: usize) -> bool;

    /// Open a TCP connection on `slot` and capture the connection id the
    /// module assigned to it.
    async fn connect(
        &mut self,
        slot: usize,
        host: &str,
        port: u16,
        ssl: bool,
        timeout: Duration,
    ) -> Result<(), Error>;

    /// Send `data`, returning how many bytes went out. The module does
    /// not report a count of its own, so a confirmed send is all of it.
    async fn send(&mut self, slot: usize, data: &[u8]) -> Result<usize, Error>;

    async fn close(&mut self, slot: usize) -> Result<(), Error>;

    /// Bytes waiting in the slot's receive buffer, after giving the
    /// engine a chance to absorb pending payload notifications.
    async fn available(&mut self, slot: usize) -> Result<usize, Error>;

    /// Drain buffered received bytes into `buf`.
    async fn read(&mut self, slot: usize, buf: &mut [u8]) -> Result<usize, Error>;
}

impl<W, C, const N: usize, const L: usize> SocketTransport for CavliClient<W, C, N, L>
where
    W: Read + Write,
    C: CellularConfig,
{
    fn register_socket(&mut self, slot: usize) -> Result<(), Error> {
        self.sockets.register(slot)
    }

    fn deregister_socket(&mut self, slot: usize) -> Result<(), Error> {
        self.mux.clear(slot);
        self.sockets.deregister(slot)
    }

    fn is_connected(&self, slot: usize) -> bool {
        self.sockets
            .get(slot)
            .map(|s| s.is_connected())
            .unwrap_or(false)
    }

    async fn connect(
        &mut self,
        slot: usize,
        host: &str,
        port: u16,
        ssl: bool,
        timeout: Duration,
    ) -> Result<(), Error> {
        if self.sockets.get(slot).is_none() {
            return Err(Error::InvalidSocket);
        }

        // Tear down whatever used the slot before this attempt.
        let _ = self.close(slot).await;
        self.mux.clear(slot);

        self.send_at(&Command::StartConnection { host, port, ssl })
            .await?;
        let (index, data) = self
            .wait_response_capture(timeout, CONNECT_TERMINATORS)
            .await?;
        if index != 0 {
            return Err(Error::ConnectFailed);
        }

        // `+CIPSTART: <id>,CONNECT OK`; the id is the one piece of the
        // response we need.
        let text = core::str::from_utf8(&data).map_err(|_| Error::InvalidResponse)?;
        let tail = text
            .rfind(CIPSTART_TAG)
            .map(|at| &text[at + CIPSTART_TAG.len()..])
            .ok_or(Error::InvalidResponse)?;
        let id = tail
            .split(',')
            .next()
            .ok_or(Error::InvalidResponse)?
            .trim()
            .parse::<u8>()
            .map_err(|_| Error::InvalidResponse)?;

        self.mux.assign(slot, id);
        debug!("Connection id {} mapped to slot {}", id, slot);

        // The exchange ends with a plain OK after the status line.
        let _ = self.wait_response(command_timeout()).await;

        if let Some(sock) = self.sockets.get_mut(slot) {
            sock.set_connected(true);
        }
        Ok(())
    }

    async fn send(&mut self, slot: usize, data: &[u8]) -> Result<usize, Error> {
        let id = self.mux.real_id(slot).ok_or(Error::InvalidSocket)?;
        if !self.is_connected(slot) {
            return Err(Error::SocketClosed);
        }

        self.send_at(&Command::SendData {
            mux: id,
            length: data.len(),
        })
        .await?;
        self.wait_response_in(command_timeout(), &[">"]).await?;
        self.write_raw(data).await?;
        self.wait_response_in(command_timeout(), &["SEND OK"])
            .await?;

        Ok(data.len())
    }

    async fn close(&mut self, slot: usize) -> Result<(), Error> {
        if slot >= N {
            return Err(Error::InvalidSocket);
        }
        if let Some(id) = self.mux.real_id(slot) {
            self.send_at(&Command::CloseConnection { mux: id }).await?;
            let _ = self.wait_response(close_timeout()).await;
        }
        if let Some(sock) = self.sockets.get_mut(slot) {
            sock.set_connected(false);
            sock.clear();
        }
        Ok(())
    }

    async fn available(&mut self, slot: usize) -> Result<usize, Error> {
        if self.sockets.get(slot).is_none() {
            return Err(Error::InvalidSocket);
        }
        if self.sockets.get(slot).map(|s| s.available()).unwrap_or(0) == 0 {
            self.spin(Duration::from_millis(10)).await?;
        }
        Ok(self.sockets.get(slot).map(|s| s.available()).unwrap_or(0))
    }

    async fn read(&mut self, slot: usize, buf: &mut [u8]) -> Result<usize, Error> {
        if self.sockets.get(slot).is_none() {
            return Err(Error::InvalidSocket);
        }
        if self.sockets.get(slot).map(|s| s.available()).unwrap_or(0) == 0 {
            self.spin(Duration::from_millis(10)).await?;
        }
        Ok(self
            .sockets
            .get_mut(slot)
            .map(|s| s.recv_slice(buf))
            .unwrap_or(0))
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
    async fn connect_captures_assigned_id() {
        let mut at = client(b"\r\n+CIPSTART: 3,CONNECT OK\r\nOK\r\n");
        at.register_socket(2).unwrap();

        at.connect(2, "example.com", 1883, false, Duration::from_millis(200))
            .await
            .unwrap();

        assert_eq!(at.real_mux(2), Some(3));
        assert!(at.is_connected(2));
        assert!(std::str::from_utf8(at.stream.written())
            .unwrap()
            .contains("AT+CIPSTART=\"TCP\",\"example.com\",1883,0\r\n"));
    }

    #[tokio::test]
    async fn connect_failure_leaves_no_mapping() {
        let mut at = client(b"\r\nCONNECT FAIL\r\n");
        at.register_socket(1).unwrap();

        assert_eq!(
            at.connect(1, "example.com", 80, false, Duration::from_millis(200))
                .await,
            Err(Error::ConnectFailed)
        );
        assert_eq!(at.real_mux(1), None);
        assert!(!at.is_connected(1));
    }

    #[tokio::test]
    async fn connect_requires_registered_slot() {
        let mut at = client(b"");
        assert_eq!(
            at.connect(0, "example.com", 80, false, Duration::from_millis(50))
                .await,
            Err(Error::InvalidSocket)
        );
    }

    #[tokio::test]
    async fn reconnect_closes_previous_session_by_real_id() {
        let mut at = client(b"\r\nOK\r\n\r\n+CIPSTART: 5,CONNECT OK\r\nOK\r\n");
        at.register_socket(0).unwrap();
        at.mux.assign(0, 2);

        at.connect(0, "example.com", 443, true, Duration::from_millis(200))
            .await
            .unwrap();

        let written = std::str::from_utf8(at.stream.written()).unwrap();
        assert!(written.starts_with("AT+CIPCLOSE=2\r\n"));
        assert!(written.contains("AT+CIPSTART=\"TCP\",\"example.com\",443,1\r\n"));
        assert_eq!(at.real_mux(0), Some(5));
    }

    #[tokio::test]
    async fn send_uses_prompt_and_confirmation() {
        let mut at = client(b"\r\n> \r\nSEND OK\r\n");
        at.register_socket(0).unwrap();
        at.mux.assign(0, 4);
        at.sockets.get_mut(0).unwrap().set_connected(true);

        assert_eq!(at.send(0, b"HELLO").await, Ok(5));

        let written = at.stream.written();
        let text = std::str::from_utf8(written).unwrap();
        assert!(text.starts_with("AT+CIPSEND=4,5\r\n"));
        assert!(text.ends_with("HELLO"));
    }

    #[tokio::test]
    async fn send_on_unopened_slot_fails() {
        let mut at = client(b"");
        at.register_socket(0).unwrap();
        assert_eq!(at.send(0, b"x").await, Err(Error::InvalidSocket));
    }

    #[tokio::test]
    async fn send_on_closed_socket_fails() {
        let mut at = client(b"");
        at.register_socket(0).unwrap();
        at.mux.assign(0, 4);
        assert_eq!(at.send(0, b"x").await, Err(Error::SocketClosed));
    }

    #[tokio::test]
    async fn close_clears_connection_state() {
        let mut at = client(b"\r\nOK\r\n");
        at.register_socket(0).unwrap();
        at.mux.assign(0, 3);
        at.sockets.get_mut(0).unwrap().set_connected(true);

        at.close(0).await.unwrap();

        assert!(!at.is_connected(0));
        assert_eq!(
            std::str::from_utf8(at.stream.written()).unwrap(),
            "AT+CIPCLOSE=3\r\n"
        );
    }

    #[tokio::test]
    async fn read_drains_buffered_payload() {
        let mut at = client(b"");
        at.register_socket(1).unwrap();
        at.sockets.get_mut(1).unwrap().fill(b"HELLO");

        let mut buf = [0u8; 16];
        assert_eq!(at.read(1, &mut buf).await, Ok(5));
        assert_eq!(&buf[..5], b"HELLO");
    }

    #[tokio::test]
    async fn read_pumps_pending_notifications_first() {
        let mut at = client(b"\r\n+CIPRECEIVE:6,5\r\nWORLD\r\n");
        at.register_socket(2).unwrap();
        at.mux.assign(2, 6);

        let mut buf = [0u8; 16];
        assert_eq!(at.read(2, &mut buf).await, Ok(5));
        assert_eq!(&buf[..5], b"WORLD");
    }

    #[tokio::test]
    async fn available_reports_queued_count() {
        let mut at = client(b"\r\n+CIPRECEIVE:6,3\r\nABC\r\n");
        at.register_socket(0).unwrap();
        at.mux.assign(0, 6);

        assert_eq!(at.available(0).await, Ok(3));
    }
}
