//! Serial ownership, the command write path and the response engine.
//!
//! The engine reads the stream one byte at a time into an accumulation
//! buffer and checks the buffer's tail against the current exchange's
//! terminators and against the unsolicited headers the C16QS emits on its
//! own. Unsolicited traffic is consumed in place (inbound payload goes to
//! the owning slot's receive buffer, remote closes flip the slot's
//! connected flag, autonomous network refreshes are discarded) and never
//! reaches the text handed back to the caller.

use embassy_futures::yield_now;
use embassy_time::{with_timeout, Duration, Instant, TimeoutError};
use embedded_io_async::{Read, Write};
use heapless::{String, Vec};

use crate::command::Command;
use crate::config::CellularConfig;
use crate::error::Error;
use crate::mux::MuxMap;
use crate::socket::SocketSet;
use crate::MUX_COUNT;

/// Accumulation buffer bound. Command responses on this module are short;
/// bulk data arrives through the payload notification path instead.
pub(crate) const INGRESS_BUF_LEN: usize = 512;

/// An exchange matches against at most this many terminators.
pub(crate) const MAX_TERMINATORS: usize = 5;

/// Default terminator set for plain command exchanges. The error-report
/// headers only appear with `AT+CMEE` enabled; matching them anyway costs
/// nothing.
pub(crate) const DEFAULT_TERMINATORS: &[&str] = &[
    "OK\r\n",
    "ERROR\r\n",
    "\r\n+CME ERROR:",
    "\r\n+CMS ERROR:",
];

const CME_ERROR: &str = "\r\n+CME ERROR:";
const CMS_ERROR: &str = "\r\n+CMS ERROR:";

/// The C16QS does not buffer inbound socket data for later retrieval; it
/// announces `+CIPRECEIVE: <id>,<len>` and immediately dumps the payload.
const DATA_READY: &str = "\r\n+CIPRECEIVE:";

/// `<id>,CLOSED`: the peer closed a connection.
const REMOTE_CLOSED: &str = "CLOSED\r\n";

/// Autonomous network name/time/timezone/DST refresh lines; recognized
/// only so they can be discarded without disturbing a pending exchange.
const REFRESH_HEADERS: &[&str] = &["*PSNWID:", "*PSUTTZ:", "+CTZV:", "DST:"];

/// Driver for one C16QS module on one serial link.
///
/// Single logical flow by design: every operation takes `&mut self`, and
/// nothing here is shared. One module per instance; independent modules
/// get independent instances.
pub struct CavliClient<W, C, const N: usize = MUX_COUNT, const L: usize = 1024>
where
    W: Read + Write,
    C: CellularConfig,
{
    pub(crate) stream: W,
    pub(crate) config: C,
    buf: Vec<u8, INGRESS_BUF_LEN>,
    pub(crate) mux: MuxMap<N>,
    pub(crate) sockets: SocketSet<N, L>,
}

impl<W, C, const N: usize, const L: usize> CavliClient<W, C, N, L>
where
    W: Read + Write,
    C: CellularConfig,
{
    pub fn new(stream: W, config: C) -> Self {
        Self {
            stream,
            config,
            buf: Vec::new(),
            mux: MuxMap::new(),
            sockets: SocketSet::new(),
        }
    }

    /// The module-assigned connection id for `slot`, for callers that
    /// build commands addressing the module directly.
    pub fn real_mux(&self, slot: usize) -> Option<u8> {
        self.mux.real_id(slot)
    }

    /// Write a command line, CRLF-terminated, and flush.
    pub async fn send_at(&mut self, cmd: &Command<'_>) -> Result<(), Error> {
        let line = cmd.as_str();
        debug!("-> [{}]", line.as_str());
        self.stream
            .write_all(line.as_bytes())
            .await
            .map_err(|_| Error::Transport)?;
        self.stream
            .write_all(b"\r\n")
            .await
            .map_err(|_| Error::Transport)?;
        self.stream.flush().await.map_err(|_| Error::Transport)
    }

    /// Write raw payload bytes (the `+CIPSEND` data phase).
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<(), Error> {
        self.stream
            .write_all(data)
            .await
            .map_err(|_| Error::Transport)?;
        self.stream.flush().await.map_err(|_| Error::Transport)
    }

    /// Send a command and classify its response against the default set.
    pub async fn command(&mut self, cmd: &Command<'_>, timeout: Duration) -> Result<usize, Error> {
        self.send_at(cmd).await?;
        self.wait_response(timeout).await
    }

    /// Send a command and require a plain `OK`.
    pub async fn command_ok(&mut self, cmd: &Command<'_>, timeout: Duration) -> Result<(), Error> {
        match self.command(cmd, timeout).await? {
            0 => Ok(()),
            _ => Err(Error::Command),
        }
    }

    /// Classify against the default terminator set, discarding the text.
    pub async fn wait_response(&mut self, timeout: Duration) -> Result<usize, Error> {
        self.wait_response_in(timeout, DEFAULT_TERMINATORS).await
    }

    /// Classify against a caller-supplied terminator set, discarding the
    /// text.
    pub async fn wait_response_in(
        &mut self,
        timeout: Duration,
        terminators: &[&str],
    ) -> Result<usize, Error> {
        self.wait_response_capture(timeout, terminators)
            .await
            .map(|(index, _)| index)
    }

    /// Drive the response engine until one of `terminators` is the suffix
    /// of the accumulated bytes, or the deadline elapses.
    ///
    /// Returns the matched terminator's index within `terminators`
    /// (lowest index wins when several match at once) together with the
    /// accumulated bytes, terminator included. `Err(Error::Timeout)` when
    /// nothing matched in time; whatever text was pending is logged and
    /// discarded, so the next exchange starts clean.
    pub async fn wait_response_capture(
        &mut self,
        timeout: Duration,
        terminators: &[&str],
    ) -> Result<(usize, Vec<u8, INGRESS_BUF_LEN>), Error> {
        debug_assert!(terminators.len() <= MAX_TERMINATORS);
        let deadline = Instant::now() + timeout;
        self.buf.clear();

        match self.classify(deadline, terminators).await {
            Ok(index) => {
                trace!("<{}> matched after {} bytes", index, self.buf.len());
                let data = self.buf.clone();
                self.buf.clear();
                Ok((index, data))
            }
            Err(Error::Timeout) => {
                if let Ok(text) = core::str::from_utf8(&self.buf) {
                    if !text.trim().is_empty() {
                        warn!("Unhandled response fragment: {}", text.trim());
                    }
                } else if !self.buf.is_empty() {
                    warn!("Unhandled response fragment ({} bytes)", self.buf.len());
                }
                self.buf.clear();
                Err(Error::Timeout)
            }
            Err(e) => Err(e),
        }
    }

    /// Absorb any pending unsolicited traffic for up to `budget`, without
    /// an exchange in flight. Used by the socket layer before reporting
    /// buffered data, since payload notifications only get consumed while
    /// the engine is running.
    pub async fn spin(&mut self, budget: Duration) -> Result<(), Error> {
        match self.wait_response_in(budget, &[]).await {
            Ok(_) | Err(Error::Timeout) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn classify(&mut self, deadline: Instant, terminators: &[&str]) -> Result<usize, Error> {
        loop {
            let byte = self.byte_until(deadline).await?;
            if byte == 0 {
                // Skip stray NULs, just in case.
                continue;
            }
            if self.buf.push(byte).is_err() {
                warn!("Response buffer full, discarding {} bytes", self.buf.len());
                self.buf.clear();
                continue;
            }

            if let Some(index) = terminators
                .iter()
                .position(|t| self.buf.ends_with(t.as_bytes()))
            {
                let matched = terminators[index];
                if matched == CME_ERROR || matched == CMS_ERROR {
                    // The error cause occupies the rest of the line.
                    self.skip_until_newline(deadline).await?;
                }
                return Ok(index);
            }

            if self.buf.ends_with(DATA_READY.as_bytes()) {
                self.socket_ingress(deadline).await?;
                self.buf.clear();
            } else if self.buf.ends_with(REMOTE_CLOSED.as_bytes()) {
                self.remote_close();
                self.buf.clear();
            } else if REFRESH_HEADERS
                .iter()
                .any(|h| self.buf.ends_with(h.as_bytes()))
            {
                self.skip_until_newline(deadline).await?;
                debug!("Network status refresh consumed");
                self.buf.clear();
            }
        }
    }

    /// `+CIPRECEIVE: <id>,<len>\r\n<payload>\r\n`. The id and length are
    /// read straight off the stream, then exactly `len` payload bytes are
    /// moved into the owning slot's receive buffer. The declared count is
    /// always drained, even when the id is unknown or the buffer cannot
    /// hold it; the stream has no way to take the bytes back, and leaving
    /// them would desynchronize every later exchange.
    async fn socket_ingress(&mut self, deadline: Instant) -> Result<(), Error> {
        let id = match self.int_until(deadline, b',').await {
            Ok(id) if id >= 0 => id as u8,
            Ok(_) | Err(Error::InvalidResponse) => {
                warn!("Malformed data notification header");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let declared = match self.int_until(deadline, b'\n').await {
            Ok(len) if len >= 0 => len as usize,
            Ok(_) | Err(Error::InvalidResponse) => {
                warn!("Malformed data notification header");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let slot = self.mux.slot_of(id);
        let sink = slot.filter(|s| self.sockets.get(*s).is_some());

        let Some(slot) = sink else {
            warn!(
                "Inbound data for unknown connection id {}, discarding {} bytes",
                id, declared
            );
            for _ in 0..declared {
                self.byte_until(deadline).await?;
            }
            return self.skip_until_newline(deadline).await;
        };

        let free = self.sockets.get(slot).map(|s| s.free()).unwrap_or(0);
        if declared > free {
            warn!(
                "Receive buffer overflow on slot {}: {} incoming vs {} free",
                slot, declared, free
            );
        }

        let mut lost = 0;
        for _ in 0..declared {
            let byte = self.byte_until(deadline).await?;
            if let Some(sock) = self.sockets.get_mut(slot) {
                if sock.enqueue(byte).is_err() {
                    lost += 1;
                }
            }
        }
        // The payload is followed by CRLF which must be discarded.
        self.skip_until_newline(deadline).await?;

        if lost > 0 {
            warn!("Dropped {} of {} bytes on slot {}", lost, declared, slot);
        }
        if let Some(sock) = self.sockets.get(slot) {
            if sock.available() < declared {
                debug!(
                    "Fewer bytes queued than declared: {} vs {}",
                    sock.available(),
                    declared
                );
            }
        }
        Ok(())
    }

    /// `<id>,CLOSED`. The id sits in the already-accumulated bytes, just
    /// before the header.
    fn remote_close(&mut self) {
        let head = &self.buf[..self.buf.len() - REMOTE_CLOSED.len()];
        let line = head.rsplit(|b| *b == b'\n').next().unwrap_or(head);
        let id = core::str::from_utf8(line)
            .ok()
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<u8>().ok());

        let Some(id) = id else {
            warn!("Malformed close notification");
            return;
        };
        match self.mux.slot_of(id) {
            Some(slot) => {
                if let Some(sock) = self.sockets.get_mut(slot) {
                    sock.set_connected(false);
                }
                debug!("Connection id {} closed by peer", id);
            }
            None => warn!("Close notification for unknown connection id {}", id),
        }
    }

    /// One byte off the stream, or `Error::Timeout` at the deadline.
    async fn byte_until(&mut self, deadline: Instant) -> Result<u8, Error> {
        let mut byte = [0u8; 1];
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            match with_timeout(deadline - now, self.stream.read(&mut byte)).await {
                Ok(Ok(0)) => yield_now().await,
                Ok(Ok(_)) => return Ok(byte[0]),
                Ok(Err(_)) => return Err(Error::Transport),
                Err(TimeoutError) => return Err(Error::Timeout),
            }
        }
    }

    async fn int_until(&mut self, deadline: Instant, delim: u8) -> Result<i32, Error> {
        let mut field = String::<12>::new();
        loop {
            let byte = self.byte_until(deadline).await?;
            if byte == delim {
                return field
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| Error::InvalidResponse);
            }
            field
                .push(byte as char)
                .map_err(|_| Error::InvalidResponse)?;
        }
    }

    async fn line_until(&mut self, deadline: Instant) -> Result<String<64>, Error> {
        let mut line = String::<64>::new();
        loop {
            let byte = self.byte_until(deadline).await?;
            if byte == b'\n' {
                return String::try_from(line.trim()).map_err(|_| Error::InvalidResponse);
            }
            if byte != b'\r' {
                // Longer lines than this are out of contract; truncate.
                line.push(byte as char).ok();
            }
        }
    }

    async fn skip_until_newline(&mut self, deadline: Instant) -> Result<(), Error> {
        loop {
            if self.byte_until(deadline).await? == b'\n' {
                return Ok(());
            }
        }
    }

    /// Read a numeric field, `delim`-terminated, directly off the stream.
    pub(crate) async fn read_int_before(
        &mut self,
        timeout: Duration,
        delim: u8,
    ) -> Result<i32, Error> {
        let deadline = Instant::now() + timeout;
        self.int_until(deadline, delim).await
    }

    /// Read the rest of the current line, trimmed.
    pub(crate) async fn read_line(&mut self, timeout: Duration) -> Result<String<64>, Error> {
        let deadline = Instant::now() + timeout;
        self.line_until(deadline).await
    }
}
