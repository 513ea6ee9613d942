//! Host-side test support: a script-driven stand-in for the module's
//! serial port.

use std::collections::VecDeque;

/// Duplex stream fed from a canned script. Reads drain the script one
/// chunk at a time; once it runs dry the read pends forever, so deadline
/// handling is exercised exactly like on a quiet serial line. Writes are
/// captured for assertions.
pub struct MockSerial {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            tx: Vec::new(),
        }
    }

    pub fn script(data: &[u8]) -> Self {
        let mut serial = Self::new();
        serial.push(data);
        serial
    }

    /// Queue more inbound bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.rx.extend(data.iter().copied());
    }

    /// Everything the driver wrote so far.
    pub fn written(&self) -> &[u8] {
        &self.tx
    }

    /// Drop the captured writes, e.g. between two phases of a test.
    pub fn clear_written(&mut self) {
        self.tx.clear();
    }
}

impl embedded_io_async::ErrorType for MockSerial {
    type Error = core::convert::Infallible;
}

impl embedded_io_async::Read for MockSerial {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.rx.is_empty() {
            // A quiet line: never ready, the engine's deadline decides.
            core::future::pending::<()>().await;
        }
        let n = buf.len().min(self.rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.rx.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl embedded_io_async::Write for MockSerial {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.tx.extend_from_slice(buf);
        Ok(buf.len())
    }
}
