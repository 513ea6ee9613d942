//! Per-slot receive state, owned by the driver.
//!
//! The protocol engine pushes unsolicited inbound payload and
//! connection-state transitions into these buffers while a command
//! exchange is in flight; the socket-facing API drains them. Slots are
//! registered explicitly, and traffic for an unregistered slot is a
//! handled (logged and discarded) condition, not a fault.

mod ring_buffer;

pub use ring_buffer::{Error as BufferError, RingBuffer};

use crate::error::Error;

/// Receive-side state of one connection slot: a connected flag plus a
/// bounded byte queue.
#[derive(Debug, Default)]
pub struct SocketBuffer<const L: usize> {
    connected: bool,
    rx: RingBuffer<u8, L>,
}

impl<const L: usize> SocketBuffer<L> {
    pub fn new() -> Self {
        Self {
            connected: false,
            rx: RingBuffer::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Bytes queued and ready for `recv_slice`.
    pub fn available(&self) -> usize {
        self.rx.len()
    }

    /// Free space left in the receive queue.
    pub fn free(&self) -> usize {
        self.rx.window()
    }

    /// Queue one received byte. `Err` when the queue is full; the caller
    /// decides whether that is a loss to report.
    pub fn enqueue(&mut self, byte: u8) -> Result<(), BufferError> {
        self.rx.enqueue(byte)
    }

    /// Drain up to `data.len()` received bytes, returning how many were
    /// copied.
    pub fn recv_slice(&mut self, data: &mut [u8]) -> usize {
        self.rx.dequeue_slice(data)
    }

    /// Drop any queued bytes, e.g. before a fresh connection attempt.
    pub fn clear(&mut self) {
        self.rx.clear();
    }

    #[cfg(test)]
    pub(crate) fn fill(&mut self, data: &[u8]) -> usize {
        self.rx.enqueue_slice(data)
    }
}

/// Owned, fixed-size arena of optional receive buffers, indexed by slot.
#[derive(Debug)]
pub struct SocketSet<const N: usize, const L: usize> {
    sockets: [Option<SocketBuffer<L>>; N],
}

impl<const N: usize, const L: usize> SocketSet<N, L> {
    pub fn new() -> Self {
        Self {
            sockets: core::array::from_fn(|_| None),
        }
    }

    /// Attach a fresh receive buffer to `slot`. Re-registering an
    /// occupied slot resets it.
    pub fn register(&mut self, slot: usize) -> Result<(), Error> {
        if slot >= N {
            return Err(Error::InvalidSocket);
        }
        self.sockets[slot] = Some(SocketBuffer::new());
        Ok(())
    }

    /// Detach the receive buffer from `slot`. Later inbound data for the
    /// slot is discarded by the engine.
    pub fn deregister(&mut self, slot: usize) -> Result<(), Error> {
        if slot >= N {
            return Err(Error::InvalidSocket);
        }
        self.sockets[slot] = None;
        Ok(())
    }

    pub fn get(&self, slot: usize) -> Option<&SocketBuffer<L>> {
        self.sockets.get(slot).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut SocketBuffer<L>> {
        self.sockets.get_mut(slot).and_then(|s| s.as_mut())
    }
}

impl<const N: usize, const L: usize> Default for SocketSet<N, L> {
    fn default() -> Self {
        Self::new()
    }
}
