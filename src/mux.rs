//! Translation between caller-visible connection slots and the
//! module-assigned connection ids.
//!
//! Unlike seemingly every other module with a SIMCom-style TCP stack, the
//! C16QS does not accept a connection number on `+CIPSTART`; it picks one
//! itself and reports it in the response. Callers address sockets by a
//! stable slot index, so every slot remembers which id the module handed
//! out, and unsolicited traffic (which names the module's id) is resolved
//! back to a slot with a linear scan.

#[derive(Debug)]
pub struct MuxMap<const N: usize> {
    real: [Option<u8>; N],
}

impl<const N: usize> Default for MuxMap<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MuxMap<N> {
    pub const fn new() -> Self {
        Self { real: [None; N] }
    }

    /// Record the id the module assigned for `slot`, replacing any
    /// previous assignment. `slot` is validated by the caller.
    pub fn assign(&mut self, slot: usize, real: u8) {
        self.real[slot] = Some(real);
    }

    /// Forget the assignment for `slot`, e.g. when the slot is reused for
    /// a new connection attempt.
    pub fn clear(&mut self, slot: usize) {
        self.real[slot] = None;
    }

    /// The module-assigned id for `slot`, if a connection ever completed
    /// on it.
    pub fn real_id(&self, slot: usize) -> Option<u8> {
        self.real.get(slot).copied().flatten()
    }

    /// Resolve a module-assigned id back to its slot. O(N), but N is 8.
    pub fn slot_of(&self, real: u8) -> Option<usize> {
        self.real.iter().position(|r| *r == Some(real))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut map = MuxMap::<8>::new();
        map.assign(2, 3);
        assert_eq!(map.slot_of(3), Some(2));
        assert_eq!(map.real_id(2), Some(3));
    }

    #[test]
    fn unknown_id_is_not_found() {
        let mut map = MuxMap::<8>::new();
        map.assign(0, 1);
        assert_eq!(map.slot_of(9), None);
        assert_eq!(map.real_id(5), None);
    }

    #[test]
    fn assign_is_idempotent() {
        let mut map = MuxMap::<8>::new();
        map.assign(4, 7);
        map.assign(4, 7);
        assert_eq!(map.slot_of(7), Some(4));
        assert_eq!(map.real_id(4), Some(7));
    }

    #[test]
    fn reassign_overwrites() {
        let mut map = MuxMap::<8>::new();
        map.assign(1, 2);
        map.assign(1, 6);
        assert_eq!(map.real_id(1), Some(6));
        assert_eq!(map.slot_of(2), None);
        assert_eq!(map.slot_of(6), Some(1));
    }

    #[test]
    fn clear_forgets() {
        let mut map = MuxMap::<8>::new();
        map.assign(3, 5);
        map.clear(3);
        assert_eq!(map.real_id(3), None);
        assert_eq!(map.slot_of(5), None);
    }

    #[test]
    fn out_of_range_lookup_is_none() {
        let map = MuxMap::<2>::new();
        assert_eq!(map.real_id(7), None);
    }
}
