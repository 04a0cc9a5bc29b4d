use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::Resolution;

/// Identifies one buffer of a [`BufferPool`] for its whole lifetime.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SlotId(pub u32);

/// Distinguishes pools of the same shape; never reused within a process.
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

/// CPU-visible pixel memory a rendered frame is read back into.
///
/// Tightly packed BGRA, `width * 4` bytes per row. Not `Clone`: a buffer is
/// in exactly one place at a time (free list, GPU submission, or encoder
/// commit), so it can neither be committed twice nor reused mid-write.
#[derive(Debug)]
pub struct PixelBuffer {
    pool: u64,
    slot: SlotId,
    ticket: u64,
    resolution: Resolution,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Acquisition order assigned by the capture session.
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn bytes_per_row(&self) -> usize {
        self.resolution.width as usize * 4
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub(crate) fn set_ticket(&mut self, ticket: u64) {
        self.ticket = ticket;
    }
}

#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum PoolError {
    #[error("pool capacity must be non-zero")]
    ZeroCapacity,

    #[error("pixel buffer size overflows for {0}")]
    TooLarge(Resolution),

    #[error("out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error("slot {0:?} is not checked out")]
    NotCheckedOut(SlotId),

    #[error("buffer does not belong to this pool")]
    Foreign,
}

/// Fixed-capacity set of reusable pixel buffers with checkout/restore discipline.
///
/// All buffers are allocated up front. Exhaustion is backpressure: `checkout`
/// returns `None` and the caller skips the frame.
#[derive(Debug)]
pub struct BufferPool {
    id: u64,
    resolution: Resolution,
    capacity: usize,
    free: VecDeque<PixelBuffer>,
    checked_out: HashSet<SlotId>,
}

impl BufferPool {
    pub fn new(resolution: Resolution, capacity: usize) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }
        let len = resolution
            .packed_len()
            .filter(|len| *len > 0)
            .ok_or(PoolError::TooLarge(resolution))?;

        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let mut free = VecDeque::with_capacity(capacity);
        for i in 0..capacity {
            let mut data = Vec::new();
            data.try_reserve_exact(len)
                .map_err(|_| PoolError::OutOfMemory { bytes: len })?;
            data.resize(len, 0);
            free.push_back(PixelBuffer {
                pool: id,
                slot: SlotId(i as u32),
                ticket: 0,
                resolution,
                data,
            });
        }

        Ok(Self {
            id,
            resolution,
            capacity,
            free,
            checked_out: HashSet::with_capacity(capacity),
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot ids of every buffer this pool owns.
    pub fn slots(&self) -> impl Iterator<Item = SlotId> + use<> {
        (0..self.capacity as u32).map(SlotId)
    }

    /// Buffers currently checked out.
    pub fn outstanding(&self) -> usize {
        self.checked_out.len()
    }

    /// Takes the least recently returned buffer, or `None` when exhausted.
    pub fn checkout(&mut self) -> Option<PixelBuffer> {
        let buffer = self.free.pop_front()?;
        self.checked_out.insert(buffer.slot);
        Some(buffer)
    }

    /// Returns a buffer previously handed out by [`checkout`](Self::checkout).
    pub fn restore(&mut self, buffer: PixelBuffer) -> Result<(), PoolError> {
        if buffer.pool != self.id {
            return Err(PoolError::Foreign);
        }
        if !self.checked_out.remove(&buffer.slot) {
            return Err(PoolError::NotCheckedOut(buffer.slot));
        }
        self.free.push_back(buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(cap: usize) -> BufferPool {
        BufferPool::new(Resolution::new(4, 2), cap).unwrap()
    }

    // ── allocation ────────────────────────────────────────────────────────

    #[test]
    fn allocates_packed_buffers() {
        let mut p = pool(2);
        let b = p.checkout().unwrap();
        assert_eq!(b.data().len(), 32);
        assert_eq!(b.bytes_per_row(), 16);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(
            BufferPool::new(Resolution::new(4, 2), 0).unwrap_err(),
            PoolError::ZeroCapacity
        );
    }

    #[test]
    fn zero_area_is_rejected() {
        assert!(matches!(
            BufferPool::new(Resolution::new(0, 2), 1),
            Err(PoolError::TooLarge(_))
        ));
    }

    // ── checkout / restore ────────────────────────────────────────────────

    #[test]
    fn exhaustion_returns_none() {
        let mut p = pool(2);
        let _a = p.checkout().unwrap();
        let _b = p.checkout().unwrap();
        assert!(p.checkout().is_none());
        assert_eq!(p.outstanding(), 2);
    }

    #[test]
    fn restore_makes_buffer_available_again() {
        let mut p = pool(1);
        let a = p.checkout().unwrap();
        let slot = a.slot();
        p.restore(a).unwrap();
        assert_eq!(p.outstanding(), 0);
        assert_eq!(p.checkout().unwrap().slot(), slot);
    }

    #[test]
    fn slots_rotate_in_return_order() {
        let mut p = pool(3);
        let a = p.checkout().unwrap();
        let b = p.checkout().unwrap();
        p.restore(b).unwrap();
        p.restore(a).unwrap();
        assert_eq!(p.checkout().unwrap().slot(), SlotId(2));
        assert_eq!(p.checkout().unwrap().slot(), SlotId(1));
        assert_eq!(p.checkout().unwrap().slot(), SlotId(0));
    }

    #[test]
    fn foreign_buffer_is_rejected() {
        let mut p = pool(1);
        let mut other = BufferPool::new(Resolution::new(8, 8), 1).unwrap();
        let foreign = other.checkout().unwrap();
        assert_eq!(p.restore(foreign).unwrap_err(), PoolError::Foreign);
    }

    #[test]
    fn buffer_from_a_same_shaped_pool_is_rejected() {
        let mut a = pool(2);
        let mut b = pool(2);
        let _from_a = a.checkout().unwrap();
        let from_b = b.checkout().unwrap();
        assert_eq!(from_b.slot(), SlotId(0));

        assert_eq!(a.restore(from_b).unwrap_err(), PoolError::Foreign);
        assert_eq!(a.outstanding(), 1);
    }

    #[test]
    fn restoring_a_slot_that_is_not_out_is_rejected() {
        let mut p = pool(2);
        let stray = PixelBuffer {
            pool: p.id,
            slot: SlotId(1),
            ticket: 0,
            resolution: p.resolution(),
            data: vec![0; 32],
        };
        assert_eq!(p.restore(stray).unwrap_err(), PoolError::NotCheckedOut(SlotId(1)));
        assert_eq!(p.checkout().unwrap().slot(), SlotId(0));
    }
}
