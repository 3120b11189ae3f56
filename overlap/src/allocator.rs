use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use bytes::BytesMut;
use tracing::{debug, trace};

/// Byte accounting shared by any number of [`MemoryAllocator`]s
///
/// The limit is advisory: exceeding it is logged but never blocks or fails I/O.
#[derive(Debug)]
pub struct MemoryQuota {
    used: AtomicUsize,
    limit: usize,
}

impl MemoryQuota {
    /// Create a quota with an advisory `limit` in bytes
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            used: AtomicUsize::new(0),
            limit,
        })
    }

    /// Create a quota that never reports being exceeded
    pub fn unlimited() -> Arc<Self> {
        Self::new(usize::MAX)
    }

    /// Number of bytes currently reserved against this quota
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// The advisory limit in bytes
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Per-endpoint handle to a [`MemoryQuota`]
#[derive(Debug, Clone)]
pub struct MemoryAllocator {
    quota: Arc<MemoryQuota>,
}

impl MemoryAllocator {
    /// Create an allocator charging `quota`
    pub fn new(quota: Arc<MemoryQuota>) -> Self {
        Self { quota }
    }

    /// Create an allocator backed by its own unlimited quota
    pub fn unlimited() -> Self {
        Self::new(MemoryQuota::unlimited())
    }

    /// The quota this allocator charges
    pub fn quota(&self) -> &Arc<MemoryQuota> {
        &self.quota
    }

    /// Account for `bytes` until the returned [`Reservation`] is dropped
    pub fn reserve(&self, bytes: usize) -> Reservation {
        let used = self.quota.used.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if used > self.quota.limit {
            debug!(
                used,
                limit = self.quota.limit,
                "memory quota exceeded by reservation of {} bytes",
                bytes
            );
        }
        Reservation {
            quota: self.quota.clone(),
            bytes,
        }
    }

    /// Allocate a zeroed region of `size` bytes for the socket to read into
    pub fn make_slice(&self, size: usize) -> BytesMut {
        trace!(size, "allocating read slice");
        BytesMut::zeroed(size)
    }
}

/// Bytes accounted against a [`MemoryQuota`], released on drop
#[derive(Debug)]
#[must_use = "dropping a reservation releases it immediately"]
pub struct Reservation {
    quota: Arc<MemoryQuota>,
    bytes: usize,
}

impl Reservation {
    /// Number of bytes held by this reservation
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.quota.used.fetch_sub(self.bytes, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservations_are_released_on_drop() {
        let quota = MemoryQuota::new(16);
        let allocator = MemoryAllocator::new(quota.clone());
        let a = allocator.reserve(10);
        let b = allocator.reserve(10);
        assert_eq!(quota.used(), 20);
        assert_eq!(b.bytes(), 10);
        drop(a);
        assert_eq!(quota.used(), 10);
        drop(b);
        assert_eq!(quota.used(), 0);
    }

    #[test]
    fn slices_are_zeroed() {
        let slice = MemoryAllocator::unlimited().make_slice(32);
        assert_eq!(slice.len(), 32);
        assert!(slice.iter().all(|&b| b == 0));
    }
}
