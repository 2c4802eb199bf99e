//! Deferred shadow reclaim.
//!
//! Threads that unmap or recycle large regions push them here; whichever
//! thread holds the shadow engine drains the queue and releases the backing
//! shadow pages in one pass.

use crossbeam_queue::SegQueue;

use crate::api::shadow::ShadowMemory;
use crate::core::mapper::AddressMapper;
use crate::sync::atomics::AtomicCounter;

/// A pending flush request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingFlush {
    addr: usize,
    size: usize,
}

/// Lock-free queue of application ranges whose shadow can be released.
pub struct ReclaimQueue {
    queue: SegQueue<PendingFlush>,
    requested: AtomicCounter,
    released: AtomicCounter,
}

impl ReclaimQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            requested: AtomicCounter::default(),
            released: AtomicCounter::default(),
        }
    }

    /// Queue `[addr, addr + size)` for a shadow flush.
    ///
    /// The range must already be unpoisoned when the queue is drained.
    pub fn push(&self, addr: usize, size: usize) {
        if size == 0 {
            return;
        }
        self.requested.add(size as u64);
        self.queue.push(PendingFlush { addr, size });
    }

    /// Flush every pending range through `shadow`.
    ///
    /// Returns the number of shadow bytes released by this drain.
    pub fn drain<M: AddressMapper>(&self, shadow: &mut ShadowMemory<M>) -> usize {
        let mut released = 0;
        while let Some(pending) = self.queue.pop() {
            released += shadow.flush_unneeded_shadow_memory(pending.addr, pending.size);
        }

        #[cfg(feature = "log")]
        if released > 0 {
            log::debug!("reclaim queue drained, {} shadow bytes released", released);
        }

        self.released.add(released as u64);
        released
    }

    /// Check if there are pending flushes.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Approximate number of pending flushes.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Application bytes queued over the lifetime of this queue.
    pub fn requested_bytes(&self) -> u64 {
        self.requested.get()
    }

    /// Shadow bytes released by all drains so far.
    pub fn released_bytes(&self) -> u64 {
        self.released.get()
    }
}

impl Default for ReclaimQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReclaimQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReclaimQueue")
            .field("pending", &self.len())
            .field("requested", &self.requested_bytes())
            .field("released", &self.released_bytes())
            .finish()
    }
}
