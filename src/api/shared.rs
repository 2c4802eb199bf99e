//! Thread-safe handle to a shadow engine.

use std::sync::Arc;

use crate::api::reclaim::ReclaimQueue;
use crate::api::shadow::ShadowMemory;
use crate::api::stats::ShadowStats;
use crate::core::gate::PoisonGate;
use crate::core::mapper::{AddressMapper, AffineMapper};
use crate::error::ShadowError;
use crate::sync::mutex::{Mutex, MutexGuard};

/// A shadow engine shared between threads.
///
/// Shadow writes go through one lock, the way an allocator serializes its
/// own bookkeeping. The gate lives outside the lock so trusted regions can
/// be bracketed without contending with writers. Cloning is cheap.
pub struct SharedShadow<M: AddressMapper = AffineMapper> {
    inner: Arc<Mutex<ShadowMemory<M>>>,
    gate: Arc<PoisonGate>,
    reclaim: Arc<ReclaimQueue>,
}

impl<M: AddressMapper> SharedShadow<M> {
    /// Wrap an engine for sharing.
    pub fn new(shadow: ShadowMemory<M>) -> Self {
        let gate = Arc::clone(shadow.gate());
        Self {
            inner: Arc::new(Mutex::new(shadow)),
            gate,
            reclaim: Arc::new(ReclaimQueue::new()),
        }
    }

    /// Lock the engine.
    pub fn lock(&self) -> MutexGuard<'_, ShadowMemory<M>> {
        self.inner.lock()
    }

    /// Access the engine with a closure.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ShadowMemory<M>) -> R,
    {
        let mut shadow = self.inner.lock();
        f(&mut shadow)
    }

    /// The gate shared with the engine.
    pub fn gate(&self) -> &Arc<PoisonGate> {
        &self.gate
    }

    /// Open or close poisoning without taking the engine lock.
    pub fn set_can_poison_memory(&self, enabled: bool) {
        self.gate.set_can_poison_memory(enabled);
    }

    /// Whether poisoning writes are currently allowed.
    pub fn can_poison_memory(&self) -> bool {
        self.gate.can_poison_memory()
    }

    /// Poison or unpoison `[addr, addr + size)`; see [`ShadowMemory::poison_shadow`].
    pub fn poison_shadow(&self, addr: usize, size: usize, value: u8) -> Result<(), ShadowError> {
        self.inner.lock().poison_shadow(addr, size, value)
    }

    /// Encode a redzone span; see [`ShadowMemory::poison_shadow_partial_right_redzone`].
    pub fn poison_shadow_partial_right_redzone(
        &self,
        addr: usize,
        size: usize,
        redzone_size: usize,
        value: u8,
    ) -> Result<(), ShadowError> {
        self.inner
            .lock()
            .poison_shadow_partial_right_redzone(addr, size, redzone_size, value)
    }

    /// Whether the byte at `addr` is poisoned.
    pub fn address_is_poisoned(&self, addr: usize) -> bool {
        self.inner.lock().address_is_poisoned(addr)
    }

    /// Queue a range for a later shadow flush. Never blocks.
    pub fn defer_flush(&self, addr: usize, size: usize) {
        self.reclaim.push(addr, size);
    }

    /// Drain deferred flushes, returning the shadow bytes released.
    pub fn process_deferred(&self) -> usize {
        let mut shadow = self.inner.lock();
        self.reclaim.drain(&mut shadow)
    }

    /// The deferred flush queue.
    pub fn reclaim_queue(&self) -> &ReclaimQueue {
        &self.reclaim
    }

    /// Snapshot of the engine statistics.
    pub fn stats(&self) -> ShadowStats {
        self.inner.lock().stats().clone()
    }
}

impl<M: AddressMapper> Clone for SharedShadow<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            gate: Arc::clone(&self.gate),
            reclaim: Arc::clone(&self.reclaim),
        }
    }
}

impl<M: AddressMapper> From<ShadowMemory<M>> for SharedShadow<M> {
    fn from(shadow: ShadowMemory<M>) -> Self {
        Self::new(shadow)
    }
}

impl<M: AddressMapper> std::fmt::Debug for SharedShadow<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedShadow")
            .field("gate", &self.gate)
            .field("reclaim", &self.reclaim)
            .finish_non_exhaustive()
    }
}
