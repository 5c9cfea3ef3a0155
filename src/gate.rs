use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting admission control for host scans.
///
/// A scan holds a [`GatePermit`] while it probes; dropping the permit returns the slot,
/// so every exit path releases exactly once. Acquire never times out and never fails.
#[derive(Debug, Clone)]
pub struct Gate {
    inner: Arc<GateInner>,
}

#[derive(Debug)]
struct GateInner {
    sem: Arc<Semaphore>,
    capacity: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Gate {
    /// Capacity is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(GateInner {
                sem: Arc::new(Semaphore::new(capacity)),
                capacity,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> GatePermit {
        let permit = self
            .inner
            .sem
            .clone()
            .acquire_owned()
            .await
            .expect("gate semaphore is never closed");
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);
        GatePermit {
            _permit: permit,
            gate: self.inner.clone(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.inner.sem.available_permits()
    }

    /// Scans currently past acquire and not yet released.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Highest `in_flight` value observed since creation.
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }
}

/// A held gate slot; released on drop.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    gate: Arc<GateInner>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
