//! Bounded pool of compilation slots
//!
//! A slot is a semaphore permit; holding one allows one compiler process.
//! Requests between admission and slot acquisition are counted as waiting,
//! and admission is refused once the queue would grow past its limit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::compiler::errors::EngineError;

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub in_flight: usize,
    pub waiting: usize,
}

#[derive(Debug)]
struct Shared {
    slots: Arc<Semaphore>,
    waiting: AtomicUsize,
    capacity: usize,
    queue_depth_limit: usize,
    queue_wait: Duration,
}

/// Fixed-size set of compilation slots shared by all requests
#[derive(Debug, Clone)]
pub struct CompilationPool {
    shared: Arc<Shared>,
}

impl CompilationPool {
    pub fn new(capacity: usize, queue_depth_limit: usize, queue_wait: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                slots: Arc::new(Semaphore::new(capacity)),
                waiting: AtomicUsize::new(0),
                capacity,
                queue_depth_limit,
                queue_wait,
            }),
        }
    }

    /// Register a request. Fails immediately with `Overloaded` when more than
    /// `queue_depth_limit` requests would be waiting for a slot.
    pub fn admit(&self) -> Result<Admission, EngineError> {
        let shared = &self.shared;
        let ahead = shared.waiting.fetch_add(1, Ordering::SeqCst);
        let free = shared.slots.available_permits();

        if ahead >= free.saturating_add(shared.queue_depth_limit) {
            shared.waiting.fetch_sub(1, Ordering::SeqCst);
            debug!(waiting = ahead, free, "admission refused");
            return Err(EngineError::Overloaded(format!(
                "{} requests already waiting for a compilation slot",
                ahead
            )));
        }

        Ok(Admission {
            shared: Arc::clone(shared),
        })
    }

    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        PoolStats {
            capacity: shared.capacity,
            in_flight: shared.capacity - shared.slots.available_permits().min(shared.capacity),
            waiting: shared.waiting.load(Ordering::SeqCst),
        }
    }
}

/// An admitted request that does not hold a slot yet. Dropping it leaves the
/// queue.
#[derive(Debug)]
pub struct Admission {
    shared: Arc<Shared>,
}

impl Admission {
    /// Wait for a slot, at most the pool's queue wait
    pub async fn acquire(self) -> Result<SlotPermit, EngineError> {
        let slots = Arc::clone(&self.shared.slots);
        let wait = self.shared.queue_wait;

        match tokio::time::timeout(wait, slots.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(SlotPermit { _permit: permit }),
            Ok(Err(_closed)) => Err(EngineError::Internal(
                "compilation pool is closed".to_string(),
            )),
            Err(_elapsed) => Err(EngineError::Overloaded(format!(
                "no compilation slot became free within {}s",
                wait.as_secs()
            ))),
        }
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.shared.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A held compilation slot, released on drop
#[derive(Debug)]
pub struct SlotPermit {
    _permit: OwnedSemaphorePermit,
}
