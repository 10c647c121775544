//! WorkerPool: a fixed set of BlockSlots with availability tracking.
//!
//! All availability and failure state sits behind one mutex + condvar.
//! `acquire` is the pipeline's only backpressure point: it blocks while every
//! slot is leased or running. The first reported failure moves the pool from
//! `Running` to `Draining`, and from then on every `acquire` (including ones
//! already waiting) returns that failure.
//!
//! Availability is FIFO by completion time, not by block index. Ordering is
//! restored downstream by the `ReorderBuffer`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use bsum_core::BsumError;
use thiserror::Error;
use tracing::{debug, warn};

use crate::slot::{BlockSlot, Job};

/// Pool lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPhase {
    /// Accepting work
    Running,
    /// A slot failed; no further work is handed out
    Draining,
    /// Every slot thread has been joined
    Stopped,
}

/// The first failure reported by any slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotFailure {
    pub slot: usize,
    pub block_index: u64,
    pub reason: String,
}

impl fmt::Display for SlotFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {} failed on slot {}: {}",
            self.block_index, self.slot, self.reason
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("{0}")]
    Failed(SlotFailure),

    #[error("worker pool is shut down")]
    Stopped,
}

impl From<PoolError> for BsumError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Failed(f) => BsumError::Computation {
                slot: f.slot,
                block_index: f.block_index,
                reason: f.reason,
            },
            PoolError::Stopped => BsumError::Other(anyhow::anyhow!("worker pool is shut down")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub slots: usize,
    pub dispatched: u64,
    pub completed: u64,
    pub running: usize,
    /// Highest number of simultaneously Running slots observed
    pub peak_running: usize,
    pub failed: usize,
}

enum SlotStatus {
    /// Idle; the pool holds the slot's buffer
    Available(Vec<u8>),
    /// Handed to a caller of `acquire`, not yet dispatched
    Leased,
    Running,
    Failed,
}

struct PoolState {
    phase: PoolPhase,
    available: VecDeque<usize>,
    slots: Vec<SlotStatus>,
    failure: Option<SlotFailure>,
    stats: PoolStats,
}

impl PoolState {
    fn all_available(&self) -> bool {
        self.available.len() == self.slots.len()
    }
}

pub(crate) struct PoolShared {
    state: Mutex<PoolState>,
    changed: Condvar,
}

impl PoolShared {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(PoolState {
                phase: PoolPhase::Running,
                available: VecDeque::with_capacity(capacity),
                slots: Vec::with_capacity(capacity),
                failure: None,
                stats: PoolStats::default(),
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, PoolState>) -> MutexGuard<'a, PoolState> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, buffer: Vec<u8>) -> usize {
        let mut state = self.lock();
        let id = state.slots.len();
        state.slots.push(SlotStatus::Available(buffer));
        state.available.push_back(id);
        state.stats.slots += 1;
        id
    }

    /// Called by a slot on itself after a successful computation.
    pub(crate) fn report_available(&self, slot: usize, buffer: Vec<u8>) {
        let mut state = self.lock();
        if matches!(state.slots[slot], SlotStatus::Running) {
            state.stats.running -= 1;
        }
        state.slots[slot] = SlotStatus::Available(buffer);
        state.available.push_back(slot);
        state.stats.completed += 1;
        self.changed.notify_all();
    }

    /// Called by a slot on itself after a failed computation. The slot never
    /// returns to rotation.
    pub(crate) fn report_failed(&self, slot: usize, block_index: u64, reason: String) {
        let mut state = self.lock();
        if matches!(state.slots[slot], SlotStatus::Running) {
            state.stats.running -= 1;
        }
        state.slots[slot] = SlotStatus::Failed;
        state.stats.failed += 1;

        if state.failure.is_none() {
            state.failure = Some(SlotFailure {
                slot,
                block_index,
                reason,
            });
        } else {
            warn!(slot, block = block_index, %reason, "additional slot failure");
        }
        if state.phase == PoolPhase::Running {
            state.phase = PoolPhase::Draining;
            debug!(slot, "pool draining after failure");
        }
        self.changed.notify_all();
    }

    fn restore(&self, slot: usize, buffer: Vec<u8>) {
        let mut state = self.lock();
        state.slots[slot] = SlotStatus::Available(buffer);
        state.available.push_front(slot);
        self.changed.notify_all();
    }

    fn mark_running(&self, slot: usize) {
        let mut state = self.lock();
        state.slots[slot] = SlotStatus::Running;
        state.stats.running += 1;
        state.stats.dispatched += 1;
        state.stats.peak_running = state.stats.peak_running.max(state.stats.running);
    }

    fn rejection(state: &PoolState) -> Option<PoolError> {
        if state.phase == PoolPhase::Running {
            return None;
        }
        // A recorded failure outlives shutdown.
        Some(match &state.failure {
            Some(f) => PoolError::Failed(f.clone()),
            None => PoolError::Stopped,
        })
    }
}

pub struct WorkerPool {
    shared: Arc<PoolShared>,
    slots: Vec<BlockSlot>,
}

impl WorkerPool {
    /// Spawn `count` slots (at least one), each with a `block_size` buffer and
    /// the job produced by `factory(slot_id)`. Every slot starts Available.
    pub fn new<J, E, F>(count: usize, block_size: usize, mut factory: F) -> Result<Self, E>
    where
        J: Job,
        F: FnMut(usize) -> Result<J, E>,
        E: From<std::io::Error>,
    {
        let count = count.max(1);
        let shared = Arc::new(PoolShared::new(count));
        let mut slots = Vec::with_capacity(count);

        for id in 0..count {
            let job = factory(id)?;
            let slot = BlockSlot::spawn(id, job, Arc::clone(&shared))?;
            let registered = shared.register(vec![0u8; block_size]);
            debug_assert_eq!(registered, slot.id());
            slots.push(slot);
        }

        debug!(slots = count, block_size, "worker pool ready");
        Ok(Self { shared, slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn phase(&self) -> PoolPhase {
        self.shared.lock().phase
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.lock().stats
    }

    pub fn failure(&self) -> Option<SlotFailure> {
        self.shared.lock().failure.clone()
    }

    /// Block until a slot is available or the pool stops accepting work.
    pub fn acquire(&self) -> Result<SlotLease<'_>, PoolError> {
        let mut state = self.shared.lock();
        loop {
            if let Some(err) = PoolShared::rejection(&state) {
                return Err(err);
            }
            while let Some(slot) = state.available.pop_front() {
                match std::mem::replace(&mut state.slots[slot], SlotStatus::Leased) {
                    SlotStatus::Available(buffer) => {
                        return Ok(SlotLease {
                            pool: self,
                            slot,
                            buffer,
                            dispatched: false,
                        });
                    }
                    other => state.slots[slot] = other,
                }
            }
            state = self.shared.wait(state);
        }
    }

    /// Block until every slot is available, or until a failure is recorded.
    /// After shutdown, returns the recorded failure if there was one.
    pub fn wait_drain(&self) -> Result<(), PoolError> {
        let mut state = self.shared.lock();
        loop {
            match PoolShared::rejection(&state) {
                Some(PoolError::Stopped) => return Ok(()),
                Some(err) => return Err(err),
                None if state.all_available() => return Ok(()),
                None => {}
            }
            state = self.shared.wait(state);
        }
    }

    /// Stop and join every slot thread. Idempotent.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.lock();
            if state.phase == PoolPhase::Stopped {
                return;
            }
            state.phase = PoolPhase::Stopped;
            self.shared.changed.notify_all();
        }
        for slot in &mut self.slots {
            slot.stop();
        }
        debug!(slots = self.slots.len(), "worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Exclusive hold on one available slot and its buffer.
///
/// Dropping a lease without calling `dispatch` returns the slot to the front
/// of the availability queue.
pub struct SlotLease<'a> {
    pool: &'a WorkerPool,
    slot: usize,
    buffer: Vec<u8>,
    dispatched: bool,
}

impl SlotLease<'_> {
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// The slot's reusable block buffer (always `block_size` bytes).
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Hand the buffer to the slot thread as block `index`.
    pub fn dispatch(mut self, index: u64) -> Result<(), PoolError> {
        let buffer = std::mem::take(&mut self.buffer);
        self.dispatched = true;

        let shared = &self.pool.shared;
        shared.mark_running(self.slot);
        if self.pool.slots[self.slot].assign(index, buffer).is_err() {
            shared.report_failed(self.slot, index, "slot thread exited".into());
            return Err(self.pool.failure().map_or(PoolError::Stopped, PoolError::Failed));
        }
        Ok(())
    }
}

impl Drop for SlotLease<'_> {
    fn drop(&mut self) {
        if !self.dispatched {
            self.pool
                .shared
                .restore(self.slot, std::mem::take(&mut self.buffer));
        }
    }
}
