//! ReorderBuffer: turns out-of-order completions into in-order emission.
//!
//! Slots insert results in whatever order they finish. `flush_ready` only
//! ever releases the contiguous run starting at `expected_next`, so output
//! order is the block order no matter how the scheduler interleaves slots.
//!
//! Keyed by index (a `BTreeMap`) rather than a ring: the distance between the
//! slowest and fastest in-flight block is not bounded in advance.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bsum_core::DigestResult;
use tracing::warn;

#[derive(Default)]
struct ReorderState {
    pending: BTreeMap<u64, Vec<u8>>,
    expected_next: u64,
}

/// Thread-safe index → digest store with contiguous-prefix flushing.
#[derive(Default)]
pub struct ReorderBuffer {
    state: Mutex<ReorderState>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ReorderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the digest for `index`. Returns false (and drops the digest) if
    /// the index was already flushed or is already pending.
    pub fn insert(&self, index: u64, digest: Vec<u8>) -> bool {
        let mut state = self.lock();
        if index < state.expected_next || state.pending.contains_key(&index) {
            warn!(block = index, "duplicate digest ignored");
            return false;
        }
        state.pending.insert(index, digest);
        true
    }

    /// Emit every ready result in ascending index order, stopping at the
    /// first gap. Returns how many results were emitted.
    ///
    /// A result is removed before `emit` sees it; if `emit` fails that result
    /// still counts as flushed and the error is returned.
    pub fn flush_ready<E, F>(&self, mut emit: F) -> Result<usize, E>
    where
        F: FnMut(DigestResult) -> Result<(), E>,
    {
        let mut state = self.lock();
        let mut emitted = 0;
        loop {
            let next = state.expected_next;
            let Some(digest) = state.pending.remove(&next) else {
                break;
            };
            state.expected_next += 1;
            emitted += 1;
            emit(DigestResult::new(next, digest))?;
        }
        Ok(emitted)
    }

    /// Index of the next result `flush_ready` will emit.
    pub fn expected_next(&self) -> u64 {
        self.lock().expected_next
    }

    /// Results inserted but not yet flushed.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }
}
