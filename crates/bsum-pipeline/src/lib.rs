//! bsum-pipeline: parallel per-block digests with strictly ordered output
//!
//! # Overview
//! - `slot`: a long-lived worker thread fed one block at a time over a channel
//! - `pool`: fixed set of slots, blocking `acquire` (backpressure), fail-fast
//! - `reorder`: index-keyed buffer that only releases the contiguous prefix
//! - `dispatcher`: reads blocks, pads the tail, dispatches, flushes, drains
//!
//! ```text
//! stdin ─► StreamDispatcher ─acquire─► WorkerPool ─► BlockSlot × N
//!                 ▲                                      │
//!                 └──── flush_ready ◄── ReorderBuffer ◄──┘ insert
//! ```

pub mod dispatcher;
pub mod pool;
pub mod reorder;
pub mod slot;

pub use dispatcher::{DigestJob, RunSummary, StreamDispatcher};
pub use pool::{PoolError, PoolPhase, PoolStats, SlotFailure, SlotLease, WorkerPool};
pub use reorder::ReorderBuffer;
pub use slot::Job;
