//! BlockSlot: one long-lived worker thread fed over a channel.
//!
//! The slot thread parks in `recv()` while Idle. A `Run` command carries the
//! block index and the slot's buffer; the thread executes its job, then hands
//! the buffer back to the pool (`report_available`) or reports a failure and
//! exits for good (`report_failed`). A failed slot is Stopped permanently.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, trace};

use crate::pool::PoolShared;

/// One unit of per-block work run on a slot thread.
pub trait Job: Send + 'static {
    fn execute(&mut self, index: u64, payload: &[u8]) -> anyhow::Result<()>;
}

pub(crate) enum SlotCommand {
    Run { index: u64, buffer: Vec<u8> },
    Stop,
}

pub(crate) struct BlockSlot {
    id: usize,
    commands: Sender<SlotCommand>,
    thread: Option<JoinHandle<()>>,
}

impl BlockSlot {
    pub(crate) fn spawn<J: Job>(
        id: usize,
        job: J,
        shared: Arc<PoolShared>,
    ) -> std::io::Result<Self> {
        let (commands, rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(format!("bsum-slot-{id}"))
            .spawn(move || run_loop(id, job, rx, shared))?;

        Ok(Self {
            id,
            commands,
            thread: Some(thread),
        })
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Hand a filled buffer to the slot thread.
    ///
    /// Fails only if the thread has already exited.
    pub(crate) fn assign(&self, index: u64, buffer: Vec<u8>) -> Result<(), Vec<u8>> {
        self.commands
            .send(SlotCommand::Run { index, buffer })
            .map_err(|mpsc::SendError(cmd)| match cmd {
                SlotCommand::Run { buffer, .. } => buffer,
                SlotCommand::Stop => Vec::new(),
            })
    }

    /// Request termination and join. Work already queued finishes first.
    pub(crate) fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        // A failed slot has already exited and dropped its receiver.
        let _ = self.commands.send(SlotCommand::Stop);
        if thread.join().is_err() {
            error!(slot = self.id, "slot thread panicked outside its job");
        }
        trace!(slot = self.id, "slot stopped");
    }
}

impl Drop for BlockSlot {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<J: Job>(id: usize, mut job: J, rx: Receiver<SlotCommand>, shared: Arc<PoolShared>) {
    while let Ok(command) = rx.recv() {
        let (index, buffer) = match command {
            SlotCommand::Run { index, buffer } => (index, buffer),
            SlotCommand::Stop => break,
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.execute(index, &buffer)));
        match outcome {
            Ok(Ok(())) => {
                debug!(slot = id, block = index, "block digested");
                shared.report_available(id, buffer);
            }
            Ok(Err(e)) => {
                let reason = format!("{e:#}");
                error!(slot = id, block = index, error = %reason, "block computation failed");
                shared.report_failed(id, index, reason);
                return;
            }
            Err(_) => {
                error!(slot = id, block = index, "block computation panicked");
                shared.report_failed(id, index, "job panicked".into());
                return;
            }
        }
    }
}
