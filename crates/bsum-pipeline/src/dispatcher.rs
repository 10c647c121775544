//! StreamDispatcher: reads fixed-size blocks and fans them out to the pool.
//!
//! Per block: acquire a slot (blocks while the pool is saturated), read into
//! the slot's buffer, zero-pad a short final block, dispatch, then flush
//! whatever contiguous prefix of digests is ready. After the loop: drain,
//! flush once more, shut the pool down.

use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;

use anyhow::Context;
use bsum_core::config::PipelineConfig;
use bsum_core::{BsumError, BsumResult};
use bsum_digest::{create_provider, DigestProvider};
use tracing::{debug, error, info};

use crate::pool::WorkerPool;
use crate::reorder::ReorderBuffer;
use crate::slot::Job;

/// Digests one block with a slot-owned provider and files the result.
pub struct DigestJob<P> {
    provider: P,
    results: Arc<ReorderBuffer>,
}

impl<P: DigestProvider + 'static> DigestJob<P> {
    pub fn new(provider: P, results: Arc<ReorderBuffer>) -> Self {
        Self { provider, results }
    }
}

impl<P: DigestProvider + 'static> Job for DigestJob<P> {
    fn execute(&mut self, index: u64, payload: &[u8]) -> anyhow::Result<()> {
        self.provider.reset().context("reset")?;
        self.provider.absorb(payload).context("absorb")?;
        self.provider.finalize().context("finalize")?;
        self.results.insert(index, self.provider.digest().to_vec());
        Ok(())
    }
}

/// Totals for a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub blocks: u64,
    pub bytes_read: u64,
    /// The final block was short and zero-padded to `block_size`.
    pub padded_tail: bool,
    pub workers: usize,
    pub peak_running: usize,
}

pub struct StreamDispatcher {
    pool: WorkerPool,
    results: Arc<ReorderBuffer>,
    block_size: usize,
}

impl StreamDispatcher {
    /// Build a dispatcher for `config.algorithm` with `config.worker_count()`
    /// slots. An unknown algorithm fails here, before any input is read.
    pub fn new(config: &PipelineConfig) -> BsumResult<Self> {
        config.validate()?;
        let workers = config.worker_count();
        info!(
            algorithm = %config.algorithm,
            workers,
            block_size = config.block_size,
            "starting block digest pipeline"
        );
        Self::with_providers(config.block_size, workers, |_| {
            create_provider(&config.algorithm).map_err(BsumError::from)
        })
    }

    /// Build a dispatcher from an arbitrary provider factory, one call per slot.
    pub fn with_providers<P, F>(block_size: usize, workers: usize, mut factory: F) -> BsumResult<Self>
    where
        P: DigestProvider + 'static,
        F: FnMut(usize) -> BsumResult<P>,
    {
        if block_size == 0 {
            return Err(BsumError::Config("block_size must be positive".into()));
        }
        let results = Arc::new(ReorderBuffer::new());
        let pool = WorkerPool::new(workers, block_size, |slot| {
            factory(slot).map(|p| DigestJob::new(p, Arc::clone(&results)))
        })?;

        Ok(Self {
            pool,
            results,
            block_size,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Digest `input` block by block, writing one lowercase hex line per block
    /// to `output` in block order.
    ///
    /// On failure, lines already written stay written; the first error wins.
    pub fn run<R: Read, W: Write>(mut self, mut input: R, mut output: W) -> BsumResult<RunSummary> {
        let mut outcome: BsumResult<()> = Ok(());
        let mut index: u64 = 0;
        let mut bytes_read: u64 = 0;
        let mut padded_tail = false;

        loop {
            let mut lease = match self.pool.acquire() {
                Ok(lease) => lease,
                Err(e) => {
                    outcome = Err(e.into());
                    break;
                }
            };

            let buffer = lease.buffer_mut();
            let (n, read_error) = match read_block(&mut input, buffer) {
                Ok(n) => (n, None),
                Err(ReadFailure { filled, error }) => {
                    error!(block = index, read = filled, error = %error, "unable to read input");
                    (filled, Some(error))
                }
            };
            if n == 0 {
                if let Some(e) = read_error {
                    outcome = Err(BsumError::InputRead(e));
                }
                break;
            }
            let short = n < buffer.len();
            if short {
                buffer[n..].fill(0);
                padded_tail = true;
                debug!(block = index, len = n, "zero-padded final block");
            }

            if let Err(e) = lease.dispatch(index) {
                outcome = Err(e.into());
                break;
            }
            index += 1;
            bytes_read += n as u64;

            // Bytes read before the failure are digested; nothing after them.
            if let Some(e) = read_error {
                outcome = Err(BsumError::InputRead(e));
                break;
            }

            if let Err(e) = self.flush(&mut output) {
                outcome = Err(e);
                break;
            }
            if short {
                break;
            }
        }

        if let Err(e) = self.pool.wait_drain() {
            if outcome.is_ok() {
                outcome = Err(e.into());
            }
        }
        if let Err(e) = self.flush(&mut output) {
            if outcome.is_ok() {
                outcome = Err(e);
            }
        }
        let stats = self.pool.stats();
        self.pool.shutdown();

        outcome?;
        let summary = RunSummary {
            blocks: index,
            bytes_read,
            padded_tail,
            workers: stats.slots,
            peak_running: stats.peak_running,
        };
        info!(
            blocks = summary.blocks,
            bytes = summary.bytes_read,
            peak_running = summary.peak_running,
            "pipeline complete"
        );
        Ok(summary)
    }

    fn flush<W: Write>(&self, output: &mut W) -> BsumResult<()> {
        let emitted = self
            .results
            .flush_ready(|r| writeln!(output, "{}", r.to_hex()))
            .map_err(BsumError::Output)?;
        if emitted > 0 {
            output.flush().map_err(BsumError::Output)?;
        }
        Ok(())
    }
}

/// A read error, plus how much of the buffer was filled before it.
struct ReadFailure {
    filled: usize,
    error: io::Error,
}

/// Fill `buf` from `reader` until it is full or the reader hits EOF.
/// Returns the number of bytes read; less than `buf.len()` means EOF.
fn read_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ReadFailure> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(error) => return Err(ReadFailure { filled, error }),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bsum_digest::{digest_once, Algorithm};
    use std::io::Cursor;

    fn config(block_size: usize, workers: usize, algorithm: &str) -> PipelineConfig {
        PipelineConfig {
            block_size,
            workers,
            algorithm: algorithm.into(),
        }
    }

    fn run(input: &[u8], block_size: usize, workers: usize) -> (String, RunSummary) {
        let dispatcher = StreamDispatcher::new(&config(block_size, workers, "md5")).unwrap();
        let mut out = Vec::new();
        let summary = dispatcher.run(Cursor::new(input.to_vec()), &mut out).unwrap();
        (String::from_utf8(out).unwrap(), summary)
    }

    /// Hands out at most `step` bytes per read.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn read_block_fills_across_short_reads() {
        let data = b"abcdefghij";
        let mut reader = Trickle { data, step: 3 };
        let mut buf = [0u8; 8];
        assert_eq!(read_block(&mut reader, &mut buf).ok(), Some(8));
        assert_eq!(&buf, b"abcdefgh");
        assert_eq!(read_block(&mut reader, &mut buf).ok(), Some(2));
        assert_eq!(read_block(&mut reader, &mut buf).ok(), Some(0));
    }

    #[test]
    fn exact_multiple_emits_one_line_per_block() {
        let (out, summary) = run(b"AAAABBBB", 4, 2);
        let expected = format!(
            "{}\n{}\n",
            hex::encode(digest_once(Algorithm::Md5, b"AAAA").unwrap()),
            hex::encode(digest_once(Algorithm::Md5, b"BBBB").unwrap())
        );
        assert_eq!(out, expected);
        assert_eq!(summary.blocks, 2);
        assert_eq!(summary.bytes_read, 8);
        assert!(!summary.padded_tail);
    }

    #[test]
    fn short_tail_is_zero_padded() {
        let (out, summary) = run(b"AAAAB", 4, 2);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], hex::encode(digest_once(Algorithm::Md5, b"B\0\0\0").unwrap()));
        assert!(summary.padded_tail);
    }

    #[test]
    fn empty_input_emits_nothing() {
        let (out, summary) = run(b"", 4, 3);
        assert!(out.is_empty());
        assert_eq!(summary.blocks, 0);
    }

    #[test]
    fn unknown_algorithm_fails_at_construction() {
        let err = StreamDispatcher::new(&config(4, 2, "no-such-digest")).err().unwrap();
        assert!(matches!(err, BsumError::UnknownAlgorithm(name) if name == "no-such-digest"));
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let err = StreamDispatcher::new(&config(0, 1, "md5")).err().unwrap();
        assert!(matches!(err, BsumError::Config(_)));
    }

    #[test]
    fn read_error_fails_the_run() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("device unplugged"))
            }
        }

        let dispatcher = StreamDispatcher::new(&config(4, 2, "md5")).unwrap();
        let mut out = Vec::new();
        let err = dispatcher.run(Broken, &mut out).unwrap_err();
        assert!(matches!(err, BsumError::InputRead(_)));
        assert!(out.is_empty());
    }

    /// Serves `data` in `step`-byte reads, then fails.
    struct FailsAfter {
        data: Vec<u8>,
        step: usize,
    }

    impl Read for FailsAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.data.is_empty() {
                return Err(io::Error::other("device unplugged"));
            }
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data.drain(..n);
            Ok(n)
        }
    }

    fn md5_line(block: &[u8]) -> String {
        format!("{}\n", hex::encode(digest_once(Algorithm::Md5, block).unwrap()))
    }

    #[test]
    fn read_error_keeps_digests_of_earlier_blocks() {
        let input = FailsAfter {
            data: b"AAAABBBBCCCC".to_vec(),
            step: 4,
        };
        let dispatcher = StreamDispatcher::new(&config(4, 3, "md5")).unwrap();
        let mut out = Vec::new();
        let err = dispatcher.run(input, &mut out).unwrap_err();
        assert!(matches!(err, BsumError::InputRead(_)));

        let expected = [b"AAAA", b"BBBB", b"CCCC"].map(|b| md5_line(b)).concat();
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn read_error_mid_block_digests_the_partial_block() {
        let input = FailsAfter {
            data: b"AAAABB".to_vec(),
            step: 3,
        };
        let dispatcher = StreamDispatcher::new(&config(4, 2, "md5")).unwrap();
        let mut out = Vec::new();
        let err = dispatcher.run(input, &mut out).unwrap_err();
        assert!(matches!(err, BsumError::InputRead(_)));

        let expected = md5_line(b"AAAA") + &md5_line(b"BB\0\0");
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn workers_reports_pool_size() {
        let d = StreamDispatcher::new(&config(16, 5, "sha256")).unwrap();
        assert_eq!(d.workers(), 5);
        assert_eq!(d.block_size(), 16);
    }
}
