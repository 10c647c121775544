//! Provider wrappers for injecting delays and failures into the pipeline.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bsum_digest::{Algorithm, DigestError, DigestProvider};
use rand::Rng;

/// MD5 with a random pause before each absorb, so completions land out of order.
pub struct Jittery {
    inner: Box<dyn DigestProvider>,
    max_delay_ms: u64,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Jittery {
    pub fn new(max_delay_ms: u64, running: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Self {
        Self {
            inner: Algorithm::Md5.provider(),
            max_delay_ms,
            running,
            peak,
        }
    }
}

impl DigestProvider for Jittery {
    fn algorithm(&self) -> Algorithm {
        self.inner.algorithm()
    }

    fn reset(&mut self) -> Result<(), DigestError> {
        self.inner.reset()
    }

    fn absorb(&mut self, data: &[u8]) -> Result<(), DigestError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let delay = rand::thread_rng().gen_range(0..=self.max_delay_ms);
        thread::sleep(Duration::from_millis(delay));
        let result = self.inner.absorb(data);
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn finalize(&mut self) -> Result<(), DigestError> {
        self.inner.finalize()
    }

    fn digest(&self) -> &[u8] {
        self.inner.digest()
    }
}

/// Which step of the computation should fail.
#[derive(Clone, Copy, Debug)]
pub enum FailAt {
    Absorb,
    Finalize,
}

/// MD5 that fails whenever a block starts with `marker`.
pub struct FailOnMarker {
    inner: Box<dyn DigestProvider>,
    marker: &'static [u8],
    at: FailAt,
    armed: bool,
}

impl FailOnMarker {
    pub fn new(marker: &'static [u8], at: FailAt) -> Self {
        Self {
            inner: Algorithm::Md5.provider(),
            marker,
            at,
            armed: false,
        }
    }

    fn injected(&self) -> DigestError {
        DigestError::Backend {
            algorithm: Algorithm::Md5,
            reason: format!("injected {:?} failure", self.at),
        }
    }
}

impl DigestProvider for FailOnMarker {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Md5
    }

    fn reset(&mut self) -> Result<(), DigestError> {
        self.armed = false;
        self.inner.reset()
    }

    fn absorb(&mut self, data: &[u8]) -> Result<(), DigestError> {
        if data.starts_with(self.marker) {
            self.armed = true;
            if matches!(self.at, FailAt::Absorb) {
                return Err(self.injected());
            }
        }
        self.inner.absorb(data)
    }

    fn finalize(&mut self) -> Result<(), DigestError> {
        if self.armed && matches!(self.at, FailAt::Finalize) {
            return Err(self.injected());
        }
        self.inner.finalize()
    }

    fn digest(&self) -> &[u8] {
        self.inner.digest()
    }
}

/// Provider whose `reset` always fails.
pub struct BrokenReset;

impl DigestProvider for BrokenReset {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Md5
    }

    fn reset(&mut self) -> Result<(), DigestError> {
        Err(DigestError::Backend {
            algorithm: Algorithm::Md5,
            reason: "context allocation failed".into(),
        })
    }

    fn absorb(&mut self, _data: &[u8]) -> Result<(), DigestError> {
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), DigestError> {
        Ok(())
    }

    fn digest(&self) -> &[u8] {
        &[]
    }
}

/// Expected output for `input` split into `block_size` blocks, computed
/// sequentially without the pipeline.
pub fn expected_lines(input: &[u8], block_size: usize) -> Vec<String> {
    input
        .chunks(block_size)
        .map(|chunk| {
            let mut block = chunk.to_vec();
            block.resize(block_size, 0);
            hex::encode(bsum_digest::digest_once(Algorithm::Md5, &block).unwrap())
        })
        .collect()
}
