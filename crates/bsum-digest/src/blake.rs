//! BLAKE3 backend
//!
//! 32-byte output. The hasher is reused across blocks via `Hasher::reset`.

use crate::provider::{Algorithm, DigestError, DigestProvider};

pub struct Blake3Provider {
    hasher: blake3::Hasher,
    started: bool,
    output: Option<blake3::Hash>,
}

impl Blake3Provider {
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
            started: false,
            output: None,
        }
    }
}

impl Default for Blake3Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestProvider for Blake3Provider {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Blake3
    }

    fn reset(&mut self) -> Result<(), DigestError> {
        self.hasher.reset();
        self.started = true;
        self.output = None;
        Ok(())
    }

    fn absorb(&mut self, data: &[u8]) -> Result<(), DigestError> {
        if !self.started {
            return Err(DigestError::NotStarted("absorb"));
        }
        self.hasher.update(data);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), DigestError> {
        if !self.started {
            return Err(DigestError::NotStarted("finalize"));
        }
        self.output = Some(self.hasher.finalize());
        self.started = false;
        Ok(())
    }

    fn digest(&self) -> &[u8] {
        self.output.as_ref().map(|h| h.as_bytes().as_slice()).unwrap_or_default()
    }
}
