//! RustCrypto backends (MD5, SHA-2) behind one generic adapter

use digest::Digest;

use crate::provider::{Algorithm, DigestError, DigestProvider};

/// Adapter from any RustCrypto `Digest` to `DigestProvider`.
pub struct RustCryptoProvider<D> {
    algorithm: Algorithm,
    state: Option<D>,
    output: Vec<u8>,
}

impl<D: Digest> RustCryptoProvider<D> {
    pub fn new(algorithm: Algorithm) -> Self {
        debug_assert_eq!(<D as Digest>::output_size(), algorithm.output_len());
        Self {
            algorithm,
            state: None,
            output: Vec::with_capacity(<D as Digest>::output_size()),
        }
    }
}

impl<D: Digest + Send> DigestProvider for RustCryptoProvider<D> {
    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn reset(&mut self) -> Result<(), DigestError> {
        self.state = Some(D::new());
        self.output.clear();
        Ok(())
    }

    fn absorb(&mut self, data: &[u8]) -> Result<(), DigestError> {
        let state = self
            .state
            .as_mut()
            .ok_or(DigestError::NotStarted("absorb"))?;
        state.update(data);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), DigestError> {
        let state = self.state.take().ok_or(DigestError::NotStarted("finalize"))?;
        self.output.clear();
        self.output.extend_from_slice(&state.finalize());
        Ok(())
    }

    fn digest(&self) -> &[u8] {
        &self.output
    }
}
