//! Digest provider contract and algorithm registry

use std::fmt;
use std::str::FromStr;

use bsum_core::BsumError;
use thiserror::Error;

use crate::blake::Blake3Provider;
use crate::rustcrypto::RustCryptoProvider;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DigestError {
    #[error("unknown digest algorithm \"{0}\"")]
    UnknownAlgorithm(String),

    /// `absorb` or `finalize` was called without a preceding `reset`.
    #[error("{0} called before reset")]
    NotStarted(&'static str),

    #[error("{algorithm} backend failed: {reason}")]
    Backend {
        algorithm: Algorithm,
        reason: String,
    },
}

impl From<DigestError> for BsumError {
    fn from(err: DigestError) -> Self {
        match err {
            DigestError::UnknownAlgorithm(name) => BsumError::UnknownAlgorithm(name),
            other => BsumError::Other(other.into()),
        }
    }
}

/// One reusable hashing context.
///
/// `digest()` is only meaningful after a successful `finalize()`; before that
/// it returns an empty slice.
pub trait DigestProvider: Send {
    fn algorithm(&self) -> Algorithm;

    /// Digest length in bytes.
    fn output_len(&self) -> usize {
        self.algorithm().output_len()
    }

    fn reset(&mut self) -> Result<(), DigestError>;
    fn absorb(&mut self, data: &[u8]) -> Result<(), DigestError>;
    fn finalize(&mut self) -> Result<(), DigestError>;
    fn digest(&self) -> &[u8];
}

impl<P: DigestProvider + ?Sized> DigestProvider for Box<P> {
    fn algorithm(&self) -> Algorithm {
        (**self).algorithm()
    }

    fn output_len(&self) -> usize {
        (**self).output_len()
    }

    fn reset(&mut self) -> Result<(), DigestError> {
        (**self).reset()
    }

    fn absorb(&mut self, data: &[u8]) -> Result<(), DigestError> {
        (**self).absorb(data)
    }

    fn finalize(&mut self) -> Result<(), DigestError> {
        (**self).finalize()
    }

    fn digest(&self) -> &[u8] {
        (**self).digest()
    }
}

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Md5,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Blake3,
}

impl Algorithm {
    pub const ALL: [Algorithm; 6] = [
        Algorithm::Md5,
        Algorithm::Sha224,
        Algorithm::Sha256,
        Algorithm::Sha384,
        Algorithm::Sha512,
        Algorithm::Blake3,
    ];

    /// Canonical lowercase name
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Md5 => "md5",
            Algorithm::Sha224 => "sha224",
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
            Algorithm::Blake3 => "blake3",
        }
    }

    pub fn output_len(self) -> usize {
        match self {
            Algorithm::Md5 => 16,
            Algorithm::Sha224 => 28,
            Algorithm::Sha256 | Algorithm::Blake3 => 32,
            Algorithm::Sha384 => 48,
            Algorithm::Sha512 => 64,
        }
    }

    /// Construct a fresh provider for this algorithm.
    pub fn provider(self) -> Box<dyn DigestProvider> {
        match self {
            Algorithm::Md5 => Box::new(RustCryptoProvider::<md5::Md5>::new(self)),
            Algorithm::Sha224 => Box::new(RustCryptoProvider::<sha2::Sha224>::new(self)),
            Algorithm::Sha256 => Box::new(RustCryptoProvider::<sha2::Sha256>::new(self)),
            Algorithm::Sha384 => Box::new(RustCryptoProvider::<sha2::Sha384>::new(self)),
            Algorithm::Sha512 => Box::new(RustCryptoProvider::<sha2::Sha512>::new(self)),
            Algorithm::Blake3 => Box::new(Blake3Provider::new()),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = DigestError;

    /// Case-insensitive; `-` and `_` separators are ignored ("SHA-256", "sha_256").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        Algorithm::ALL
            .into_iter()
            .find(|a| a.name() == normalized)
            .ok_or_else(|| DigestError::UnknownAlgorithm(s.to_string()))
    }
}

/// Look up `name` and build a provider for it.
pub fn create_provider(name: &str) -> Result<Box<dyn DigestProvider>, DigestError> {
    let algorithm: Algorithm = name.parse()?;
    tracing::trace!(%algorithm, "digest provider created");
    Ok(algorithm.provider())
}

/// Run one full reset/absorb/finalize cycle on `provider`.
pub fn digest_with<P: DigestProvider + ?Sized>(
    provider: &mut P,
    data: &[u8],
) -> Result<Vec<u8>, DigestError> {
    provider.reset()?;
    provider.absorb(data)?;
    provider.finalize()?;
    Ok(provider.digest().to_vec())
}

/// Hash `data` in one shot.
pub fn digest_once(algorithm: Algorithm, data: &[u8]) -> Result<Vec<u8>, DigestError> {
    digest_with(algorithm.provider().as_mut(), data)
}
