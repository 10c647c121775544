use thiserror::Error;

pub type BsumResult<T> = Result<T, BsumError>;

#[derive(Debug, Error)]
pub enum BsumError {
    /// The requested digest algorithm is not known to any backend.
    #[error("unknown digest algorithm \"{0}\"")]
    UnknownAlgorithm(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("unable to read input: {0}")]
    InputRead(#[source] std::io::Error),

    #[error("digest of block {block_index} failed on slot {slot}: {reason}")]
    Computation {
        slot: usize,
        block_index: u64,
        reason: String,
    },

    #[error("unable to write output: {0}")]
    Output(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BsumError {
    /// True for errors raised before any input was consumed.
    pub fn is_configuration(&self) -> bool {
        matches!(self, BsumError::UnknownAlgorithm(_) | BsumError::Config(_))
    }
}
