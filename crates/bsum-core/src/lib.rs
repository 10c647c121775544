pub mod config;
pub mod error;
pub mod types;

pub use error::{BsumError, BsumResult};
pub use types::DigestResult;
