use std::fmt;

/// Digest of one block, keyed by its zero-based position in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestResult {
    pub block_index: u64,
    pub digest: Vec<u8>,
}

impl DigestResult {
    pub fn new(block_index: u64, digest: Vec<u8>) -> Self {
        Self {
            block_index,
            digest,
        }
    }

    /// Lowercase hex, two characters per byte, no separators.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.digest)
    }
}

impl fmt::Display for DigestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
