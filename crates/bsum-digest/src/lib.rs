//! bsum-digest: pluggable per-block digest providers
//!
//! # Overview
//! - `provider`: the `DigestProvider` contract, `Algorithm` names, and the registry
//! - `rustcrypto`: MD5 and the SHA-2 family through the RustCrypto `digest` traits
//! - `blake`: BLAKE3
//!
//! A provider is stateful and reused: `reset → absorb → finalize → digest`
//! once per block, on the slot thread that owns it.

pub mod blake;
pub mod provider;
pub mod rustcrypto;

pub use provider::{create_provider, digest_once, digest_with, Algorithm, DigestError, DigestProvider};
