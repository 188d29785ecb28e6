//! Encryption at rest for shared files
//!
//! AES-256-GCM with a 16-byte IV. Per-file keys are sealed under the
//! deployment master key before they are persisted.

mod cipher;

pub use cipher::{
    decrypt, encrypt, generate_iv, generate_key, split_prefixed_iv, CryptoEngine, CryptoError, Key,
};
