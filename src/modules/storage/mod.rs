//! Storage module for encrypted blobs
//!
//! Flat-directory blob store keyed by storage name. Writes are staged and
//! renamed into place so readers never observe a partial blob.

mod local_store;

pub use local_store::{FileStore, StorageError, StoredBlob};
