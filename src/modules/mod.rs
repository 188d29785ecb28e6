//! Modules layer - Infrastructure components
//!
//! Contains the at-rest encryption primitives and the blob storage adapter.

pub mod crypto;
pub mod storage;
