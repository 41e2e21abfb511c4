//! Cryptographic utilities
//!
//! This module provides:
//! - SHA-256 hashing and call selectors
//! - Account identifiers and deterministic identity derivation

pub mod address;
pub mod hash;

pub use address::{Address, AddressError, ADDRESS_LEN};
pub use hash::{selector, sha256, sha256_hex};
