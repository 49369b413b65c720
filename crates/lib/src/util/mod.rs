//! Shared utilities: output digests and test helpers.

pub mod hash;

#[cfg(test)]
pub mod testutil;
