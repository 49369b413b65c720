//! Platform identifiers for module variants.

pub mod arch;

pub use arch::Arch;
