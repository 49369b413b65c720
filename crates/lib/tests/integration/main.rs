//! End-to-end tests of the mixed-build pipeline against a mock runner.

mod aquery_tests;
mod common;
mod mixed_build_tests;
