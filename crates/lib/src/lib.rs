//! Mixed-build coordination: delegating parts of a native action graph to
//! Bazel and splicing Bazel's actions back in.

pub mod analysis;
pub mod aquery;
pub mod config;
pub mod consts;
pub mod context;
pub mod cquery;
pub mod demux;
pub mod ledger;
pub mod mixed;
pub mod module;
pub mod ninja;
pub mod platform;
pub mod runner;
pub mod splice;
pub mod synth;
pub mod util;
