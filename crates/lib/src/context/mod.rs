//! The facade analysis code talks to.
//!
//! A [`MixedBuildContext`] answers fact requests during analysis and, between
//! the two analysis passes, runs Bazel once to settle every request made in
//! the first pass. Three implementations share the trait:
//! - [`BazelContext`]: delegation enabled, backed by a real or mock [`Runner`]
//! - [`DisabledContext`]: delegation off; any query is a programming error
//! - [`MockContext`]: canned answers for analysis tests
//!
//! [`Runner`]: crate::runner::Runner

mod bazel;
mod mock;
mod noop;

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::aquery::{AqueryError, BuildStatement};
use crate::config::{BazelPaths, ConfigError, Getenv, mixed_builds_requested};
use crate::cquery::{CC_INFO, CcInfo, OUTPUT_FILES, ParseFact, QueryError, QueryKind};
use crate::demux::DemuxError;
use crate::ledger::RequestKey;
use crate::platform::Arch;
use crate::runner::{BazelRunner, RunnerError};
use crate::synth::SynthError;

pub use bazel::BazelContext;
pub use mock::MockContext;
pub use noop::DisabledContext;

/// Lifecycle of an enabled context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// Analysis is queuing requests.
  Collecting,
  /// Bazel is running.
  Invoking,
  /// Requests are answered and build statements are available.
  Settled,
  /// Invocation failed; the context cannot be invoked again.
  Failed,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Phase::Collecting => "collecting",
      Phase::Invoking => "invoking",
      Phase::Settled => "settled",
      Phase::Failed => "failed",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Error)]
pub enum InvokeError {
  #[error("bazel has already been invoked (context is {0})")]
  AlreadyInvoked(Phase),

  #[error(transparent)]
  Synth(#[from] SynthError),

  #[error(transparent)]
  Runner(#[from] RunnerError),

  #[error(transparent)]
  Demux(#[from] DemuxError),

  #[error(transparent)]
  Aquery(#[from] AqueryError),

  #[error("failed to write file {}: {source}", path.display())]
  WriteFile { path: PathBuf, source: std::io::Error },
}

/// Access to facts computed by Bazel.
pub trait MixedBuildContext: Send + Sync {
  /// Whether modules may delegate to Bazel at all.
  fn enabled(&self) -> bool;

  /// The raw answer for `key`, or `None` after queuing it.
  fn get_fact(&self, key: &RequestKey) -> Option<&str>;

  /// Output file paths of `label` under `arch`, once known.
  fn get_output_files(&self, label: &str, arch: Arch) -> Option<Vec<String>> {
    self
      .get_fact(&RequestKey::new(label, OUTPUT_FILES.name(), arch))
      .map(|raw| OUTPUT_FILES.files(raw))
  }

  /// Native compile and link facts of `label` under `arch`, once known.
  ///
  /// # Errors
  ///
  /// Fails if Bazel's answer does not have the expected shape.
  fn get_cc_info(&self, label: &str, arch: Arch) -> Result<Option<CcInfo>, QueryError> {
    self
      .get_fact(&RequestKey::new(label, CC_INFO.name(), arch))
      .map(|raw| CC_INFO.parse(raw))
      .transpose()
  }

  /// Run Bazel for everything requested so far. At most once per context.
  fn invoke(&mut self) -> Result<(), InvokeError>;

  fn output_base(&self) -> Option<&Path>;

  /// Actions Bazel reported; empty until invoked.
  fn build_statements(&self) -> &[BuildStatement];

  /// Requests made but not yet answered.
  fn pending_requests(&self) -> Vec<RequestKey>;

  /// Files generated for Bazel, which the Ninja file depends on.
  fn generated_files(&self) -> Vec<PathBuf>;
}

/// Pick the context for this process from the environment.
///
/// # Errors
///
/// When `USE_BAZEL_ANALYSIS=1` is set, every Bazel path must be configured;
/// the error names each missing variable.
pub fn new_context(env: &impl Getenv, build_dir: impl Into<PathBuf>) -> Result<Box<dyn MixedBuildContext>, ConfigError> {
  if !mixed_builds_requested(env) {
    debug!("mixed builds disabled");
    return Ok(Box::new(DisabledContext));
  }

  let paths = BazelPaths::from_env(env, build_dir)?;
  debug!(workspace = %paths.workspace_dir.display(), "mixed builds enabled");
  Ok(Box::new(BazelContext::new(paths, Box::new(BazelRunner))))
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;
  use crate::config::{
    BAZEL_HOME_ENV, BAZEL_METRICS_DIR_ENV, BAZEL_OUTPUT_BASE_ENV, BAZEL_PATH_ENV, BAZEL_WORKSPACE_ENV,
    USE_BAZEL_ANALYSIS_ENV,
  };

  fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn disabled_without_gate() {
    let ctx = new_context(&env(&[]), "out").unwrap();
    assert!(!ctx.enabled());
    assert!(ctx.output_base().is_none());
  }

  #[test]
  fn enabled_with_gate_and_paths() {
    let ctx = new_context(
      &env(&[
        (USE_BAZEL_ANALYSIS_ENV, "1"),
        (BAZEL_HOME_ENV, "/home/bazel"),
        (BAZEL_PATH_ENV, "/usr/bin/bazel"),
        (BAZEL_OUTPUT_BASE_ENV, "/out/bazel"),
        (BAZEL_WORKSPACE_ENV, "/src"),
        (BAZEL_METRICS_DIR_ENV, "/out/metrics"),
      ]),
      "out",
    )
    .unwrap();
    assert!(ctx.enabled());
    assert_eq!(ctx.output_base(), Some(Path::new("/out/bazel")));
  }

  #[test]
  fn gate_without_paths_is_fatal() {
    let err = new_context(&env(&[(USE_BAZEL_ANALYSIS_ENV, "1"), (BAZEL_PATH_ENV, "/usr/bin/bazel")]), "out")
      .err()
      .unwrap();
    let ConfigError::MissingEnvVars(missing) = err;
    assert_eq!(missing.len(), 4);
    assert!(!missing.contains(&BAZEL_PATH_ENV.to_string()));
  }

  #[test]
  fn phase_names() {
    assert_eq!(Phase::Settled.to_string(), "settled");
    assert_eq!(Phase::Failed.to_string(), "failed");
  }
}
