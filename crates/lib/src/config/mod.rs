//! Environment configuration for mixed builds.
//!
//! Mixed builds are gated on `USE_BAZEL_ANALYSIS=1`. When the gate is open,
//! every path Bazel needs must be configured; missing settings are collected
//! and reported together so they can be fixed in one round.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::consts::INTERMEDIATES_DIR_NAME;

/// Environment variable that turns mixed builds on when set to `1`.
pub const USE_BAZEL_ANALYSIS_ENV: &str = "USE_BAZEL_ANALYSIS";

pub const BAZEL_HOME_ENV: &str = "BAZEL_HOME";
pub const BAZEL_PATH_ENV: &str = "BAZEL_PATH";
pub const BAZEL_OUTPUT_BASE_ENV: &str = "BAZEL_OUTPUT_BASE";
pub const BAZEL_WORKSPACE_ENV: &str = "BAZEL_WORKSPACE";
pub const BAZEL_METRICS_DIR_ENV: &str = "BAZEL_METRICS_DIR";

/// Errors raised while assembling mixed-build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("missing required env vars to use bazel: [{}]", .0.join(", "))]
  MissingEnvVars(Vec<String>),
}

/// Source of environment values.
///
/// The process environment is the production source; tests hand in maps.
pub trait Getenv {
  fn getenv(&self, key: &str) -> Option<String>;
}

/// Reads from the real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl Getenv for ProcessEnv {
  fn getenv(&self, key: &str) -> Option<String> {
    std::env::var(key).ok()
  }
}

impl Getenv for HashMap<String, String> {
  fn getenv(&self, key: &str) -> Option<String> {
    self.get(key).cloned()
  }
}

impl Getenv for BTreeMap<String, String> {
  fn getenv(&self, key: &str) -> Option<String> {
    self.get(key).cloned()
  }
}

/// Returns true if the environment asks for mixed builds.
pub fn mixed_builds_requested(env: &impl Getenv) -> bool {
  env.getenv(USE_BAZEL_ANALYSIS_ENV).as_deref() == Some("1")
}

/// Filesystem locations used for one mixed build.
///
/// Assembled once from the environment and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BazelPaths {
  /// `HOME` handed to Bazel, which keys its cache on it.
  pub home_dir: PathBuf,
  /// The Bazel binary.
  pub bazel_path: PathBuf,
  /// Bazel's `--output_base`.
  pub output_base: PathBuf,
  /// Root of the source tree; Bazel runs here.
  pub workspace_dir: PathBuf,
  /// Native build directory, relative to the workspace unless absolute.
  pub build_dir: PathBuf,
  /// Directory receiving per-run Bazel profiles.
  pub metrics_dir: PathBuf,
}

impl BazelPaths {
  /// Assemble paths from the environment.
  ///
  /// Values shorter than two characters count as unset.
  ///
  /// # Errors
  ///
  /// Returns [`ConfigError::MissingEnvVars`] naming every missing variable.
  pub fn from_env(env: &impl Getenv, build_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
    let mut missing = Vec::new();
    let mut require = |key: &str| -> PathBuf {
      match env.getenv(key) {
        Some(value) if value.len() > 1 => PathBuf::from(value),
        _ => {
          missing.push(key.to_string());
          PathBuf::new()
        }
      }
    };

    let home_dir = require(BAZEL_HOME_ENV);
    let bazel_path = require(BAZEL_PATH_ENV);
    let output_base = require(BAZEL_OUTPUT_BASE_ENV);
    let workspace_dir = require(BAZEL_WORKSPACE_ENV);
    let metrics_dir = require(BAZEL_METRICS_DIR_ENV);

    if !missing.is_empty() {
      return Err(ConfigError::MissingEnvVars(missing));
    }

    Ok(Self {
      home_dir,
      bazel_path,
      output_base,
      workspace_dir,
      build_dir: build_dir.into(),
      metrics_dir,
    })
  }

  /// Directory holding generated Bazel files, relative to the workspace
  /// (e.g. `out/soong/bazel`).
  pub fn intermediates_dir(&self) -> PathBuf {
    self.build_dir.join(INTERMEDIATES_DIR_NAME)
  }

  /// [`Self::intermediates_dir`] resolved against the workspace root.
  pub fn absolute_intermediates_dir(&self) -> PathBuf {
    self.workspace_dir.join(self.intermediates_dir())
  }

  /// Bazel's execution root, where spliced actions run.
  pub fn execroot(&self) -> PathBuf {
    execroot(&self.output_base)
  }
}

/// Execution root below a Bazel output base.
pub fn execroot(output_base: &Path) -> PathBuf {
  output_base.join("execroot").join("__main__")
}
