//! Invoking the Bazel binary.
//!
//! Every invocation carries the same reproducible flag set so that the query,
//! the action log and the final build all see one configuration. The process
//! boundary sits behind [`Runner`] so tests can substitute [`MockRunner`].

mod mock;

use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::BazelPaths;

pub use mock::{MockRunner, RecordedCommand, RecordedCommands};

/// Identifies an invocation; also names its profile file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunName {
  CqueryBuildroot,
  AqueryBuildroot,
  BuildPhonyRoot,
}

impl RunName {
  pub fn as_str(&self) -> &'static str {
    match self {
      RunName::CqueryBuildroot => "cquery-buildroot",
      RunName::AqueryBuildroot => "aquery-buildroot",
      RunName::BuildPhonyRoot => "bazel-build-phony-root",
    }
  }

  pub fn profile_path(&self, paths: &BazelPaths) -> PathBuf {
    paths.metrics_dir.join(format!("{}_bazel_profile.gz", self.as_str()))
  }
}

impl fmt::Display for RunName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A Bazel verb with its target expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BazelCommand {
  pub command: String,
  pub expression: String,
}

impl BazelCommand {
  pub fn new(command: impl Into<String>, expression: impl Into<String>) -> Self {
    Self {
      command: command.into(),
      expression: expression.into(),
    }
  }
}

impl fmt::Display for BazelCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.command, self.expression)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  pub stdout: String,
  pub stderr: String,
}

#[derive(Debug, Error)]
pub enum RunnerError {
  #[error("failed to spawn bazel `{command}`: {source}")]
  Spawn { command: String, source: std::io::Error },

  #[error("bazel command failed with exit code {code:?}: `{command}` (env: {}): {stderr}", format_env(env))]
  Failed {
    command: String,
    env: Vec<(String, String)>,
    code: Option<i32>,
    stderr: String,
  },
}

fn format_env(env: &[(String, String)]) -> String {
  env.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(" ")
}

/// Issues Bazel commands.
pub trait Runner: Send + Sync {
  /// Run one command to completion and capture its output.
  ///
  /// # Errors
  ///
  /// A process that cannot start or exits non-zero is an error carrying the
  /// full command line and captured stderr.
  fn issue(
    &mut self,
    paths: &BazelPaths,
    run_name: RunName,
    command: &BazelCommand,
    extra_flags: &[String],
  ) -> Result<CommandOutput, RunnerError>;
}

/// Arguments passed to the Bazel binary, in order.
pub fn command_args(paths: &BazelPaths, run_name: RunName, command: &BazelCommand, extra_flags: &[String]) -> Vec<String> {
  let mut args = vec![
    format!("--output_base={}", paths.output_base.display()),
    command.command.clone(),
    command.expression.clone(),
    format!("--package_path=%workspace%/{}", paths.intermediates_dir().display()),
    format!("--profile={}", run_name.profile_path(paths).display()),
    "--platforms=@sourceroot//build/bazel/platforms:android_x86_64".to_string(),
    "--extra_toolchains=@sourceroot//prebuilts/clang/host/linux-x86:all".to_string(),
    "--host_platform=@sourceroot//build/bazel/platforms:linux_x86_64".to_string(),
    "--experimental_repository_disable_download".to_string(),
  ];
  args.extend(extra_flags.iter().cloned());
  args
}

/// Variables added on top of the inherited environment.
pub fn command_env(paths: &BazelPaths) -> Vec<(String, String)> {
  let mut env = vec![("HOME".to_string(), paths.home_dir.display().to_string())];
  if !cfg!(target_os = "macos") {
    env.push(("PWD".to_string(), "/proc/self/cwd".to_string()));
  }
  env.push(("BAZEL_DO_NOT_DETECT_CPP_TOOLCHAIN".to_string(), "1".to_string()));
  env
}

/// Runs the real Bazel binary from [`BazelPaths::bazel_path`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BazelRunner;

impl Runner for BazelRunner {
  fn issue(
    &mut self,
    paths: &BazelPaths,
    run_name: RunName,
    command: &BazelCommand,
    extra_flags: &[String],
  ) -> Result<CommandOutput, RunnerError> {
    let args = command_args(paths, run_name, command, extra_flags);
    let env = command_env(paths);
    let command_line = std::iter::once(paths.bazel_path.display().to_string())
      .chain(args.iter().cloned())
      .collect::<Vec<_>>()
      .join(" ");

    info!(run = %run_name, command = %command, "invoking bazel");
    debug!(command_line = %command_line, "spawning bazel");

    let output = Command::new(&paths.bazel_path)
      .args(&args)
      .current_dir(&paths.workspace_dir)
      .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
      .output()
      .map_err(|e| RunnerError::Spawn {
        command: command_line.clone(),
        source: e,
      })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
      return Err(RunnerError::Failed {
        command: command_line,
        env,
        code: output.status.code(),
        stderr,
      });
    }

    debug!(run = %run_name, stdout_bytes = stdout.len(), "bazel finished");
    Ok(CommandOutput { stdout, stderr })
  }
}
