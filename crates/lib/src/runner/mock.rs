use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::BazelPaths;

use super::{BazelCommand, CommandOutput, RunName, Runner, RunnerError, command_args, command_env};

/// One command as seen by [`MockRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
  pub run_name: RunName,
  pub command: BazelCommand,
  pub args: Vec<String>,
}

/// Shared view of the commands a [`MockRunner`] has issued.
///
/// Stays readable after the runner has been moved into a context.
#[derive(Debug, Clone, Default)]
pub struct RecordedCommands(Arc<Mutex<Vec<RecordedCommand>>>);

impl RecordedCommands {
  pub fn all(&self) -> Vec<RecordedCommand> {
    self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// How many times the given verb was issued.
  pub fn count(&self, verb: &str) -> usize {
    self
      .0
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .filter(|c| c.command.command == verb)
      .count()
  }

  fn push(&self, command: RecordedCommand) {
    self.0.lock().unwrap_or_else(PoisonError::into_inner).push(command);
  }
}

/// Answers commands from canned output instead of running Bazel.
///
/// Commands without a canned answer succeed with empty output.
#[derive(Debug, Default)]
pub struct MockRunner {
  responses: HashMap<BazelCommand, CommandOutput>,
  failures: HashMap<BazelCommand, (i32, String)>,
  recorded: RecordedCommands,
}

impl MockRunner {
  pub fn new() -> Self {
    Self::default()
  }

  /// Answer `command` with the given stdout.
  pub fn with_stdout(mut self, command: BazelCommand, stdout: impl Into<String>) -> Self {
    self.responses.insert(
      command,
      CommandOutput {
        stdout: stdout.into(),
        stderr: String::new(),
      },
    );
    self
  }

  pub fn with_output(mut self, command: BazelCommand, output: CommandOutput) -> Self {
    self.responses.insert(command, output);
    self
  }

  /// Fail `command` with the given exit code and stderr.
  pub fn with_failure(mut self, command: BazelCommand, code: i32, stderr: impl Into<String>) -> Self {
    self.failures.insert(command, (code, stderr.into()));
    self
  }

  pub fn recorded(&self) -> RecordedCommands {
    self.recorded.clone()
  }
}

impl Runner for MockRunner {
  fn issue(
    &mut self,
    paths: &BazelPaths,
    run_name: RunName,
    command: &BazelCommand,
    extra_flags: &[String],
  ) -> Result<CommandOutput, RunnerError> {
    let args = command_args(paths, run_name, command, extra_flags);
    self.recorded.push(RecordedCommand {
      run_name,
      command: command.clone(),
      args: args.clone(),
    });

    if let Some((code, stderr)) = self.failures.get(command) {
      return Err(RunnerError::Failed {
        command: args.join(" "),
        env: command_env(paths),
        code: Some(*code),
        stderr: stderr.clone(),
      });
    }

    Ok(self.responses.get(command).cloned().unwrap_or_default())
  }
}

#[cfg(test)]
mod tests {
  use std::path::Path;

  use super::*;
  use crate::util::testutil::test_paths;

  #[test]
  fn answers_from_canned_output_and_records() {
    let paths = test_paths(Path::new("/ws"));
    let cquery = BazelCommand::new("cquery", "deps(//:buildroot)");
    let mut runner = MockRunner::new().with_stdout(cquery.clone(), "a>>NONE");
    let recorded = runner.recorded();

    let output = runner.issue(&paths, RunName::CqueryBuildroot, &cquery, &[]).unwrap();
    let other = runner
      .issue(&paths, RunName::BuildPhonyRoot, &BazelCommand::new("build", "//:phonyroot"), &[])
      .unwrap();

    assert_eq!(output.stdout, "a>>NONE");
    assert_eq!(other, CommandOutput::default());
    assert_eq!(recorded.count("cquery"), 1);
    assert_eq!(recorded.count("build"), 1);
    assert_eq!(recorded.all()[0].run_name, RunName::CqueryBuildroot);
  }

  #[test]
  fn canned_failures_are_typed_errors() {
    let paths = test_paths(Path::new("/ws"));
    let aquery = BazelCommand::new("aquery", "deps(//:buildroot)");
    let mut runner = MockRunner::new().with_failure(aquery.clone(), 1, "boom");

    let err = runner.issue(&paths, RunName::AqueryBuildroot, &aquery, &[]).unwrap_err();
    assert!(matches!(err, RunnerError::Failed { code: Some(1), ref stderr, .. } if stderr == "boom"));
  }
}
