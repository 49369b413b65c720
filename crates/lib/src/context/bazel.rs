use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::aquery::{BuildStatement, parse_build_statements};
use crate::config::BazelPaths;
use crate::consts::{BUILDROOT_LABEL, PHONYROOT_LABEL};
use crate::cquery::QueryRegistry;
use crate::demux::resolve_pending;
use crate::ledger::{RequestKey, RequestLedger};
use crate::runner::{BazelCommand, RunName, Runner};
use crate::synth::{CQUERY_FILENAME, CQUERY_OUTPUT_FILENAME, ScriptSet, SynthError, script_paths};

use super::{InvokeError, MixedBuildContext, Phase};

/// Delegation enabled: requests are answered by running Bazel.
pub struct BazelContext {
  paths: BazelPaths,
  registry: QueryRegistry,
  ledger: RequestLedger,
  runner: Box<dyn Runner>,
  phase: Phase,
  statements: Vec<BuildStatement>,
}

impl BazelContext {
  pub fn new(paths: BazelPaths, runner: Box<dyn Runner>) -> Self {
    Self {
      paths,
      registry: QueryRegistry::builtin().clone(),
      ledger: RequestLedger::new(),
      runner,
      phase: Phase::Collecting,
      statements: Vec::new(),
    }
  }

  /// Use `registry` instead of the built-in query kinds.
  pub fn with_registry(mut self, registry: QueryRegistry) -> Self {
    self.registry = registry;
    self
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn paths(&self) -> &BazelPaths {
    &self.paths
  }

  pub fn ledger(&self) -> &RequestLedger {
    &self.ledger
  }

  /// Render the scripts for the current pending set without running anything.
  pub fn synthesize(&self) -> Result<ScriptSet, SynthError> {
    ScriptSet::synthesize(&self.paths.workspace_dir, &self.ledger.pending_keys(), &self.registry)
  }

  /// Write the scripts for the current pending set into the intermediates directory.
  pub fn write_scripts(&self) -> Result<Vec<PathBuf>, SynthError> {
    self.synthesize()?.write_to(&self.paths.absolute_intermediates_dir())
  }

  fn run_pipeline(&mut self) -> Result<(), InvokeError> {
    // The Ninja file depends on the scripts, so they exist even when Bazel is skipped.
    self.write_scripts()?;

    let pending = self.ledger.pending_len();
    if pending == 0 {
      info!("no pending bazel requests, skipping invocation");
      return Ok(());
    }
    info!(requests = pending, "invoking bazel");

    let scripts_dir = self.paths.absolute_intermediates_dir();

    let cquery_file = self.paths.intermediates_dir().join(CQUERY_FILENAME);
    let cquery = self.runner.issue(
      &self.paths,
      RunName::CqueryBuildroot,
      &BazelCommand::new("cquery", format!("kind(rule, deps({BUILDROOT_LABEL}))")),
      &[
        "--output=starlark".to_string(),
        format!("--starlark:file={}", cquery_file.display()),
      ],
    )?;

    let cquery_out = scripts_dir.join(CQUERY_OUTPUT_FILENAME);
    fs::write(&cquery_out, &cquery.stdout).map_err(|e| InvokeError::WriteFile {
      path: cquery_out.clone(),
      source: e,
    })?;

    let resolved = resolve_pending(&mut self.ledger, &cquery)?;
    debug!(resolved, "query results recorded");

    let aquery = self.runner.issue(
      &self.paths,
      RunName::AqueryBuildroot,
      &BazelCommand::new("aquery", format!("deps({BUILDROOT_LABEL})")),
      &["--output=jsonproto".to_string()],
    )?;
    self.statements = parse_build_statements(aquery.stdout.as_bytes())?;
    debug!(actions = self.statements.len(), "action graph recorded");

    // Materializes the symlink forests the spliced actions run in; executes nothing.
    self
      .runner
      .issue(&self.paths, RunName::BuildPhonyRoot, &BazelCommand::new("build", PHONYROOT_LABEL), &[])?;

    self.ledger.clear_pending();
    Ok(())
  }
}

impl MixedBuildContext for BazelContext {
  fn enabled(&self) -> bool {
    true
  }

  fn get_fact(&self, key: &RequestKey) -> Option<&str> {
    self.ledger.get_fact(key)
  }

  fn invoke(&mut self) -> Result<(), InvokeError> {
    if self.phase != Phase::Collecting {
      return Err(InvokeError::AlreadyInvoked(self.phase));
    }

    self.phase = Phase::Invoking;
    match self.run_pipeline() {
      Ok(()) => {
        self.phase = Phase::Settled;
        Ok(())
      }
      Err(err) => {
        error!(error = %err, "bazel invocation failed");
        self.phase = Phase::Failed;
        Err(err)
      }
    }
  }

  fn output_base(&self) -> Option<&Path> {
    Some(&self.paths.output_base)
  }

  fn build_statements(&self) -> &[BuildStatement] {
    &self.statements
  }

  fn pending_requests(&self) -> Vec<RequestKey> {
    self.ledger.pending_keys()
  }

  fn generated_files(&self) -> Vec<PathBuf> {
    script_paths(&self.paths.absolute_intermediates_dir())
  }
}
