//! Implementation of the `mixbuild scripts` command.
//!
//! Runs the first analysis pass only and writes the Bazel workspace, BUILD
//! file, rule definitions and cquery script it would have run.

use std::path::Path;

use anyhow::{Context, Result, bail};

use mixbuild_lib::analysis::{AnalysisOptions, analyze};
use mixbuild_lib::config::{BazelPaths, ProcessEnv, USE_BAZEL_ANALYSIS_ENV, mixed_builds_requested};
use mixbuild_lib::context::BazelContext;
use mixbuild_lib::module::ModuleGraph;
use mixbuild_lib::runner::BazelRunner;

pub fn cmd_scripts(modules: &Path, out: &Path) -> Result<()> {
  if !mixed_builds_requested(&ProcessEnv) {
    bail!("Mixed builds are disabled; set {}=1", USE_BAZEL_ANALYSIS_ENV);
  }

  let graph = ModuleGraph::load(modules).with_context(|| format!("Failed to load modules: {}", modules.display()))?;
  let paths = BazelPaths::from_env(&ProcessEnv, out).context("Failed to configure Bazel")?;
  let ctx = BazelContext::new(paths, Box::new(BazelRunner));

  let options = AnalysisOptions {
    out_dir: out.to_path_buf(),
  };
  analyze(&graph, &ctx, &options).context("Build analysis failed")?;

  let written = ctx.write_scripts().context("Failed to write Bazel scripts")?;
  println!("Requests: {}", ctx.ledger().pending_len());
  for path in written {
    println!("  {}", path.display());
  }

  Ok(())
}
