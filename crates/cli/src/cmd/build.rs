//! Implementation of the `mixbuild build` command.
//!
//! Runs both analysis passes, invoking Bazel in between when
//! `USE_BAZEL_ANALYSIS=1`, and writes `build.ninja` into the output directory.

use std::path::Path;

use anyhow::{Context, Result};

use mixbuild_lib::config::ProcessEnv;
use mixbuild_lib::context::new_context;
use mixbuild_lib::mixed::{BuildOptions, run_build, write_ninja};
use mixbuild_lib::module::ModuleGraph;

pub fn cmd_build(modules: &Path, out: &Path, module_list: Option<&Path>) -> Result<()> {
  let graph = ModuleGraph::load(modules).with_context(|| format!("Failed to load modules: {}", modules.display()))?;

  let module_list_file = module_list
    .map(|path| dunce::canonicalize(path).with_context(|| format!("Module list not found: {}", path.display())))
    .transpose()?;

  let mut ctx = new_context(&ProcessEnv, out).context("Failed to configure Bazel")?;
  let options = BuildOptions {
    out_dir: out.to_path_buf(),
    module_list_file,
  };

  let action_graph = run_build(&graph, ctx.as_mut(), &options).context("Build analysis failed")?;
  let (ninja, _) = write_ninja(&action_graph, out).context("Failed to write ninja file")?;

  println!("Modules: {}", graph.len());
  println!("Rules: {}", action_graph.len());
  if ctx.enabled() {
    println!("Bazel actions: {}", ctx.build_statements().len());
  }
  println!("Path: {}", ninja.display());

  Ok(())
}
