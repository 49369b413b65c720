//! The two-pass mixed build.
//!
//! 1. Analyze with an empty ledger; delegated variants queue their requests.
//! 2. Invoke Bazel once to answer them and collect its action graph.
//! 3. Analyze again with every answer available.
//! 4. Splice Bazel's actions into the native graph.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::{AnalysisError, AnalysisOptions, analyze};
use crate::config::ConfigError;
use crate::context::{InvokeError, MixedBuildContext};
use crate::module::{ModuleError, ModuleGraph};
use crate::ninja::writer::{render, render_depfile};
use crate::ninja::{ActionGraph, GraphError};
use crate::splice::{SpliceError, bazel_ninja_deps, register_build_statements};

pub const NINJA_FILENAME: &str = "build.ninja";
pub const NINJA_DEPFILE_FILENAME: &str = "build.ninja.d";

#[derive(Debug, Error)]
pub enum MixedBuildError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Module(#[from] ModuleError),

  #[error(transparent)]
  Analysis(#[from] AnalysisError),

  #[error(transparent)]
  Invoke(#[from] InvokeError),

  #[error(transparent)]
  Splice(#[from] SpliceError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("second analysis pass made requests nobody will answer: {}", .0.join(", "))]
  UnsettledRequests(Vec<String>),

  #[error("failed to create directory {}: {source}", path.display())]
  CreateDir { path: PathBuf, source: std::io::Error },

  #[error("failed to write file {}: {source}", path.display())]
  WriteFile { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
  /// Directory for native outputs.
  pub out_dir: PathBuf,
  /// The module list file; `bazel.list` is looked up next to it.
  pub module_list_file: Option<PathBuf>,
}

/// Run analysis, the Bazel invocation and splicing; return the final graph.
///
/// # Errors
///
/// Any analysis, invocation or graph error aborts the build. After the
/// invocation every request must be answered; leftovers are an error.
pub fn run_build(
  modules: &ModuleGraph,
  ctx: &mut dyn MixedBuildContext,
  options: &BuildOptions,
) -> Result<ActionGraph, MixedBuildError> {
  let analysis_options = AnalysisOptions {
    out_dir: options.out_dir.clone(),
  };

  if ctx.enabled() {
    let first = analyze(modules, ctx, &analysis_options)?;
    info!(
      provisional = first.provisional.len(),
      requests = ctx.pending_requests().len(),
      "first analysis pass complete"
    );
    ctx.invoke()?;
  }

  let analysis = analyze(modules, ctx, &analysis_options)?;
  let unsettled = ctx.pending_requests();
  if !unsettled.is_empty() {
    return Err(MixedBuildError::UnsettledRequests(
      unsettled.iter().map(|key| key.to_string()).collect(),
    ));
  }

  let mut graph = ActionGraph::new();
  for rule in analysis.rules {
    graph.add_rule(rule)?;
  }
  let spliced = register_build_statements(ctx, &mut graph)?;
  graph.add_ninja_file_deps(bazel_ninja_deps(ctx, options.module_list_file.as_deref())?);
  if let Some(module_list_file) = &options.module_list_file {
    graph.add_ninja_file_deps([module_list_file.display().to_string()]);
  }

  // Reject cycles introduced by splicing before anything is written.
  graph.ordered()?;
  info!(rules = graph.len(), spliced, "action graph complete");
  Ok(graph)
}

/// Write `build.ninja` and `build.ninja.d` into `dir`; returns their paths.
pub fn write_ninja(graph: &ActionGraph, dir: &Path) -> Result<(PathBuf, PathBuf), MixedBuildError> {
  fs::create_dir_all(dir).map_err(|e| MixedBuildError::CreateDir {
    path: dir.to_path_buf(),
    source: e,
  })?;

  let ninja = dir.join(NINJA_FILENAME);
  fs::write(&ninja, render(graph)?).map_err(|e| MixedBuildError::WriteFile {
    path: ninja.clone(),
    source: e,
  })?;

  let depfile = dir.join(NINJA_DEPFILE_FILENAME);
  let target = ninja.display().to_string();
  fs::write(&depfile, render_depfile(&target, graph.ninja_file_deps())).map_err(|e| MixedBuildError::WriteFile {
    path: depfile.clone(),
    source: e,
  })?;

  debug!(path = %ninja.display(), "wrote ninja file");
  Ok((ninja, depfile))
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;
  use crate::aquery::BuildStatement;
  use crate::context::{DisabledContext, MockContext};
  use crate::ledger::RequestKey;
  use crate::platform::Arch;

  /// Enabled context that never answers anything.
  struct Unanswered;

  impl MixedBuildContext for Unanswered {
    fn enabled(&self) -> bool {
      true
    }

    fn get_fact(&self, _key: &RequestKey) -> Option<&str> {
      None
    }

    fn invoke(&mut self) -> Result<(), InvokeError> {
      Ok(())
    }

    fn output_base(&self) -> Option<&Path> {
      Some(Path::new("/ob"))
    }

    fn build_statements(&self) -> &[BuildStatement] {
      &[]
    }

    fn pending_requests(&self) -> Vec<RequestKey> {
      vec![RequestKey::new("//pkg:gen", "getOutputFiles", Arch::Common)]
    }

    fn generated_files(&self) -> Vec<PathBuf> {
      Vec::new()
    }
  }

  const GRAPH: &str = r#"{ "modules": [
    {
      "name": "gen",
      "kind": "genrule",
      "srcs": ["gen.in"],
      "cmd": "cp $(in) $(out)",
      "out": ["gen.h"],
      "bazel_module": { "label": "//pkg:gen", "mixed_build_enabled": true }
    }
  ] }"#;

  fn options(dir: &Path) -> BuildOptions {
    BuildOptions {
      out_dir: dir.join("out"),
      module_list_file: None,
    }
  }

  #[test]
  fn disabled_build_is_purely_native() {
    let temp = TempDir::new().unwrap();
    let modules = ModuleGraph::from_json(GRAPH).unwrap();

    let graph = run_build(&modules, &mut DisabledContext, &options(temp.path())).unwrap();
    assert_eq!(graph.len(), 1);
    assert_eq!(graph.rules()[0].command, format!("cp gen.in {}", temp.path().join("out/gen/common/gen.h").display()));
    assert_eq!(graph.ninja_file_deps().count(), 0);
  }

  #[test]
  fn enabled_build_splices_statements() {
    let temp = TempDir::new().unwrap();
    let modules = ModuleGraph::from_json(GRAPH).unwrap();
    let mut ctx = MockContext::new("/ob")
      .with_output_files("//pkg:gen", Arch::Common, vec!["bazel-out/bin/pkg/gen.h".to_string()])
      .with_build_statements(vec![BuildStatement {
        mnemonic: "Genrule".to_string(),
        command: "cp pkg/gen.in bazel-out/bin/pkg/gen.h".to_string(),
        input_paths: vec!["pkg/gen.in".to_string()],
        output_paths: vec!["bazel-out/bin/pkg/gen.h".to_string()],
        depfile: None,
        env: Vec::new(),
      }]);

    let graph = run_build(&modules, &mut ctx, &options(temp.path())).unwrap();

    assert_eq!(graph.len(), 2);
    let ordered: Vec<&str> = graph.ordered().unwrap().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(ordered, vec!["bazel 0", "gen.common"]);
  }

  #[test]
  fn unanswered_requests_after_invocation_are_fatal() {
    let temp = TempDir::new().unwrap();
    let modules = ModuleGraph::from_json(GRAPH).unwrap();

    let err = run_build(&modules, &mut Unanswered, &options(temp.path())).unwrap_err();
    match err {
      MixedBuildError::UnsettledRequests(keys) => {
        assert_eq!(keys, vec!["@sourceroot//pkg:gen|x86_64 (getOutputFiles)"]);
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn writes_ninja_and_depfile() {
    let temp = TempDir::new().unwrap();
    let modules = ModuleGraph::from_json(GRAPH).unwrap();
    let mut graph = run_build(&modules, &mut DisabledContext, &options(temp.path())).unwrap();
    graph.add_ninja_file_deps(["modules.json".to_string()]);

    let (ninja, depfile) = write_ninja(&graph, temp.path()).unwrap();
    assert!(fs::read_to_string(&ninja).unwrap().contains("rule gen_common\n"));
    assert_eq!(
      fs::read_to_string(&depfile).unwrap(),
      format!("{}: \\\n  modules.json\n", ninja.display())
    );
  }
}
