//! Turning Bazel's actions into native rules.
//!
//! Bazel actions run relative to its execution root, so each spliced command
//! changes into the execroot first and every path it touches is anchored
//! there. Rules are marked `restat`: when Bazel's outputs come out
//! byte-identical, their dependents are not rebuilt.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::aquery::BuildStatement;
use crate::config::execroot;
use crate::consts::BAZEL_LIST_FILENAME;
use crate::context::MixedBuildContext;
use crate::ninja::{ActionGraph, GraphError, Rule};

#[derive(Debug, Error)]
pub enum SpliceError {
  #[error("bazel action {index} ({mnemonic}) has an empty command")]
  EmptyCommand { index: usize, mnemonic: String },

  #[error("enabled context has no output base")]
  NoOutputBase,

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("failed to read {}: {source}", path.display())]
  ReadManifest { path: PathBuf, source: std::io::Error },
}

fn anchored(execroot: &Path, path: &str) -> String {
  execroot.join(path).display().to_string()
}

/// The native rule for the `index`th Bazel action.
pub fn statement_rule(index: usize, stmt: &BuildStatement, execroot: &Path) -> Result<Rule, SpliceError> {
  if stmt.command.trim().is_empty() {
    return Err(SpliceError::EmptyCommand {
      index,
      mnemonic: stmt.mnemonic.clone(),
    });
  }

  let mut command = format!("cd {} && ", execroot.display());
  for pair in &stmt.env {
    command.push_str(&format!(
      "export {}={} && ",
      pair.key,
      shell_escape::unix::escape(pair.value.as_str().into())
    ));
  }
  command.push_str(&stmt.command);

  let mut rule = Rule::new(format!("bazel {index}"), command)
    .description(stmt.mnemonic.clone())
    .restat();
  for output in &stmt.output_paths {
    rule = rule.implicit_output(anchored(execroot, output));
  }
  for input in &stmt.input_paths {
    rule = rule.implicit_input(anchored(execroot, input));
  }
  if let Some(depfile) = &stmt.depfile {
    rule = rule.depfile(anchored(execroot, depfile));
  }
  Ok(rule)
}

/// Register every build statement of `ctx` with `graph`. A no-op when
/// delegation is disabled.
pub fn register_build_statements(ctx: &dyn MixedBuildContext, graph: &mut ActionGraph) -> Result<usize, SpliceError> {
  if !ctx.enabled() {
    return Ok(0);
  }
  let output_base = ctx.output_base().ok_or(SpliceError::NoOutputBase)?;
  let execroot = execroot(output_base);

  let statements = ctx.build_statements();
  for (index, stmt) in statements.iter().enumerate() {
    graph.add_rule(statement_rule(index, stmt, &execroot)?)?;
  }
  debug!(rules = statements.len(), "spliced bazel actions");
  Ok(statements.len())
}

/// Files whose change must regenerate the Ninja file: the generated Bazel
/// scripts, plus the `bazel.list` manifest next to `module_list_file` and
/// every file it lists.
///
/// A missing manifest contributes nothing.
pub fn bazel_ninja_deps(ctx: &dyn MixedBuildContext, module_list_file: Option<&Path>) -> Result<Vec<String>, SpliceError> {
  if !ctx.enabled() {
    return Ok(Vec::new());
  }

  let mut deps: Vec<String> = ctx.generated_files().iter().map(|p| p.display().to_string()).collect();

  let Some(module_list_file) = module_list_file else {
    return Ok(deps);
  };
  let manifest = module_list_file
    .parent()
    .unwrap_or_else(|| Path::new(""))
    .join(BAZEL_LIST_FILENAME);
  if !manifest.is_file() {
    debug!(path = %manifest.display(), "no bazel file manifest");
    return Ok(deps);
  }

  let contents = fs::read_to_string(&manifest).map_err(|e| SpliceError::ReadManifest {
    path: manifest.clone(),
    source: e,
  })?;
  deps.push(manifest.display().to_string());
  deps.extend(
    contents
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(str::to_string),
  );
  Ok(deps)
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;
  use crate::aquery::KeyValuePair;
  use crate::context::{DisabledContext, MockContext};

  fn compile() -> BuildStatement {
    BuildStatement {
      mnemonic: "CppCompile".to_string(),
      command: "clang -c a.cc -o a.o".to_string(),
      input_paths: vec!["a.cc".to_string()],
      output_paths: vec!["a.o".to_string()],
      depfile: Some("a.d".to_string()),
      env: Vec::new(),
    }
  }

  #[test]
  fn builds_restat_rule_anchored_in_execroot() {
    let rule = statement_rule(0, &compile(), Path::new("/ob/execroot/__main__")).unwrap();

    assert_eq!(rule.name, "bazel 0");
    assert_eq!(rule.description, "CppCompile");
    assert_eq!(rule.command, "cd /ob/execroot/__main__ && clang -c a.cc -o a.o");
    assert_eq!(rule.implicit_outputs, vec!["/ob/execroot/__main__/a.o"]);
    assert_eq!(rule.implicit_inputs, vec!["/ob/execroot/__main__/a.cc"]);
    assert_eq!(rule.depfile.as_deref(), Some("/ob/execroot/__main__/a.d"));
    assert!(rule.restat);
    assert!(rule.outputs.is_empty() && rule.inputs.is_empty());
  }

  #[test]
  fn exports_statement_environment() {
    let mut stmt = compile();
    stmt.env = vec![KeyValuePair {
      key: "MSG".to_string(),
      value: "hello world".to_string(),
    }];
    let rule = statement_rule(3, &stmt, Path::new("/x")).unwrap();
    assert_eq!(rule.command, "cd /x && export MSG='hello world' && clang -c a.cc -o a.o");
  }

  #[test]
  fn empty_command_is_fatal() {
    let mut stmt = compile();
    stmt.command = "  ".to_string();
    assert!(matches!(
      statement_rule(5, &stmt, Path::new("/x")),
      Err(SpliceError::EmptyCommand { index: 5, .. })
    ));
  }

  #[test]
  fn registers_one_rule_per_statement() {
    let ctx = MockContext::new("/ob").with_build_statements(vec![compile()]);
    let mut graph = ActionGraph::new();

    assert_eq!(register_build_statements(&ctx, &mut graph).unwrap(), 1);
    assert_eq!(
      graph.producer("/ob/execroot/__main__/a.o").map(|r| r.name.as_str()),
      Some("bazel 0")
    );
  }

  #[test]
  fn disabled_context_splices_nothing() {
    let mut graph = ActionGraph::new();
    assert_eq!(register_build_statements(&DisabledContext, &mut graph).unwrap(), 0);
    assert!(bazel_ninja_deps(&DisabledContext, None).unwrap().is_empty());
    assert!(graph.is_empty());
  }

  #[test]
  fn reads_manifest_next_to_module_list() {
    let temp = TempDir::new().unwrap();
    let module_list = temp.path().join("Android.bp.list");
    let manifest = temp.path().join("bazel.list");
    fs::write(&manifest, "build/bazel/rules/BUILD\n\nbuild/bazel/rules/cc.bzl\n").unwrap();

    let deps = bazel_ninja_deps(&MockContext::new("/ob"), Some(&module_list)).unwrap();
    assert_eq!(
      deps,
      vec![
        manifest.display().to_string(),
        "build/bazel/rules/BUILD".to_string(),
        "build/bazel/rules/cc.bzl".to_string(),
      ]
    );
  }

  #[test]
  fn missing_manifest_contributes_nothing() {
    let temp = TempDir::new().unwrap();
    let deps = bazel_ninja_deps(&MockContext::new("/ob"), Some(&temp.path().join("Android.bp.list"))).unwrap();
    assert!(deps.is_empty());
  }
}
