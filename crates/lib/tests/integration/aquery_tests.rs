//! Splicing Bazel's action graph into the native graph.

use std::fs;

use mixbuild_lib::aquery::{AqueryError, parse_build_statements};
use mixbuild_lib::context::{BazelContext, InvokeError, MixedBuildContext, Phase};
use mixbuild_lib::ninja::{ActionGraph, Rule};
use mixbuild_lib::platform::Arch;
use mixbuild_lib::runner::MockRunner;
use mixbuild_lib::splice::register_build_statements;
use mixbuild_lib::util::hash::OutputDigests;
use tempfile::TempDir;

use super::common::{CPP_COMPILE_ACTION_GRAPH, aquery_command, cquery_command, test_paths};

const QUERY_OUTPUT: &str = "@sourceroot//pkg:a|arm64>>getOutputFiles>>a.o\n";

fn settled_context(temp: &TempDir, action_graph: &str) -> Result<BazelContext, InvokeError> {
  let runner = MockRunner::new()
    .with_stdout(cquery_command(), QUERY_OUTPUT)
    .with_stdout(aquery_command(), action_graph);
  let mut ctx = BazelContext::new(test_paths(temp.path()), Box::new(runner));
  ctx.get_output_files("//pkg:a", Arch::Arm64);
  ctx.invoke()?;
  Ok(ctx)
}

#[test]
fn cpp_compile_becomes_one_restat_rule() {
  let temp = TempDir::new().unwrap();
  let ctx = settled_context(&temp, CPP_COMPILE_ACTION_GRAPH).unwrap();
  let mut graph = ActionGraph::new();

  assert_eq!(register_build_statements(&ctx, &mut graph).unwrap(), 1);

  let execroot = temp.path().join("output_base/execroot/__main__");
  let rule = &graph.rules()[0];
  assert_eq!(graph.len(), 1);
  assert_eq!(rule.implicit_outputs, vec![execroot.join("a.o").display().to_string()]);
  assert_eq!(rule.implicit_inputs, vec![execroot.join("a.cc").display().to_string()]);
  assert!(rule.restat);
  assert_eq!(
    rule.command,
    format!("cd {} && clang -c a.cc -o a.o", execroot.display())
  );
}

#[test]
fn empty_command_fails_the_invocation() {
  let temp = TempDir::new().unwrap();
  let doc = r#"{ "actions": [{ "actionKey": "k", "mnemonic": "Symlink", "arguments": [] }] }"#;

  let err = settled_context(&temp, doc).err().unwrap();
  assert!(matches!(err, InvokeError::Aquery(AqueryError::EmptyCommand { .. })));
}

#[test]
fn failed_invocation_leaves_context_failed() {
  let temp = TempDir::new().unwrap();
  let runner = MockRunner::new()
    .with_stdout(cquery_command(), QUERY_OUTPUT)
    .with_stdout(aquery_command(), "not json");
  let recorded = runner.recorded();
  let mut ctx = BazelContext::new(test_paths(temp.path()), Box::new(runner));
  ctx.get_output_files("//pkg:a", Arch::Arm64);

  assert!(matches!(ctx.invoke(), Err(InvokeError::Aquery(AqueryError::Json(_)))));
  assert_eq!(ctx.phase(), Phase::Failed);
  assert!(ctx.build_statements().is_empty());
  assert_eq!(recorded.count("build"), 0);
}

#[test]
fn identical_outputs_do_not_dirty_dependents() {
  let temp = TempDir::new().unwrap();
  let ctx = settled_context(&temp, CPP_COMPILE_ACTION_GRAPH).unwrap();
  let mut graph = ActionGraph::new();
  register_build_statements(&ctx, &mut graph).unwrap();

  let execroot = temp.path().join("output_base/execroot/__main__");
  let object = execroot.join("a.o").display().to_string();
  let source = execroot.join("a.cc").display().to_string();
  graph
    .add_rule(Rule::new("link", "ld a.o -o app").input(object.clone()).output("out/app"))
    .unwrap();

  fs::create_dir_all(&execroot).unwrap();
  fs::write(&object, "object v1").unwrap();
  let before = OutputDigests::capture([&object]).unwrap();

  // Recompiling produced byte-identical output with a fresh mtime.
  fs::write(&object, "object v1").unwrap();
  let after = OutputDigests::capture([&object]).unwrap();
  let dirty = graph
    .dirty_rules(&[source.as_str()], |output| before.changed(&after, output))
    .unwrap();
  assert_eq!(dirty.into_iter().collect::<Vec<_>>(), vec!["bazel 0"]);

  // A real change propagates to the link step.
  fs::write(&object, "object v2").unwrap();
  let after = OutputDigests::capture([&object]).unwrap();
  let dirty = graph
    .dirty_rules(&[source.as_str()], |output| before.changed(&after, output))
    .unwrap();
  assert_eq!(dirty.into_iter().collect::<Vec<_>>(), vec!["bazel 0", "link"]);
}

#[test]
fn parses_nested_path_fragments() {
  let doc = r#"{
    "artifacts": [{ "id": 1, "pathFragmentId": 3 }],
    "actions": [{ "mnemonic": "Genrule", "arguments": ["/bin/bash", "-c", "touch $@"], "outputIds": [1] }],
    "pathFragments": [
      { "id": 1, "label": "bazel-out" },
      { "id": 2, "label": "bin", "parentId": 1 },
      { "id": 3, "label": "gen.h", "parentId": 2 }
    ]
  }"#;
  let statements = parse_build_statements(doc.as_bytes()).unwrap();
  assert_eq!(statements[0].output_paths, vec!["bazel-out/bin/gen.h"]);
  assert_eq!(statements[0].command, "/bin/bash -c 'touch $@'");
}
