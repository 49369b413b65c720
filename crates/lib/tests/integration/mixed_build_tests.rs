//! Two-pass builds through `BazelContext` with a mock runner.

use std::fs;
use std::thread;

use mixbuild_lib::context::{BazelContext, InvokeError, MixedBuildContext, Phase};
use mixbuild_lib::mixed::{BuildOptions, run_build, write_ninja};
use mixbuild_lib::module::ModuleGraph;
use mixbuild_lib::platform::Arch;
use mixbuild_lib::runner::MockRunner;
use tempfile::TempDir;

use super::common::{CPP_COMPILE_ACTION_GRAPH, aquery_command, cquery_command, test_paths};

const LIBFOO_GRAPH: &str = r#"{ "modules": [
  {
    "name": "libfoo",
    "kind": "genrule",
    "archs": ["arm64", "x86_64"],
    "bazel_module": { "label": "//pkg:foo", "mixed_build_enabled": true }
  },
  {
    "name": "app",
    "kind": "genrule",
    "archs": ["arm64"],
    "deps": ["libfoo"],
    "cmd": "link $(in) -o $(out)",
    "out": ["app"]
  }
] }"#;

const LIBFOO_QUERY_OUTPUT: &str = "\
@sourceroot//pkg:foo|arm64>>getOutputFiles>>bazel-out/arm64/bin/pkg/libfoo.so
@sourceroot//pkg:foo|x86_64>>getOutputFiles>>bazel-out/x86_64/bin/pkg/libfoo.so
@sourceroot//pkg:dep|arm64>>NONE
";

#[test]
fn queued_request_resolves_after_invocation() {
  let temp = TempDir::new().unwrap();
  let runner = MockRunner::new().with_stdout(cquery_command(), "@sourceroot//pkg:foo|arm64>>getOutputFiles>>out/foo.so\n");
  let mut ctx = BazelContext::new(test_paths(temp.path()), Box::new(runner));

  assert_eq!(ctx.get_output_files("//pkg:foo", Arch::Arm64), None);
  assert_eq!(ctx.pending_requests().len(), 1);

  ctx.invoke().unwrap();

  assert_eq!(
    ctx.get_output_files("//pkg:foo", Arch::Arm64),
    Some(vec!["out/foo.so".to_string()])
  );
  assert!(ctx.pending_requests().is_empty());

  let build_file = fs::read_to_string(temp.path().join("out/bazel/BUILD.bazel")).unwrap();
  assert!(build_file.contains("config_node(name = \"arm64\",\n    arch = \"arm64\",\n    deps = [\"@sourceroot//pkg:foo\"],"));
}

#[test]
fn bazel_runs_once_per_build() {
  let temp = TempDir::new().unwrap();
  let runner = MockRunner::new()
    .with_stdout(cquery_command(), LIBFOO_QUERY_OUTPUT)
    .with_stdout(aquery_command(), "{}");
  let recorded = runner.recorded();
  let mut ctx = BazelContext::new(test_paths(temp.path()), Box::new(runner));
  let modules = ModuleGraph::from_json(LIBFOO_GRAPH).unwrap();
  let options = BuildOptions {
    out_dir: "out".into(),
    module_list_file: None,
  };

  let graph = run_build(&modules, &mut ctx, &options).unwrap();

  assert_eq!(recorded.count("cquery"), 1);
  assert_eq!(recorded.count("aquery"), 1);
  assert_eq!(recorded.count("build"), 1);
  assert_eq!(ctx.phase(), Phase::Settled);

  // Both variants were resolved separately.
  assert_eq!(
    ctx.get_output_files("//pkg:foo", Arch::Arm64),
    Some(vec!["bazel-out/arm64/bin/pkg/libfoo.so".to_string()])
  );
  assert_eq!(
    ctx.get_output_files("//pkg:foo", Arch::X86_64),
    Some(vec!["bazel-out/x86_64/bin/pkg/libfoo.so".to_string()])
  );
  assert_eq!(ctx.ledger().resolved_len(), 2);

  let app = graph.producer("out/app/arm64/app").unwrap();
  assert_eq!(app.inputs, vec!["out/libfoo/arm64/pkg/libfoo.so"]);
  assert_eq!(graph.producer("out/libfoo/x86_64/pkg/libfoo.so").map(|r| r.name.as_str()), Some("libfoo.x86_64"));

  // A second invocation is refused and runs nothing.
  assert!(matches!(ctx.invoke(), Err(InvokeError::AlreadyInvoked(Phase::Settled))));
  assert_eq!(recorded.count("cquery"), 1);
}

#[test]
fn architectures_get_distinct_config_nodes() {
  let temp = TempDir::new().unwrap();
  let ctx = BazelContext::new(test_paths(temp.path()), Box::new(MockRunner::new()));
  ctx.get_output_files("//pkg:foo", Arch::Arm64);
  ctx.get_output_files("//pkg:foo", Arch::X86_64);

  let scripts = ctx.synthesize().unwrap();
  assert!(scripts.build_file.contains("config_node(name = \"arm64\""));
  assert!(scripts.build_file.contains("config_node(name = \"x86_64\""));
  assert!(scripts.cquery.contains("\"@sourceroot//pkg:foo|arm64\": True,"));
  assert!(scripts.cquery.contains("\"@sourceroot//pkg:foo|x86_64\": True,"));
}

#[test]
fn concurrent_requests_queue_each_key_once() {
  let temp = TempDir::new().unwrap();
  let ctx = BazelContext::new(test_paths(temp.path()), Box::new(MockRunner::new()));

  thread::scope(|scope| {
    for worker in 0..4 {
      let ctx = &ctx;
      scope.spawn(move || {
        for n in 0..25 {
          let label = format!("//pkg:t{}", (n + worker) % 5);
          assert!(ctx.get_output_files(&label, Arch::Arm64).is_none());
          assert!(ctx.get_cc_info(&label, Arch::Arm64).unwrap().is_none());
        }
      });
    }
  });

  assert_eq!(ctx.pending_requests().len(), 10);
}

#[test]
fn missing_query_result_aborts_the_build() {
  let temp = TempDir::new().unwrap();
  let runner = MockRunner::new().with_stdout(
    cquery_command(),
    "@sourceroot//pkg:foo|arm64>>getOutputFiles>>bazel-out/arm64/bin/pkg/libfoo.so\n",
  );
  let mut ctx = BazelContext::new(test_paths(temp.path()), Box::new(runner));
  let modules = ModuleGraph::from_json(LIBFOO_GRAPH).unwrap();
  let options = BuildOptions {
    out_dir: "out".into(),
    module_list_file: None,
  };

  let err = run_build(&modules, &mut ctx, &options).unwrap_err();
  let message = err.to_string();
  assert!(message.contains("@sourceroot//pkg:foo|x86_64"), "{message}");
  assert_eq!(ctx.phase(), Phase::Failed);
}

#[test]
fn writes_ninja_with_bazel_file_dependencies() {
  let temp = TempDir::new().unwrap();
  let runner = MockRunner::new()
    .with_stdout(cquery_command(), LIBFOO_QUERY_OUTPUT)
    .with_stdout(aquery_command(), CPP_COMPILE_ACTION_GRAPH);
  let mut ctx = BazelContext::new(test_paths(temp.path()), Box::new(runner));
  let modules = ModuleGraph::from_json(LIBFOO_GRAPH).unwrap();

  let module_list = temp.path().join("Android.bp.list");
  fs::write(temp.path().join("bazel.list"), "build/bazel/rules/BUILD\n").unwrap();
  let options = BuildOptions {
    out_dir: "out".into(),
    module_list_file: Some(module_list.clone()),
  };

  let graph = run_build(&modules, &mut ctx, &options).unwrap();
  let (ninja, depfile) = write_ninja(&graph, &temp.path().join("out")).unwrap();

  let ninja = fs::read_to_string(ninja).unwrap();
  assert!(ninja.contains("rule bazel_0\n"));
  assert!(ninja.contains("  restat = true\n"));

  let depfile = fs::read_to_string(depfile).unwrap();
  assert!(depfile.contains("out/bazel/buildroot.cquery"));
  assert!(depfile.contains("bazel.list"));
  assert!(depfile.contains("build/bazel/rules/BUILD"));
  assert!(depfile.contains("Android.bp.list"));
}

#[test]
fn native_only_build_still_writes_bazel_file_dependencies() {
  let temp = TempDir::new().unwrap();
  let runner = MockRunner::new();
  let recorded = runner.recorded();
  let mut ctx = BazelContext::new(test_paths(temp.path()), Box::new(runner));
  let modules = ModuleGraph::from_json(
    r#"{ "modules": [{ "name": "gen", "kind": "genrule", "cmd": "touch $(out)", "out": ["gen.txt"] }] }"#,
  )
  .unwrap();
  let options = BuildOptions {
    out_dir: "out".into(),
    module_list_file: None,
  };

  let graph = run_build(&modules, &mut ctx, &options).unwrap();

  assert!(recorded.all().is_empty());
  let deps: Vec<&String> = graph.ninja_file_deps().collect();
  assert_eq!(deps.len(), 4);
  for dep in deps {
    assert!(std::path::Path::new(dep).is_file(), "missing {dep}");
  }
}
