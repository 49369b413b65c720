//! Shared test helpers for library integration tests.

use std::path::{Path, PathBuf};

use mixbuild_lib::config::BazelPaths;
use mixbuild_lib::runner::BazelCommand;

/// Paths rooted at a temp directory, with the native build directory `out`.
pub fn test_paths(root: &Path) -> BazelPaths {
  BazelPaths {
    home_dir: root.join("home"),
    bazel_path: root.join("bazel"),
    output_base: root.join("output_base"),
    workspace_dir: root.to_path_buf(),
    build_dir: PathBuf::from("out"),
    metrics_dir: root.join("metrics"),
  }
}

pub fn cquery_command() -> BazelCommand {
  BazelCommand::new("cquery", "kind(rule, deps(//:buildroot))")
}

pub fn aquery_command() -> BazelCommand {
  BazelCommand::new("aquery", "deps(//:buildroot)")
}

/// One `CppCompile` action compiling `a.cc` into `a.o`.
pub const CPP_COMPILE_ACTION_GRAPH: &str = r#"{
  "artifacts": [
    { "id": 1, "pathFragmentId": 1 },
    { "id": 2, "pathFragmentId": 2 }
  ],
  "actions": [{
    "targetId": 1,
    "actionKey": "x",
    "mnemonic": "CppCompile",
    "arguments": ["clang", "-c", "a.cc", "-o", "a.o"],
    "inputDepSetIds": [1],
    "outputIds": [2],
    "primaryOutputId": 2
  }],
  "depSetOfFiles": [{ "id": 1, "directArtifactIds": [1] }],
  "pathFragments": [
    { "id": 1, "label": "a.cc" },
    { "id": 2, "label": "a.o" }
  ]
}"#;
