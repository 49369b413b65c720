//! Test utilities for mixbuild-lib.

use std::path::{Path, PathBuf};

use crate::config::BazelPaths;

/// Paths rooted at `root`, with the native build directory `out`.
pub fn test_paths(root: &Path) -> BazelPaths {
  BazelPaths {
    home_dir: root.join("home"),
    bazel_path: root.join("bazel"),
    output_base: root.join("out/bazel/output"),
    workspace_dir: root.to_path_buf(),
    build_dir: PathBuf::from("out"),
    metrics_dir: root.join("out/metrics"),
  }
}

/// Write an executable shell script standing in for the Bazel binary.
#[cfg(unix)]
pub fn fake_bazel(dir: &Path, script: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join("fake-bazel");
  std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}
