//! Declarative module definitions, loaded from JSON.
//!
//! This is the minimal front end the coordination core needs: modules with a
//! kind, per-architecture variants, sources, dependencies and an optional
//! Bazel counterpart.

mod graph;

use serde::{Deserialize, Serialize};

use crate::platform::Arch;

pub use graph::{ModuleError, ModuleGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
  Genrule,
  Filegroup,
  CcLibraryStatic,
  CcLibraryShared,
  CcObject,
}

impl ModuleKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ModuleKind::Genrule => "genrule",
      ModuleKind::Filegroup => "filegroup",
      ModuleKind::CcLibraryStatic => "cc_library_static",
      ModuleKind::CcLibraryShared => "cc_library_shared",
      ModuleKind::CcObject => "cc_object",
    }
  }

  /// Native-code modules, whose Bazel facts come from `CcInfo`.
  pub fn is_cc(&self) -> bool {
    matches!(
      self,
      ModuleKind::CcLibraryStatic | ModuleKind::CcLibraryShared | ModuleKind::CcObject
    )
  }
}

/// Link from a module to the Bazel target that can build it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BazelModuleProps {
  pub label: String,
  #[serde(default)]
  pub mixed_build_enabled: bool,
}

fn default_archs() -> Vec<Arch> {
  vec![Arch::Common]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDef {
  pub name: String,
  pub kind: ModuleKind,
  #[serde(default = "default_archs")]
  pub archs: Vec<Arch>,
  #[serde(default)]
  pub srcs: Vec<String>,
  #[serde(default)]
  pub deps: Vec<String>,
  /// Shell command; `$(in)` and `$(out)` expand to the input and output paths.
  #[serde(default)]
  pub cmd: Option<String>,
  #[serde(default)]
  pub out: Vec<String>,
  #[serde(default)]
  pub bazel_module: Option<BazelModuleProps>,
}

/// How a module maps onto the remote engine.
pub trait Delegation {
  /// Whether this module's actions come from Bazel when delegation is enabled.
  fn delegated(&self) -> bool;

  /// The Bazel label building this module for `arch`.
  fn remote_label(&self, arch: Arch) -> Option<&str>;
}

impl Delegation for ModuleDef {
  fn delegated(&self) -> bool {
    self.bazel_module.as_ref().is_some_and(|props| props.mixed_build_enabled)
  }

  fn remote_label(&self, _arch: Arch) -> Option<&str> {
    self
      .bazel_module
      .as_ref()
      .filter(|props| props.mixed_build_enabled)
      .map(|props| props.label.as_str())
  }
}
