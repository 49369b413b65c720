use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::aquery::BuildStatement;
use crate::cquery::{CC_INFO, CcInfo, OUTPUT_FILES, QueryKind};
use crate::ledger::{RequestKey, canonicalize_label};
use crate::platform::Arch;

use super::{InvokeError, MixedBuildContext};

/// Answer to an unseeded `getCcInfo` request: five empty sections.
const EMPTY_CC_INFO: &str = "||||";

/// Enabled context with canned answers. Every request is immediately ready;
/// labels without a canned answer yield empty facts.
///
/// Answers are stored in the same text form Bazel prints, so `get_fact` and
/// the typed accessors agree.
#[derive(Debug, Clone, Default)]
pub struct MockContext {
  output_base: PathBuf,
  facts: HashMap<(String, &'static str, Arch), String>,
  statements: Vec<BuildStatement>,
}

impl MockContext {
  pub fn new(output_base: impl Into<PathBuf>) -> Self {
    Self {
      output_base: output_base.into(),
      ..Default::default()
    }
  }

  pub fn with_output_files(mut self, label: &str, arch: Arch, files: Vec<String>) -> Self {
    self
      .facts
      .insert((canonicalize_label(label), OUTPUT_FILES.name(), arch), files.join(", "));
    self
  }

  pub fn with_cc_info(mut self, label: &str, arch: Arch, info: CcInfo) -> Self {
    let raw = [
      &info.output_files,
      &info.cc_static_library_files,
      &info.cc_object_files,
      &info.includes,
      &info.system_includes,
    ]
    .map(|section| section.join(", "))
    .join("|");
    self.facts.insert((canonicalize_label(label), CC_INFO.name(), arch), raw);
    self
  }

  pub fn with_build_statements(mut self, statements: Vec<BuildStatement>) -> Self {
    self.statements = statements;
    self
  }
}

impl MixedBuildContext for MockContext {
  fn enabled(&self) -> bool {
    true
  }

  fn get_fact(&self, key: &RequestKey) -> Option<&str> {
    let seeded = self.facts.get(&(key.canonical_label(), key.kind, key.arch));
    match seeded {
      Some(raw) => Some(raw.as_str()),
      None if key.kind == CC_INFO.name() => Some(EMPTY_CC_INFO),
      None => Some(""),
    }
  }

  fn invoke(&mut self) -> Result<(), InvokeError> {
    Ok(())
  }

  fn output_base(&self) -> Option<&Path> {
    Some(&self.output_base)
  }

  fn build_statements(&self) -> &[BuildStatement] {
    &self.statements
  }

  fn pending_requests(&self) -> Vec<RequestKey> {
    Vec::new()
  }

  fn generated_files(&self) -> Vec<PathBuf> {
    Vec::new()
  }
}
