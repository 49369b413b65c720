//! Generates the Bazel workspace that evaluates every pending request.
//!
//! The output is a pure function of the pending set: the same requests always
//! produce byte-identical files, so a rerun with unchanged inputs leaves the
//! generated files (and anything depending on them) untouched.

mod templates;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::consts::{ID_ARCH_SEPARATOR, TAG_SEPARATOR};
use crate::cquery::QueryRegistry;
use crate::ledger::RequestKey;

use templates::{
  BUILD_TEMPLATE, CONFIG_NODE_TEMPLATE, CQUERY_TEMPLATE, MAIN_BZL, QUERY_DISPATCH_TEMPLATE, QUERY_KIND_TEMPLATE,
  WORKSPACE_TEMPLATE,
};

pub const WORKSPACE_FILENAME: &str = "WORKSPACE.bazel";
pub const BUILD_FILENAME: &str = "BUILD.bazel";
pub const MAIN_BZL_FILENAME: &str = "main.bzl";
pub const CQUERY_FILENAME: &str = "buildroot.cquery";
pub const CQUERY_OUTPUT_FILENAME: &str = "cquery.out";

/// Errors that can occur while generating or writing the scripts.
#[derive(Debug, Error)]
pub enum SynthError {
  #[error("labels cannot be expressed in query output (contain '>>' or '|'): {}", .0.join(", "))]
  InvalidLabels(Vec<String>),

  #[error("request for unregistered query kind {0:?}")]
  UnknownKind(String),

  #[error("failed to create directory {}: {source}", path.display())]
  CreateDir { path: PathBuf, source: std::io::Error },

  #[error("failed to write file {}: {source}", path.display())]
  WriteFile { path: PathBuf, source: std::io::Error },
}

/// The four generated files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSet {
  pub workspace: String,
  pub build_file: String,
  pub main_bzl: String,
  pub cquery: String,
}

impl ScriptSet {
  /// Render the scripts for `pending`.
  ///
  /// # Errors
  ///
  /// Fails before rendering anything if a label cannot survive the query
  /// output format, or if a request names a kind missing from `registry`.
  pub fn synthesize(workspace_dir: &Path, pending: &[RequestKey], registry: &QueryRegistry) -> Result<Self, SynthError> {
    let invalid: BTreeSet<String> = pending
      .iter()
      .filter(|key| key.label.contains(TAG_SEPARATOR) || key.label.contains(ID_ARCH_SEPARATOR))
      .map(|key| key.label.clone())
      .collect();
    if !invalid.is_empty() {
      return Err(SynthError::InvalidLabels(invalid.into_iter().collect()));
    }

    for key in pending {
      if registry.get(key.kind).is_none() {
        return Err(SynthError::UnknownKind(key.kind.to_string()));
      }
    }

    debug!(requests = pending.len(), "synthesizing bazel workspace");

    Ok(Self {
      workspace: WORKSPACE_TEMPLATE.replace("{workspace}", &workspace_dir.to_string_lossy()),
      build_file: build_file(pending),
      main_bzl: MAIN_BZL.to_string(),
      cquery: cquery_file(pending, registry),
    })
  }

  /// File names paired with their contents, in a fixed order.
  pub fn files(&self) -> [(&'static str, &str); 4] {
    [
      (MAIN_BZL_FILENAME, &self.main_bzl),
      (BUILD_FILENAME, &self.build_file),
      (CQUERY_FILENAME, &self.cquery),
      (WORKSPACE_FILENAME, &self.workspace),
    ]
  }

  /// Write the scripts into `dir`, creating it if needed.
  ///
  /// Returns the written paths.
  pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>, SynthError> {
    fs::create_dir_all(dir).map_err(|e| SynthError::CreateDir {
      path: dir.to_path_buf(),
      source: e,
    })?;

    let mut written = Vec::with_capacity(4);
    for (name, contents) in self.files() {
      let path = dir.join(name);
      fs::write(&path, contents).map_err(|e| SynthError::WriteFile {
        path: path.clone(),
        source: e,
      })?;
      written.push(path);
    }
    Ok(written)
  }
}

/// Paths of the generated scripts inside `dir`.
pub fn script_paths(dir: &Path) -> Vec<PathBuf> {
  [MAIN_BZL_FILENAME, BUILD_FILENAME, CQUERY_FILENAME, WORKSPACE_FILENAME]
    .iter()
    .map(|name| dir.join(name))
    .collect()
}

fn quoted_list(items: impl IntoIterator<Item = impl AsRef<str>>) -> String {
  items
    .into_iter()
    .map(|item| format!("\"{}\"", item.as_ref()))
    .collect::<Vec<_>>()
    .join(", ")
}

fn build_file(pending: &[RequestKey]) -> String {
  let mut labels_by_arch: BTreeMap<&'static str, BTreeSet<String>> = BTreeMap::new();
  for key in pending {
    labels_by_arch
      .entry(key.arch.request_tag())
      .or_default()
      .insert(key.canonical_label());
  }

  let config_nodes: String = labels_by_arch
    .iter()
    .map(|(arch, labels)| {
      CONFIG_NODE_TEMPLATE
        .replace("{arch}", arch)
        .replace("{labels}", &quoted_list(labels))
        + "\n"
    })
    .collect();
  let config_node_labels = quoted_list(labels_by_arch.keys().map(|arch| format!(":{arch}")));

  BUILD_TEMPLATE
    .replace("{config_nodes}", &config_nodes)
    .replace("{config_node_labels}", &config_node_labels)
}

fn indent(body: &str) -> String {
  body
    .lines()
    .map(|line| if line.is_empty() { String::new() } else { format!("  {line}") })
    .collect::<Vec<_>>()
    .join("\n")
}

fn cquery_file(pending: &[RequestKey], registry: &QueryRegistry) -> String {
  let mut ids_by_kind: BTreeMap<&'static str, BTreeSet<String>> = BTreeMap::new();
  for key in pending {
    ids_by_kind.entry(key.kind).or_default().insert(key.id());
  }

  let mut kinds = String::new();
  let mut dispatch = String::new();
  for kind in registry.iter() {
    let Some(ids) = ids_by_kind.get(kind.name()) else {
      continue;
    };
    let id_entries: String = ids.iter().map(|id| format!("  \"{id}\": True,\n")).collect();
    kinds.push_str(
      &QUERY_KIND_TEMPLATE
        .replace("{ids}", &id_entries)
        .replace("{body}", &indent(kind.function_body()))
        .replace("{kind}", kind.name()),
    );
    kinds.push('\n');
    dispatch.push_str(&QUERY_DISPATCH_TEMPLATE.replace("{kind}", kind.name()));
  }

  CQUERY_TEMPLATE.replace("{kinds}", &kinds).replace("{dispatch}", &dispatch)
}
