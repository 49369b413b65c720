//! Parsing Bazel's `aquery --output=jsonproto` action graph.
//!
//! The document is a flat set of tables cross-referenced by integer ids:
//! artifacts point at path fragments, path fragments at their parents,
//! actions at depsets of input artifacts, and depsets at further depsets.
//! [`parse_build_statements`] resolves those references into self-contained
//! [`BuildStatement`]s.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AqueryError {
  #[error("invalid aquery output: {0}")]
  Json(#[from] serde_json::Error),

  #[error("undefined artifact id {0}")]
  UndefinedArtifact(u32),

  #[error("undefined depset id {0}")]
  UndefinedDepSet(u32),

  #[error("undefined path fragment id {0}")]
  UndefinedPathFragment(u32),

  #[error("depset {0} contains itself")]
  DepSetCycle(u32),

  #[error("path fragment {0} is its own ancestor")]
  PathFragmentCycle(u32),

  #[error("action {mnemonic} ({action_key}) has more than one depfile: {}", depfiles.join(", "))]
  MultipleDepfiles {
    mnemonic: String,
    action_key: String,
    depfiles: Vec<String>,
  },

  #[error("action {mnemonic} ({action_key}) has an empty command")]
  EmptyCommand { mnemonic: String, action_key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
  pub key: String,
  pub value: String,
}

/// One action Bazel would run, with every reference resolved to a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStatement {
  pub mnemonic: String,
  pub command: String,
  pub input_paths: Vec<String>,
  pub output_paths: Vec<String>,
  pub depfile: Option<String>,
  pub env: Vec<KeyValuePair>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ActionGraphContainer {
  #[serde(default)]
  artifacts: Vec<Artifact>,
  #[serde(default)]
  actions: Vec<Action>,
  #[serde(default)]
  dep_set_of_files: Vec<DepSetOfFiles>,
  #[serde(default)]
  path_fragments: Vec<PathFragment>,
  #[serde(default, rename = "targets")]
  _targets: Option<IgnoredAny>,
  #[serde(default, rename = "ruleClasses")]
  _rule_classes: Option<IgnoredAny>,
  #[serde(default, rename = "configuration")]
  _configuration: Option<IgnoredAny>,
  #[serde(default, rename = "aspectDescriptors")]
  _aspect_descriptors: Option<IgnoredAny>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Artifact {
  id: u32,
  path_fragment_id: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Action {
  #[serde(default)]
  action_key: String,
  #[serde(default)]
  mnemonic: String,
  #[serde(default)]
  arguments: Vec<String>,
  #[serde(default)]
  environment_variables: Vec<KeyValuePair>,
  #[serde(default)]
  input_dep_set_ids: Vec<u32>,
  #[serde(default)]
  output_ids: Vec<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepSetOfFiles {
  id: u32,
  #[serde(default)]
  direct_artifact_ids: Vec<u32>,
  #[serde(default)]
  transitive_dep_set_ids: Vec<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PathFragment {
  id: u32,
  label: String,
  #[serde(default)]
  parent_id: u32,
}

/// Resolves ids against the tables of one document.
struct Resolver<'a> {
  artifacts: HashMap<u32, u32>,
  dep_sets: HashMap<u32, &'a DepSetOfFiles>,
  fragments: HashMap<u32, &'a PathFragment>,
  paths: HashMap<u32, String>,
  flattened: HashMap<u32, Vec<u32>>,
}

impl<'a> Resolver<'a> {
  fn new(container: &'a ActionGraphContainer) -> Self {
    Self {
      artifacts: container.artifacts.iter().map(|a| (a.id, a.path_fragment_id)).collect(),
      dep_sets: container.dep_set_of_files.iter().map(|d| (d.id, d)).collect(),
      fragments: container.path_fragments.iter().map(|f| (f.id, f)).collect(),
      paths: HashMap::new(),
      flattened: HashMap::new(),
    }
  }

  /// Join a fragment's labels from the root down. A parent id of 0 ends the chain.
  fn fragment_path(&mut self, id: u32) -> Result<String, AqueryError> {
    if let Some(path) = self.paths.get(&id) {
      return Ok(path.clone());
    }

    let mut labels = Vec::new();
    let mut seen = HashSet::new();
    let mut current = id;
    while current != 0 {
      if !seen.insert(current) {
        return Err(AqueryError::PathFragmentCycle(current));
      }
      let fragment: &'a PathFragment = self
        .fragments
        .get(&current)
        .copied()
        .ok_or(AqueryError::UndefinedPathFragment(current))?;
      labels.push(fragment.label.as_str());
      current = fragment.parent_id;
    }
    labels.reverse();

    let path = labels.join("/");
    self.paths.insert(id, path.clone());
    Ok(path)
  }

  fn artifact_path(&mut self, id: u32) -> Result<String, AqueryError> {
    let fragment = *self.artifacts.get(&id).ok_or(AqueryError::UndefinedArtifact(id))?;
    self.fragment_path(fragment)
  }

  /// Artifact ids reachable from a depset, direct ones first, without duplicates.
  fn flatten(&mut self, id: u32, in_progress: &mut HashSet<u32>) -> Result<Vec<u32>, AqueryError> {
    if let Some(ids) = self.flattened.get(&id) {
      return Ok(ids.clone());
    }
    if !in_progress.insert(id) {
      return Err(AqueryError::DepSetCycle(id));
    }

    let dep_set: &'a DepSetOfFiles = self.dep_sets.get(&id).copied().ok_or(AqueryError::UndefinedDepSet(id))?;
    let mut seen = HashSet::new();
    let mut ids: Vec<u32> = Vec::new();
    for &artifact in &dep_set.direct_artifact_ids {
      if seen.insert(artifact) {
        ids.push(artifact);
      }
    }
    for &child in &dep_set.transitive_dep_set_ids {
      for artifact in self.flatten(child, in_progress)? {
        if seen.insert(artifact) {
          ids.push(artifact);
        }
      }
    }

    in_progress.remove(&id);
    self.flattened.insert(id, ids.clone());
    Ok(ids)
  }

  fn statement(&mut self, action: &Action) -> Result<BuildStatement, AqueryError> {
    if action.arguments.iter().all(String::is_empty) {
      return Err(AqueryError::EmptyCommand {
        mnemonic: action.mnemonic.clone(),
        action_key: action.action_key.clone(),
      });
    }
    let command = action
      .arguments
      .iter()
      .map(|arg| shell_escape::unix::escape(Cow::Borrowed(arg.as_str())))
      .collect::<Vec<_>>()
      .join(" ");

    let mut input_paths = Vec::new();
    let mut seen = HashSet::new();
    for &dep_set in &action.input_dep_set_ids {
      for artifact in self.flatten(dep_set, &mut HashSet::new())? {
        if seen.insert(artifact) {
          input_paths.push(self.artifact_path(artifact)?);
        }
      }
    }

    let mut output_paths = Vec::new();
    let mut depfiles = Vec::new();
    for &id in &action.output_ids {
      let path = self.artifact_path(id)?;
      if path.ends_with(".d") {
        depfiles.push(path);
      } else {
        output_paths.push(path);
      }
    }
    if depfiles.len() > 1 {
      return Err(AqueryError::MultipleDepfiles {
        mnemonic: action.mnemonic.clone(),
        action_key: action.action_key.clone(),
        depfiles,
      });
    }

    Ok(BuildStatement {
      mnemonic: action.mnemonic.clone(),
      command,
      input_paths,
      output_paths,
      depfile: depfiles.pop(),
      env: action.environment_variables.clone(),
    })
  }
}

/// Parse an aquery `jsonproto` document into build statements, in action order.
///
/// Empty input means Bazel had nothing to report and yields no statements.
///
/// # Errors
///
/// Malformed JSON, unknown top-level tables, dangling ids, reference cycles,
/// actions with several depfiles and actions without a command are all
/// errors; no partial result is returned.
pub fn parse_build_statements(raw: &[u8]) -> Result<Vec<BuildStatement>, AqueryError> {
  if raw.iter().all(u8::is_ascii_whitespace) {
    return Ok(Vec::new());
  }

  let container: ActionGraphContainer = serde_json::from_slice(raw)?;
  let mut resolver = Resolver::new(&container);
  let statements = container
    .actions
    .iter()
    .map(|action| resolver.statement(action))
    .collect::<Result<Vec<_>, _>>()?;

  debug!(actions = statements.len(), "parsed aquery action graph");
  Ok(statements)
}
