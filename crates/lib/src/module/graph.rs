use std::collections::HashMap;
use std::path::{Path, PathBuf};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Deserialize;
use thiserror::Error;

use super::ModuleDef;

#[derive(Debug, Error)]
pub enum ModuleError {
  #[error("failed to read module graph {}: {source}", path.display())]
  Read { path: PathBuf, source: std::io::Error },

  #[error("invalid module graph: {0}")]
  Json(#[from] serde_json::Error),

  #[error("module {0:?} is defined more than once")]
  DuplicateModule(String),

  #[error("module {module:?} depends on undefined module {dep:?}")]
  UnknownDependency { module: String, dep: String },

  #[error("dependency cycle through module {0:?}")]
  Cycle(String),
}

#[derive(Debug, Deserialize)]
struct ModuleFile {
  modules: Vec<ModuleDef>,
}

/// Validated modules plus the dependency edges between them.
#[derive(Debug)]
pub struct ModuleGraph {
  modules: Vec<ModuleDef>,
  by_name: HashMap<String, NodeIndex>,
  graph: DiGraph<usize, ()>,
}

impl ModuleGraph {
  /// Parse `{"modules": [...]}`.
  pub fn from_json(json: &str) -> Result<Self, ModuleError> {
    let file: ModuleFile = serde_json::from_str(json)?;
    Self::new(file.modules)
  }

  pub fn load(path: &Path) -> Result<Self, ModuleError> {
    let json = std::fs::read_to_string(path).map_err(|e| ModuleError::Read {
      path: path.to_path_buf(),
      source: e,
    })?;
    Self::from_json(&json)
  }

  /// Check names are unique, dependencies exist and there are no cycles.
  pub fn new(modules: Vec<ModuleDef>) -> Result<Self, ModuleError> {
    let mut graph = DiGraph::new();
    let mut by_name = HashMap::new();

    for (index, module) in modules.iter().enumerate() {
      let node = graph.add_node(index);
      if by_name.insert(module.name.clone(), node).is_some() {
        return Err(ModuleError::DuplicateModule(module.name.clone()));
      }
    }

    for module in &modules {
      let dependent = by_name[&module.name];
      for dep in &module.deps {
        let Some(&dependency) = by_name.get(dep) else {
          return Err(ModuleError::UnknownDependency {
            module: module.name.clone(),
            dep: dep.clone(),
          });
        };
        // Edge from dependency to dependent
        graph.add_edge(dependency, dependent, ());
      }
    }

    toposort(&graph, None).map_err(|cycle| ModuleError::Cycle(modules[graph[cycle.node_id()]].name.clone()))?;

    Ok(Self {
      modules,
      by_name,
      graph,
    })
  }

  pub fn get(&self, name: &str) -> Option<&ModuleDef> {
    self.by_name.get(name).map(|&node| &self.modules[self.graph[node]])
  }

  pub fn modules(&self) -> &[ModuleDef] {
    &self.modules
  }

  pub fn len(&self) -> usize {
    self.modules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.modules.is_empty()
  }

  /// Modules grouped into waves; every module's dependencies sit in earlier
  /// waves, so modules within a wave can be analyzed in parallel.
  ///
  /// Modules keep definition order inside a wave.
  pub fn waves(&self) -> Vec<Vec<&ModuleDef>> {
    let mut in_degree: Vec<usize> = self
      .graph
      .node_indices()
      .map(|node| self.graph.neighbors_directed(node, Direction::Incoming).count())
      .collect();
    let mut remaining: Vec<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let (ready, rest): (Vec<NodeIndex>, Vec<NodeIndex>) =
        remaining.into_iter().partition(|node| in_degree[node.index()] == 0);
      // Construction rejected cycles, so this only guards against a bad graph.
      if ready.is_empty() {
        break;
      }

      for &node in &ready {
        for dependent in self.graph.neighbors_directed(node, Direction::Outgoing) {
          in_degree[dependent.index()] = in_degree[dependent.index()].saturating_sub(1);
        }
      }
      waves.push(ready.iter().map(|&node| &self.modules[self.graph[node]]).collect());
      remaining = rest;
    }

    waves
  }
}
