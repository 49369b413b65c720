//! The native action graph handed to the low-level executor.
//!
//! Rules are registered by native analysis and by the splicer, validated for
//! unique names and outputs, and rendered in dependency order by
//! [`writer::render`].

pub mod writer;

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("rule {0:?} is already defined")]
  DuplicateRule(String),

  #[error("output {output} is produced by both {first:?} and {second:?}")]
  DuplicateOutput {
    output: String,
    first: String,
    second: String,
  },

  #[error("rule {rule:?} lists output {output} more than once")]
  RepeatedOutput { rule: String, output: String },

  #[error("rule {0:?} has no outputs")]
  NoOutputs(String),

  #[error("dependency cycle through rule {0:?}")]
  Cycle(String),
}

/// One executable build step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rule {
  pub name: String,
  pub description: String,
  pub command: String,
  pub outputs: Vec<String>,
  pub implicit_outputs: Vec<String>,
  pub inputs: Vec<String>,
  pub implicit_inputs: Vec<String>,
  pub depfile: Option<String>,
  /// Re-stat outputs after running; unchanged outputs do not dirty dependents.
  pub restat: bool,
  /// An alias with no command.
  pub phony: bool,
}

impl Rule {
  pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      command: command.into(),
      ..Default::default()
    }
  }

  /// A rule that only groups `inputs` under `outputs`.
  pub fn phony(name: impl Into<String>, outputs: Vec<String>, inputs: Vec<String>) -> Self {
    Self {
      name: name.into(),
      outputs,
      inputs,
      phony: true,
      ..Default::default()
    }
  }

  pub fn description(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  pub fn output(mut self, path: impl Into<String>) -> Self {
    self.outputs.push(path.into());
    self
  }

  pub fn implicit_output(mut self, path: impl Into<String>) -> Self {
    self.implicit_outputs.push(path.into());
    self
  }

  pub fn input(mut self, path: impl Into<String>) -> Self {
    self.inputs.push(path.into());
    self
  }

  pub fn implicit_input(mut self, path: impl Into<String>) -> Self {
    self.implicit_inputs.push(path.into());
    self
  }

  pub fn depfile(mut self, path: impl Into<String>) -> Self {
    self.depfile = Some(path.into());
    self
  }

  pub fn restat(mut self) -> Self {
    self.restat = true;
    self
  }

  pub fn all_outputs(&self) -> impl Iterator<Item = &String> {
    self.outputs.iter().chain(&self.implicit_outputs)
  }

  pub fn all_inputs(&self) -> impl Iterator<Item = &String> {
    self.inputs.iter().chain(&self.implicit_inputs)
  }
}

#[derive(Debug, Default)]
pub struct ActionGraph {
  rules: Vec<Rule>,
  producers: HashMap<String, usize>,
  rule_ids: HashSet<String>,
  ninja_file_deps: BTreeSet<String>,
}

impl ActionGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a rule.
  ///
  /// # Errors
  ///
  /// Rule names must be unique after sanitizing for Ninja, every rule needs
  /// an output, and no output may have two producers or appear twice in
  /// one rule.
  pub fn add_rule(&mut self, rule: Rule) -> Result<(), GraphError> {
    if rule.all_outputs().next().is_none() {
      return Err(GraphError::NoOutputs(rule.name));
    }
    let rule_id = writer::rule_id(&rule.name);
    if self.rule_ids.contains(&rule_id) {
      return Err(GraphError::DuplicateRule(rule.name));
    }
    let mut seen = BTreeSet::new();
    for output in rule.all_outputs() {
      if !seen.insert(output) {
        return Err(GraphError::RepeatedOutput {
          rule: rule.name.clone(),
          output: output.clone(),
        });
      }
      if let Some(&first) = self.producers.get(output) {
        return Err(GraphError::DuplicateOutput {
          output: output.clone(),
          first: self.rules[first].name.clone(),
          second: rule.name.clone(),
        });
      }
    }

    let index = self.rules.len();
    for output in rule.all_outputs() {
      self.producers.insert(output.clone(), index);
    }
    self.rule_ids.insert(rule_id);
    self.rules.push(rule);
    Ok(())
  }

  /// Files whose change must regenerate the Ninja file itself.
  pub fn add_ninja_file_deps(&mut self, deps: impl IntoIterator<Item = String>) {
    self.ninja_file_deps.extend(deps);
  }

  pub fn ninja_file_deps(&self) -> impl Iterator<Item = &String> {
    self.ninja_file_deps.iter()
  }

  pub fn rules(&self) -> &[Rule] {
    &self.rules
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  /// The rule producing `path`, if any.
  pub fn producer(&self, path: &str) -> Option<&Rule> {
    self.producers.get(path).map(|&index| &self.rules[index])
  }

  fn dependency_graph(&self) -> DiGraph<usize, ()> {
    let mut graph = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..self.rules.len()).map(|i| graph.add_node(i)).collect();
    for (index, rule) in self.rules.iter().enumerate() {
      for input in rule.all_inputs() {
        if let Some(&producer) = self.producers.get(input) {
          graph.add_edge(nodes[producer], nodes[index], ());
        }
      }
    }
    graph
  }

  /// Rules with every producer before its consumers.
  ///
  /// # Errors
  ///
  /// Returns [`GraphError::Cycle`] naming a rule on the cycle.
  pub fn ordered(&self) -> Result<Vec<&Rule>, GraphError> {
    let graph = self.dependency_graph();
    let sorted = toposort(&graph, None).map_err(|cycle| GraphError::Cycle(self.rules[graph[cycle.node_id()]].name.clone()))?;
    Ok(sorted.into_iter().map(|node| &self.rules[graph[node]]).collect())
  }

  /// Names of the rules that would run after `touched` files changed.
  ///
  /// A rule runs when any input changed. Its outputs then count as changed,
  /// unless it is a restat rule and `output_changed` reports every output
  /// identical to before, in which case its dependents stay clean.
  pub fn dirty_rules<F>(&self, touched: &[&str], output_changed: F) -> Result<BTreeSet<String>, GraphError>
  where
    F: Fn(&str) -> bool,
  {
    let mut changed: HashSet<&str> = touched.iter().copied().collect();
    let mut dirty = BTreeSet::new();

    for rule in self.ordered()? {
      if !rule.all_inputs().any(|input| changed.contains(input.as_str())) {
        continue;
      }
      dirty.insert(rule.name.clone());
      if !rule.restat || rule.all_outputs().any(|output| output_changed(output)) {
        changed.extend(rule.all_outputs().map(String::as_str));
      }
    }
    Ok(dirty)
  }
}
