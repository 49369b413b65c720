//! Rendering an [`ActionGraph`] as a Ninja file plus its `.d` dependency list.

use std::fmt::Write as _;

use super::{ActionGraph, GraphError, Rule};
use crate::consts::APP_NAME;

const NINJA_REQUIRED_VERSION: &str = "1.7.1";

/// Ninja identifier for a rule name: anything outside `[A-Za-z0-9_]` becomes `_`.
pub fn rule_id(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
    .collect()
}

/// Escape a path for a `build` line.
pub fn escape_path(path: &str) -> String {
  let mut escaped = String::with_capacity(path.len());
  for c in path.chars() {
    match c {
      '$' => escaped.push_str("$$"),
      ' ' => escaped.push_str("$ "),
      ':' => escaped.push_str("$:"),
      '\n' => escaped.push_str("$\n"),
      _ => escaped.push(c),
    }
  }
  escaped
}

/// Escape a variable value.
pub fn escape_value(value: &str) -> String {
  value.replace('$', "$$")
}

fn paths(list: &[String]) -> String {
  list.iter().map(|p| escape_path(p)).collect::<Vec<_>>().join(" ")
}

fn write_build_line(out: &mut String, rule_name: &str, rule: &Rule) {
  out.push_str("build");
  if !rule.outputs.is_empty() {
    let _ = write!(out, " {}", paths(&rule.outputs));
  }
  if !rule.implicit_outputs.is_empty() {
    let _ = write!(out, " | {}", paths(&rule.implicit_outputs));
  }
  let _ = write!(out, ": {rule_name}");
  if !rule.inputs.is_empty() {
    let _ = write!(out, " {}", paths(&rule.inputs));
  }
  if !rule.implicit_inputs.is_empty() {
    let _ = write!(out, " | {}", paths(&rule.implicit_inputs));
  }
  out.push('\n');
}

/// Render the graph, rules ordered producers-first.
///
/// # Errors
///
/// Fails if the graph has a cycle.
pub fn render(graph: &ActionGraph) -> Result<String, GraphError> {
  let mut out = String::new();
  let _ = writeln!(out, "# Generated by {APP_NAME}. Do not edit.");
  let _ = writeln!(out, "ninja_required_version = {NINJA_REQUIRED_VERSION}");

  for rule in graph.ordered()? {
    out.push('\n');
    if rule.phony {
      write_build_line(&mut out, "phony", rule);
      continue;
    }

    let id = rule_id(&rule.name);
    let _ = writeln!(out, "rule {id}");
    let _ = writeln!(out, "  command = {}", escape_value(&rule.command));
    if !rule.description.is_empty() {
      let _ = writeln!(out, "  description = {}", escape_value(&rule.description));
    }
    if let Some(depfile) = &rule.depfile {
      let _ = writeln!(out, "  depfile = {}", escape_value(depfile));
      out.push_str("  deps = gcc\n");
    }
    if rule.restat {
      out.push_str("  restat = true\n");
    }
    write_build_line(&mut out, &id, rule);
  }
  Ok(out)
}

/// Make-style dependency list for `target`, e.g. `build.ninja: a b`.
pub fn render_depfile<'a>(target: &str, deps: impl IntoIterator<Item = &'a String>) -> String {
  let escape = |p: &str| p.replace(' ', "\\ ");
  let mut out = format!("{}:", escape(target));
  for dep in deps {
    let _ = write!(out, " \\\n  {}", escape(dep));
  }
  out.push('\n');
  out
}
