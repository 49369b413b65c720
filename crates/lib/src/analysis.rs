//! Turning module variants into native rules.
//!
//! Analysis runs wave by wave; the variants of one wave are analyzed in
//! parallel. A delegated module asks the context for Bazel's facts. While
//! they are unknown the variant is provisional: it contributes no rules or
//! outputs, and the request is queued for the next invocation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::execroot;
use crate::context::MixedBuildContext;
use crate::cquery::QueryError;
use crate::module::{Delegation, ModuleDef, ModuleGraph, ModuleKind};
use crate::ninja::Rule;
use crate::platform::Arch;

#[derive(Debug, Error)]
pub enum AnalysisError {
  #[error("module {module:?} ({arch}) has no cmd")]
  NoCommand { module: String, arch: Arch },

  #[error("module {module:?} ({arch}) declares no outputs")]
  NoOutputs { module: String, arch: Arch },

  #[error("module {module:?} ({arch}) depends on {dep:?}, which has no {arch} or common variant")]
  MissingVariant { module: String, dep: String, arch: Arch },

  #[error("bad bazel answer for module {module:?} ({arch}): {source}")]
  Query {
    module: String,
    arch: Arch,
    source: QueryError,
  },

  #[error("module {module:?} ({arch}) has bazel outputs {first:?} and {second:?} that both copy to {dest}")]
  OutputCollision {
    module: String,
    arch: Arch,
    first: String,
    second: String,
    dest: String,
  },
}

/// Where native outputs are placed.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
  pub out_dir: PathBuf,
}

/// Rules and outputs produced by one analysis pass.
#[derive(Debug, Default)]
pub struct Analysis {
  pub rules: Vec<Rule>,
  pub outputs: BTreeMap<(String, Arch), Vec<String>>,
  /// Delegated variants still waiting for Bazel.
  pub provisional: Vec<(String, Arch)>,
}

enum Variant {
  Ready { rules: Vec<Rule>, outputs: Vec<String> },
  Provisional,
}

fn variant_dir(options: &AnalysisOptions, module: &ModuleDef, arch: Arch) -> PathBuf {
  options.out_dir.join(&module.name).join(arch.to_string())
}

fn rule_name(module: &ModuleDef, arch: Arch) -> String {
  format!("{}.{}", module.name, arch)
}

/// Path of a Bazel output relative to its configuration's output root:
/// `bazel-out/<cfg>/bin/pkg/x.h` becomes `pkg/x.h`. Other paths are kept.
fn bazel_relative_path(file: &str) -> &str {
  let Some(rest) = file.strip_prefix("bazel-out/") else {
    return file;
  };
  let Some((_, rest)) = rest.split_once('/') else {
    return file;
  };
  rest
    .strip_prefix("bin/")
    .or_else(|| rest.strip_prefix("genfiles/"))
    .unwrap_or(rest)
}

/// Output files of `dep` visible to a variant built for `arch`.
fn dep_outputs<'a>(
  outputs: &'a BTreeMap<(String, Arch), Vec<String>>,
  module: &ModuleDef,
  dep: &str,
  arch: Arch,
) -> Result<&'a [String], AnalysisError> {
  outputs
    .get(&(dep.to_string(), arch))
    .or_else(|| outputs.get(&(dep.to_string(), Arch::Common)))
    .map(Vec::as_slice)
    .ok_or_else(|| AnalysisError::MissingVariant {
      module: module.name.clone(),
      dep: dep.to_string(),
      arch,
    })
}

fn analyze_native(
  module: &ModuleDef,
  arch: Arch,
  outputs: &BTreeMap<(String, Arch), Vec<String>>,
  options: &AnalysisOptions,
) -> Result<Variant, AnalysisError> {
  let mut inputs = module.srcs.clone();
  for dep in &module.deps {
    inputs.extend(dep_outputs(outputs, module, dep, arch)?.iter().cloned());
  }

  if module.kind == ModuleKind::Filegroup {
    return Ok(Variant::Ready {
      rules: Vec::new(),
      outputs: inputs,
    });
  }

  let cmd = module.cmd.as_deref().ok_or_else(|| AnalysisError::NoCommand {
    module: module.name.clone(),
    arch,
  })?;
  if module.out.is_empty() {
    return Err(AnalysisError::NoOutputs {
      module: module.name.clone(),
      arch,
    });
  }

  let dir = variant_dir(options, module, arch);
  let outs: Vec<String> = module.out.iter().map(|o| dir.join(o).display().to_string()).collect();
  let command = cmd.replace("$(in)", &inputs.join(" ")).replace("$(out)", &outs.join(" "));

  let mut rule = Rule::new(rule_name(module, arch), command).description(format!("{} {}", module.kind.as_str(), module.name));
  for input in &inputs {
    rule = rule.input(input.clone());
  }
  for out in &outs {
    rule = rule.output(out.clone());
  }

  Ok(Variant::Ready {
    rules: vec![rule],
    outputs: outs,
  })
}

fn analyze_delegated(
  module: &ModuleDef,
  label: &str,
  arch: Arch,
  ctx: &dyn MixedBuildContext,
  options: &AnalysisOptions,
) -> Result<Variant, AnalysisError> {
  let files = if module.kind.is_cc() {
    ctx
      .get_cc_info(label, arch)
      .map_err(|e| AnalysisError::Query {
        module: module.name.clone(),
        arch,
        source: e,
      })?
      .map(|info| info.output_files)
  } else {
    ctx.get_output_files(label, arch)
  };

  let Some(files) = files else {
    trace!(module = %module.name, %arch, label, "waiting for bazel");
    return Ok(Variant::Provisional);
  };
  if files.is_empty() {
    return Ok(Variant::Ready {
      rules: Vec::new(),
      outputs: Vec::new(),
    });
  }

  let execroot = ctx.output_base().map(execroot).unwrap_or_default();
  let dir = variant_dir(options, module, arch);
  let mut copied_from: HashMap<String, &String> = HashMap::with_capacity(files.len());
  let mut dirs = BTreeSet::new();
  let mut copies = Vec::with_capacity(files.len());
  let mut rule = Rule::new(rule_name(module, arch), String::new()).description(format!("bazel output {}", module.name));
  let mut outs = Vec::with_capacity(files.len());
  for file in &files {
    let src = execroot.join(file).display().to_string();
    let dst_path = dir.join(bazel_relative_path(file));
    let dst = dst_path.display().to_string();
    if let Some(first) = copied_from.insert(dst.clone(), file) {
      return Err(AnalysisError::OutputCollision {
        module: module.name.clone(),
        arch,
        first: first.clone(),
        second: file.clone(),
        dest: dst,
      });
    }
    dirs.insert(dst_path.parent().unwrap_or(dir.as_path()).display().to_string());
    copies.push(format!(
      "cp -f {} {}",
      shell_escape::unix::escape(src.as_str().into()),
      shell_escape::unix::escape(dst.as_str().into())
    ));
    rule = rule.implicit_input(src).output(dst.clone());
    outs.push(dst);
  }
  let dirs: Vec<String> = dirs
    .iter()
    .map(|d| shell_escape::unix::escape(d.as_str().into()).to_string())
    .collect();
  rule.command = format!("mkdir -p {} && {}", dirs.join(" "), copies.join(" && "));

  Ok(Variant::Ready {
    rules: vec![rule],
    outputs: outs,
  })
}

/// Analyze every variant of every module in `graph`.
///
/// Delegated modules are only consulted through `ctx` when it is enabled;
/// otherwise they are built natively like any other module.
pub fn analyze(graph: &ModuleGraph, ctx: &dyn MixedBuildContext, options: &AnalysisOptions) -> Result<Analysis, AnalysisError> {
  let mut analysis = Analysis::default();

  for wave in graph.waves() {
    let variants: Vec<(&ModuleDef, Arch)> = wave
      .iter()
      .flat_map(|module| module.archs.iter().map(move |&arch| (*module, arch)))
      .collect();

    let outputs = &analysis.outputs;
    let results: Vec<((String, Arch), Variant)> = variants
      .par_iter()
      .map(|&(module, arch)| -> Result<((String, Arch), Variant), AnalysisError> {
        let variant = match module.remote_label(arch) {
          Some(label) if ctx.enabled() => analyze_delegated(module, label, arch, ctx, options)?,
          _ => analyze_native(module, arch, outputs, options)?,
        };
        Ok(((module.name.clone(), arch), variant))
      })
      .collect::<Result<_, _>>()?;

    for (key, variant) in results {
      match variant {
        Variant::Ready { rules, outputs } => {
          analysis.rules.extend(rules);
          analysis.outputs.insert(key, outputs);
        }
        Variant::Provisional => {
          analysis.outputs.insert(key.clone(), Vec::new());
          analysis.provisional.push(key);
        }
      }
    }
  }

  debug!(
    rules = analysis.rules.len(),
    provisional = analysis.provisional.len(),
    "analysis pass complete"
  );
  Ok(analysis)
}
