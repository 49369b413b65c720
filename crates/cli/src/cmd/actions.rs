use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use mixbuild_lib::aquery::parse_build_statements;

pub fn cmd_actions(file: &Path, json: bool) -> Result<()> {
  let raw = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
  let statements = parse_build_statements(&raw).context("Failed to parse action graph")?;

  if json {
    let out = serde_json::to_string_pretty(&statements).context("Failed to serialize build statements")?;
    println!("{}", out);
    return Ok(());
  }

  println!("Actions: {}", statements.len());
  for statement in &statements {
    println!("{}: {}", statement.mnemonic, statement.output_paths.join(" "));
    if let Some(depfile) = &statement.depfile {
      println!("  depfile: {}", depfile);
    }
  }

  Ok(())
}
