mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{cmd_actions, cmd_build, cmd_scripts};

/// mixbuild - splice Bazel-built modules into a native ninja build
#[derive(Parser)]
#[command(name = "mixbuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Analyze a module list and write build.ninja
  Build {
    /// Module list in JSON
    #[arg(long)]
    modules: PathBuf,

    /// Native output directory
    #[arg(long, default_value = "out")]
    out: PathBuf,

    /// File the module list was generated from; tracked as a ninja file dependency
    #[arg(long)]
    module_list: Option<PathBuf>,
  },

  /// Write the Bazel scripts for a module list without invoking Bazel
  Scripts {
    /// Module list in JSON
    #[arg(long)]
    modules: PathBuf,

    /// Native output directory
    #[arg(long, default_value = "out")]
    out: PathBuf,
  },

  /// Print the build statements of a saved `aquery --output=jsonproto` dump
  Actions {
    /// Path to the aquery output
    file: PathBuf,

    /// Print statements as JSON
    #[arg(long)]
    json: bool,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Build {
      modules,
      out,
      module_list,
    } => cmd_build(&modules, &out, module_list.as_deref()),
    Commands::Scripts { modules, out } => cmd_scripts(&modules, &out),
    Commands::Actions { file, json } => cmd_actions(&file, json),
  }
}
