mod cmd;
mod output;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use keel_lib::consts::{DEFINITION_FILE, EXIT_CONFIG_ERROR};

use crate::cmd::{cmd_host, cmd_list, cmd_plan, cmd_run};
use crate::output::print_error;

/// keel - dependency-ordered build target runner
#[derive(Parser)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose logging (ignored when RUST_LOG is set)
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Path to the build definition
  #[arg(short, long, global = true, default_value = DEFINITION_FILE)]
  file: PathBuf,

  /// Force a host type instead of detecting one (e.g. terminal, github-actions)
  #[arg(long, global = true)]
  host: Option<String>,

  #[command(subcommand)]
  command: Commands,
}

/// Target selection shared by `run` and `plan`.
#[derive(Args, Debug, Clone, Default)]
pub struct Selection {
  /// Targets to run (default target when empty)
  pub targets: Vec<String>,

  /// Skip the named targets; with no names, skip everything not requested
  #[arg(long, num_args = 0.., value_delimiter = ',')]
  pub skip: Option<Vec<String>>,

  /// Set a parameter (NAME=VALUE), repeatable
  #[arg(short, long = "param", value_name = "NAME=VALUE")]
  pub params: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
  /// Execute targets and their dependencies
  Run {
    #[command(flatten)]
    selection: Selection,

    /// Keep executing independent targets after a failure
    #[arg(long = "continue")]
    continue_on_failure: bool,
  },

  /// Show the execution order without running anything
  Plan {
    #[command(flatten)]
    selection: Selection,

    /// Print the plan as JSON
    #[arg(long)]
    json: bool,
  },

  /// List declared targets and parameters
  List,

  /// Show the detected host type
  Host,
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let host = cli.host.as_deref();
  let result = match cli.command {
    Commands::Run {
      selection,
      continue_on_failure,
    } => cmd_run(&cli.file, host, &selection, continue_on_failure),
    Commands::Plan { selection, json } => cmd_plan(&cli.file, host, &selection, json),
    Commands::List => cmd_list(&cli.file),
    Commands::Host => cmd_host(host),
  };

  // Anything that fails before a target runs is a configuration problem.
  let code = match result {
    Ok(code) => code,
    Err(err) => {
      print_error(&format!("{err:#}"));
      EXIT_CONFIG_ERROR
    }
  };
  std::process::exit(code);
}
