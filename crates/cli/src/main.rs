mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{ClasspathFormat, ResolveArgs};

/// Resolve and run thin archives
#[derive(Parser)]
#[command(name = "thin")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output as JSON
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve an archive's dependencies and run it
  Run {
    /// Archive file or exploded directory
    archive: PathBuf,

    #[command(flatten)]
    resolve: ResolveArgs,

    /// Resolve and print the plan without launching
    #[arg(long)]
    dry_run: bool,

    /// How long to wait for the application to start (e.g. 30s, 2m)
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Arguments passed to the application
    #[arg(last = true)]
    args: Vec<String>,
  },

  /// Print the classpath of an archive
  Classpath {
    archive: PathBuf,

    #[command(flatten)]
    resolve: ResolveArgs,

    /// Path list, or a computed override file that skips resolution next time
    #[arg(long, value_enum, default_value_t = ClasspathFormat::Path)]
    format: ClasspathFormat,
  },

  /// List the artifacts an archive needs beyond those of a parent archive
  Diff {
    /// Archive whose additional artifacts are listed
    child: PathBuf,

    /// Archive whose artifacts are already available
    #[arg(long)]
    parent: PathBuf,

    #[command(flatten)]
    resolve: ResolveArgs,
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
    Commands::Run {
      archive,
      resolve,
      dry_run,
      timeout,
      args,
    } => {
      if dry_run {
        cmd::cmd_plan(&archive, &resolve, cli.verbose, cli.json)
      } else {
        cmd::cmd_run(&archive, &resolve, timeout, args, cli.json)
      }
    }
    Commands::Classpath {
      archive,
      resolve,
      format,
    } => cmd::cmd_classpath(&archive, &resolve, format, cli.json),
    Commands::Diff { child, parent, resolve } => cmd::cmd_diff(&parent, &child, &resolve, cli.verbose, cli.json),
  }
}
