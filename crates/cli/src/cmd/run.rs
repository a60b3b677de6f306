//! `thin run`: resolve an archive and host it until it stops.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::debug;

use thinlaunch_lib::host::{CommandEntryPoint, DeployRequest, EntryPoints, HostConfig, LaunchState, RuntimeHost};
use thinlaunch_lib::launcher::Launcher;

use super::ResolveArgs;
use crate::output::{print_info, print_json, print_stat, print_state, print_success, symbols};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Resolve only and report what would be launched.
pub fn cmd_plan(archive: &Path, args: &ResolveArgs, verbose: bool, json: bool) -> Result<()> {
  let resolver = args.resolver()?;
  let prepared = Launcher::new(&resolver, args.launch_options())
    .prepare(archive)
    .with_context(|| format!("Failed to resolve {}", archive.display()))?;

  if json {
    return print_json(&prepared);
  }

  print_success(&format!("Resolved {}", prepared.manifest.coordinate));
  print_stat("Artifacts", &prepared.resolved.len().to_string());
  print_stat("Computed", &prepared.plan.computed.to_string());
  if let Some(main) = &prepared.manifest.launch.main {
    print_stat("Main", main);
  }
  if let Some(entry) = &prepared.manifest.launch.entry {
    print_stat("Entry point", entry);
  }

  if verbose && !prepared.plan.directives.is_empty() {
    println!();
    println!("Overrides:");
    for directive in &prepared.plan.directives {
      let profile = if directive.profile.is_empty() {
        "base"
      } else {
        directive.profile.as_str()
      };
      println!("  {} {} ({})", symbols::INFO, directive.kind, profile);
    }
  }

  println!();
  println!("Classpath:");
  for entry in prepared.classpath.entries() {
    println!("  {} {}", symbols::INFO, entry);
  }
  Ok(())
}

/// Deploy the archive through the command entry point and wait for it.
pub fn cmd_run(
  archive: &Path,
  args: &ResolveArgs,
  timeout: Option<Duration>,
  app_args: Vec<String>,
  json: bool,
) -> Result<()> {
  let resolver = Arc::new(args.resolver()?);
  let mut config = HostConfig {
    launch: args.launch_options(),
    ..Default::default()
  };
  if let Some(timeout) = timeout {
    config.launch_timeout = timeout;
  }
  let host = RuntimeHost::new(resolver, EntryPoints::new().with(Arc::new(CommandEntryPoint)), config);

  let mut request = DeployRequest::new(archive)
    .name(&args.name)
    .profiles(args.profiles())
    .args(app_args);
  request.properties = args.properties();

  let started = Instant::now();
  let id = host
    .deploy(request)
    .with_context(|| format!("Failed to launch {}", archive.display()))?;
  if !json {
    print_info(&format!("Launched {} as {}", archive.display(), id));
  }

  let status = loop {
    let status = host.status(&id)?;
    if !status.state.is_running() {
      debug!(id = %id, state = %status.state, launches = status.launches, "instance stopped");
      break status;
    }
    thread::sleep(POLL_INTERVAL);
  };

  if json {
    print_json(&status)?;
  } else {
    print_state(&status.id.0, status.state, status.error.as_deref());
    let elapsed = Duration::from_millis(started.elapsed().as_millis() as u64);
    print_stat("Elapsed", &humantime::format_duration(elapsed).to_string());
  }

  match status.state {
    LaunchState::Complete => Ok(()),
    state => bail!("application ended in state {}", state),
  }
}
