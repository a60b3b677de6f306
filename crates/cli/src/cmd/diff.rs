//! `thin diff`: artifacts a child archive adds on top of a parent.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use thinlaunch_lib::launcher::Launcher;

use super::ResolveArgs;
use crate::output::{print_info, print_json, symbols};

pub fn cmd_diff(parent: &Path, child: &Path, args: &ResolveArgs, verbose: bool, json: bool) -> Result<()> {
  let resolver = args.resolver()?;
  let added = Launcher::new(&resolver, args.launch_options())
    .diff(parent, child)
    .with_context(|| format!("Failed to compare {} with {}", child.display(), parent.display()))?;

  if json {
    return print_json(&added);
  }

  if added.is_empty() {
    print_info("No additional artifacts.");
    return Ok(());
  }

  for artifact in &added {
    println!(
      "  {} {}",
      symbols::PLUS.if_supports_color(Stream::Stdout, |s| s.green()),
      artifact.coordinate
    );
    if verbose && let Some(file) = &artifact.file {
      println!("      {}", file.display().if_supports_color(Stream::Stdout, |s| s.dimmed()));
    }
  }
  Ok(())
}
