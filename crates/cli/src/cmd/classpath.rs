//! `thin classpath`: print the assembled classpath.

use std::path::Path;

use anyhow::{Context, Result};

use thinlaunch_lib::launcher::Launcher;

use super::{ClasspathFormat, ResolveArgs};
use crate::output::print_json;

pub fn cmd_classpath(archive: &Path, args: &ResolveArgs, format: ClasspathFormat, json: bool) -> Result<()> {
  let resolver = args.resolver()?;
  let prepared = Launcher::new(&resolver, args.launch_options())
    .prepare(archive)
    .with_context(|| format!("Failed to resolve {}", archive.display()))?;

  if json {
    return print_json(&prepared.classpath);
  }

  match format {
    ClasspathFormat::Path => {
      let path = prepared
        .classpath
        .to_path_string()
        .context("Classpath contains a path that cannot be joined")?;
      println!("{}", path.to_string_lossy());
    }
    ClasspathFormat::Properties => print!("{}", prepared.computed_layer().to_properties_string()),
  }
  Ok(())
}
