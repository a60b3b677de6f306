//! Command implementations and the resolution flags they share.

mod classpath;
mod diff;
mod run;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use thinlaunch_lib::consts::DEFAULT_LAYER_NAME;
use thinlaunch_lib::coordinate::Coordinate;
use thinlaunch_lib::launcher::LaunchOptions;
use thinlaunch_lib::platform::paths;
use thinlaunch_lib::resolve::{PlannerOptions, RepositoryConfig, SharedResolver};

pub use classpath::cmd_classpath;
pub use diff::cmd_diff;
pub use run::{cmd_plan, cmd_run};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ClasspathFormat {
  #[default]
  Path,
  Properties,
}

/// Flags controlling where artifacts come from and which overrides apply.
#[derive(Debug, Clone, Args)]
pub struct ResolveArgs {
  /// Base name of the override files (<name>[-<profile>].properties)
  #[arg(long, default_value = DEFAULT_LAYER_NAME)]
  pub name: String,

  /// Override profiles, in increasing precedence (default: $THIN_PROFILE)
  #[arg(short, long = "profile", value_delimiter = ',')]
  pub profiles: Vec<String>,

  /// Artifact cache root (default: $THIN_ROOT, then the user cache dir)
  #[arg(long)]
  pub root: Option<PathBuf>,

  /// Remote repository directory, searched in order (default: $THIN_REPOS)
  #[arg(long = "repo")]
  pub repos: Vec<PathBuf>,

  /// Extra directory searched for override files
  #[arg(long = "location")]
  pub locations: Vec<PathBuf>,

  /// Only use artifacts already in the cache (default: $THIN_OFFLINE)
  #[arg(long)]
  pub offline: bool,

  /// Resolve even when the archive carries a computed classpath
  #[arg(long)]
  pub force: bool,

  /// Constraint import applied when the manifest declares none
  #[arg(long)]
  pub default_import: Option<Coordinate>,

  /// Property override, applied after every profile
  #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_property)]
  pub properties: Vec<(String, String)>,
}

impl ResolveArgs {
  pub fn profiles(&self) -> Vec<String> {
    if self.profiles.is_empty() {
      paths::profiles()
    } else {
      self.profiles.clone()
    }
  }

  pub fn properties(&self) -> BTreeMap<String, String> {
    self.properties.iter().cloned().collect()
  }

  pub fn repository_config(&self) -> Result<RepositoryConfig> {
    let mut config = match &self.root {
      Some(root) => RepositoryConfig {
        root: root.clone(),
        remotes: paths::remote_repositories(),
        offline: paths::offline(),
      },
      None => RepositoryConfig::from_env().context("Failed to locate the artifact cache")?,
    };
    if !self.repos.is_empty() {
      config.remotes = self.repos.clone();
    }
    config.offline |= self.offline;
    Ok(config)
  }

  pub fn resolver(&self) -> Result<SharedResolver> {
    Ok(SharedResolver::new(self.repository_config()?))
  }

  pub fn launch_options(&self) -> LaunchOptions {
    LaunchOptions {
      name: self.name.clone(),
      profiles: self.profiles(),
      properties: self.properties(),
      locations: self.locations.clone(),
      planner: PlannerOptions {
        default_import: self.default_import.clone(),
        force: self.force,
      },
    }
  }
}

fn parse_property(value: &str) -> Result<(String, String), String> {
  let (key, value) = value
    .split_once('=')
    .ok_or_else(|| format!("expected KEY=VALUE, got '{value}'"))?;
  let key = key.trim();
  if key.is_empty() {
    return Err("property key must not be empty".to_string());
  }
  Ok((key.to_string(), value.to_string()))
}
