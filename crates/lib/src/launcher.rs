//! From an archive on disk to a classpath.
//!
//! [`Launcher::prepare`] runs the whole pipeline:
//! 1. Open the archive and read its manifest
//! 2. Fold in the parent chain ([`ManifestReader`])
//! 3. Load the override layer for the requested profiles
//! 4. Plan and resolve ([`ResolutionPlanner`])
//! 5. Assemble the classpath

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::archive::Archive;
use crate::classpath::{self, Classpath};
use crate::consts::DEFAULT_LAYER_NAME;
use crate::error::LaunchError;
use crate::manifest::{ManifestReader, ResolvedManifest};
use crate::overrides::{LayerLoader, OverrideLayer};
use crate::resolve::{PlannerOptions, ResolutionPlan, ResolutionPlanner, ResolvedSet, Resolver};

/// What to load and how.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
  /// Base name of the override files.
  pub name: String,
  pub profiles: Vec<String>,
  /// Caller overrides, applied after every profile.
  pub properties: BTreeMap<String, String>,
  /// External directories searched for override files.
  pub locations: Vec<PathBuf>,
  pub planner: PlannerOptions,
}

impl Default for LaunchOptions {
  fn default() -> Self {
    Self {
      name: DEFAULT_LAYER_NAME.to_string(),
      profiles: Vec::new(),
      properties: BTreeMap::new(),
      locations: Vec::new(),
      planner: PlannerOptions::default(),
    }
  }
}

/// Everything known about an archive once it is ready to launch.
#[derive(Debug, Clone, Serialize)]
pub struct Prepared {
  #[serde(skip)]
  pub archive: Archive,
  pub manifest: ResolvedManifest,
  #[serde(skip)]
  pub layer: OverrideLayer,
  pub plan: ResolutionPlan,
  pub resolved: ResolvedSet,
  pub classpath: Classpath,
}

impl Prepared {
  /// Properties handed to the application: manifest properties, overlaid by
  /// the layer's plain properties.
  pub fn properties(&self) -> BTreeMap<String, String> {
    let mut properties = self.manifest.properties.clone();
    properties.extend(self.layer.plain_properties());
    properties
  }

  /// The resolved set as a computed override layer.
  pub fn computed_layer(&self) -> OverrideLayer {
    OverrideLayer::computed_from(&self.resolved, &self.layer)
  }
}

pub struct Launcher<'a> {
  resolver: &'a dyn Resolver,
  options: LaunchOptions,
}

impl<'a> Launcher<'a> {
  pub fn new(resolver: &'a dyn Resolver, options: LaunchOptions) -> Self {
    Self { resolver, options }
  }

  pub fn options(&self) -> &LaunchOptions {
    &self.options
  }

  /// Read the archive, its manifest and its override layer, and plan the
  /// resolution without running it.
  pub fn plan(&self, resource: &Path) -> Result<(Archive, ResolvedManifest, OverrideLayer, ResolutionPlan), LaunchError> {
    let archive = Archive::open(resource)?;
    let manifest = ManifestReader::new(self.resolver).resolve(&archive.manifest()?)?;
    debug!(coordinate = %manifest.coordinate, ancestors = manifest.ancestors.len(), "read manifest");

    let mut layer = LayerLoader::new(&self.options.name)
      .profiles(self.options.profiles.iter().cloned())
      .locations(self.options.locations.clone())
      .load(Some(&archive))?;
    layer.apply_overrides(&self.options.properties);

    let plan = self.planner().plan(&manifest, &layer)?;
    Ok((archive, manifest, layer, plan))
  }

  /// Run the full pipeline.
  pub fn prepare(&self, resource: &Path) -> Result<Prepared, LaunchError> {
    let (archive, manifest, layer, plan) = self.plan(resource)?;
    let resolved = self.planner().execute(&plan)?;
    let classpath = classpath::assemble(&archive, &resolved);
    info!(
      archive = %resource.display(),
      coordinate = %manifest.coordinate,
      artifacts = resolved.len(),
      computed = plan.computed,
      "prepared classpath"
    );
    Ok(Prepared {
      archive,
      manifest,
      layer,
      plan,
      resolved,
      classpath,
    })
  }

  /// Artifacts `child` needs beyond those of `parent`.
  pub fn diff(&self, parent: &Path, child: &Path) -> Result<ResolvedSet, LaunchError> {
    let (_, _, _, parent_plan) = self.plan(parent)?;
    let (_, _, _, child_plan) = self.plan(child)?;
    Ok(self.planner().subtract(&parent_plan, &child_plan)?)
  }

  fn planner(&self) -> ResolutionPlanner<'a> {
    ResolutionPlanner::new(self.resolver, self.options.planner.clone())
  }
}
