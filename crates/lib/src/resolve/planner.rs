//! Resolution planning.
//!
//! Combines a [`ResolvedManifest`] with an [`OverrideLayer`] into a
//! [`ResolveRequest`], submits it to a [`Resolver`], and computes the
//! incremental artifact set of a child application against a parent.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::{ResolveError, ResolveRequest, ResolvedArtifact, ResolvedSet, Resolver};
use crate::coordinate::Coordinate;
use crate::manifest::{Dependency, ResolvedManifest};
use crate::overrides::{DirectiveKind, OverrideDirective, OverrideError, OverrideLayer};

/// Errors that can occur while planning or running a resolution.
#[derive(Debug, Error)]
pub enum PlanError {
  #[error(transparent)]
  Override(#[from] OverrideError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),
}

/// Planner configuration.
#[derive(Debug, Clone, Default)]
pub struct PlannerOptions {
  /// Constraint import added when neither the manifest nor the overrides
  /// declare one.
  pub default_import: Option<Coordinate>,
  /// Resolve even when the override layer is marked computed.
  pub force: bool,
}

/// A request ready for the resolver, with the directives that shaped it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionPlan {
  pub request: ResolveRequest,
  /// The layer already lists the full artifact set; the graph is not walked.
  pub computed: bool,
  pub directives: Vec<OverrideDirective>,
}

/// Builds resolution requests and runs them against a resolver.
pub struct ResolutionPlanner<'a> {
  resolver: &'a dyn Resolver,
  options: PlannerOptions,
}

impl<'a> ResolutionPlanner<'a> {
  pub fn new(resolver: &'a dyn Resolver, options: PlannerOptions) -> Self {
    Self { resolver, options }
  }

  pub fn options(&self) -> &PlannerOptions {
    &self.options
  }

  /// Build the request for a manifest under an override layer.
  ///
  /// 1. Add and pin directives replace same-key entries or append new ones.
  /// 2. Exclude directives become wildcard exclusions on every dependency and
  ///    remove the matching direct dependency.
  /// 3. With no constraint import left, the configured default is added.
  ///
  /// A computed layer (unless forced) replaces the manifest's dependencies
  /// with the layer's own list.
  pub fn plan(&self, manifest: &ResolvedManifest, layer: &OverrideLayer) -> Result<ResolutionPlan, PlanError> {
    let directives = layer.directives(&manifest.properties)?;
    let computed = layer.is_computed() && !self.options.force;
    if layer.is_computed() && self.options.force {
      info!(manifest = %manifest.coordinate, "ignoring computed override layer");
    }

    let mut request = ResolveRequest {
      dependencies: if computed {
        Vec::new()
      } else {
        manifest.dependencies.clone()
      },
      imports: manifest.imports.clone(),
      managed: manifest.managed.clone(),
      transitive: layer.is_transitive(),
    };

    for directive in &directives {
      match &directive.kind {
        DirectiveKind::AddDependency(c) => {
          let dependency = Dependency::new(c.clone());
          match request.dependencies.iter_mut().find(|d| d.key() == dependency.key()) {
            Some(existing) => {
              debug!(from = %existing.coordinate, to = %c, profile = %directive.profile, "replacing dependency");
              existing.coordinate = c.clone();
            }
            None => request.dependencies.push(dependency),
          }
        }
        DirectiveKind::PinConstraint(c) => replace_or_push(&mut request.imports, c),
        DirectiveKind::PinManaged(c) => replace_or_push(&mut request.managed, c),
        DirectiveKind::ExcludeDependency(_) => {}
      }
    }

    for directive in &directives {
      if let DirectiveKind::ExcludeDependency(key) = &directive.kind {
        request.dependencies.retain(|d| {
          let keep = !key.matches(&d.key());
          if !keep {
            debug!(dependency = %d.coordinate, profile = %directive.profile, "removing excluded dependency");
          }
          keep
        });
        for dependency in &mut request.dependencies {
          dependency.exclusions.insert(key.clone());
        }
      }
    }

    if request.imports.is_empty()
      && let Some(default) = &self.options.default_import
    {
      debug!(import = %default, "adding default constraint import");
      request.imports.push(default.clone());
    }

    Ok(ResolutionPlan {
      request,
      computed,
      directives,
    })
  }

  /// Run a plan.
  ///
  /// A computed plan fetches each listed artifact directly; otherwise the
  /// whole request goes to the resolver.
  pub fn execute(&self, plan: &ResolutionPlan) -> Result<ResolvedSet, ResolveError> {
    if !plan.computed {
      return self.resolver.resolve(&plan.request);
    }

    debug!(count = plan.request.dependencies.len(), "using computed dependency set");
    let mut resolved = ResolvedSet::new();
    for dependency in &plan.request.dependencies {
      let coordinate = &dependency.coordinate;
      if coordinate.version.is_none() {
        return Err(ResolveError::MissingVersion(coordinate.key()));
      }
      let file = match self.resolver.resolve_one(coordinate) {
        Ok(file) => Some(file),
        Err(e) if dependency.optional => {
          warn!(coordinate = %coordinate, error = %e, "skipping unresolved optional artifact");
          None
        }
        Err(e) => return Err(e),
      };
      let mut artifact = ResolvedArtifact::new(coordinate.clone(), file);
      artifact.exclusions = dependency.exclusions.clone();
      resolved.insert(artifact);
    }
    Ok(resolved)
  }

  /// Plan and run in one step.
  pub fn resolve(&self, manifest: &ResolvedManifest, layer: &OverrideLayer) -> Result<ResolvedSet, PlanError> {
    let plan = self.plan(manifest, layer)?;
    Ok(self.execute(&plan)?)
  }

  /// Artifacts the child needs beyond what the parent already provides.
  ///
  /// The child inherits the parent's constraint imports, and each child
  /// dependency that the parent also declares picks up the parent's
  /// exclusions for it. The result is the child's resolved set minus every
  /// entry the parent resolved at the same version.
  pub fn subtract(&self, parent: &ResolutionPlan, child: &ResolutionPlan) -> Result<ResolvedSet, ResolveError> {
    let parent_set = self.execute(parent)?;

    let mut child = child.clone();
    for import in &parent.request.imports {
      if !child.request.imports.iter().any(|c| c.key() == import.key()) {
        child.request.imports.push(import.clone());
      }
    }
    for dependency in &mut child.request.dependencies {
      if let Some(inherited) = parent.request.dependencies.iter().find(|d| d.key() == dependency.key()) {
        dependency.exclusions.extend(inherited.exclusions.iter().cloned());
      }
    }

    let child_set = self.execute(&child)?;
    let diff = child_set.subtract(&parent_set);
    debug!(
      parent = parent_set.len(),
      child = child_set.len(),
      incremental = diff.len(),
      "computed incremental artifacts"
    );
    Ok(diff)
  }
}

fn replace_or_push(entries: &mut Vec<Coordinate>, coordinate: &Coordinate) {
  match entries.iter_mut().find(|c| c.key() == coordinate.key()) {
    Some(existing) => *existing = coordinate.clone(),
    None => entries.push(coordinate.clone()),
  }
}
