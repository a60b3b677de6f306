//! Manifest resolution.
//!
//! Turns a [`Manifest`] into a [`ResolvedManifest`]:
//! 1. Walk the parent chain through the resolver (best effort)
//! 2. Merge properties root-first so descendants win on conflict
//! 3. Expand property references and substitute every placeholder
//! 4. Merge constraint imports, managed pins, and dependencies by key,
//!    descendant declarations first
//! 5. Drop `test` and `provided` dependencies; move `import`-scoped ones to
//!    the constraint imports
//!
//! A parent that cannot be fetched is logged and skipped. Parent
//! contributions are an enhancement, not a requirement.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, warn};

use super::types::{Dependency, DependencySpec, LaunchSpec, Manifest, ManifestError, ResolvedManifest, Scope};
use crate::consts::MAX_PARENT_DEPTH;
use crate::coordinate::{ArtifactKey, Coordinate};
use crate::placeholder::{expand_properties, substitute};
use crate::resolve::Resolver;

/// Reads manifests and folds in their ancestors.
pub struct ManifestReader<'a> {
  resolver: Option<&'a dyn Resolver>,
}

impl<'a> ManifestReader<'a> {
  /// A reader that fetches parents through `resolver`.
  pub fn new(resolver: &'a dyn Resolver) -> Self {
    Self {
      resolver: Some(resolver),
    }
  }

  /// A reader that ignores parent references.
  pub fn standalone() -> Self {
    Self { resolver: None }
  }

  /// Resolve a manifest against its parent chain.
  ///
  /// # Errors
  ///
  /// Returns [`ManifestError`] if a placeholder cannot be resolved or a
  /// coordinate is malformed. A missing parent is not an error.
  pub fn resolve(&self, manifest: &Manifest) -> Result<ResolvedManifest, ManifestError> {
    let chain = self.parent_chain(manifest);
    let label = manifest.coordinate.clone();

    // Root-first so that nearer declarations overwrite ancestors.
    let mut raw_properties = BTreeMap::new();
    for m in chain.iter().rev() {
      raw_properties.extend(m.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    let mut properties = expand_properties(&raw_properties).map_err(|source| ManifestError::Placeholder {
      manifest: label.clone(),
      field: "properties".to_string(),
      source,
    })?;

    let coordinate = resolve_coordinate(&manifest.coordinate, &properties, &label, "coordinate")?;
    properties.extend(implicit_properties(&coordinate));
    let properties = expand_properties(&properties).map_err(|source| ManifestError::Placeholder {
      manifest: label.clone(),
      field: "properties".to_string(),
      source,
    })?;

    let mut imports = Vec::new();
    let mut managed = Vec::new();
    let mut dependencies = Vec::new();
    let mut seen_imports = HashSet::new();
    let mut seen_managed = HashSet::new();
    let mut seen_deps = HashSet::new();

    for m in &chain {
      for raw in &m.imports {
        let c = resolve_coordinate(raw, &properties, &label, "imports")?;
        if seen_imports.insert(c.key()) {
          imports.push(c);
        }
      }
      for raw in &m.managed {
        let c = resolve_coordinate(raw, &properties, &label, "managed")?;
        if seen_managed.insert(c.key()) {
          managed.push(c);
        }
      }
      for spec in &m.dependencies {
        let dependency = resolve_dependency(spec, &properties, &label)?;
        if !seen_deps.insert(dependency.key()) {
          continue;
        }
        match dependency.scope {
          Scope::Import => {
            if seen_imports.insert(dependency.key()) {
              imports.push(dependency.coordinate);
            }
          }
          scope if !scope.is_runtime() => {
            debug!(dependency = %dependency.coordinate, ?scope, "dropping non-runtime dependency");
          }
          _ => dependencies.push(dependency),
        }
      }
    }

    let launch = chain
      .iter()
      .filter_map(|m| m.launch.as_ref())
      .fold(LaunchSpec::default(), |acc, spec| LaunchSpec {
        main: acc.main.or_else(|| spec.main.clone()),
        entry: acc.entry.or_else(|| spec.entry.clone()),
      });

    let mut ancestors = Vec::new();
    for m in chain.iter().skip(1) {
      // Ancestor coordinates were already parsed while walking the chain.
      if let Ok(c) = resolve_coordinate(&m.coordinate, &properties, &label, "parent") {
        ancestors.push(c);
      }
    }

    debug!(
      manifest = %coordinate,
      ancestors = ancestors.len(),
      dependencies = dependencies.len(),
      imports = imports.len(),
      "resolved manifest"
    );

    Ok(ResolvedManifest {
      coordinate,
      properties,
      dependencies,
      imports,
      managed,
      launch,
      ancestors,
    })
  }

  /// The manifest followed by its ancestors, nearest first.
  fn parent_chain(&self, manifest: &Manifest) -> Vec<Manifest> {
    let mut chain = vec![manifest.clone()];
    let Some(resolver) = self.resolver else {
      return chain;
    };

    let mut visited: HashSet<ArtifactKey> = HashSet::new();
    if let Ok(own) = manifest.coordinate.parse::<Coordinate>() {
      visited.insert(own.key());
    }

    let mut current = manifest.clone();
    while let Some(parent_ref) = current.parent.clone() {
      if chain.len() > MAX_PARENT_DEPTH {
        warn!(manifest = %manifest.coordinate, "parent chain too deep, ignoring remaining ancestors");
        break;
      }

      // Parent references may use properties declared by the child.
      let parent_ref = substitute(&parent_ref, &current.properties).unwrap_or(parent_ref);
      let parent: Coordinate = match parent_ref.parse() {
        Ok(c) => c,
        Err(e) => {
          warn!(parent = %parent_ref, error = %e, "invalid parent reference, continuing without it");
          break;
        }
      };

      if !visited.insert(parent.key()) {
        warn!(parent = %parent, "parent chain cycle detected, ignoring remaining ancestors");
        break;
      }

      match resolver.read_manifest(&parent) {
        Ok(parent_manifest) => {
          debug!(parent = %parent, "loaded parent manifest");
          chain.push(parent_manifest.clone());
          current = parent_manifest;
        }
        Err(e) => {
          warn!(parent = %parent, error = %e, "failed to fetch parent manifest, continuing without it");
          break;
        }
      }
    }

    chain
  }
}

fn implicit_properties(coordinate: &Coordinate) -> BTreeMap<String, String> {
  let mut props = BTreeMap::new();
  props.insert("project.group".to_string(), coordinate.group.clone());
  props.insert("project.name".to_string(), coordinate.name.clone());
  if let Some(version) = &coordinate.version {
    props.insert("project.version".to_string(), version.clone());
  }
  props
}

fn resolve_coordinate(
  raw: &str,
  properties: &BTreeMap<String, String>,
  manifest: &str,
  field: &str,
) -> Result<Coordinate, ManifestError> {
  let text = substitute(raw, properties).map_err(|source| ManifestError::Placeholder {
    manifest: manifest.to_string(),
    field: field.to_string(),
    source,
  })?;
  text.parse().map_err(|source| ManifestError::Coordinate {
    manifest: manifest.to_string(),
    source,
  })
}

fn resolve_dependency(
  spec: &DependencySpec,
  properties: &BTreeMap<String, String>,
  manifest: &str,
) -> Result<Dependency, ManifestError> {
  let coordinate = resolve_coordinate(&spec.coordinate, properties, manifest, "dependencies")?;
  let mut exclusions = BTreeSet::new();
  for raw in &spec.exclusions {
    let text = substitute(raw, properties).map_err(|source| ManifestError::Placeholder {
      manifest: manifest.to_string(),
      field: "exclusions".to_string(),
      source,
    })?;
    let key = text.parse().map_err(|source| ManifestError::Coordinate {
      manifest: manifest.to_string(),
      source,
    })?;
    exclusions.insert(key);
  }

  Ok(Dependency {
    coordinate,
    scope: spec.scope,
    optional: spec.optional,
    exclusions,
  })
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;
  use std::path::PathBuf;

  use tracing_test::traced_test;

  use super::*;
  use crate::resolve::{ResolveError, ResolveRequest, ResolvedSet};

  /// Serves manifests from memory; everything else is unsupported.
  #[derive(Default)]
  struct ManifestStore {
    manifests: HashMap<String, Manifest>,
  }

  impl ManifestStore {
    fn with(mut self, toml: &str) -> Self {
      let manifest = Manifest::from_toml_str(toml).unwrap();
      self.manifests.insert(manifest.coordinate.clone(), manifest);
      self
    }
  }

  impl Resolver for ManifestStore {
    fn resolve(&self, _request: &ResolveRequest) -> Result<ResolvedSet, ResolveError> {
      Ok(ResolvedSet::new())
    }

    fn resolve_one(&self, coordinate: &Coordinate) -> Result<PathBuf, ResolveError> {
      Err(ResolveError::NotFound(coordinate.clone()))
    }

    fn read_manifest(&self, coordinate: &Coordinate) -> Result<Manifest, ResolveError> {
      self
        .manifests
        .get(&coordinate.to_string())
        .cloned()
        .ok_or_else(|| ResolveError::NotFound(coordinate.clone()))
    }
  }

  const CHILD: &str = r#"
coordinate = "com.example:app:1.0"
parent = "com.example:parent:3"
imports = ["org.acme:acme-bom:${acme.version}"]

[properties]
"core.version" = "2.0"

[[dependencies]]
coordinate = "lib:core:${core.version}"

[[dependencies]]
coordinate = "lib:testkit:1.0"
scope = "test"

[[dependencies]]
coordinate = "lib:servlet:4.0"
scope = "provided"
"#;

  const PARENT: &str = r#"
coordinate = "com.example:parent:3"
imports = ["org.base:base-bom:5"]

[properties]
"acme.version" = "7.1"
"core.version" = "1.0"

[[dependencies]]
coordinate = "lib:logging:${project.version}"
"#;

  #[test]
  fn resolves_placeholders_with_ancestor_properties() {
    let store = ManifestStore::default().with(PARENT);
    let manifest = Manifest::from_toml_str(CHILD).unwrap();

    let resolved = ManifestReader::new(&store).resolve(&manifest).unwrap();

    let imports: Vec<String> = resolved.imports.iter().map(ToString::to_string).collect();
    assert_eq!(imports, vec!["org.acme:acme-bom:7.1", "org.base:base-bom:5"]);
    // Descendant property wins over the parent's.
    assert_eq!(resolved.dependencies[0].coordinate.to_string(), "lib:core:2.0");
    // project.* refers to the manifest being resolved.
    assert_eq!(resolved.dependencies[1].coordinate.to_string(), "lib:logging:1.0");
    assert_eq!(resolved.ancestors.len(), 1);
  }

  #[test]
  fn drops_test_and_provided_scopes() {
    let store = ManifestStore::default().with(PARENT);
    let manifest = Manifest::from_toml_str(CHILD).unwrap();

    let resolved = ManifestReader::new(&store).resolve(&manifest).unwrap();
    let names: Vec<&str> = resolved.dependencies.iter().map(|d| d.coordinate.name.as_str()).collect();
    assert!(!names.contains(&"testkit"));
    assert!(!names.contains(&"servlet"));
  }

  #[test]
  #[traced_test]
  fn missing_parent_is_not_fatal() {
    let store = ManifestStore::default();
    let manifest = Manifest::from_toml_str(
      r#"
coordinate = "com.example:app:1.0"
parent = "com.example:gone:1"

[[dependencies]]
coordinate = "lib:core:1.0"
"#,
    )
    .unwrap();

    let resolved = ManifestReader::new(&store).resolve(&manifest).unwrap();
    assert_eq!(resolved.dependencies.len(), 1);
    assert!(resolved.ancestors.is_empty());
    assert!(logs_contain("failed to fetch parent manifest"));
  }

  #[test]
  fn unresolved_placeholder_is_an_error() {
    let manifest = Manifest::from_toml_str(
      r#"
coordinate = "com.example:app:1.0"

[[dependencies]]
coordinate = "lib:core:${nope}"
"#,
    )
    .unwrap();

    let err = ManifestReader::standalone().resolve(&manifest).unwrap_err();
    assert!(matches!(err, ManifestError::Placeholder { .. }), "{err}");
  }

  #[test]
  fn parent_cycle_is_cut() {
    let store = ManifestStore::default()
      .with(
        r#"
coordinate = "g:a:1"
parent = "g:b:1"
"#,
      )
      .with(
        r#"
coordinate = "g:b:1"
parent = "g:a:1"
"#,
      );
    let manifest = store.read_manifest(&"g:a:1".parse().unwrap()).unwrap();

    let resolved = ManifestReader::new(&store).resolve(&manifest).unwrap();
    assert_eq!(resolved.ancestors.len(), 1);
  }

  #[test]
  fn import_scope_becomes_constraint_import() {
    let manifest = Manifest::from_toml_str(
      r#"
coordinate = "g:app:1"

[[dependencies]]
coordinate = "org.acme:acme-bom:pom:3"
scope = "import"
"#,
    )
    .unwrap();

    let resolved = ManifestReader::standalone().resolve(&manifest).unwrap();
    assert!(resolved.dependencies.is_empty());
    assert_eq!(resolved.imports[0].to_string(), "org.acme:acme-bom:pom:3");
  }

  #[test]
  fn launch_metadata_inherits_from_parent() {
    let store = ManifestStore::default().with(
      r#"
coordinate = "g:parent:1"

[launch]
entry = "command"
main = "parent-main"
"#,
    );
    let manifest = Manifest::from_toml_str(
      r#"
coordinate = "g:app:1"
parent = "g:parent:1"

[launch]
main = "app-main"
"#,
    )
    .unwrap();

    let resolved = ManifestReader::new(&store).resolve(&manifest).unwrap();
    assert_eq!(resolved.launch.main.as_deref(), Some("app-main"));
    assert_eq!(resolved.launch.entry.as_deref(), Some("command"));
  }
}
