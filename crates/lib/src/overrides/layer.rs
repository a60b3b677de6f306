//! Profile-qualified override layer.
//!
//! Override files are property documents named `<name>[-<profile>].properties`.
//! Keys are namespaced:
//!
//! - `dependencies.<key>` - add (or replace) a dependency
//! - `exclusions.<key>` - exclude a dependency everywhere
//! - `boms.<key>` - add a version-constraint import
//! - `managed.<key>` - pin a version directly
//! - `transitive.enabled` - resolve transitively (default `true`)
//! - `computed` - the layer already lists the full resolved set (default `false`)
//!
//! Any other key is a plain property, available to `${...}` placeholders in
//! override values.
//!
//! # Merge Order
//!
//! The unqualified file is loaded first, then each named profile in the order
//! given. For every profile, the archive's own metadata is read before any
//! external location. A caller-supplied override map is applied last.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::directive::{DirectiveKind, OverrideDirective, OverrideError};
use super::properties;
use crate::archive::Archive;
use crate::consts::METADATA_DIR;
use crate::coordinate::{ArtifactKey, Coordinate};
use crate::placeholder::substitute;
use crate::resolve::ResolvedSet;

pub const DEPENDENCIES: &str = "dependencies.";
pub const EXCLUSIONS: &str = "exclusions.";
pub const BOMS: &str = "boms.";
pub const MANAGED: &str = "managed.";
pub const TRANSITIVE: &str = "transitive.enabled";
pub const COMPUTED: &str = "computed";

/// Profile label for entries applied through [`OverrideLayer::apply_overrides`].
pub const OVERRIDE_PROFILE: &str = "<override>";

/// Merged override properties, with the profile each key came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideLayer {
  properties: BTreeMap<String, String>,
  origins: BTreeMap<String, String>,
}

impl OverrideLayer {
  pub fn new() -> Self {
    Self::default()
  }

  /// A layer holding `properties` as if loaded from the unqualified profile.
  pub fn from_properties(properties: BTreeMap<String, String>) -> Self {
    let mut layer = Self::new();
    layer.merge(&properties, "");
    layer
  }

  pub fn properties(&self) -> &BTreeMap<String, String> {
    &self.properties
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.properties.get(key).map(String::as_str)
  }

  /// Profile that last wrote `key`.
  pub fn origin(&self, key: &str) -> Option<&str> {
    self.origins.get(key).map(String::as_str)
  }

  pub fn is_computed(&self) -> bool {
    is_true(self.properties.get(COMPUTED))
  }

  pub fn is_transitive(&self) -> bool {
    self
      .properties
      .get(TRANSITIVE)
      .map(|v| !v.trim().eq_ignore_ascii_case("false"))
      .unwrap_or(true)
  }

  /// Keys outside every directive namespace.
  pub fn plain_properties(&self) -> BTreeMap<String, String> {
    self
      .properties
      .iter()
      .filter(|(k, _)| !is_directive_key(k) && k.as_str() != TRANSITIVE && k.as_str() != COMPUTED)
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }

  /// Fold a later profile's properties into this layer.
  ///
  /// - A computed accumulator ignores `dependencies.*` and `boms.*` from a
  ///   profile that is not itself computed.
  /// - A computed profile replaces the accumulator's `dependencies.*` and
  ///   `boms.*` entirely.
  /// - `dependencies.X` cancels an earlier `exclusions.X` and vice versa.
  /// - Everything else overwrites.
  pub fn merge(&mut self, incoming: &BTreeMap<String, String>, profile: &str) {
    let incoming_computed = is_true(incoming.get(COMPUTED));

    let mut incoming = incoming.clone();
    if incoming_computed {
      self.strip_declared();
    } else if self.is_computed() {
      incoming.retain(|k, _| !is_declared_key(k) && k != COMPUTED);
    }

    for (key, value) in incoming {
      if let Some(name) = key.strip_prefix(DEPENDENCIES) {
        self.remove(&format!("{EXCLUSIONS}{name}"));
      } else if let Some(name) = key.strip_prefix(EXCLUSIONS) {
        self.remove(&format!("{DEPENDENCIES}{name}"));
      }
      trace!(key = %key, profile, "override property");
      self.origins.insert(key.clone(), profile.to_string());
      self.properties.insert(key, value);
    }
  }

  /// Apply caller overrides with the highest precedence.
  pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, String>) {
    for (key, value) in overrides {
      self.origins.insert(key.clone(), OVERRIDE_PROFILE.to_string());
      self.properties.insert(key.clone(), value.clone());
    }
  }

  /// Translate the layer into typed directives.
  ///
  /// Values may reference `context` properties or plain layer properties;
  /// the layer's own plain properties win. Entries with an empty value are
  /// ignored.
  pub fn directives(&self, context: &BTreeMap<String, String>) -> Result<Vec<OverrideDirective>, OverrideError> {
    let mut scope = context.clone();
    scope.extend(self.plain_properties());

    let mut directives = Vec::new();
    for (key, raw) in &self.properties {
      let Some((namespace, name)) = split_directive_key(key) else {
        continue;
      };
      let value = substitute(raw, &scope).map_err(|source| OverrideError::Placeholder {
        key: key.clone(),
        source,
      })?;
      let value = value.trim();
      if value.is_empty() {
        debug!(key = %key, "skipping empty override");
        continue;
      }

      let kind = match namespace {
        DEPENDENCIES => DirectiveKind::AddDependency(parse_coordinate(key, value)?),
        EXCLUSIONS => DirectiveKind::ExcludeDependency(parse_key(key, value)?),
        BOMS => DirectiveKind::PinConstraint(parse_coordinate(key, value)?),
        _ => DirectiveKind::PinManaged(parse_coordinate(key, value)?),
      };
      directives.push(OverrideDirective {
        name: name.to_string(),
        kind,
        profile: self.origin(key).unwrap_or_default().to_string(),
      });
    }

    Ok(directives)
  }

  /// Render the layer as a properties document.
  pub fn to_properties_string(&self) -> String {
    properties::to_string(&self.properties)
  }

  /// A computed layer listing every artifact of `resolved`.
  ///
  /// The result carries `computed=true`, so a later planner resolves each
  /// listed artifact directly instead of walking the dependency graph again.
  /// Plain properties and `transitive.enabled` are carried over from `base`.
  pub fn computed_from(resolved: &ResolvedSet, base: &OverrideLayer) -> Self {
    let mut props = base.plain_properties();
    if let Some(transitive) = base.get(TRANSITIVE) {
      props.insert(TRANSITIVE.to_string(), transitive.to_string());
    }
    props.insert(COMPUTED.to_string(), "true".to_string());

    let mut name_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for c in resolved.coordinates() {
      *name_counts.entry(c.name.as_str()).or_default() += 1;
    }
    for c in resolved.coordinates() {
      // Fall back to group-qualified keys where names collide across groups.
      let label = if name_counts.get(c.name.as_str()).copied().unwrap_or(0) > 1 {
        format!("{}.{}", c.group, c.name)
      } else {
        c.name.clone()
      };
      props.insert(format!("{DEPENDENCIES}{label}"), c.to_string());
    }

    Self::from_properties(props)
  }

  fn strip_declared(&mut self) {
    self.properties.retain(|k, _| !is_declared_key(k));
    self.origins.retain(|k, _| !is_declared_key(k));
  }

  fn remove(&mut self, key: &str) {
    self.properties.remove(key);
    self.origins.remove(key);
  }
}

/// Loads and merges override files for a set of profiles.
#[derive(Debug, Clone)]
pub struct LayerLoader {
  name: String,
  profiles: Vec<String>,
  locations: Vec<PathBuf>,
}

impl LayerLoader {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      profiles: Vec::new(),
      locations: Vec::new(),
    }
  }

  /// Named profiles, merged after the unqualified one in this order.
  pub fn profiles<I, S>(mut self, profiles: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.profiles = profiles
      .into_iter()
      .map(Into::into)
      .filter(|p: &String| !p.is_empty())
      .collect();
    self
  }

  /// External directories searched after the archive for every profile.
  pub fn locations(mut self, locations: Vec<PathBuf>) -> Self {
    self.locations = locations;
    self
  }

  /// File name for a profile; the empty profile is unqualified.
  pub fn file_name(&self, profile: &str) -> String {
    if profile.is_empty() {
      format!("{}.properties", self.name)
    } else {
      format!("{}-{}.properties", self.name, profile)
    }
  }

  /// Load and merge every available file.
  ///
  /// Missing files are skipped; unreadable ones are errors.
  pub fn load(&self, archive: Option<&Archive>) -> Result<OverrideLayer, OverrideError> {
    let mut layer = OverrideLayer::new();

    let all_profiles = std::iter::once("").chain(self.profiles.iter().map(String::as_str));
    for profile in all_profiles {
      let file_name = self.file_name(profile);

      if let Some(archive) = archive {
        let entry = format!("{METADATA_DIR}/{file_name}");
        let content = archive
          .read_entry_string(&entry)
          .map_err(|source| OverrideError::Archive { entry: entry.clone(), source })?;
        if let Some(content) = content {
          debug!(entry = %entry, profile, "loading override file from archive");
          layer.merge(&properties::parse(&content), profile);
        }
      }

      for location in &self.locations {
        let path = location.join(&file_name);
        if let Some(content) = read_optional(&path)? {
          debug!(path = %path.display(), profile, "loading override file");
          layer.merge(&properties::parse(&content), profile);
        }
      }
    }

    Ok(layer)
  }
}

fn read_optional(path: &Path) -> Result<Option<String>, OverrideError> {
  match std::fs::read_to_string(path) {
    Ok(content) => Ok(Some(content)),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
    Err(source) => Err(OverrideError::Read {
      path: path.to_path_buf(),
      source,
    }),
  }
}

fn is_true(value: Option<&String>) -> bool {
  value.map(|v| v.trim().eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// `dependencies.*` and `boms.*` - the keys a computed layer owns.
fn is_declared_key(key: &str) -> bool {
  key.starts_with(DEPENDENCIES) || key.starts_with(BOMS)
}

fn is_directive_key(key: &str) -> bool {
  split_directive_key(key).is_some()
}

fn split_directive_key(key: &str) -> Option<(&'static str, &str)> {
  [DEPENDENCIES, EXCLUSIONS, BOMS, MANAGED]
    .into_iter()
    .find_map(|ns| key.strip_prefix(ns).map(|name| (ns, name)))
}

fn parse_coordinate(key: &str, value: &str) -> Result<Coordinate, OverrideError> {
  value.parse().map_err(|source| OverrideError::Coordinate {
    key: key.to_string(),
    source,
  })
}

/// Exclusions accept either `group:name` or a full coordinate.
fn parse_key(key: &str, value: &str) -> Result<ArtifactKey, OverrideError> {
  value
    .parse::<ArtifactKey>()
    .or_else(|_| value.parse::<Coordinate>().map(|c| c.key()))
    .map_err(|source| OverrideError::Coordinate {
      key: key.to_string(),
      source,
    })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resolve::ResolvedArtifact;

  fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn later_dependency_cancels_earlier_exclusion() {
    let mut layer = OverrideLayer::new();
    layer.merge(&props(&[("exclusions.x", "g:x")]), "p1");
    layer.merge(&props(&[("dependencies.x", "g:x:1.0")]), "p2");

    assert_eq!(layer.get("dependencies.x"), Some("g:x:1.0"));
    assert_eq!(layer.get("exclusions.x"), None);
    assert_eq!(layer.origin("dependencies.x"), Some("p2"));
  }

  #[test]
  fn later_exclusion_cancels_earlier_dependency() {
    let mut layer = OverrideLayer::new();
    layer.merge(&props(&[("dependencies.x", "g:x:1.0")]), "p1");
    layer.merge(&props(&[("exclusions.x", "g:x")]), "p2");

    assert_eq!(layer.get("exclusions.x"), Some("g:x"));
    assert_eq!(layer.get("dependencies.x"), None);
  }

  fn computed_base() -> OverrideLayer {
    let mut base = vec![("computed", "true")];
    let deps = [
      ("dependencies.a", "g:a:1"),
      ("dependencies.b", "g:b:1"),
      ("dependencies.c", "g:c:1"),
      ("dependencies.d", "g:d:1"),
      ("dependencies.e", "g:e:1"),
    ];
    base.extend(deps);
    OverrideLayer::from_properties(props(&base))
  }

  fn dependency_keys(layer: &OverrideLayer) -> Vec<String> {
    layer
      .properties()
      .keys()
      .filter(|k| k.starts_with(DEPENDENCIES))
      .cloned()
      .collect()
  }

  #[test]
  fn computed_accumulator_strips_uncomputed_additions() {
    let mut layer = computed_base();
    layer.merge(
      &props(&[("dependencies.f", "g:f:1"), ("boms.x", "g:bom:1"), ("server.port", "9000")]),
      "extra",
    );

    assert_eq!(dependency_keys(&layer).len(), 5);
    assert!(layer.get("dependencies.f").is_none());
    assert!(layer.get("boms.x").is_none());
    assert_eq!(layer.get("server.port"), Some("9000"));
    assert!(layer.is_computed());
  }

  #[test]
  fn computed_profile_replaces_declared_entries() {
    let mut layer = computed_base();
    layer.merge(
      &props(&[
        ("computed", "true"),
        ("dependencies.v", "g:v:1"),
        ("dependencies.w", "g:w:1"),
        ("dependencies.x", "g:x:1"),
        ("dependencies.y", "g:y:1"),
        ("dependencies.z", "g:z:1"),
      ]),
      "resolved",
    );

    assert_eq!(
      dependency_keys(&layer),
      vec![
        "dependencies.v",
        "dependencies.w",
        "dependencies.x",
        "dependencies.y",
        "dependencies.z"
      ]
    );
  }

  #[test]
  fn computed_profile_over_declarative_accumulator() {
    let mut layer = OverrideLayer::from_properties(props(&[("dependencies.a", "g:a:1"), ("boms.b", "g:bom:1")]));
    layer.merge(&props(&[("computed", "true"), ("dependencies.z", "g:z:1")]), "resolved");

    assert_eq!(dependency_keys(&layer), vec!["dependencies.z"]);
    assert!(layer.get("boms.b").is_none());
    assert!(layer.is_computed());
  }

  #[test]
  fn overrides_apply_last() {
    let mut layer = OverrideLayer::from_properties(props(&[("transitive.enabled", "true")]));
    layer.apply_overrides(&props(&[("transitive.enabled", "false")]));

    assert!(!layer.is_transitive());
    assert_eq!(layer.origin("transitive.enabled"), Some(OVERRIDE_PROFILE));
  }

  #[test]
  fn defaults() {
    let layer = OverrideLayer::new();
    assert!(layer.is_transitive());
    assert!(!layer.is_computed());
  }

  #[test]
  fn directives_substitute_and_classify() {
    let layer = OverrideLayer::from_properties(props(&[
      ("core.version", "2.0"),
      ("dependencies.core", "lib:core:${core.version}"),
      ("exclusions.legacy", "org.legacy:old"),
      ("boms.acme", "org.acme:bom:${acme.version}"),
      ("managed.util", "lib:util:3.1"),
      ("dependencies.empty", ""),
    ]));
    let context = props(&[("acme.version", "7")]);

    let directives = layer.directives(&context).unwrap();
    let kinds: Vec<String> = directives.iter().map(|d| d.kind.to_string()).collect();

    assert_eq!(
      kinds,
      vec![
        "pin-constraint org.acme:bom:7",
        "add lib:core:2.0",
        "exclude org.legacy:old",
        "pin-managed lib:util:3.1",
      ]
    );
  }

  #[test]
  fn bad_directive_value_is_reported_with_key() {
    let layer = OverrideLayer::from_properties(props(&[("dependencies.bad", "nocolon")]));
    let err = layer.directives(&BTreeMap::new()).unwrap_err();
    assert!(err.to_string().contains("dependencies.bad"), "{err}");
  }

  #[test]
  fn computed_from_resolved_set() {
    let resolved: ResolvedSet = [
      ResolvedArtifact::new("g1:core:1".parse().unwrap(), None),
      ResolvedArtifact::new("g2:core:2".parse().unwrap(), None),
      ResolvedArtifact::new("g1:util:1".parse().unwrap(), None),
    ]
    .into_iter()
    .collect();
    let base = OverrideLayer::from_properties(props(&[("dependencies.x", "g:x:1"), ("app.mode", "fast")]));

    let layer = OverrideLayer::computed_from(&resolved, &base);
    assert!(layer.is_computed());
    assert_eq!(layer.get("dependencies.g1.core"), Some("g1:core:1"));
    assert_eq!(layer.get("dependencies.g2.core"), Some("g2:core:2"));
    assert_eq!(layer.get("dependencies.util"), Some("g1:util:1"));
    assert_eq!(layer.get("dependencies.x"), None);
    assert_eq!(layer.get("app.mode"), Some("fast"));
  }
}
