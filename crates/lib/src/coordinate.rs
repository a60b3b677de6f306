//! Package coordinates.
//!
//! A [`Coordinate`] identifies a package artifact. Its textual form is
//! `group:artifact[:extension[:classifier]][:version]`:
//!
//! | parts | meaning                                  |
//! |-------|------------------------------------------|
//! | 2     | `group:artifact`                         |
//! | 3     | `group:artifact:version`                 |
//! | 4     | `group:artifact:extension:version`       |
//! | 5     | `group:artifact:extension:classifier:version` |
//!
//! In the 4 and 5 part forms an empty trailing segment means "no version",
//! which keeps versionless coordinates with a classifier or a non-default
//! extension representable.
//!
//! Coordinates compare equal on every field. Override and merge logic works
//! on the coarser [`ArtifactKey`] (`group`, `name`) instead.
//!
//! # Example
//!
//! ```
//! use thinlaunch_lib::coordinate::Coordinate;
//!
//! let c: Coordinate = "org.example:core:zip:linux:1.2".parse().unwrap();
//! assert_eq!(c.extension, "zip");
//! assert_eq!(c.classifier.as_deref(), Some("linux"));
//! assert_eq!(c.to_string(), "org.example:core:zip:linux:1.2");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::DEFAULT_EXTENSION;

/// Errors that can occur while parsing coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
  #[error("invalid coordinate '{0}': expected group:artifact[:extension[:classifier]][:version]")]
  Malformed(String),

  #[error("invalid coordinate '{input}': {field} must not be empty")]
  EmptyField { input: String, field: &'static str },

  #[error("invalid artifact key '{0}': expected group:artifact")]
  MalformedKey(String),
}

/// The `(group, name)` identity used for overrides, exclusions, and merging.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactKey {
  pub group: String,
  pub name: String,
}

impl ArtifactKey {
  pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      group: group.into(),
      name: name.into(),
    }
  }

  /// Returns true if this key matches `other`, honouring `*` wildcards on
  /// either component.
  pub fn matches(&self, other: &ArtifactKey) -> bool {
    (self.group == "*" || self.group == other.group) && (self.name == "*" || self.name == other.name)
  }
}

impl fmt::Display for ArtifactKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.group, self.name)
  }
}

impl FromStr for ArtifactKey {
  type Err = CoordinateError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (group, name) = s
      .trim()
      .split_once(':')
      .ok_or_else(|| CoordinateError::MalformedKey(s.to_string()))?;
    if group.is_empty() || name.is_empty() || name.contains(':') {
      return Err(CoordinateError::MalformedKey(s.to_string()));
    }
    Ok(Self::new(group, name))
  }
}

impl TryFrom<String> for ArtifactKey {
  type Error = CoordinateError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<ArtifactKey> for String {
  fn from(key: ArtifactKey) -> Self {
    key.to_string()
  }
}

/// A package artifact identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coordinate {
  pub group: String,
  pub name: String,
  /// Absent until resolution picks a version.
  pub version: Option<String>,
  pub classifier: Option<String>,
  pub extension: String,
}

impl Coordinate {
  /// Create a coordinate with the default extension and no classifier. An
  /// empty version counts as no version.
  pub fn new(group: impl Into<String>, name: impl Into<String>, version: Option<&str>) -> Self {
    Self {
      group: group.into(),
      name: name.into(),
      version: version.filter(|v| !v.is_empty()).map(str::to_string),
      classifier: None,
      extension: DEFAULT_EXTENSION.to_string(),
    }
  }

  pub fn key(&self) -> ArtifactKey {
    ArtifactKey::new(&self.group, &self.name)
  }

  /// Returns a copy of this coordinate with the given version.
  pub fn with_version(&self, version: impl Into<String>) -> Self {
    Self {
      version: Some(version.into()),
      ..self.clone()
    }
  }

  /// File name of the artifact in a repository layout:
  /// `<name>-<version>[-<classifier>].<extension>`.
  ///
  /// Returns `None` while the version is still unresolved.
  pub fn file_name(&self) -> Option<String> {
    let version = self.version.as_deref()?;
    Some(match &self.classifier {
      Some(classifier) => format!("{}-{}-{}.{}", self.name, version, classifier, self.extension),
      None => format!("{}-{}.{}", self.name, version, self.extension),
    })
  }

  /// Relative directory of the artifact in a repository layout:
  /// `<group with dots as separators>/<name>/<version>`.
  pub fn repository_dir(&self) -> Option<std::path::PathBuf> {
    let version = self.version.as_deref()?;
    let mut path = std::path::PathBuf::new();
    for segment in self.group.split('.') {
      path.push(segment);
    }
    path.push(&self.name);
    path.push(version);
    Some(path)
  }

  fn is_plain(&self) -> bool {
    self.classifier.is_none() && self.extension == DEFAULT_EXTENSION
  }
}

impl fmt::Display for Coordinate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.group, self.name)?;
    if self.is_plain() {
      if let Some(version) = &self.version {
        write!(f, ":{version}")?;
      }
      return Ok(());
    }

    write!(f, ":{}", self.extension)?;
    if let Some(classifier) = &self.classifier {
      write!(f, ":{classifier}")?;
    }
    write!(f, ":{}", self.version.as_deref().unwrap_or(""))
  }
}

impl FromStr for Coordinate {
  type Err = CoordinateError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let input = s.trim();
    let parts: Vec<&str> = input.split(':').collect();

    let non_empty = |value: &str, field: &'static str| -> Result<String, CoordinateError> {
      if value.is_empty() {
        Err(CoordinateError::EmptyField {
          input: input.to_string(),
          field,
        })
      } else {
        Ok(value.to_string())
      }
    };
    let optional = |value: &str| (!value.is_empty()).then(|| value.to_string());

    let (group, name) = match parts.as_slice() {
      [group, name, ..] => (non_empty(group, "group")?, non_empty(name, "artifact")?),
      _ => return Err(CoordinateError::Malformed(input.to_string())),
    };

    let (extension, classifier, version) = match parts.as_slice() {
      [_, _] => (DEFAULT_EXTENSION.to_string(), None, None),
      [_, _, version] => (DEFAULT_EXTENSION.to_string(), None, Some(non_empty(version, "version")?)),
      [_, _, extension, version] => (non_empty(extension, "extension")?, None, optional(version)),
      [_, _, extension, classifier, version] => (non_empty(extension, "extension")?, optional(classifier), optional(version)),
      _ => return Err(CoordinateError::Malformed(input.to_string())),
    };

    Ok(Self {
      group,
      name,
      version,
      classifier,
      extension,
    })
  }
}

impl TryFrom<String> for Coordinate {
  type Error = CoordinateError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Coordinate> for String {
  fn from(coordinate: Coordinate) -> Self {
    coordinate.to_string()
  }
}
