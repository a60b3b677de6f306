//! Property placeholder parsing and substitution.
//!
//! Manifests and override files reference properties with `${name}` tokens
//! that must be replaced before any coordinate reaches the resolver. This
//! module handles parsing those strings and substituting resolved values.
//!
//! # Placeholder Format
//!
//! - `${name}` - value of property `name`
//!
//! Single `$` characters pass through unchanged.
//!
//! # Escaping
//!
//! Use `$${` to produce a literal `${` sequence.
//!
//! # Example
//!
//! ```
//! use thinlaunch_lib::placeholder::{parse, Segment};
//!
//! let segments = parse("lib:core:${core.version}").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("lib:core:".to_string()),
//!     Segment::Property("core.version".to_string()),
//! ]);
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

use crate::consts::MAX_PROPERTY_DEPTH;

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A property reference to be resolved
  Property(String),
}

/// Errors that can occur during placeholder parsing or resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("empty placeholder at position {0}")]
  Empty(usize),

  #[error("unresolved property: {0}")]
  Unresolved(String),

  #[error("property '{0}' references itself or nests deeper than {MAX_PROPERTY_DEPTH} levels")]
  TooDeep(String),
}

/// Source of property values during substitution.
pub trait PropertySource {
  fn property(&self, name: &str) -> Option<&str>;
}

impl PropertySource for BTreeMap<String, String> {
  fn property(&self, name: &str) -> Option<&str> {
    self.get(name).map(String::as_str)
  }
}

/// Parse a string containing placeholders into segments.
///
/// # Errors
///
/// Returns an error if a placeholder is unclosed or empty.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '$')) => {
        chars.next();
        if let Some((_, '{')) = chars.peek() {
          // Escaped: $${ -> ${ (literal)
          chars.next();
          literal.push_str("${");
        } else {
          literal.push_str("$$");
        }
      }
      Some((_, '{')) => {
        chars.next();

        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }

        let mut name = String::new();
        let mut found_close = false;
        for (_, c) in chars.by_ref() {
          if c == '}' {
            found_close = true;
            break;
          }
          name.push(c);
        }

        if !found_close {
          return Err(PlaceholderError::Unclosed(pos));
        }
        let name = name.trim();
        if name.is_empty() {
          return Err(PlaceholderError::Empty(pos));
        }
        segments.push(Segment::Property(name.to_string()));
      }
      _ => literal.push('$'),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Substitute all placeholders in a string using the provided source.
///
/// Substituted values are not re-scanned; use [`expand_properties`] first
/// when property values may themselves contain references.
///
/// # Errors
///
/// Returns an error if parsing fails or a property is unknown.
pub fn substitute(input: &str, source: &impl PropertySource) -> Result<String, PlaceholderError> {
  if !input.contains("${") {
    return Ok(input.to_string());
  }

  let mut out = String::with_capacity(input.len());
  for segment in parse(input)? {
    match segment {
      Segment::Literal(text) => out.push_str(&text),
      Segment::Property(name) => {
        let value = source
          .property(&name)
          .ok_or_else(|| PlaceholderError::Unresolved(name.clone()))?;
        out.push_str(value);
      }
    }
  }
  Ok(out)
}

/// Returns true if the string contains at least one placeholder.
pub fn has_placeholders(input: &str) -> bool {
  parse(input)
    .map(|segments| segments.iter().any(|s| matches!(s, Segment::Property(_))))
    .unwrap_or(false)
}

/// Expand references between property values.
///
/// Each value may reference other properties in the same map. References
/// are expanded until no placeholders remain. Unknown references are left in
/// place so that a later substitution pass can report them in context.
///
/// # Errors
///
/// Returns [`PlaceholderError::TooDeep`] if expansion does not settle within
/// [`MAX_PROPERTY_DEPTH`] rounds (typically a reference cycle).
pub fn expand_properties(properties: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>, PlaceholderError> {
  let mut current = properties.clone();

  for _ in 0..MAX_PROPERTY_DEPTH {
    let mut changed = false;
    let mut next = BTreeMap::new();

    for (key, value) in &current {
      let expanded = expand_known(value, &current)?;
      if expanded != *value {
        changed = true;
      }
      next.insert(key.clone(), expanded);
    }

    current = next;
    if !changed {
      // A settled map can still hold self-references such as `a = ${a}`.
      if let Some(key) = current.iter().find(|(_, v)| references_known(v, &current)).map(|(k, _)| k) {
        return Err(PlaceholderError::TooDeep(key.clone()));
      }
      return Ok(current);
    }
  }

  let culprit = current
    .iter()
    .find(|(_, v)| has_placeholders(v))
    .map(|(k, _)| k.clone())
    .unwrap_or_default();
  Err(PlaceholderError::TooDeep(culprit))
}

fn references_known(value: &str, properties: &BTreeMap<String, String>) -> bool {
  parse(value)
    .map(|segments| {
      segments
        .iter()
        .any(|s| matches!(s, Segment::Property(name) if properties.contains_key(name)))
    })
    .unwrap_or(false)
}

/// Substitute only the references the map knows about, keeping the rest.
fn expand_known(input: &str, properties: &BTreeMap<String, String>) -> Result<String, PlaceholderError> {
  if !input.contains("${") {
    return Ok(input.to_string());
  }

  let mut out = String::with_capacity(input.len());
  for segment in parse(input)? {
    match segment {
      Segment::Literal(text) => out.push_str(&escape(&text)),
      Segment::Property(name) => match properties.get(&name) {
        Some(value) => out.push_str(value),
        None => {
          out.push_str("${");
          out.push_str(&name);
          out.push('}');
        }
      },
    }
  }
  Ok(out)
}

/// Re-escape literal `${` so a later parse keeps it literal.
fn escape(text: &str) -> String {
  text.replace("${", "$${")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn parse_plain_literal() {
    assert_eq!(parse("g:a:1.0").unwrap(), vec![Segment::Literal("g:a:1.0".into())]);
    assert!(parse("").unwrap().is_empty());
  }

  #[test]
  fn parse_multiple_properties() {
    let segments = parse("${group}:${name}").unwrap();
    assert_eq!(
      segments,
      vec![
        Segment::Property("group".into()),
        Segment::Literal(":".into()),
        Segment::Property("name".into()),
      ]
    );
  }

  #[test]
  fn lone_dollar_passes_through() {
    assert_eq!(parse("$HOME/x").unwrap(), vec![Segment::Literal("$HOME/x".into())]);
  }

  #[test]
  fn escape_produces_literal() {
    assert_eq!(parse("a$${b}").unwrap(), vec![Segment::Literal("a${b}".into())]);
  }

  #[test]
  fn unclosed_and_empty_are_errors() {
    assert_eq!(parse("x${oops"), Err(PlaceholderError::Unclosed(1)));
    assert_eq!(parse("${ }"), Err(PlaceholderError::Empty(0)));
  }

  #[test]
  fn substitute_resolves_and_reports_missing() {
    let p = props(&[("v", "2.0")]);
    assert_eq!(substitute("lib:core:${v}", &p).unwrap(), "lib:core:2.0");
    assert_eq!(
      substitute("lib:core:${missing}", &p),
      Err(PlaceholderError::Unresolved("missing".into()))
    );
  }

  #[test]
  fn expand_nested_references() {
    let p = props(&[("base", "1"), ("minor", "${base}.2"), ("full", "${minor}.3")]);
    let expanded = expand_properties(&p).unwrap();
    assert_eq!(expanded["full"], "1.2.3");
  }

  #[test]
  fn expand_keeps_unknown_references() {
    let p = props(&[("a", "${unknown}-x")]);
    assert_eq!(expand_properties(&p).unwrap()["a"], "${unknown}-x");
  }

  #[test]
  fn expand_detects_cycles() {
    let p = props(&[("a", "${b}"), ("b", "${a}")]);
    assert!(matches!(expand_properties(&p), Err(PlaceholderError::TooDeep(_))));
  }
}
