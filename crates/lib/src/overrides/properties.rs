//! Reading and writing `.properties` documents.
//!
//! Supports the subset used by override files: `#`/`!` comments, `=`, `:` or
//! whitespace separators, trailing-backslash line continuations, and the
//! usual escapes (`\\`, `\n`, `\t`, `\r`, `\=`, `\:`, `\ `, `\uXXXX`).

use std::collections::BTreeMap;

/// Parse a properties document into an ordered map.
///
/// Later duplicates of a key overwrite earlier ones.
pub fn parse(content: &str) -> BTreeMap<String, String> {
  let mut properties = BTreeMap::new();
  let mut lines = content.lines();

  while let Some(line) = lines.next() {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
      continue;
    }

    let mut logical = trimmed.to_string();
    while ends_with_continuation(&logical) {
      logical.pop();
      match lines.next() {
        Some(next) => logical.push_str(next.trim_start()),
        None => break,
      }
    }

    let (key, value) = split_pair(&logical);
    properties.insert(unescape(key), unescape(value));
  }

  properties
}

/// Render a map as a properties document, one sorted entry per line.
pub fn to_string(properties: &BTreeMap<String, String>) -> String {
  let mut out = String::new();
  for (key, value) in properties {
    out.push_str(&escape(key, true));
    out.push('=');
    out.push_str(&escape(value, false));
    out.push('\n');
  }
  out
}

/// An odd number of trailing backslashes continues the line.
fn ends_with_continuation(line: &str) -> bool {
  line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_pair(line: &str) -> (&str, &str) {
  let mut escaped = false;
  for (idx, ch) in line.char_indices() {
    if escaped {
      escaped = false;
      continue;
    }
    match ch {
      '\\' => escaped = true,
      '=' | ':' => return (line[..idx].trim_end(), line[idx + 1..].trim_start()),
      c if c.is_whitespace() => {
        let rest = line[idx..].trim_start();
        let rest = rest
          .strip_prefix('=')
          .or_else(|| rest.strip_prefix(':'))
          .unwrap_or(rest)
          .trim_start();
        return (&line[..idx], rest);
      }
      _ => {}
    }
  }
  (line, "")
}

fn unescape(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut chars = text.chars();

  while let Some(ch) = chars.next() {
    if ch != '\\' {
      out.push(ch);
      continue;
    }
    match chars.next() {
      Some('n') => out.push('\n'),
      Some('t') => out.push('\t'),
      Some('r') => out.push('\r'),
      Some('f') => out.push('\u{c}'),
      Some('u') => {
        let hex: String = chars.by_ref().take(4).collect();
        match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
          Some(decoded) => out.push(decoded),
          None => {
            out.push_str("\\u");
            out.push_str(&hex);
          }
        }
      }
      Some(other) => out.push(other),
      None => {}
    }
  }

  out
}

fn escape(text: &str, is_key: bool) -> String {
  let mut out = String::with_capacity(text.len());
  for (idx, ch) in text.chars().enumerate() {
    match ch {
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\t' => out.push_str("\\t"),
      '\r' => out.push_str("\\r"),
      '=' | ':' if is_key => {
        out.push('\\');
        out.push(ch);
      }
      ' ' if is_key || idx == 0 => out.push_str("\\ "),
      '#' | '!' if idx == 0 => {
        out.push('\\');
        out.push(ch);
      }
      _ => out.push(ch),
    }
  }
  out
}
