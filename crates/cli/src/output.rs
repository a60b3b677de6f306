//! CLI output formatting utilities.
//!
//! Colored status messages and the shared JSON printer.

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

use thinlaunch_lib::host::LaunchState;

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const PLUS: &str = "+";
}

pub fn truncate_hash(hash: &str) -> &str {
  let len = hash.len().min(12);
  &hash[..len]
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// Report a final launch state the way the other status lines look.
pub fn print_state(id: &str, state: LaunchState, error: Option<&str>) {
  let message = format!("{} {}", truncate_hash(id), state);
  match state {
    LaunchState::Complete | LaunchState::Running => print_success(&message),
    LaunchState::Cancelled => print_warning(&message),
    LaunchState::Failed | LaunchState::Error => match error {
      Some(error) => print_error(&format!("{message}: {error}")),
      None => print_error(&message),
    },
    LaunchState::Unknown | LaunchState::Launching => print_info(&message),
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
