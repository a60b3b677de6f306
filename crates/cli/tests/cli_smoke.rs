//! CLI smoke tests for thin.
//!
//! Each test builds a throwaway remote repository and archive, then runs the
//! binary against them.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// Get a Command for the thin binary, isolated from the caller's settings.
fn thin_cmd(env: &TempDir) -> Command {
  let mut cmd = cargo_bin_cmd!("thin");
  cmd
    .current_dir(env.path())
    .env_remove("THIN_ROOT")
    .env_remove("THIN_REPOS")
    .env_remove("THIN_OFFLINE")
    .env_remove("THIN_PROFILE")
    .env_remove("RUST_LOG");
  cmd
}

fn publish(remote: &Path, group: &str, name: &str, version: &str) {
  let dir = remote.join(group).join(name).join(version);
  fs::create_dir_all(&dir).unwrap();
  fs::write(dir.join(format!("{name}-{version}.jar")), name).unwrap();
}

fn archive(dir: &Path, file: &str, manifest: &str, extra: &[(&str, &str)]) -> PathBuf {
  let path = dir.join(file);
  let mut writer = zip::ZipWriter::new(fs::File::create(&path).unwrap());
  let options = SimpleFileOptions::default();
  writer.start_file("META-INF/thin/manifest.toml", options).unwrap();
  writer.write_all(manifest.as_bytes()).unwrap();
  for (entry, content) in extra {
    writer.start_file(*entry, options).unwrap();
    writer.write_all(content.as_bytes()).unwrap();
  }
  writer.finish().unwrap();
  path
}

/// A remote with lib:core 1.0 and 2.0, and an app archive depending on 1.0.
fn setup() -> TempDir {
  let temp = TempDir::new().unwrap();
  let remote = temp.path().join("remote");
  publish(&remote, "lib", "core", "1.0");
  publish(&remote, "lib", "core", "2.0");
  publish(&remote, "lib", "web", "1.0");

  archive(
    temp.path(),
    "app.jar",
    r#"
coordinate = "com.example:app:1.0"

[[dependencies]]
coordinate = "lib:core:1.0"

[launch]
entry = "command"
main = "/bin/sh"
"#,
    &[("META-INF/thin-next.properties", "dependencies.core=lib:core:2.0\n")],
  );
  archive(
    temp.path(),
    "web.jar",
    r#"
coordinate = "com.example:web:1.0"

[[dependencies]]
coordinate = "lib:core:1.0"

[[dependencies]]
coordinate = "lib:web:1.0"
"#,
    &[],
  );
  temp
}

const REPO_ARGS: [&str; 4] = ["--root", "cache", "--repo", "remote"];

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  let env = TempDir::new().unwrap();
  thin_cmd(&env)
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  let env = TempDir::new().unwrap();
  thin_cmd(&env)
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("thin"));
}

// =============================================================================
// Classpath
// =============================================================================

#[test]
fn classpath_lists_resolved_artifacts() {
  let env = setup();
  thin_cmd(&env)
    .args(["classpath", "app.jar"])
    .args(REPO_ARGS)
    .assert()
    .success()
    .stdout(predicate::str::contains("app.jar").and(predicate::str::contains("core-1.0.jar")));
}

#[test]
fn classpath_with_profile() {
  let env = setup();
  thin_cmd(&env)
    .args(["classpath", "app.jar", "--profile", "next"])
    .args(REPO_ARGS)
    .assert()
    .success()
    .stdout(predicate::str::contains("core-2.0.jar"));
}

#[test]
fn classpath_property_override() {
  let env = setup();
  thin_cmd(&env)
    .args(["classpath", "app.jar", "-D", "dependencies.core=lib:core:2.0"])
    .args(REPO_ARGS)
    .assert()
    .success()
    .stdout(predicate::str::contains("core-2.0.jar").and(predicate::str::contains("core-1.0.jar").not()));
}

#[test]
fn classpath_properties_format() {
  let env = setup();
  thin_cmd(&env)
    .args(["classpath", "app.jar", "--format", "properties"])
    .args(REPO_ARGS)
    .assert()
    .success()
    .stdout(predicate::str::contains("computed=true").and(predicate::str::contains("dependencies.core=lib:core:1.0")));
}

#[test]
fn offline_without_cache_fails() {
  let env = setup();
  thin_cmd(&env)
    .args(["classpath", "app.jar", "--offline"])
    .args(REPO_ARGS)
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to resolve"));
}

#[test]
fn missing_archive_fails() {
  let env = setup();
  thin_cmd(&env)
    .args(["classpath", "missing.jar"])
    .args(REPO_ARGS)
    .assert()
    .failure()
    .stderr(predicate::str::contains("missing.jar"));
}

// =============================================================================
// Run
// =============================================================================

#[test]
fn dry_run_prints_plan_as_json() {
  let env = setup();
  thin_cmd(&env)
    .args(["run", "app.jar", "--dry-run", "--json"])
    .args(REPO_ARGS)
    .assert()
    .success()
    .stdout(predicate::str::contains("\"classpath\"").and(predicate::str::contains("lib:core:1.0")));
}

#[cfg(unix)]
#[test]
fn run_hosts_the_main_program() {
  let env = setup();
  thin_cmd(&env)
    .args(["run", "app.jar"])
    .args(REPO_ARGS)
    .args(["--", "-c", "printf '%s' \"$CLASSPATH\" > classpath.txt"])
    .assert()
    .success();

  let classpath = fs::read_to_string(env.path().join("classpath.txt")).unwrap();
  assert!(classpath.contains("core-1.0.jar"));
}

#[cfg(unix)]
#[test]
fn run_reports_failure() {
  let env = setup();
  thin_cmd(&env)
    .args(["run", "app.jar"])
    .args(REPO_ARGS)
    .args(["--", "-c", "exit 3"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("failed"));
}

// =============================================================================
// Diff
// =============================================================================

#[test]
fn diff_lists_added_artifacts() {
  let env = setup();
  thin_cmd(&env)
    .args(["diff", "web.jar", "--parent", "app.jar"])
    .args(REPO_ARGS)
    .assert()
    .success()
    .stdout(predicate::str::contains("lib:web:1.0").and(predicate::str::contains("lib:core").not()));
}

#[test]
fn diff_of_identical_archives_is_empty() {
  let env = setup();
  thin_cmd(&env)
    .args(["diff", "app.jar", "--parent", "app.jar", "--json"])
    .args(REPO_ARGS)
    .assert()
    .success()
    .stdout(predicate::str::contains("lib:").not());
}
