//! Archive to classpath, end to end.

use std::collections::BTreeMap;

use thinlaunch_lib::classpath::ClasspathEntry;
use thinlaunch_lib::launcher::{LaunchOptions, Launcher};
use thinlaunch_lib::resolve::{LocalRepository, RepositoryConfig};

use super::common::{TestEnv, manifest};

fn options(profiles: &[&str]) -> LaunchOptions {
  LaunchOptions {
    profiles: profiles.iter().map(|p| p.to_string()).collect(),
    ..Default::default()
  }
}

fn versions(prepared: &thinlaunch_lib::launcher::Prepared) -> Vec<String> {
  prepared.resolved.coordinates().map(|c| c.to_string()).collect()
}

#[test]
fn profile_replaces_declared_version() {
  let env = TestEnv::new();
  env.publish("lib:core:1.0", &[]);
  env.publish("lib:core:2.0", &[]);
  let archive = env.archive(
    "app.jar",
    &manifest("com.example:app:1.0", &["lib:core:1.0"]),
    &[("META-INF/thin-extra.properties", "dependencies.core=lib:core:2.0\n")],
  );
  let repo = env.repository();

  let plain = Launcher::new(&repo, options(&[])).prepare(&archive).unwrap();
  assert_eq!(versions(&plain), vec!["lib:core:1.0"]);

  let extra = Launcher::new(&repo, options(&["extra"])).prepare(&archive).unwrap();
  assert_eq!(versions(&extra), vec!["lib:core:2.0"]);
}

#[test]
fn classpath_starts_with_the_archive_and_its_classes() {
  let env = TestEnv::new();
  let core = env.publish("lib:core:1.0", &["lib:util:1.0"]);
  let util = env.publish("lib:util:1.0", &[]);
  let archive = env.archive(
    "app.jar",
    &manifest("com.example:app:1.0", &["lib:core:1.0"]),
    &[("classes/com/example/Main.class", "")],
  );
  let repo = env.repository();

  let prepared = Launcher::new(&repo, options(&[])).prepare(&archive).unwrap();
  let entries: Vec<&ClasspathEntry> = prepared.classpath.entries().iter().collect();

  assert_eq!(entries[0], &ClasspathEntry::Archive { path: archive.clone() });
  assert!(matches!(entries[1], ClasspathEntry::Nested { prefix, .. } if prefix == "classes/"));
  // Artifacts are served from the cache, not the remote.
  let locations: Vec<_> = entries[2..].iter().map(|e| e.location().to_path_buf()).collect();
  assert_eq!(locations.len(), 2);
  assert!(locations.iter().all(|p| p.starts_with(env.cache())));
  assert_eq!(locations[0].file_name(), core.file_name());
  assert_eq!(locations[1].file_name(), util.file_name());
}

#[test]
fn caller_properties_win_over_profiles() {
  let env = TestEnv::new();
  env.publish("lib:core:1.0", &[]);
  env.publish("lib:core:2.0", &[]);
  env.publish("lib:core:3.0", &[]);
  let archive = env.archive(
    "app.jar",
    &manifest("com.example:app:1.0", &["lib:core:1.0"]),
    &[("META-INF/thin-extra.properties", "dependencies.core=lib:core:2.0\n")],
  );
  let repo = env.repository();

  let mut properties = BTreeMap::new();
  properties.insert("dependencies.core".to_string(), "lib:core:3.0".to_string());
  let options = LaunchOptions {
    properties,
    ..options(&["extra"])
  };

  let prepared = Launcher::new(&repo, options).prepare(&archive).unwrap();
  assert_eq!(versions(&prepared), vec!["lib:core:3.0"]);
}

#[test]
fn computed_layer_reproduces_the_resolution_offline() {
  let env = TestEnv::new();
  env.publish("lib:core:1.0", &["lib:util:1.0"]);
  env.publish("lib:util:1.0", &[]);
  let archive = env.archive("app.jar", &manifest("com.example:app:1.0", &["lib:core:1.0"]), &[]);
  let repo = env.repository();
  let first = Launcher::new(&repo, options(&[])).prepare(&archive).unwrap();

  let computed = first.computed_layer().to_properties_string();
  assert!(computed.contains("computed=true"));
  // The manifest's dependencies are ignored once a computed layer is present.
  let frozen = env.archive(
    "frozen.jar",
    &manifest("com.example:app:1.0", &["lib:missing:9.9"]),
    &[("META-INF/thin.properties", &computed)],
  );

  let mut config = RepositoryConfig::new(env.cache());
  config.offline = true;
  let offline = LocalRepository::open(config).unwrap();
  let second = Launcher::new(&offline, options(&[])).prepare(&frozen).unwrap();

  assert!(second.plan.computed);
  assert_eq!(versions(&second), versions(&first));
}

#[test]
fn diff_lists_only_what_the_child_adds() {
  let env = TestEnv::new();
  env.publish("lib:core:1.0", &[]);
  env.publish("lib:web:1.0", &["lib:http:1.0"]);
  env.publish("lib:http:1.0", &[]);
  let parent = env.archive("parent.jar", &manifest("com.example:base:1.0", &["lib:core:1.0"]), &[]);
  let child = env.archive(
    "child.jar",
    &manifest("com.example:web:1.0", &["lib:core:1.0", "lib:web:1.0"]),
    &[],
  );
  let repo = env.repository();
  let launcher = Launcher::new(&repo, options(&[]));

  let added: Vec<String> = launcher
    .diff(&parent, &child)
    .unwrap()
    .coordinates()
    .map(|c| c.to_string())
    .collect();
  assert_eq!(added, vec!["lib:web:1.0", "lib:http:1.0"]);

  assert!(launcher.diff(&parent, &parent).unwrap().is_empty());
}

#[test]
fn missing_manifest_is_reported() {
  let env = TestEnv::new();
  let bare = env.path().join("bare");
  std::fs::create_dir_all(&bare).unwrap();
  let repo = env.repository();

  let err = Launcher::new(&repo, options(&[])).prepare(&bare).unwrap_err();
  assert_eq!(err.kind(), thinlaunch_lib::error::ErrorKind::ManifestUnreadable);
}
