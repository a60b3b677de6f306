//! Hosting archives through the built-in command entry point.

#![cfg(unix)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thinlaunch_lib::host::{
  CommandEntryPoint, DeployRequest, EntryPoints, ExtensionRegistry, HostConfig, InstanceId, InstanceStatus,
  LaunchState, RuntimeHost,
};

use super::common::TestEnv;

fn host(env: &TestEnv) -> RuntimeHost {
  let entries = EntryPoints::new().with(Arc::new(CommandEntryPoint));
  RuntimeHost::new(Arc::new(env.repository()), entries, HostConfig::default())
    .with_extensions(Arc::new(ExtensionRegistry::new()))
}

fn command_archive(env: &TestEnv, name: &str, dependencies: &[&str]) -> std::path::PathBuf {
  let mut manifest = format!("coordinate = \"com.example:{name}:1.0\"\n\n[launch]\nentry = \"command\"\nmain = \"/bin/sh\"\n");
  for dep in dependencies {
    manifest.push_str(&format!("\n[[dependencies]]\ncoordinate = \"{dep}\"\n"));
  }
  env.archive(&format!("{name}.jar"), &manifest, &[])
}

fn wait_until_stopped(host: &RuntimeHost, id: &InstanceId) -> InstanceStatus {
  let deadline = Instant::now() + Duration::from_secs(10);
  loop {
    let status = host.status(id).unwrap();
    if !status.state.is_running() || Instant::now() > deadline {
      return status;
    }
    thread::sleep(Duration::from_millis(20));
  }
}

#[test]
fn child_process_receives_the_classpath() {
  let env = TestEnv::new();
  let core = env.publish("lib:core:1.0", &[]);
  let archive = command_archive(&env, "app", &["lib:core:1.0"]);
  let out = env.path().join("classpath.txt");
  let host = host(&env);

  let request = DeployRequest::new(&archive).args([
    "-c".to_string(),
    format!("printf '%s' \"$CLASSPATH\" > '{}'", out.display()),
  ]);
  let id = host.deploy(request).unwrap();
  let status = wait_until_stopped(&host, &id);

  assert_eq!(status.state, LaunchState::Complete);
  let classpath = std::fs::read_to_string(&out).unwrap();
  assert!(classpath.contains("app.jar"));
  assert!(classpath.contains(core.file_name().unwrap().to_str().unwrap()));
}

#[test]
fn cancelling_stops_the_process() {
  let env = TestEnv::new();
  let archive = command_archive(&env, "server", &[]);
  let host = host(&env);

  let id = host.deploy(DeployRequest::new(&archive).args(["-c", "sleep 30"])).unwrap();
  assert_eq!(host.status(&id).unwrap().state, LaunchState::Running);
  assert_eq!(host.deploy(DeployRequest::new(&archive)).unwrap(), id);

  assert_eq!(host.cancel(&id).unwrap(), LaunchState::Cancelled);
  let status = host.status(&id).unwrap();
  assert_eq!(status.state, LaunchState::Cancelled);
  assert!(!status.leaked);
  assert_eq!(host.status(&id).unwrap().state, LaunchState::Cancelled);
}

#[test]
fn failing_process_is_recorded() {
  let env = TestEnv::new();
  let archive = command_archive(&env, "broken", &[]);
  let host = host(&env);

  let id = host.deploy(DeployRequest::new(&archive).args(["-c", "exit 3"])).unwrap();
  let status = wait_until_stopped(&host, &id);

  assert_eq!(status.state, LaunchState::Failed);
  assert!(status.error.unwrap().contains("exited"));
  assert_eq!(status.boundary, None);
}

#[test]
fn unresolvable_dependency_fails_the_deploy() {
  let env = TestEnv::new();
  let archive = command_archive(&env, "orphan", &["lib:absent:1.0"]);
  let host = host(&env);

  let err = host.deploy(DeployRequest::new(&archive)).unwrap_err();
  assert!(err.kind().is_some_and(|k| k.is_fatal()));
}
