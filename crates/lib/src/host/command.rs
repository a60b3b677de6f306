//! Built-in entry point that runs the declared main program as a child
//! process, with the assembled classpath exported as `CLASSPATH`.

use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::contract::{AppError, ApplicationFactory, HostedApplication, LaunchContext};
use crate::consts::{COMMAND_ENTRY_POINT, COMMAND_STOP_GRACE_MS};

/// Environment variable carrying the classpath to the child.
pub const CLASSPATH_ENV: &str = "CLASSPATH";
/// Environment variable carrying the instance id to the child.
pub const INSTANCE_ENV: &str = "THIN_INSTANCE_ID";

#[derive(Debug, Default, Clone, Copy)]
pub struct CommandEntryPoint;

impl ApplicationFactory for CommandEntryPoint {
  fn name(&self) -> &str {
    COMMAND_ENTRY_POINT
  }

  fn create(&self, _context: &LaunchContext) -> Result<Box<dyn HostedApplication>, AppError> {
    Ok(Box::new(CommandApplication::default()))
  }
}

#[derive(Default)]
struct Process {
  child: Option<Child>,
  exit: Option<ExitStatus>,
}

/// A hosted application backed by a child process.
#[derive(Default)]
pub struct CommandApplication {
  process: Mutex<Process>,
}

impl CommandApplication {
  fn program(context: &LaunchContext) -> Result<PathBuf, AppError> {
    let main = context
      .main
      .as_deref()
      .ok_or("the manifest declares no main program for the command entry point")?;
    // Relative programs shipped next to the archive win over PATH lookups.
    let beside = context.resource.parent().map(|dir| dir.join(main));
    Ok(match beside {
      Some(path) if path.is_file() => path,
      _ => PathBuf::from(main),
    })
  }

  fn poll(process: &mut Process) -> Option<ExitStatus> {
    if process.exit.is_none()
      && let Some(child) = process.child.as_mut()
    {
      match child.try_wait() {
        Ok(Some(status)) => {
          debug!(pid = child.id(), %status, "child exited");
          process.exit = Some(status);
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "failed to poll child process"),
      }
    }
    process.exit
  }
}

impl HostedApplication for CommandApplication {
  fn run(&self, context: &LaunchContext) -> Result<(), AppError> {
    let program = Self::program(context)?;
    let classpath = context.classpath.to_path_string()?;

    let child = Command::new(&program)
      .args(&context.args)
      .env(CLASSPATH_ENV, classpath)
      .env(INSTANCE_ENV, context.id.to_string())
      .stdin(Stdio::inherit())
      .stdout(Stdio::inherit())
      .stderr(Stdio::inherit())
      .spawn()
      .map_err(|e| format!("failed to start {}: {e}", program.display()))?;
    info!(pid = child.id(), program = %program.display(), "started child process");

    self.process.lock().unwrap_or_else(|e| e.into_inner()).child = Some(child);
    Ok(())
  }

  fn is_running(&self) -> bool {
    let mut process = self.process.lock().unwrap_or_else(|e| e.into_inner());
    process.child.is_some() && Self::poll(&mut process).is_none()
  }

  fn error(&self) -> Option<String> {
    let mut process = self.process.lock().unwrap_or_else(|e| e.into_inner());
    Self::poll(&mut process)
      .filter(|status| !status.success())
      .map(|status| format!("process exited with {status}"))
  }

  fn close(&self) -> Result<(), AppError> {
    let mut process = self.process.lock().unwrap_or_else(|e| e.into_inner());
    if Self::poll(&mut process).is_some() {
      return Ok(());
    }
    if let Some(child) = process.child.as_mut() {
      let status = stop(child, Duration::from_millis(COMMAND_STOP_GRACE_MS))?;
      process.exit = Some(status);
    }
    Ok(())
  }
}

/// Ask the child to terminate, and kill it if it is still alive once
/// `grace` has passed.
fn stop(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
  debug!(pid = child.id(), "stopping child process");
  match terminate(child) {
    Ok(()) => {
      let deadline = Instant::now() + grace;
      while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
          return Ok(status);
        }
        thread::sleep(Duration::from_millis(20));
      }
      warn!(pid = child.id(), grace = ?grace, "child did not stop in time; killing it");
    }
    Err(e) => warn!(pid = child.id(), error = %e, "failed to signal child; killing it"),
  }
  child.kill()?;
  child.wait()
}

#[cfg(unix)]
fn terminate(child: &Child) -> io::Result<()> {
  use rustix::process::{Pid, Signal, kill_process};

  kill_process(Pid::from_child(child), Signal::TERM).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(not(unix))]
fn terminate(_child: &Child) -> io::Result<()> {
  Err(io::Error::new(io::ErrorKind::Unsupported, "no cooperative stop on this platform"))
}
