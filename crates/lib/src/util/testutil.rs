//! Test utilities for thinlaunch-lib.
//!
//! Builders for throwaway archives and repository layouts used by unit tests.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;

/// Write a zip archive at `path` with the given `(entry, content)` pairs.
///
/// Directory entries are expressed with a trailing `/` and empty content.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) -> PathBuf {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  let file = fs::File::create(path).unwrap();
  let mut writer = zip::ZipWriter::new(file);
  let options = SimpleFileOptions::default();

  for (name, content) in entries {
    if name.ends_with('/') {
      writer.add_directory(*name, options).unwrap();
    } else {
      writer.start_file(*name, options).unwrap();
      writer.write_all(content.as_bytes()).unwrap();
    }
  }

  writer.finish().unwrap();
  path.to_path_buf()
}

/// Write a file relative to `root`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
  let path = root.join(relative);
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(&path, content).unwrap();
  path
}

/// Returns the command and args to execute a shell script.
#[cfg(unix)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

#[cfg(windows)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("cmd.exe", vec!["/C".to_string(), script.to_string()])
}
