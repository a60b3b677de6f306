//! Fixtures shared by the library integration tests.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thinlaunch_lib::coordinate::Coordinate;
use thinlaunch_lib::resolve::{LocalRepository, RepositoryConfig};
use zip::write::SimpleFileOptions;

/// A scratch directory with a remote repository and an empty cache.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  pub fn remote(&self) -> PathBuf {
    self.path().join("remote")
  }

  pub fn cache(&self) -> PathBuf {
    self.path().join("cache")
  }

  pub fn repository(&self) -> LocalRepository {
    let mut config = RepositoryConfig::new(self.cache());
    config.remotes = vec![self.remote()];
    LocalRepository::open(config).unwrap()
  }

  /// Publish an artifact to the remote, with an optional manifest listing
  /// its dependencies.
  pub fn publish(&self, coordinate: &str, dependencies: &[&str]) -> PathBuf {
    let c: Coordinate = coordinate.parse().unwrap();
    let dir = self.remote().join(c.repository_dir().unwrap());
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join(c.file_name().unwrap());
    fs::write(&file, coordinate).unwrap();

    if !dependencies.is_empty() {
      let mut manifest = format!("coordinate = \"{coordinate}\"\n");
      for dep in dependencies {
        manifest.push_str(&format!("\n[[dependencies]]\ncoordinate = \"{dep}\"\n"));
      }
      fs::write(dir.join(format!("{}-{}.toml", c.name, c.version.unwrap())), manifest).unwrap();
    }
    file
  }

  /// Build a thin archive with the given manifest and extra entries.
  pub fn archive(&self, name: &str, manifest: &str, extra: &[(&str, &str)]) -> PathBuf {
    let path = self.path().join(name);
    let file = fs::File::create(&path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
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
}

/// A manifest declaring the given dependencies.
pub fn manifest(coordinate: &str, dependencies: &[&str]) -> String {
  let mut manifest = format!("coordinate = \"{coordinate}\"\n");
  for dep in dependencies {
    manifest.push_str(&format!("\n[[dependencies]]\ncoordinate = \"{dep}\"\n"));
  }
  manifest
}
