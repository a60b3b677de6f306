use std::path::PathBuf;

use crate::consts::APP_NAME;

/// Overrides the artifact cache root.
pub const ROOT_ENV: &str = "THIN_ROOT";
/// Path list of remote repository directories.
pub const REPOS_ENV: &str = "THIN_REPOS";
/// Any value other than empty, `0` or `false` enables offline mode.
pub const OFFLINE_ENV: &str = "THIN_OFFLINE";
/// Comma separated profile list.
pub const PROFILE_ENV: &str = "THIN_PROFILE";

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("USERPROFILE").map(PathBuf::from)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").map(PathBuf::from)
}

/// Returns the directory for cache files for the application
#[cfg(windows)]
pub fn cache_dir() -> Option<PathBuf> {
  std::env::var_os("LOCALAPPDATA").map(|p| PathBuf::from(p).join(APP_NAME).join("Cache"))
}

/// Returns the directory for cache files for the application
#[cfg(not(windows))]
pub fn cache_dir() -> Option<PathBuf> {
  let cache_home = std::env::var_os("XDG_CACHE_HOME")
    .filter(|v| !v.is_empty())
    .map(PathBuf::from)
    .or_else(|| home_dir().map(|home| home.join(".cache")))?;
  Some(cache_home.join(APP_NAME))
}

/// Artifact cache root: `THIN_ROOT`, else `<cache dir>/repository`.
pub fn repository_root() -> Option<PathBuf> {
  if let Some(root) = std::env::var_os(ROOT_ENV).filter(|v| !v.is_empty()) {
    return Some(PathBuf::from(root));
  }
  cache_dir().map(|dir| dir.join("repository"))
}

/// Remote repository directories from `THIN_REPOS`.
pub fn remote_repositories() -> Vec<PathBuf> {
  std::env::var_os(REPOS_ENV)
    .map(|value| std::env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()).collect())
    .unwrap_or_default()
}

/// Whether `THIN_OFFLINE` requests offline mode.
pub fn offline() -> bool {
  std::env::var(OFFLINE_ENV)
    .map(|v| {
      let v = v.trim();
      !(v.is_empty() || v == "0" || v.eq_ignore_ascii_case("false"))
    })
    .unwrap_or(false)
}

/// Profiles from `THIN_PROFILE`.
pub fn profiles() -> Vec<String> {
  std::env::var(PROFILE_ENV)
    .map(|v| split_list(&v))
    .unwrap_or_default()
}

/// Split a comma separated list, dropping empty items.
pub fn split_list(value: &str) -> Vec<String> {
  value
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
#[cfg(not(windows))]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn root_env_takes_precedence() {
    temp_env::with_vars(
      [
        (ROOT_ENV, Some("/custom/root")),
        ("XDG_CACHE_HOME", Some("/custom/cache")),
      ],
      || {
        assert_eq!(repository_root(), Some(PathBuf::from("/custom/root")));
      },
    );
  }

  #[test]
  #[serial]
  fn xdg_fallback_to_home_directories() {
    temp_env::with_vars(
      [
        (ROOT_ENV, None::<&str>),
        ("XDG_CACHE_HOME", None::<&str>),
        ("HOME", Some("/home/user")),
      ],
      || {
        assert_eq!(cache_dir(), Some(PathBuf::from("/home/user/.cache").join(APP_NAME)));
        assert_eq!(
          repository_root(),
          Some(PathBuf::from("/home/user/.cache").join(APP_NAME).join("repository"))
        );
      },
    );
  }

  #[test]
  #[serial]
  fn offline_and_repos_from_env() {
    temp_env::with_vars(
      [
        (OFFLINE_ENV, Some("true")),
        (REPOS_ENV, Some("/a:/b")),
        (PROFILE_ENV, Some("dev, extra,")),
      ],
      || {
        assert!(offline());
        assert_eq!(remote_repositories(), vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(profiles(), vec!["dev", "extra"]);
      },
    );
    temp_env::with_var(OFFLINE_ENV, Some("0"), || assert!(!offline()));
    temp_env::with_var(OFFLINE_ENV, None::<&str>, || assert!(!offline()));
  }
}
