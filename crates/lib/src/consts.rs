//! Crate-wide constants.

/// Application name, used for cache and config directory names.
pub const APP_NAME: &str = "thinlaunch";

/// Length of the truncated hex fingerprint used for instance ids.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Directory inside an archive that holds launcher metadata.
pub const METADATA_DIR: &str = "META-INF";

/// Path of the package manifest inside an archive.
pub const MANIFEST_PATH: &str = "META-INF/thin/manifest.toml";

/// Default base name of the override-layer property files.
pub const DEFAULT_LAYER_NAME: &str = "thin";

/// Prefix under which an archive embeds its own classes.
pub const NESTED_CLASSES_PREFIX: &str = "classes/";

/// Separator between an outer archive path and a nested entry path.
pub const NESTED_SEPARATOR: &str = "!/";

/// File suffix of loadable classes on a classpath.
pub const CLASS_SUFFIX: &str = ".class";

/// Default artifact extension.
pub const DEFAULT_EXTENSION: &str = "jar";

/// Maximum nesting depth when expanding property references.
pub const MAX_PROPERTY_DEPTH: usize = 10;

/// Maximum depth of a manifest parent chain.
pub const MAX_PARENT_DEPTH: usize = 16;

/// Default time a deploy waits for an application to start.
pub const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 60;

/// Name of the built-in entry point that runs a child process.
pub const COMMAND_ENTRY_POINT: &str = "command";

/// How long a child process gets to exit after SIGTERM before it is killed.
pub const COMMAND_STOP_GRACE_MS: u64 = 5_000;
