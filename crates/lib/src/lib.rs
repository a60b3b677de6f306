//! thinlaunch-lib: dependency resolution and isolated hosting for thin
//! archives.
//!
//! A thin archive ships its own code and a manifest naming what it depends
//! on, instead of bundling every dependency. This crate turns such an
//! archive into something runnable:
//! - `manifest`: the archive's dependency declaration, with parent chains
//!   and property placeholders folded in
//! - `overrides`: profile-specific property files that add, exclude or pin
//!   dependencies
//! - `resolve`: planning and running a resolution against a repository
//! - `classpath`: the ordered list of locations to load from
//! - `boundary`: an isolated loader built over a classpath
//! - `host`: deploying, tracking and tearing down hosted applications

pub mod archive;
pub mod boundary;
pub mod classpath;
pub mod consts;
pub mod coordinate;
pub mod error;
pub mod host;
pub mod launcher;
pub mod manifest;
pub mod overrides;
pub mod placeholder;
pub mod platform;
pub mod resolve;
pub mod util;
