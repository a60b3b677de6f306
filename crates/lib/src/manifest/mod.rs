//! Package manifests.
//!
//! Manifests declare what an application needs instead of bundling it. The
//! [`reader`] walks the parent chain and produces a [`ResolvedManifest`]
//! whose coordinates are ready for the resolver.

pub mod reader;
mod types;

pub use reader::ManifestReader;
pub use types::*;
