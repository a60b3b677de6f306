//! Override layers: profile-qualified property files that add, exclude, or
//! pin dependencies on top of a manifest.

mod directive;
pub mod layer;
pub mod properties;

pub use directive::{DirectiveKind, OverrideDirective, OverrideError};
pub use layer::{LayerLoader, OverrideLayer};
