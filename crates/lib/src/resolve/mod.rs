//! Dependency resolution.
//!
//! - `types` - the [`Resolver`] contract and [`ResolvedSet`]
//! - [`planner`] - manifest + overrides into a request, and child/parent diff
//! - [`local`] - a directory-layout repository with a local cache
//! - [`shared`] - a lazily opened handle shared across deployments

pub mod local;
pub mod planner;
pub mod shared;
mod types;

pub use local::{LocalRepository, RepositoryConfig};
pub use planner::{PlanError, PlannerOptions, ResolutionPlan, ResolutionPlanner};
pub use shared::SharedResolver;
pub use types::*;
