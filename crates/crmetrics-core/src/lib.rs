//! crmetrics core: resource data model and the error surface shared by the
//! controller and tooling.
//!
//! This crate carries no runtime or transport dependencies so it can be reused
//! by test harnesses and cluster client implementations alike.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths surface as `CrMetricsError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod resource;

/// Shared result type.
pub use error::{CrMetricsError, ErrorClass, Result};
pub use resource::{
    ResourceIdentity, ResourceSnapshot, ResourceSpec, ResourceStatus, TypeMeta, Workload,
    WorkloadSpec, FINALIZER,
};
