//! crmetrics controller library entry.
//!
//! This crate wires the metric registry, the lifecycle synchronizer, the
//! owned-workload sync, the work queue, and the `/metrics` endpoint into a
//! controller. It is consumed by the binary (`main.rs`) and by integration
//! tests.

pub mod app_state;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod obs;
pub mod ops;
pub mod reconcile;
pub mod router;
