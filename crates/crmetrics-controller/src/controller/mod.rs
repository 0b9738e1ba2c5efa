//! Work queue and worker pool driving reconciliation.

pub mod queue;
pub mod runner;

pub use queue::WorkQueue;
pub use runner::Controller;
