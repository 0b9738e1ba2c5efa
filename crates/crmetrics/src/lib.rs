//! Top-level facade crate for crmetrics.
//!
//! Re-exports the core data model and the controller library so users can depend on a single crate.

pub mod core {
    pub use crmetrics_core::*;
}

pub mod controller {
    pub use crmetrics_controller::*;
}
