//! Controller for the `aws-auth` trust map
//!
//! - [`sync`] - The periodic IAM group to `mapUsers` reconciliation loop

pub mod sync;

pub use sync::{PassOutcome, ReconcileLoop, SyncPhase, SyncSettings};
