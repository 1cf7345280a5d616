//! Integration tests for the aws-auth trust map store
//!
//! These tests require a Kubernetes cluster (kind) and exercise the
//! ConfigMap-backed store and the reconciliation loop against a real API
//! server. IAM is replaced by a static resolver.
//!
//! - `trust_map_store`: Stories about reading and conditionally replacing
//!   `mapUsers` while other writers touch the same ConfigMap
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored --nocapture
//! ```

mod helpers;
mod trust_map_store;
