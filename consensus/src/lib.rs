//! Quorum-certified multi-signatures over a three-phase ordering protocol.
//!
//! A pool of `n = 3f + 1` replicas orders batches of transactions through
//! pre-prepare, prepare, and commit rounds. This crate validates that vote
//! sequence for each instance and, once the surrounding ordering layer
//! determines an instance committed, assembles a quorum-certified
//! multi-signature over the resulting state root — the artifact that lets
//! any later reader (a catching-up replica, a light client) accept a root
//! without replaying agreement.
//!
//! # Architecture
//!
//! The core of the crate is the [Coordinator]. For every in-flight
//! [types::OrderKey] it:
//! - Validates the proposer and prior-state dependency of a
//!   [types::PrePrepare]
//! - Tracks [types::Prepare] votes and rejects duplicates and conflicts
//! - Verifies the partial signature carried by each [types::Commit]
//!   against the sender's key in the shared
//!   [palisade_cryptography::registry::KeyRegistry]
//! - Combines a quorum of verified partials into a [types::Certificate]
//! - Adopts a proposer-attached certificate only after independently
//!   verifying it
//!
//! Thresholds come from [quorum::Quorums]; the signature algebra is behind
//! the [palisade_cryptography::Scheme] seam. Per-instance state is retired
//! explicitly via [Coordinator::gc], driven by the ordering layer's own
//! liveness mechanism (view change), which is out of scope here.
//!
//! # Safety
//!
//! For a given instance at most one state root can ever be certified: any
//! two multi-signature quorums intersect in an honest replica, and honest
//! replicas sign one root per instance. The coordinator treats evidence to
//! the contrary as a protocol-level bug and aborts rather than letting a
//! fork propagate.

pub mod quorum;
pub mod types;

mod coordinator;
pub use coordinator::{Config, Coordinator};
mod metrics;
pub use metrics::Metrics;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
