//! Proof-verified ledger catch-up for lagging replicas.
//!
//! A replica that is new, restarted, or freshly partitioned holds ledgers
//! that lag the pool. This crate brings each ledger into agreement with
//! the quorum without trusting any single peer: lag is established from a
//! quorum of peer-reported [types::LedgerStatus]es, the target checkpoint
//! is fixed from a quorum of identical [types::ConsistencyProof]s, and
//! every pulled batch is checked against the proof's accumulator roots
//! before it is appended.
//!
//! # Architecture
//!
//! [LedgerSync] is a per-ledger state machine over
//! {NotSynced, Syncing, Synced}:
//! - NotSynced: collects statuses and proofs; exact-match statuses from a
//!   quorum mean no catch-up is needed, while a quorum of identical
//!   proofs fixes a [types::CatchupTarget] and starts pulling.
//! - Syncing: issues bounded range requests round-robin across peers,
//!   verifies each batch against the proof-fixed boundary roots, applies
//!   strictly in sequence order (later batches are held, not applied),
//!   and re-requests a failed range from an alternate peer. Proofs whose
//!   starting point the episode has already passed are rejected as stale.
//! - Synced: ordering resumes; renewed lag re-enters the cycle.
//!
//! [SyncManager] sequences episodes across ledgers in ascending
//! [types::LedgerId] order: the pool (membership) ledger must be synced
//! before the domain ledger starts, because the committee used to judge
//! the domain ledger's evidence comes from the pool ledger.
//!
//! All cross-node interaction is message-driven: handlers consume one
//! inbound message, never block, and queue outbound messages which the
//! surrounding transport drains via [LedgerSync::take_outbound]. Retry
//! and timeout policy is owned by the transport, which reports expiry
//! through [LedgerSync::on_request_timeout].

use bytes::Bytes;
use palisade_cryptography::Digest;

pub mod types;

mod manager;
pub use manager::{Config, LedgerSync, SyncManager};
mod metrics;
pub use metrics::Metrics;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

/// An append-only transaction log with a cumulative digest over every
/// prefix.
///
/// Transactions are opaque bytes at this layer. The accumulator must be
/// deterministic: any two ledgers holding the same prefix report the same
/// digest for it.
pub trait Ledger {
    /// Number of transactions in the ledger.
    fn size(&self) -> u64;

    /// Accumulator root over the entire ledger.
    fn root(&self) -> Digest;

    /// Accumulator root over the first `n` transactions, if `n` does not
    /// exceed the current size.
    fn digest_of_prefix(&self, n: u64) -> Option<Digest>;

    /// The accumulator root that appending `txns` to a prefix with root
    /// `base` would produce. Pure; does not touch stored state.
    fn extend_digest(&self, base: &Digest, txns: &[Bytes]) -> Digest;

    /// Append transactions, returning the new root.
    fn append(&mut self, txns: &[Bytes]) -> Digest;

    /// The transactions in `[start, end)`, if the range is within the
    /// current size.
    fn read_range(&self, start: u64, end: u64) -> Option<Vec<Bytes>>;
}
