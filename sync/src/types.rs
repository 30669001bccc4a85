//! Types exchanged during ledger catch-up.

use bytes::Bytes;
use palisade_cryptography::{Digest, Participant};

/// Identifier of a ledger within the pool. Catch-up episodes run in
/// ascending id order: a ledger may only start catching up once every
/// lower-numbered ledger is synced.
pub type LedgerId = u8;

/// The membership ledger. Must be synced before any other ledger, since
/// committee membership used to validate everything else derives from it.
pub const POOL_LEDGER: LedgerId = 0;

/// The application ledger.
pub const DOMAIN_LEDGER: LedgerId = 1;

/// Whether local ordering participation for a ledger is trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerState {
    /// The ledger may be behind the pool; ordering is not trusted.
    NotSynced,
    /// A catch-up episode is in flight.
    Syncing,
    /// The ledger matches the quorum-agreed state; ordering resumes.
    Synced,
}

/// A peer's self-reported view of one of its ledgers. Raw evidence for
/// deciding lag; never trusted individually.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct LedgerStatus {
    pub ledger_id: LedgerId,
    pub size: u64,
    pub root: Digest,
}

/// A peer's claim that a ledger transitioned between two checkpoints,
/// carrying the accumulator roots at every batch boundary in between.
///
/// The boundary roots are what let each pulled batch be verified on
/// arrival rather than only once the final target root is reachable. A
/// proof is acted on only once a quorum of peers have made the identical
/// claim.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConsistencyProof {
    pub ledger_id: LedgerId,
    /// Size of the ledger at the claimed starting checkpoint.
    pub seq_no_start: u64,
    /// Size of the ledger at the claimed ending checkpoint.
    pub seq_no_end: u64,
    /// Accumulator root over the first `seq_no_start` transactions.
    pub old_root: Digest,
    /// Accumulator root over the first `seq_no_end` transactions.
    pub new_root: Digest,
    /// Roots at each batch boundary in `(seq_no_start, seq_no_end]`,
    /// ascending; the final entry is `(seq_no_end, new_root)`.
    pub boundary_roots: Vec<(u64, Digest)>,
}

/// Request for the transactions in `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CatchupRequest {
    pub ledger_id: LedgerId,
    pub start: u64,
    pub end: u64,
}

/// The transactions for a previously requested range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatchupReply {
    pub ledger_id: LedgerId,
    pub start: u64,
    pub txns: Vec<Bytes>,
}

/// The checkpoint a catch-up episode is committed to reaching.
///
/// Immutable once fixed; replaced only if proven unreachable, in which
/// case the episode restarts from fresh evidence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatchupTarget {
    pub seq_no_start: u64,
    pub seq_no_end: u64,
    /// Accumulator root the ledger must have at `seq_no_end`.
    pub root: Digest,
    /// Quorum-backed roots at each batch boundary, from the accepted
    /// consistency proof.
    pub boundaries: std::collections::BTreeMap<u64, Digest>,
}

/// A catch-up message, tagged for transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Status(LedgerStatus),
    Proof(ConsistencyProof),
    Request(CatchupRequest),
    Reply(CatchupReply),
}

impl Message {
    /// The ledger this message concerns.
    pub fn ledger_id(&self) -> LedgerId {
        match self {
            Message::Status(status) => status.ledger_id,
            Message::Proof(proof) => proof.ledger_id,
            Message::Request(request) => request.ledger_id,
            Message::Reply(reply) => reply.ledger_id,
        }
    }
}

/// A message addressed to a peer, handed to the surrounding transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outbound<P: Participant> {
    pub to: P,
    pub message: Message,
}

/// Error that may be encountered when interacting with the
/// [LedgerSync](super::LedgerSync).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Routing Errors
    /// The message names a ledger this manager does not own
    #[error("message for ledger {0}, expected {1}")]
    WrongLedger(LedgerId, LedgerId),
    /// The message names a ledger no manager owns
    #[error("no manager for ledger {0}")]
    UnknownLedger(LedgerId),
    /// The sender is not a known pool member
    #[error("unknown peer {0}")]
    UnknownPeer(String),

    // Consistency Proof Errors
    /// The proof's starting point is below the episode's progress
    #[error("consistency proof starting at {claimed} is stale, progress at {progress}")]
    StaleConsistencyProof { claimed: u64, progress: u64 },
    /// The proof proposes a different target than the in-flight episode
    #[error("consistency proof conflicts with the in-flight target")]
    ConflictingProof,
    /// The proof is structurally unsound or inconsistent with the local prefix
    #[error("malformed consistency proof")]
    InvalidProof,

    // Catch-up Errors
    /// Every peer has failed or refused the current target; episode restarted
    #[error("catch-up target unreachable, episode restarted")]
    UnreachableTarget,
    /// A pulled batch's accumulator digest diverged from the proof
    #[error("batch for range [{start}, {end}) failed verification")]
    Verification { start: u64, end: u64 },
    /// A reply arrived for a range that was never requested
    #[error("unexpected reply for range starting at {0}")]
    UnexpectedReply(u64),
    /// A peer requested a range beyond the local ledger
    #[error("request for range [{start}, {end}) outside the local ledger")]
    UnavailableRange { start: u64, end: u64 },
}

impl Error {
    /// Returns true if the error represents a blockable offense by a peer.
    pub fn blockable(&self) -> bool {
        matches!(
            self,
            Error::InvalidProof | Error::Verification { .. }
        )
    }
}
