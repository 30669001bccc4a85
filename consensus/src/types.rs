//! Types used across the ordering protocol.

use palisade_cryptography::{union_unique, Digest, Participant, Scheme};

/// View under which an instance is ordered. Advances only on view change,
/// which is driven by the surrounding ordering layer.
pub type View = u64;

/// Position of an instance within a view.
pub type SeqNo = u64;

/// Identifier of a single ordering instance (the "3PC key").
///
/// For a given key, at most one state root is ever finally committed
/// across all honest replicas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey {
    pub view: View,
    pub seq: SeqNo,
}

impl OrderKey {
    pub fn new(view: View, seq: SeqNo) -> Self {
        Self { view, seq }
    }

    /// Compact integer form, ordered identically to the key itself.
    pub fn index(&self) -> u128 {
        ((self.view as u128) << 64) | self.seq as u128
    }
}

impl std::fmt::Display for OrderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.view, self.seq)
    }
}

/// Suffix appended to the application namespace when signing state roots,
/// preventing reuse of ordering signatures for other message types.
const MULTISIG_SUFFIX: &[u8] = b"_MULTISIG";

/// Returns the suffixed namespace for signing a state root.
#[inline]
pub(crate) fn multisig_namespace(namespace: &[u8]) -> Vec<u8> {
    union_unique(namespace, MULTISIG_SUFFIX)
}

/// The bytes a replica signs for `(key, root)`.
///
/// Binding the key into the payload keeps a partial signature produced
/// for one instance from counting toward another instance that happens
/// to reach the same root.
pub(crate) fn signing_payload(key: &OrderKey, root: &Digest) -> Vec<u8> {
    let mut payload = Vec::with_capacity(16 + 32);
    payload.extend_from_slice(&key.view.to_be_bytes());
    payload.extend_from_slice(&key.seq.to_be_bytes());
    payload.extend_from_slice(root.as_ref());
    payload
}

/// The proposer's opening message for an instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrePrepare<S: Scheme, P: Participant> {
    /// Instance being proposed.
    pub key: OrderKey,
    /// State root that applying this instance's batch would produce.
    pub state_root: Digest,
    /// State root this proposal builds on.
    pub prior_root: Digest,
    /// Certificate for the prior instance, attached by the proposer so
    /// replicas that already voted for it can adopt it without
    /// recomputing the combination.
    pub prior_certificate: Option<Certificate<S, P>>,
}

/// A replica's vote that it received a proposal for an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Prepare {
    pub key: OrderKey,
    /// Root of the proposal being voted on.
    pub state_root: Digest,
}

/// A replica's vote that a prepare quorum exists, carrying its partial
/// signature over the agreed root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit<S: Scheme> {
    pub key: OrderKey,
    /// Root the prepare quorum agreed on.
    pub state_root: Digest,
    /// The sender's signature share over `(key, state_root)`.
    pub signature: S::PartialSignature,
}

/// A quorum-certified multi-signature over a state root.
///
/// Valid only if `participants` meets the multi-signature quorum and the
/// combined `signature` verifies against every named participant's
/// registered public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate<S: Scheme, P: Participant> {
    /// Root the certificate attests to.
    pub root: Digest,
    /// Distinct replicas whose partials were combined, in identity order.
    pub participants: Vec<P>,
    /// The combined signature.
    pub signature: S::MultiSignature,
}

/// Error that may be encountered when interacting with the [Coordinator](super::Coordinator).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Proposal Errors
    /// The sender is not the expected proposer for this instance
    #[error("instance {0}: sender {1} is not the expected proposer")]
    WrongProposer(OrderKey, String),
    /// The proposal's declared prior root does not match local expectation
    #[error("instance {0}: prior root mismatch")]
    PriorRootMismatch(OrderKey),
    /// A proposal for the same instance with a different root already exists
    #[error("instance {0}: conflicting proposal")]
    ConflictingProposal(OrderKey),

    // Vote Errors
    /// No proposal is known for the referenced instance
    #[error("instance {0}: vote references unknown proposal")]
    UnknownProposal(OrderKey),
    /// The referenced instance has been retired by garbage collection
    #[error("instance {0}: superseded by watermark")]
    Superseded(OrderKey),
    /// The vote's root differs from the root under agreement
    #[error("instance {0}: vote for conflicting root")]
    ConflictingRoot(OrderKey),
    /// A vote from this sender was already recorded for this instance
    #[error("instance {0}: duplicate vote from {1}")]
    DuplicateVote(OrderKey, String),
    /// The sender is not a committee member at the current epoch
    #[error("epoch {0} has no validator {1}")]
    UnknownValidator(u64, String),
    /// The vote's partial signature does not verify
    #[error("instance {0}: invalid partial signature from {1}")]
    InvalidPartialSignature(OrderKey, String),

    // Multi-Signature Errors
    /// Fewer participants than the multi-signature quorum
    #[error("certificate has {0} participants, quorum is {1}")]
    BelowQuorum(usize, u32),
    /// The participant set names the same replica twice
    #[error("certificate names a participant twice")]
    DuplicateParticipant,
    /// A named participant is not a committee member at the current epoch
    #[error("certificate participant {0} is not a committee member")]
    UnknownParticipant(String),
    /// The combined signature does not verify against the participants
    #[error("invalid multi-signature for instance {0}")]
    InvalidMultiSignature(OrderKey),
    /// The proposal carries no certificate to adopt
    #[error("instance {0}: proposal carries no certificate")]
    MissingCertificate(OrderKey),
}

impl Error {
    /// Returns true if the error represents a blockable offense by a peer.
    pub fn blockable(&self) -> bool {
        matches!(
            self,
            Error::WrongProposer(..)
                | Error::ConflictingProposal(..)
                | Error::ConflictingRoot(..)
                | Error::InvalidPartialSignature(..)
                | Error::DuplicateParticipant
                | Error::InvalidMultiSignature(..)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_key_index_preserves_order() {
        let keys = [
            OrderKey::new(0, 0),
            OrderKey::new(0, 1),
            OrderKey::new(0, u64::MAX),
            OrderKey::new(1, 0),
            OrderKey::new(2, 7),
        ];
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].index() < pair[1].index());
        }
    }

    #[test]
    fn test_signing_payload_binds_instance() {
        let root = Digest::hash(b"root");
        let a = signing_payload(&OrderKey::new(1, 7), &root);
        let b = signing_payload(&OrderKey::new(1, 8), &root);
        assert_ne!(a, b);
    }
}
