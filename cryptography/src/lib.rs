//! Multi-party signature schemes and key material for palisade.
//!
//! This crate defines the seam between the agreement protocol and the
//! underlying signature algebra: a [Scheme] produces a partial signature
//! over a message, verifies another participant's partial against its
//! registered public key, combines a quorum of partials into a single
//! [Scheme::MultiSignature], and verifies the combination against the
//! participants' aggregate public material. Consensus code never touches
//! curve arithmetic directly.
//!
//! Two implementations exist, selected at construction time:
//! - [bls12381::Bls12381]: the production backend (BLS12-381 min_pk).
//! - `mocks::Insecure`: a deterministic fake for tests (feature `mocks`).
//!
//! Public keys are distributed per epoch through a [registry::KeyRegistry];
//! registration is append-only within an epoch so a rotation can never
//! invalidate signatures certified under a prior epoch.

use std::fmt::Debug;
use std::hash::Hash;

use sha2::{Digest as _, Sha256};

pub mod bls12381;
pub mod registry;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

/// Errors that may be encountered when interacting with a [Scheme].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The public key bytes do not decode to a valid key.
    #[error("invalid public key")]
    InvalidPublicKey,
    /// A partial signature failed verification.
    #[error("invalid partial signature")]
    InvalidPartialSignature,
    /// A combined signature failed verification.
    #[error("invalid multi-signature")]
    InvalidMultiSignature,
    /// No partial signatures were provided to combine.
    #[error("nothing to combine")]
    NothingToCombine,
    /// A provided signature did not decode to a valid group element.
    #[error("malformed signature")]
    MalformedSignature,
}

/// A 32-byte cryptographic digest, used for state roots and ledger
/// accumulator roots.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// Hash arbitrary bytes into a [Digest].
    pub fn hash(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }

    /// Chain this digest with additional bytes, producing the next
    /// accumulator root.
    pub fn chain(&self, bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..")
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Concatenate a namespace and a message, prepended by the namespace length.
///
/// This produces a unique byte sequence for each `(namespace, msg)` pair,
/// preventing signatures produced for one message type from being replayed
/// as another.
pub fn union_unique(namespace: &[u8], msg: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(8 + namespace.len() + msg.len());
    result.extend_from_slice(&(namespace.len() as u64).to_be_bytes());
    result.extend_from_slice(namespace);
    result.extend_from_slice(msg);
    result
}

/// Stable identity of a participant in the pool.
///
/// Blanket-implemented for any type with the required bounds; callers
/// typically use a public key or a short node name.
pub trait Participant:
    Clone + Debug + Eq + Hash + Ord + Send + Sync + 'static
{
}

impl<T: Clone + Debug + Eq + Hash + Ord + Send + Sync + 'static> Participant for T {}

/// A multi-party signature scheme.
///
/// Each participant holds its own key material and produces
/// [Scheme::PartialSignature]s; any quorum of partials over the same
/// message combines into one [Scheme::MultiSignature] that verifies
/// against the contributing participants' public keys.
pub trait Scheme: Clone + Send + Sync + 'static {
    /// Public key material registered for a participant.
    type PublicKey: Clone + Debug + Eq + Hash + Send + Sync + 'static;
    /// One participant's signature share over a message.
    type PartialSignature: Clone + Debug + Eq + Send + Sync + 'static;
    /// A combined signature from a set of participants.
    type MultiSignature: Clone + Debug + Eq + Send + Sync + 'static;

    /// This node's own public key.
    fn public_key(&self) -> Self::PublicKey;

    /// Produce a partial signature over `message` within `namespace`.
    fn sign(&self, namespace: &[u8], message: &[u8]) -> Self::PartialSignature;

    /// Verify a partial signature against a registered public key.
    fn verify(
        public_key: &Self::PublicKey,
        namespace: &[u8],
        message: &[u8],
        partial: &Self::PartialSignature,
    ) -> Result<(), Error>;

    /// Combine partial signatures into a single multi-signature.
    ///
    /// The caller is responsible for ensuring every partial has already
    /// been individually verified and that contributors are pairwise
    /// distinct; `combine` itself performs no quorum accounting.
    fn combine<'a, I>(partials: I) -> Result<Self::MultiSignature, Error>
    where
        I: IntoIterator<Item = &'a Self::PartialSignature>;

    /// Verify a multi-signature against the contributing participants'
    /// public keys.
    fn verify_multi<'a, I>(
        public_keys: I,
        namespace: &[u8],
        message: &[u8],
        multi: &Self::MultiSignature,
    ) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'a Self::PublicKey>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_unique() {
        // Shifting bytes between namespace and message must change the payload.
        let a = union_unique(b"ab", b"c");
        let b = union_unique(b"a", b"bc");
        assert_ne!(a, b);
    }

    #[test]
    fn test_digest_chain() {
        let root = Digest::hash(b"genesis");
        let next = root.chain(b"txn");
        assert_ne!(root, next);
        // Chaining is deterministic.
        assert_eq!(next, root.chain(b"txn"));
    }
}
