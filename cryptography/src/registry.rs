//! Epoch-scoped registry of participant public keys.

use std::collections::BTreeMap;

use crate::{Participant, Scheme};

/// Epoch under which a set of key bindings applies. Epochs advance on
/// committee changes; bindings within an epoch never change.
pub type Epoch = u64;

/// Maps participant identity to current public key material, per epoch.
///
/// Registration is append-only within an epoch: a binding, once made, is
/// never replaced. Rotation happens by registering a new epoch, which
/// leaves certificates formed under prior epochs verifiable forever.
pub struct KeyRegistry<P: Participant, S: Scheme> {
    epochs: BTreeMap<Epoch, BTreeMap<P, S::PublicKey>>,
}

impl<P: Participant, S: Scheme> KeyRegistry<P, S> {
    pub fn new() -> Self {
        Self {
            epochs: BTreeMap::new(),
        }
    }

    /// Bind `participant` to `key` for `epoch`.
    ///
    /// Returns `false` (and leaves the registry untouched) if the
    /// participant already has a binding for this epoch.
    pub fn register(&mut self, epoch: Epoch, participant: P, key: S::PublicKey) -> bool {
        let bindings = self.epochs.entry(epoch).or_default();
        if bindings.contains_key(&participant) {
            return false;
        }
        bindings.insert(participant, key);
        true
    }

    /// Public key registered for `participant` at `epoch`, if any.
    pub fn public_key_for(&self, participant: &P, epoch: Epoch) -> Option<&S::PublicKey> {
        self.epochs.get(&epoch)?.get(participant)
    }

    /// All participants registered for `epoch`, in identity order.
    ///
    /// The order is stable across nodes, which makes it usable for
    /// round-robin proposer selection.
    pub fn participants(&self, epoch: Epoch) -> Vec<P> {
        self.epochs
            .get(&epoch)
            .map(|bindings| bindings.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `participant` is a committee member at `epoch`.
    pub fn is_member(&self, participant: &P, epoch: Epoch) -> bool {
        self.public_key_for(participant, epoch).is_some()
    }
}

impl<P: Participant, S: Scheme> Default for KeyRegistry<P, S> {
    fn default() -> Self {
        Self::new()
    }
}
