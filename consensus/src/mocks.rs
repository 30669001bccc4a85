//! Test fixtures for driving the [Coordinator](crate::Coordinator).

use std::sync::{Arc, RwLock};

use palisade_cryptography::mocks::Insecure;
use palisade_cryptography::registry::KeyRegistry;
use palisade_cryptography::{Digest, Scheme as _};

use crate::coordinator::{Config, Coordinator};
use crate::metrics::Metrics;
use crate::quorum::Quorums;
use crate::types::{signing_payload, Certificate, OrderKey};

/// Namespace shared by all committee fixtures.
pub const NAMESPACE: &[u8] = b"_PALISADE_TEST";

/// An `n`-replica committee over the [Insecure] scheme with every member
/// registered at epoch 0.
pub struct Committee {
    pub quorums: Quorums,
    pub registry: Arc<RwLock<KeyRegistry<u32, Insecure>>>,
    ids: Vec<u32>,
}

impl Committee {
    pub fn new(n: u32) -> Self {
        let quorums = Quorums::new(n).expect("committee too small");
        let mut registry = KeyRegistry::new();
        let ids: Vec<u32> = (0..n).collect();
        for id in &ids {
            let scheme = Insecure::new(*id);
            assert!(registry.register(0, *id, scheme.public_key()));
        }
        Self {
            quorums,
            registry: Arc::new(RwLock::new(registry)),
            ids,
        }
    }

    /// A coordinator acting as replica `id`.
    pub fn coordinator(&self, id: u32) -> Coordinator<Insecure, u32> {
        Coordinator::new(Config {
            scheme: Insecure::new(id),
            me: id,
            namespace: NAMESPACE.to_vec(),
            quorums: self.quorums,
            registry: self.registry.clone(),
            epoch: 0,
            metrics: Metrics::default(),
        })
    }

    /// The round-robin proposer for `view`.
    pub fn proposer(&self, view: u64) -> u32 {
        self.ids[(view % self.ids.len() as u64) as usize]
    }

    /// A well-formed certificate over `(key, root)` signed by `signers`.
    pub fn certificate(
        &self,
        key: OrderKey,
        root: Digest,
        signers: &[u32],
    ) -> Certificate<Insecure, u32> {
        let namespace = crate::types::multisig_namespace(NAMESPACE);
        let payload = signing_payload(&key, &root);
        let partials: Vec<_> = signers
            .iter()
            .map(|id| Insecure::new(*id).sign(&namespace, &payload))
            .collect();
        Certificate {
            root,
            participants: signers.to_vec(),
            signature: Insecure::combine(partials.iter()).expect("non-empty signer set"),
        }
    }
}
