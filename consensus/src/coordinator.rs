//! Collection of quorum-certified multi-signatures over ordered state roots.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use palisade_cryptography::registry::{Epoch, KeyRegistry};
use palisade_cryptography::{Digest, Participant, Scheme};
use tracing::{debug, warn};

use crate::metrics::Metrics;
use crate::quorum::Quorums;
use crate::types::{
    multisig_namespace, signing_payload, Certificate, Commit, Error, OrderKey, PrePrepare, Prepare,
};

/// Configuration for the [Coordinator].
pub struct Config<S: Scheme, P: Participant> {
    /// This node's signing material.
    pub scheme: S,
    /// This node's identity within the pool.
    pub me: P,
    /// The application namespace used to sign over different types of messages.
    /// Used to prevent replay attacks on other applications.
    pub namespace: Vec<u8>,
    /// Certificate thresholds for the pool.
    pub quorums: Quorums,
    /// Public key material for the pool, shared with catch-up.
    pub registry: Arc<RwLock<KeyRegistry<P, S>>>,
    /// Epoch under which committee membership is resolved.
    pub epoch: Epoch,
    /// Metrics for this coordinator.
    pub metrics: Metrics,
}

/// Per-instance signature-collection state.
struct Instance<S: Scheme, P: Participant> {
    /// Accepted proposal: (state root, prior root).
    proposal: Option<(Digest, Digest)>,
    /// Prepare votes recorded, by sender.
    prepares: BTreeMap<P, Digest>,
    /// Verified partial signatures recorded, by sender.
    partials: BTreeMap<P, (Digest, S::PartialSignature)>,
    /// Certificate persisted for this instance, if any.
    certificate: Option<Certificate<S, P>>,
}

impl<S: Scheme, P: Participant> Instance<S, P> {
    fn new() -> Self {
        Self {
            proposal: None,
            prepares: BTreeMap::new(),
            partials: BTreeMap::new(),
            certificate: None,
        }
    }
}

/// Validates the three-phase vote sequence for each ordering instance and,
/// once the ordering layer determines an instance is committed, assembles a
/// quorum-certified multi-signature over the resulting state root.
///
/// The coordinator owns all per-instance signature state. Instances live in
/// an arena keyed by [OrderKey] and bounded below by a watermark: once the
/// ordering layer retires a key via [Coordinator::gc], everything at or
/// below it is discarded and later votes for those keys are rejected as
/// superseded. Validation failures are returned to the caller and never
/// mutate state; the caller decides whether to discipline the sender (see
/// [Error::blockable]).
pub struct Coordinator<S: Scheme, P: Participant> {
    scheme: S,
    me: P,
    namespace: Vec<u8>,
    quorums: Quorums,
    registry: Arc<RwLock<KeyRegistry<P, S>>>,
    epoch: Epoch,
    watermark: Option<OrderKey>,
    instances: BTreeMap<OrderKey, Instance<S, P>>,
    metrics: Metrics,
}

impl<S: Scheme, P: Participant> Coordinator<S, P> {
    pub fn new(cfg: Config<S, P>) -> Self {
        Self {
            scheme: cfg.scheme,
            me: cfg.me,
            namespace: multisig_namespace(&cfg.namespace),
            quorums: cfg.quorums,
            registry: cfg.registry,
            epoch: cfg.epoch,
            watermark: None,
            instances: BTreeMap::new(),
            metrics: cfg.metrics,
        }
    }

    /// This node's identity.
    pub fn me(&self) -> &P {
        &self.me
    }

    /// Advance to a new epoch; committee membership for subsequent
    /// validation resolves against the new epoch's registrations.
    pub fn enter_epoch(&mut self, epoch: Epoch) {
        self.epoch = epoch;
    }

    /// Reject keys retired by [Coordinator::gc].
    fn active(&self, key: OrderKey) -> Result<(), Error> {
        match self.watermark {
            Some(watermark) if key <= watermark => Err(Error::Superseded(key)),
            _ => Ok(()),
        }
    }

    /// The expected proposer for `view`: round-robin over the committee
    /// in identity order.
    fn proposer(&self, view: u64) -> Option<P> {
        let registry = self.registry.read().unwrap();
        let participants = registry.participants(self.epoch);
        if participants.is_empty() {
            return None;
        }
        let index = (view % participants.len() as u64) as usize;
        Some(participants[index].clone())
    }

    /// Validate the opening proposal for an instance.
    ///
    /// Rejects proposals from anyone but the expected proposer for the
    /// view, proposals whose declared prior root is inconsistent with the
    /// locally expected prior root, and conflicting re-proposals.
    pub fn validate_pre_prepare(
        &mut self,
        pre_prepare: &PrePrepare<S, P>,
        sender: &P,
        expected_prior_root: &Digest,
    ) -> Result<(), Error> {
        let key = pre_prepare.key;
        self.active(key).inspect_err(|_| {
            self.metrics.rejected.inc();
        })?;
        let result = (|| {
            let Some(proposer) = self.proposer(key.view) else {
                return Err(Error::UnknownValidator(self.epoch, format!("{sender:?}")));
            };
            if *sender != proposer {
                return Err(Error::WrongProposer(key, format!("{sender:?}")));
            }
            if pre_prepare.prior_root != *expected_prior_root {
                return Err(Error::PriorRootMismatch(key));
            }
            if let Some(instance) = self.instances.get(&key) {
                if let Some((root, _)) = instance.proposal {
                    if root != pre_prepare.state_root {
                        return Err(Error::ConflictingProposal(key));
                    }
                }
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                let instance = self.instances.entry(key).or_insert_with(Instance::new);
                instance.proposal = Some((pre_prepare.state_root, pre_prepare.prior_root));
                self.metrics.proposals.inc();
                self.metrics.instances.set(self.instances.len() as i64);
                debug!(%key, root = %pre_prepare.state_root, "accepted proposal");
                Ok(())
            }
            Err(err) => {
                self.metrics.rejected.inc();
                Err(err)
            }
        }
    }

    /// Validate a prepare vote.
    ///
    /// Rejects votes referencing an unknown or superseded proposal, votes
    /// for a root other than the proposed one, and duplicates.
    pub fn validate_prepare(&mut self, prepare: &Prepare, sender: &P) -> Result<(), Error> {
        let key = prepare.key;
        let result = (|| {
            self.active(key)?;
            let Some(instance) = self.instances.get(&key) else {
                return Err(Error::UnknownProposal(key));
            };
            let Some((root, _)) = instance.proposal else {
                return Err(Error::UnknownProposal(key));
            };
            if prepare.state_root != root {
                return Err(Error::ConflictingRoot(key));
            }
            if instance.prepares.contains_key(sender) {
                return Err(Error::DuplicateVote(key, format!("{sender:?}")));
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                let instance = self.instances.get_mut(&key).expect("checked above");
                instance.prepares.insert(sender.clone(), prepare.state_root);
                self.metrics.votes.inc();
                Ok(())
            }
            Err(err) => {
                self.metrics.rejected.inc();
                Err(err)
            }
        }
    }

    /// Validate a commit vote and record its partial signature.
    ///
    /// Beyond the prepare checks, the committed root must match what the
    /// prepare quorum agreed on, the sender must be a committee member at
    /// the current epoch, and the carried partial signature must verify
    /// against the sender's registered key.
    pub fn validate_commit(
        &mut self,
        commit: &Commit<S>,
        sender: &P,
        expected_state_root: &Digest,
    ) -> Result<(), Error> {
        let key = commit.key;
        let result = (|| {
            self.active(key)?;
            let Some(instance) = self.instances.get(&key) else {
                return Err(Error::UnknownProposal(key));
            };
            if instance.proposal.is_none() {
                return Err(Error::UnknownProposal(key));
            }
            if commit.state_root != *expected_state_root {
                return Err(Error::ConflictingRoot(key));
            }
            if instance.partials.contains_key(sender) {
                return Err(Error::DuplicateVote(key, format!("{sender:?}")));
            }
            let registry = self.registry.read().unwrap();
            let Some(public_key) = registry.public_key_for(sender, self.epoch) else {
                return Err(Error::UnknownValidator(self.epoch, format!("{sender:?}")));
            };
            let payload = signing_payload(&key, &commit.state_root);
            S::verify(public_key, &self.namespace, &payload, &commit.signature)
                .map_err(|_| Error::InvalidPartialSignature(key, format!("{sender:?}")))?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                let instance = self.instances.get_mut(&key).expect("checked above");
                instance
                    .partials
                    .insert(sender.clone(), (commit.state_root, commit.signature.clone()));
                self.metrics.votes.inc();
                debug!(%key, sender = ?sender, "recorded partial signature");
                Ok(())
            }
            Err(err) => {
                self.metrics.rejected.inc();
                Err(err)
            }
        }
    }

    /// Produce this node's partial signature over `(key, root)`.
    pub fn sign_state(&self, key: OrderKey, root: &Digest) -> S::PartialSignature {
        let payload = signing_payload(&key, root);
        self.scheme.sign(&self.namespace, &payload)
    }

    /// Assemble a certificate for `key` if a multi-signature quorum of
    /// verified partials over the same root has been collected.
    ///
    /// Returns `None` while quorum is outstanding. Two different roots
    /// both reaching quorum for one key would break the agreement safety
    /// invariant and aborts the process.
    pub fn calculate_multi_sig(&mut self, key: OrderKey) -> Option<Certificate<S, P>> {
        let instance = self.instances.get(&key)?;

        // Group verified partials by the root they attest to.
        let mut by_root: BTreeMap<Digest, Vec<&P>> = BTreeMap::new();
        for (sender, (root, _)) in &instance.partials {
            by_root.entry(*root).or_default().push(sender);
        }
        let mut certified: Vec<Digest> = by_root
            .iter()
            .filter(|(_, senders)| self.quorums.multi_signature.reached(senders.len()))
            .map(|(root, _)| *root)
            .collect();
        assert!(
            certified.len() <= 1,
            "two state roots reached quorum for instance {key}: agreement safety violated"
        );
        let root = certified.pop()?;

        // A certificate this node previously persisted must agree.
        if let Some(existing) = &instance.certificate {
            assert!(
                existing.root == root,
                "instance {key} certified root {} but quorum now backs {root}: agreement safety violated",
                existing.root
            );
        }

        let participants: Vec<P> = by_root[&root].iter().map(|p| (*p).clone()).collect();
        let partials = participants
            .iter()
            .map(|p| &instance.partials[p].1)
            .collect::<Vec<_>>();
        let signature = match S::combine(partials.into_iter()) {
            Ok(signature) => signature,
            Err(err) => {
                // Every partial was verified on entry; a combine failure
                // means a malformed share slipped through.
                warn!(%key, ?err, "failed to combine verified partials");
                return None;
            }
        };
        debug!(%key, %root, participants = participants.len(), "assembled multi-signature");
        Some(Certificate {
            root,
            participants,
            signature,
        })
    }

    /// Validate a certificate against the committee at the current epoch.
    ///
    /// Fails if the participant set is below quorum or names anyone twice,
    /// if any participant lacks a registered key, if the certified root is
    /// not `expected_root`, or if the combined signature does not verify.
    pub fn validate_multi_sig(
        &self,
        certificate: &Certificate<S, P>,
        key: OrderKey,
        expected_root: &Digest,
    ) -> Result<(), Error> {
        if !self
            .quorums
            .multi_signature
            .reached(certificate.participants.len())
        {
            return Err(Error::BelowQuorum(
                certificate.participants.len(),
                self.quorums.multi_signature.value,
            ));
        }
        let mut seen = certificate.participants.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != certificate.participants.len() {
            return Err(Error::DuplicateParticipant);
        }
        if certificate.root != *expected_root {
            return Err(Error::InvalidMultiSignature(key));
        }
        let registry = self.registry.read().unwrap();
        let mut keys = Vec::with_capacity(certificate.participants.len());
        for participant in &certificate.participants {
            let Some(public_key) = registry.public_key_for(participant, self.epoch) else {
                return Err(Error::UnknownParticipant(format!("{participant:?}")));
            };
            keys.push(public_key);
        }
        let payload = signing_payload(&key, &certificate.root);
        S::verify_multi(
            keys.into_iter(),
            &self.namespace,
            &payload,
            &certificate.signature,
        )
        .map_err(|_| Error::InvalidMultiSignature(key))
    }

    /// Persist a certificate this node computed independently.
    ///
    /// Idempotent per instance. Persisting a certificate for a root that
    /// conflicts with one already persisted aborts the process.
    pub fn save_multi_sig_local(
        &mut self,
        certificate: Certificate<S, P>,
        key: OrderKey,
    ) -> Result<(), Error> {
        self.active(key)?;
        let instance = self.instances.entry(key).or_insert_with(Instance::new);
        if let Some(existing) = &instance.certificate {
            assert!(
                existing.root == certificate.root,
                "instance {key} already certified root {} but asked to persist {}: agreement safety violated",
                existing.root,
                certificate.root
            );
            return Ok(());
        }
        instance.certificate = Some(certificate);
        self.metrics.certificates.inc();
        self.metrics.instances.set(self.instances.len() as i64);
        Ok(())
    }

    /// Adopt the certificate a proposer attached for the prior instance.
    ///
    /// Skips recomputing the combination but never trusts the proposer:
    /// the certificate is fully validated before acceptance.
    pub fn save_multi_sig_shared(
        &mut self,
        pre_prepare: &PrePrepare<S, P>,
        prior_key: OrderKey,
    ) -> Result<(), Error> {
        let Some(certificate) = &pre_prepare.prior_certificate else {
            self.metrics.rejected.inc();
            return Err(Error::MissingCertificate(prior_key));
        };
        if let Err(err) = self.validate_multi_sig(certificate, prior_key, &pre_prepare.prior_root) {
            self.metrics.rejected.inc();
            return Err(err);
        }
        self.save_multi_sig_local(certificate.clone(), prior_key)
    }

    /// Certificate persisted for `key`, if any. The ordering layer reads
    /// this to attach certificates to committed ledger writes.
    pub fn multi_sig(&self, key: OrderKey) -> Option<&Certificate<S, P>> {
        self.instances.get(&key)?.certificate.as_ref()
    }

    /// Discard all per-instance state at or below `key`.
    ///
    /// Called by the ordering layer once instances are finalized and no
    /// longer subject to view-change replay; bounds memory to the
    /// in-flight window. Later votes for retired keys are rejected as
    /// superseded.
    pub fn gc(&mut self, key: OrderKey) {
        self.instances.retain(|k, _| *k > key);
        self.watermark = Some(match self.watermark {
            Some(watermark) => watermark.max(key),
            None => key,
        });
        self.metrics.instances.set(self.instances.len() as i64);
        debug!(%key, remaining = self.instances.len(), "retired instances");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::Committee;
    use crate::types::{Commit, OrderKey, PrePrepare, Prepare};
    use palisade_cryptography::{mocks::Insecure, Scheme as _};

    const ROOT: &[u8] = b"R";
    const OTHER_ROOT: &[u8] = b"R'";

    fn commit_from(committee: &Committee, id: u32, key: OrderKey, root: Digest) -> Commit<Insecure> {
        let signer = committee.coordinator(id);
        Commit {
            key,
            state_root: root,
            signature: signer.sign_state(key, &root),
        }
    }

    #[test]
    fn test_aggregation_liveness_at_quorum() {
        let committee = Committee::new(4);
        let mut coordinator = committee.coordinator(0);
        let key = OrderKey::new(1, 7);
        let root = Digest::hash(ROOT);
        let prior = Digest::hash(b"prior");

        coordinator
            .validate_pre_prepare(
                &PrePrepare {
                    key,
                    state_root: root,
                    prior_root: prior,
                    prior_certificate: None,
                },
                &committee.proposer(key.view),
                &prior,
            )
            .unwrap();

        // One short of quorum: no certificate.
        for id in 0..2 {
            coordinator
                .validate_commit(&commit_from(&committee, id, key, root), &id, &root)
                .unwrap();
        }
        assert!(coordinator.calculate_multi_sig(key).is_none());

        // At quorum: a certificate that validates.
        coordinator
            .validate_commit(&commit_from(&committee, 2, key, root), &2, &root)
            .unwrap();
        let certificate = coordinator.calculate_multi_sig(key).unwrap();
        assert_eq!(certificate.root, root);
        assert_eq!(certificate.participants, vec![0, 1, 2]);
        coordinator
            .validate_multi_sig(&certificate, key, &root)
            .unwrap();
    }

    #[test]
    fn test_save_local_is_idempotent() {
        let committee = Committee::new(4);
        let mut coordinator = committee.coordinator(0);
        let key = OrderKey::new(1, 7);
        let root = Digest::hash(ROOT);
        let certificate = committee.certificate(key, root, &[0, 1, 2]);

        coordinator
            .save_multi_sig_local(certificate.clone(), key)
            .unwrap();
        coordinator.save_multi_sig_local(certificate, key).unwrap();
        assert_eq!(coordinator.multi_sig(key).unwrap().root, root);
    }

    #[test]
    #[should_panic(expected = "agreement safety violated")]
    fn test_conflicting_certificates_abort() {
        let committee = Committee::new(4);
        let mut coordinator = committee.coordinator(0);
        let key = OrderKey::new(1, 7);
        coordinator
            .save_multi_sig_local(
                committee.certificate(key, Digest::hash(ROOT), &[0, 1, 2]),
                key,
            )
            .unwrap();
        let _ = coordinator.save_multi_sig_local(
            committee.certificate(key, Digest::hash(OTHER_ROOT), &[0, 1, 2]),
            key,
        );
    }

    #[test]
    fn test_fork_attempt_certifies_single_root() {
        // Scenario: three replicas sign "R" for (1, 7); the fourth signs
        // "R'". Only "R" may ever be certified.
        let committee = Committee::new(4);
        let mut coordinator = committee.coordinator(0);
        let key = OrderKey::new(1, 7);
        let root = Digest::hash(ROOT);
        let other = Digest::hash(OTHER_ROOT);
        let prior = Digest::hash(b"prior");

        coordinator
            .validate_pre_prepare(
                &PrePrepare {
                    key,
                    state_root: root,
                    prior_root: prior,
                    prior_certificate: None,
                },
                &committee.proposer(key.view),
                &prior,
            )
            .unwrap();
        for id in 0..3 {
            coordinator
                .validate_commit(&commit_from(&committee, id, key, root), &id, &root)
                .unwrap();
        }
        // The divergent commit does not match the agreed root.
        let divergent = commit_from(&committee, 3, key, other);
        assert!(matches!(
            coordinator.validate_commit(&divergent, &3, &root),
            Err(Error::ConflictingRoot(_))
        ));

        let certificate = coordinator.calculate_multi_sig(key).unwrap();
        assert_eq!(certificate.root, root);
        // Recomputing yields the same root; the divergent root never
        // reaches quorum.
        assert_eq!(coordinator.calculate_multi_sig(key).unwrap().root, root);
    }

    #[test]
    fn test_validate_pre_prepare_rejections() {
        let committee = Committee::new(4);
        let mut coordinator = committee.coordinator(0);
        let key = OrderKey::new(1, 7);
        let root = Digest::hash(ROOT);
        let prior = Digest::hash(b"prior");
        let proposer = committee.proposer(key.view);
        let pre_prepare = PrePrepare {
            key,
            state_root: root,
            prior_root: prior,
            prior_certificate: None,
        };

        // Not the round-robin proposer for this view.
        let imposter = (proposer + 1) % 4;
        let err = coordinator
            .validate_pre_prepare(&pre_prepare, &imposter, &prior)
            .unwrap_err();
        assert!(matches!(err, Error::WrongProposer(..)));
        assert!(err.blockable());

        // Declared prior root diverges from local expectation.
        assert!(matches!(
            coordinator.validate_pre_prepare(&pre_prepare, &proposer, &Digest::hash(b"else")),
            Err(Error::PriorRootMismatch(_))
        ));

        // Accepted, then re-proposed with a different root.
        coordinator
            .validate_pre_prepare(&pre_prepare, &proposer, &prior)
            .unwrap();
        let conflicting = PrePrepare {
            state_root: Digest::hash(OTHER_ROOT),
            ..pre_prepare
        };
        assert!(matches!(
            coordinator.validate_pre_prepare(&conflicting, &proposer, &prior),
            Err(Error::ConflictingProposal(_))
        ));
    }

    #[test]
    fn test_validate_prepare_rejections() {
        let committee = Committee::new(4);
        let mut coordinator = committee.coordinator(0);
        let key = OrderKey::new(1, 7);
        let root = Digest::hash(ROOT);
        let prior = Digest::hash(b"prior");

        // No proposal yet.
        let prepare = Prepare {
            key,
            state_root: root,
        };
        assert!(matches!(
            coordinator.validate_prepare(&prepare, &1),
            Err(Error::UnknownProposal(_))
        ));

        coordinator
            .validate_pre_prepare(
                &PrePrepare {
                    key,
                    state_root: root,
                    prior_root: prior,
                    prior_certificate: None,
                },
                &committee.proposer(key.view),
                &prior,
            )
            .unwrap();

        // Vote for a different root than proposed.
        assert!(matches!(
            coordinator.validate_prepare(
                &Prepare {
                    key,
                    state_root: Digest::hash(OTHER_ROOT),
                },
                &1,
            ),
            Err(Error::ConflictingRoot(_))
        ));

        // First vote accepted, duplicate rejected.
        coordinator.validate_prepare(&prepare, &1).unwrap();
        assert!(matches!(
            coordinator.validate_prepare(&prepare, &1),
            Err(Error::DuplicateVote(..))
        ));
    }

    #[test]
    fn test_validate_commit_rejects_forgery_and_outsiders() {
        let committee = Committee::new(4);
        let mut coordinator = committee.coordinator(0);
        let key = OrderKey::new(1, 7);
        let root = Digest::hash(ROOT);
        let prior = Digest::hash(b"prior");

        coordinator
            .validate_pre_prepare(
                &PrePrepare {
                    key,
                    state_root: root,
                    prior_root: prior,
                    prior_certificate: None,
                },
                &committee.proposer(key.view),
                &prior,
            )
            .unwrap();

        // A signature produced by one replica does not verify for another.
        let mut forged = commit_from(&committee, 1, key, root);
        forged.signature = committee.coordinator(2).sign_state(key, &root);
        let err = coordinator.validate_commit(&forged, &1, &root).unwrap_err();
        assert!(matches!(err, Error::InvalidPartialSignature(..)));
        assert!(err.blockable());

        // A sender outside the committee is rejected.
        let mut outsider = commit_from(&committee, 1, key, root);
        outsider.signature = Insecure::new(99).sign(b"ns", b"msg");
        assert!(matches!(
            coordinator.validate_commit(&outsider, &99, &root),
            Err(Error::UnknownValidator(..))
        ));
    }

    #[test]
    fn test_shared_certificate_requires_verification() {
        let committee = Committee::new(4);
        let mut coordinator = committee.coordinator(0);
        let prior_key = OrderKey::new(1, 6);
        let key = OrderKey::new(1, 7);
        let prior_root = Digest::hash(b"prior");
        let root = Digest::hash(ROOT);

        // A valid attached certificate is adopted.
        let pre_prepare = PrePrepare {
            key,
            state_root: root,
            prior_root,
            prior_certificate: Some(committee.certificate(prior_key, prior_root, &[0, 1, 2])),
        };
        coordinator
            .save_multi_sig_shared(&pre_prepare, prior_key)
            .unwrap();
        assert_eq!(coordinator.multi_sig(prior_key).unwrap().root, prior_root);

        // Below-quorum participant set is rejected.
        let mut coordinator = committee.coordinator(1);
        let under = PrePrepare {
            prior_certificate: Some(committee.certificate(prior_key, prior_root, &[0, 1])),
            ..pre_prepare.clone()
        };
        assert!(matches!(
            coordinator.save_multi_sig_shared(&under, prior_key),
            Err(Error::BelowQuorum(2, 3))
        ));

        // A certificate whose combination does not cover its participant
        // set is rejected, not adopted.
        let mut tampered = committee.certificate(prior_key, prior_root, &[0, 1, 2]);
        tampered.participants = vec![0, 1, 3];
        let tampered = PrePrepare {
            prior_certificate: Some(tampered),
            ..pre_prepare.clone()
        };
        let err = coordinator
            .save_multi_sig_shared(&tampered, prior_key)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMultiSignature(_)));
        assert!(err.blockable());
        assert!(coordinator.multi_sig(prior_key).is_none());

        // No attached certificate at all.
        let missing = PrePrepare {
            prior_certificate: None,
            ..pre_prepare
        };
        assert!(matches!(
            coordinator.save_multi_sig_shared(&missing, prior_key),
            Err(Error::MissingCertificate(_))
        ));
    }

    #[test]
    fn test_gc_retires_instances() {
        let committee = Committee::new(4);
        let mut coordinator = committee.coordinator(0);
        let retired = OrderKey::new(1, 7);
        let live = OrderKey::new(1, 8);
        let root = Digest::hash(ROOT);
        let prior = Digest::hash(b"prior");

        for key in [retired, live] {
            coordinator
                .validate_pre_prepare(
                    &PrePrepare {
                        key,
                        state_root: root,
                        prior_root: prior,
                        prior_certificate: None,
                    },
                    &committee.proposer(key.view),
                    &prior,
                )
                .unwrap();
        }

        coordinator.gc(retired);

        // Votes for the retired key fail as superseded, even though the
        // instance was known before collection.
        assert!(matches!(
            coordinator.validate_prepare(
                &Prepare {
                    key: retired,
                    state_root: root,
                },
                &1,
            ),
            Err(Error::Superseded(_))
        ));
        assert!(coordinator.multi_sig(retired).is_none());

        // The live key above the watermark is unaffected.
        coordinator
            .validate_prepare(
                &Prepare {
                    key: live,
                    state_root: root,
                },
                &1,
            )
            .unwrap();
    }

    #[test]
    fn test_epoch_rotation() {
        let committee = Committee::new(4);
        let mut coordinator = committee.coordinator(0);
        let key = OrderKey::new(1, 7);
        let root = Digest::hash(ROOT);
        let certificate = committee.certificate(key, root, &[0, 1, 2]);

        // Under an epoch with no registrations, participants are unknown.
        coordinator.enter_epoch(1);
        assert!(matches!(
            coordinator.validate_multi_sig(&certificate, key, &root),
            Err(Error::UnknownParticipant(_))
        ));

        // Back under the original epoch the same certificate verifies.
        coordinator.enter_epoch(0);
        coordinator
            .validate_multi_sig(&certificate, key, &root)
            .unwrap();
    }
}
