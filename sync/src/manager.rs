//! Per-ledger catch-up episodes and their sequencing across ledgers.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use bytes::Bytes;
use palisade_consensus::quorum::Quorums;
use palisade_cryptography::{Digest, Participant};
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::types::{
    CatchupReply, CatchupRequest, CatchupTarget, ConsistencyProof, Error, LedgerId, LedgerState,
    LedgerStatus, Message, Outbound,
};
use crate::Ledger;

/// Configuration for a [LedgerSync].
pub struct Config<P: Participant> {
    /// The ledger this instance keeps in agreement with the pool.
    pub ledger_id: LedgerId,
    /// This node's identity within the pool.
    pub me: P,
    /// The other pool members; must not include `me`.
    pub peers: Vec<P>,
    /// Certificate thresholds for the pool.
    pub quorums: Quorums,
    /// Number of transactions pulled per request; consistency proofs must
    /// carry an accumulator root at every multiple of this. Must be
    /// non-zero.
    pub batch_size: u64,
    /// Metrics for this instance.
    pub metrics: Metrics,
}

/// Brings one ledger into agreement with the quorum.
///
/// A state machine over [LedgerState]: evidence of lag is gathered from
/// peer statuses and consistency proofs while `NotSynced`, a quorum of
/// identical proofs fixes an immutable [CatchupTarget] and starts a
/// `Syncing` episode, and verified application of every pulled batch ends
/// it `Synced`. Handlers never block; outbound messages accumulate in an
/// outbox drained via [LedgerSync::take_outbound].
///
/// An instance acts on evidence only once [LedgerSync::kick]ed eligible.
/// Evidence arriving before that is retained and re-evaluated when
/// eligibility lands, so a ledger forced to wait its turn loses nothing.
pub struct LedgerSync<L: Ledger, P: Participant> {
    ledger_id: LedgerId,
    me: P,
    peers: Vec<P>,
    quorums: Quorums,
    batch_size: u64,
    ledger: L,
    state: LedgerState,
    eligible: bool,
    /// Latest status reported by each peer.
    statuses: BTreeMap<P, LedgerStatus>,
    /// Peers whose latest status matches ours exactly.
    agreeing: BTreeSet<P>,
    /// Latest consistency proof claim from each peer. One slot per
    /// sender keeps retained proofs bounded by the peer set no matter
    /// how many distinct claims a faulty peer fabricates.
    proofs: BTreeMap<P, ConsistencyProof>,
    /// The checkpoint the in-flight episode is committed to.
    target: Option<CatchupTarget>,
    /// Ledger size verified and applied so far this episode.
    verified: u64,
    /// Accumulator root over the first `verified` transactions.
    verified_root: Digest,
    /// Replies buffered until every earlier range has been applied.
    pending: BTreeMap<u64, (P, CatchupReply)>,
    /// Outstanding range requests, by range start.
    assigned: BTreeMap<u64, P>,
    /// Peers that served a batch failing verification this episode.
    distrusted: BTreeSet<P>,
    /// Ordered transactions held back while the ledger is not synced.
    deferred: Vec<Bytes>,
    /// The status last sent to each peer, to end status exchanges.
    told: BTreeMap<P, LedgerStatus>,
    outbox: VecDeque<Outbound<P>>,
    metrics: Metrics,
}

impl<L: Ledger, P: Participant> LedgerSync<L, P> {
    pub fn new(cfg: Config<P>, ledger: L) -> Self {
        assert!(cfg.batch_size > 0, "batch size must be non-zero");
        let verified = ledger.size();
        let verified_root = ledger.root();
        let mut sync = Self {
            ledger_id: cfg.ledger_id,
            me: cfg.me,
            peers: cfg.peers,
            quorums: cfg.quorums,
            batch_size: cfg.batch_size,
            ledger,
            state: LedgerState::NotSynced,
            eligible: false,
            statuses: BTreeMap::new(),
            agreeing: BTreeSet::new(),
            proofs: BTreeMap::new(),
            target: None,
            verified,
            verified_root,
            pending: BTreeMap::new(),
            assigned: BTreeMap::new(),
            distrusted: BTreeSet::new(),
            deferred: Vec::new(),
            told: BTreeMap::new(),
            outbox: VecDeque::new(),
            metrics: cfg.metrics,
        };
        sync.set_state(LedgerState::NotSynced);
        sync
    }

    /// This node's identity.
    pub fn me(&self) -> &P {
        &self.me
    }

    /// The ledger this instance manages.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Current position in the catch-up cycle.
    pub fn state(&self) -> LedgerState {
        self.state
    }

    /// This node's current status for the managed ledger.
    pub fn status(&self) -> LedgerStatus {
        LedgerStatus {
            ledger_id: self.ledger_id,
            size: self.ledger.size(),
            root: self.ledger.root(),
        }
    }

    /// Mark this ledger eligible to act on catch-up evidence and solicit
    /// peer statuses. Retained evidence is re-evaluated immediately, so a
    /// ledger whose turn arrives late may conclude without another
    /// message. Idempotent.
    pub fn kick(&mut self) {
        if self.eligible {
            return;
        }
        self.eligible = true;
        if self.state == LedgerState::NotSynced {
            self.broadcast_status(true);
            self.try_conclude();
        }
    }

    /// Drain all queued outbound messages for the transport to send.
    pub fn take_outbound(&mut self) -> Vec<Outbound<P>> {
        self.outbox.drain(..).collect()
    }

    /// Hold back an ordered transaction until the ledger is synced.
    ///
    /// Ordering output that arrives mid-episode cannot be applied: the
    /// episode's target was fixed without it. The caller re-applies the
    /// held transactions via [LedgerSync::take_deferred] once synced.
    pub fn defer_ordering(&mut self, txn: Bytes) {
        self.deferred.push(txn);
    }

    /// Take every transaction held back during catch-up, in arrival order.
    pub fn take_deferred(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.deferred)
    }

    /// Record a peer's self-reported ledger status.
    ///
    /// Answers with our own status (once per exchange), serves a
    /// consistency proof back when the sender is verifiably behind us, and
    /// counts exact matches toward the agreement quorum that lets an
    /// episode conclude without any transfer. A quorum of statuses ahead
    /// of a synced ledger re-opens the cycle.
    pub fn on_status(&mut self, sender: &P, status: LedgerStatus) -> Result<(), Error> {
        self.check_routing(sender, status.ledger_id)?;
        let mine = self.status();
        self.statuses.insert(sender.clone(), status);
        if status == mine {
            self.agreeing.insert(sender.clone());
        } else {
            self.agreeing.remove(sender);
        }
        debug!(ledger = self.ledger_id, ?sender, size = status.size, "peer status");

        // Answer unless the exchange has already converged.
        if self.told.get(sender) != Some(&mine) {
            self.tell_status(sender.clone());
        }

        // A sender behind us gets the proof it needs to catch up, provided
        // its claimed checkpoint is actually a prefix of our ledger.
        if status.size < mine.size
            && self.ledger.digest_of_prefix(status.size) == Some(status.root)
        {
            if let Some(proof) = self.build_proof(status.size) {
                self.outbox.push_back(Outbound {
                    to: sender.clone(),
                    message: Message::Proof(proof),
                });
            }
        }

        // Renewed lag: enough peers ahead of a synced ledger that at least
        // one of them is honest.
        if self.state == LedgerState::Synced {
            let ahead = self
                .statuses
                .values()
                .filter(|s| s.size > mine.size)
                .count();
            if self.quorums.weak.reached(ahead) {
                info!(ledger = self.ledger_id, "fell behind the pool, resyncing");
                self.set_state(LedgerState::NotSynced);
                self.agreeing.clear();
                self.broadcast_status(true);
            }
        }

        self.try_conclude();
        Ok(())
    }

    /// Record a peer's consistency proof.
    ///
    /// A proof is structurally validated against the local ledger, then
    /// retained as the sender's current claim (a later proof from the
    /// same peer replaces it); a quorum of senders holding identical
    /// claims fixes the episode's target. Proofs starting below the episode's
    /// progress are stale, and proofs disagreeing with an in-flight target
    /// are rejected without dislodging it.
    pub fn on_proof(&mut self, sender: &P, proof: ConsistencyProof) -> Result<(), Error> {
        self.check_routing(sender, proof.ledger_id)?;
        let result = self.accept_proof(sender, proof);
        match &result {
            Ok(()) => self.metrics.proofs_accepted.inc(),
            Err(_) => self.metrics.proofs_rejected.inc(),
        };
        result?;
        self.try_conclude();
        Ok(())
    }

    fn accept_proof(&mut self, sender: &P, proof: ConsistencyProof) -> Result<(), Error> {
        let progress = match self.state {
            LedgerState::Syncing => self.verified,
            _ => self.ledger.size(),
        };
        if proof.seq_no_start < progress {
            return Err(Error::StaleConsistencyProof {
                claimed: proof.seq_no_start,
                progress,
            });
        }

        // An in-flight episode never changes target; matching proofs are
        // merely late supporters.
        if let Some(target) = &self.target {
            let matches = proof.seq_no_start == target.seq_no_start
                && proof.seq_no_end == target.seq_no_end
                && proof.new_root == target.root;
            if !matches {
                return Err(Error::ConflictingProof);
            }
            self.proofs.insert(sender.clone(), proof);
            return Ok(());
        }

        if proof.seq_no_end <= proof.seq_no_start
            || self.ledger.digest_of_prefix(proof.seq_no_start) != Some(proof.old_root)
        {
            return Err(Error::InvalidProof);
        }

        // Boundaries must land exactly at batch-size steps and terminate
        // at the claimed end.
        let mut expected = Vec::new();
        let mut at = proof.seq_no_start + self.batch_size;
        while at < proof.seq_no_end {
            expected.push(at);
            at += self.batch_size;
        }
        expected.push(proof.seq_no_end);
        let ends: Vec<u64> = proof.boundary_roots.iter().map(|(end, _)| *end).collect();
        if ends != expected {
            return Err(Error::InvalidProof);
        }
        match proof.boundary_roots.last() {
            Some((_, root)) if *root == proof.new_root => {}
            _ => return Err(Error::InvalidProof),
        }

        debug!(
            ledger = self.ledger_id,
            ?sender,
            end = proof.seq_no_end,
            "consistency proof recorded"
        );
        self.proofs.insert(sender.clone(), proof);
        Ok(())
    }

    /// Serve a peer's request for a range of transactions.
    pub fn on_request(&mut self, sender: &P, request: CatchupRequest) -> Result<(), Error> {
        self.check_routing(sender, request.ledger_id)?;
        let Some(txns) = self.ledger.read_range(request.start, request.end) else {
            return Err(Error::UnavailableRange {
                start: request.start,
                end: request.end,
            });
        };
        self.outbox.push_back(Outbound {
            to: sender.clone(),
            message: Message::Reply(CatchupReply {
                ledger_id: self.ledger_id,
                start: request.start,
                txns,
            }),
        });
        Ok(())
    }

    /// Record a peer's reply to one of our range requests.
    ///
    /// Replies may arrive in any order; each is held until every earlier
    /// range has been applied, then verified against the target's boundary
    /// root before its transactions touch the ledger. A batch that fails
    /// verification distrusts its sender for the rest of the episode and
    /// is re-requested from an alternate peer; if no peer remains the
    /// target is abandoned and the episode restarts from fresh evidence.
    pub fn on_reply(&mut self, sender: &P, reply: CatchupReply) -> Result<(), Error> {
        self.check_routing(sender, reply.ledger_id)?;
        if self.target.is_none() || self.assigned.get(&reply.start) != Some(sender) {
            return Err(Error::UnexpectedReply(reply.start));
        }
        self.assigned.remove(&reply.start);
        self.pending.insert(reply.start, (sender.clone(), reply));

        // Apply strictly in sequence order.
        loop {
            let Some((peer, reply)) = self.pending.remove(&self.verified) else {
                break;
            };
            let Some((end, expected)) = self.next_boundary() else {
                break;
            };
            let start = self.verified;
            let sound = reply.txns.len() as u64 == end - start
                && self.ledger.extend_digest(&self.verified_root, &reply.txns) == expected;
            if !sound {
                self.metrics.batches_rejected.inc();
                warn!(
                    ledger = self.ledger_id,
                    ?peer,
                    start,
                    end,
                    "batch failed verification, re-requesting"
                );
                self.distrusted.insert(peer);
                if !self.request_range(start, end) {
                    self.abandon();
                    return Err(Error::UnreachableTarget);
                }
                return Err(Error::Verification { start, end });
            }
            self.verified_root = self.ledger.append(&reply.txns);
            self.verified = end;
            self.metrics.batches_applied.inc();
            debug!(ledger = self.ledger_id, start, end, "batch applied");
        }

        if self
            .target
            .as_ref()
            .is_some_and(|target| self.verified == target.seq_no_end)
        {
            self.finish();
        }
        Ok(())
    }

    /// Re-issue a range request that the transport gave up on.
    ///
    /// The slow peer is not distrusted (a timeout is not proof of fault),
    /// but the range is handed to a different peer when one is available.
    pub fn on_request_timeout(&mut self, start: u64) {
        let Some(prev) = self.assigned.get(&start).cloned() else {
            return;
        };
        let Some((end, _)) = self.boundary_after(start) else {
            return;
        };
        let courier = self
            .courier(start, Some(&prev))
            .or_else(|| self.courier(start, None));
        if let Some(courier) = courier {
            warn!(ledger = self.ledger_id, start, ?courier, "request timed out, reassigning");
            self.assigned.insert(start, courier.clone());
            self.outbox.push_back(Outbound {
                to: courier,
                message: Message::Request(CatchupRequest {
                    ledger_id: self.ledger_id,
                    start,
                    end,
                }),
            });
        }
    }

    fn check_routing(&self, sender: &P, ledger_id: LedgerId) -> Result<(), Error> {
        if ledger_id != self.ledger_id {
            return Err(Error::WrongLedger(ledger_id, self.ledger_id));
        }
        if !self.peers.contains(sender) {
            return Err(Error::UnknownPeer(format!("{sender:?}")));
        }
        Ok(())
    }

    /// Conclude the evidence-gathering phase if eligible and a quorum has
    /// formed: exact status agreement ends the episode in place, while a
    /// quorum behind one proof claim fixes the target and starts pulling.
    fn try_conclude(&mut self) {
        if !self.eligible || self.state != LedgerState::NotSynced {
            return;
        }
        if self.quorums.ledger_status.reached(self.agreeing.len()) {
            info!(ledger = self.ledger_id, "pool agrees with local ledger");
            self.finish();
            return;
        }
        // Quorum is counted over senders whose latest claims are identical.
        let base = self.ledger.size();
        let ready = {
            let mut support: BTreeMap<&ConsistencyProof, usize> = BTreeMap::new();
            for claim in self.proofs.values() {
                if claim.seq_no_start == base {
                    *support.entry(claim).or_insert(0) += 1;
                }
            }
            support
                .into_iter()
                .find(|(_, count)| self.quorums.consistency_proof.reached(*count))
                .map(|(claim, _)| claim.clone())
        };
        if let Some(proof) = ready {
            self.fix_target(proof);
        }
    }

    /// Commit the episode to a quorum-backed target and request every
    /// range, spread round-robin over the peers.
    fn fix_target(&mut self, proof: ConsistencyProof) {
        info!(
            ledger = self.ledger_id,
            from = proof.seq_no_start,
            to = proof.seq_no_end,
            "catch-up target fixed"
        );
        self.verified = proof.seq_no_start;
        self.verified_root = proof.old_root;
        self.target = Some(CatchupTarget {
            seq_no_start: proof.seq_no_start,
            seq_no_end: proof.seq_no_end,
            root: proof.new_root,
            boundaries: proof.boundary_roots.iter().copied().collect(),
        });
        self.set_state(LedgerState::Syncing);
        let mut start = proof.seq_no_start;
        for (end, _) in &proof.boundary_roots {
            // Peers are all trusted at this point, so assignment cannot fail.
            self.request_range(start, *end);
            start = *end;
        }
    }

    /// Assign `[start, end)` to a peer and queue the request. Returns
    /// false when every peer is distrusted.
    fn request_range(&mut self, start: u64, end: u64) -> bool {
        let Some(courier) = self.courier(start, None) else {
            return false;
        };
        self.assigned.insert(start, courier.clone());
        self.outbox.push_back(Outbound {
            to: courier,
            message: Message::Request(CatchupRequest {
                ledger_id: self.ledger_id,
                start,
                end,
            }),
        });
        true
    }

    /// The peer responsible for the range starting at `start`: round-robin
    /// over trusted peers, optionally excluding one.
    fn courier(&self, start: u64, except: Option<&P>) -> Option<P> {
        let candidates: Vec<&P> = self
            .peers
            .iter()
            .filter(|peer| !self.distrusted.contains(*peer) && Some(*peer) != except)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let index = ((start / self.batch_size) % candidates.len() as u64) as usize;
        Some(candidates[index].clone())
    }

    /// The next unverified range's end and expected root.
    fn next_boundary(&self) -> Option<(u64, Digest)> {
        self.boundary_after(self.verified)
    }

    fn boundary_after(&self, start: u64) -> Option<(u64, Digest)> {
        let target = self.target.as_ref()?;
        target
            .boundaries
            .range(start + 1..)
            .next()
            .map(|(end, root)| (*end, *root))
    }

    /// End the episode synced and clear its working state.
    fn finish(&mut self) {
        self.set_state(LedgerState::Synced);
        self.target = None;
        self.proofs.clear();
        self.pending.clear();
        self.assigned.clear();
        self.distrusted.clear();
        self.metrics.episodes_completed.inc();
        info!(ledger = self.ledger_id, size = self.ledger.size(), "ledger synced");
    }

    /// Abandon an unreachable target and restart from fresh evidence.
    fn abandon(&mut self) {
        self.set_state(LedgerState::NotSynced);
        self.target = None;
        self.proofs.clear();
        self.pending.clear();
        self.assigned.clear();
        self.distrusted.clear();
        self.agreeing.clear();
        self.verified = self.ledger.size();
        self.verified_root = self.ledger.root();
        self.broadcast_status(true);
    }

    fn build_proof(&self, from: u64) -> Option<ConsistencyProof> {
        let size = self.ledger.size();
        if from >= size {
            return None;
        }
        let mut boundary_roots = Vec::new();
        let mut at = from + self.batch_size;
        while at < size {
            boundary_roots.push((at, self.ledger.digest_of_prefix(at)?));
            at += self.batch_size;
        }
        boundary_roots.push((size, self.ledger.root()));
        Some(ConsistencyProof {
            ledger_id: self.ledger_id,
            seq_no_start: from,
            seq_no_end: size,
            old_root: self.ledger.digest_of_prefix(from)?,
            new_root: self.ledger.root(),
            boundary_roots,
        })
    }

    fn broadcast_status(&mut self, force: bool) {
        let mine = self.status();
        let peers: Vec<P> = self.peers.clone();
        for peer in peers {
            if force || self.told.get(&peer) != Some(&mine) {
                self.tell_status(peer);
            }
        }
    }

    fn tell_status(&mut self, to: P) {
        let mine = self.status();
        self.told.insert(to.clone(), mine);
        self.outbox.push_back(Outbound {
            to,
            message: Message::Status(mine),
        });
    }

    fn set_state(&mut self, state: LedgerState) {
        self.state = state;
        self.metrics.state.set(match state {
            LedgerState::NotSynced => 0,
            LedgerState::Syncing => 1,
            LedgerState::Synced => 2,
        });
    }
}

/// Sequences catch-up across a node's ledgers in ascending [LedgerId]
/// order.
///
/// The membership ledger must be synced before any later ledger starts
/// its episode, because the committee used to judge a later ledger's
/// evidence derives from it. The manager kicks exactly the first unsynced
/// ledger eligible after every handled message; ledgers behind it keep
/// collecting evidence in the meantime.
pub struct SyncManager<L: Ledger, P: Participant> {
    ledgers: BTreeMap<LedgerId, LedgerSync<L, P>>,
}

impl<L: Ledger, P: Participant> SyncManager<L, P> {
    pub fn new(syncs: Vec<LedgerSync<L, P>>) -> Self {
        let mut ledgers = BTreeMap::new();
        for sync in syncs {
            let previous = ledgers.insert(sync.ledger_id, sync);
            assert!(previous.is_none(), "duplicate ledger id");
        }
        Self { ledgers }
    }

    /// Begin catch-up: the lowest-numbered ledger becomes eligible.
    pub fn start(&mut self) {
        self.kick_next();
    }

    /// Route an inbound message to its ledger, then advance eligibility.
    pub fn handle(&mut self, sender: &P, message: Message) -> Result<(), Error> {
        let id = message.ledger_id();
        let Some(sync) = self.ledgers.get_mut(&id) else {
            return Err(Error::UnknownLedger(id));
        };
        let result = match message {
            Message::Status(status) => sync.on_status(sender, status),
            Message::Proof(proof) => sync.on_proof(sender, proof),
            Message::Request(request) => sync.on_request(sender, request),
            Message::Reply(reply) => sync.on_reply(sender, reply),
        };
        self.kick_next();
        result
    }

    /// Report a request timeout to the owning ledger.
    pub fn on_request_timeout(&mut self, ledger_id: LedgerId, start: u64) {
        if let Some(sync) = self.ledgers.get_mut(&ledger_id) {
            sync.on_request_timeout(start);
        }
    }

    /// Drain queued outbound messages across all ledgers.
    pub fn take_outbound(&mut self) -> Vec<Outbound<P>> {
        self.ledgers
            .values_mut()
            .flat_map(|sync| sync.take_outbound())
            .collect()
    }

    /// Current state of every ledger, in id order.
    pub fn states(&self) -> Vec<(LedgerId, LedgerState)> {
        self.ledgers
            .iter()
            .map(|(id, sync)| (*id, sync.state()))
            .collect()
    }

    pub fn sync(&self, ledger_id: LedgerId) -> Option<&LedgerSync<L, P>> {
        self.ledgers.get(&ledger_id)
    }

    pub fn sync_mut(&mut self, ledger_id: LedgerId) -> Option<&mut LedgerSync<L, P>> {
        self.ledgers.get_mut(&ledger_id)
    }

    /// Make the first unsynced ledger eligible. Ledgers after it stay
    /// ineligible until every earlier ledger is synced.
    fn kick_next(&mut self) {
        let next = self
            .ledgers
            .iter()
            .find(|(_, sync)| sync.state() != LedgerState::Synced)
            .map(|(id, _)| *id);
        if let Some(id) = next {
            if self
                .ledgers
                .range(..id)
                .all(|(_, sync)| sync.state() == LedgerState::Synced)
            {
                if let Some(sync) = self.ledgers.get_mut(&id) {
                    sync.kick();
                }
            }
        }
    }
}
