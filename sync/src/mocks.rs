//! Test fixtures for driving a [LedgerSync](crate::LedgerSync).

use bytes::Bytes;
use palisade_cryptography::Digest;

use crate::types::LedgerId;
use crate::Ledger;

/// An in-memory [Ledger] with a chained-hash accumulator.
///
/// The genesis root is derived from the ledger id so distinct ledgers never
/// share a prefix digest. Each append folds the transaction into the running
/// root, and the root after every prefix is retained so any historical
/// checkpoint can be served.
#[derive(Clone, Debug)]
pub struct MemLedger {
    txns: Vec<Bytes>,
    /// `roots[n]` is the accumulator root over the first `n` transactions.
    roots: Vec<Digest>,
}

impl MemLedger {
    pub fn new(id: LedgerId) -> Self {
        Self {
            txns: Vec::new(),
            roots: vec![Digest::hash(&[id])],
        }
    }

    /// A ledger pre-populated with `n` deterministic transactions.
    pub fn with_txns(id: LedgerId, n: u64) -> Self {
        let mut ledger = Self::new(id);
        ledger.append(&txns(0, n));
        ledger
    }
}

/// Deterministic transactions for sequence numbers `[start, end)`.
pub fn txns(start: u64, end: u64) -> Vec<Bytes> {
    (start..end)
        .map(|i| Bytes::from(format!("txn-{i}")))
        .collect()
}

impl Ledger for MemLedger {
    fn size(&self) -> u64 {
        self.txns.len() as u64
    }

    fn root(&self) -> Digest {
        self.roots[self.txns.len()]
    }

    fn digest_of_prefix(&self, n: u64) -> Option<Digest> {
        self.roots.get(n as usize).copied()
    }

    fn extend_digest(&self, base: &Digest, txns: &[Bytes]) -> Digest {
        let mut root = *base;
        for txn in txns {
            root = root.chain(txn);
        }
        root
    }

    fn append(&mut self, txns: &[Bytes]) -> Digest {
        for txn in txns {
            let root = self.root().chain(txn);
            self.txns.push(txn.clone());
            self.roots.push(root);
        }
        self.root()
    }

    fn read_range(&self, start: u64, end: u64) -> Option<Vec<Bytes>> {
        if start > end || end > self.size() {
            return None;
        }
        Some(self.txns[start as usize..end as usize].to_vec())
    }
}
