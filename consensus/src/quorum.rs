//! Certificate thresholds over a pool of `n = 3f + 1` replicas.

/// A single threshold: the minimum number of distinct participants whose
/// agreement certifies a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quorum {
    pub value: u32,
}

impl Quorum {
    /// Whether `count` distinct participants meet this threshold.
    pub fn reached(&self, count: usize) -> bool {
        count >= self.value as usize
    }
}

/// The full set of thresholds used across ordering and catch-up.
///
/// All are derived from `n` under the usual BFT assumption `n = 3f + 1`;
/// a claim backed by a weak quorum (`f + 1`) is vouched for by at least
/// one honest replica, while a strong quorum (`n - f`) guarantees any
/// two certificates intersect in an honest replica.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quorums {
    /// Pool size.
    pub n: u32,
    /// Maximum number of faulty replicas tolerated.
    pub f: u32,
    /// At least one honest replica agrees.
    pub weak: Quorum,
    /// Any two certificates intersect in an honest replica.
    pub strong: Quorum,
    /// Prepare votes required; the proposer itself does not prepare.
    pub prepare: Quorum,
    /// Commit votes required.
    pub commit: Quorum,
    /// Peer ledger statuses that must agree before lag is acted on;
    /// a replica does not count its own status.
    pub ledger_status: Quorum,
    /// Equivalent consistency proofs required to fix a catch-up target.
    pub consistency_proof: Quorum,
    /// Partial signatures required to certify a multi-signature.
    pub multi_signature: Quorum,
}

impl Quorums {
    /// Compute thresholds for a pool of `n` replicas.
    ///
    /// Returns `None` when `n` is too small to tolerate any fault.
    pub fn new(n: u32) -> Option<Self> {
        let f = n.checked_sub(1)? / 3;
        if f == 0 {
            return None;
        }
        Some(Self {
            n,
            f,
            weak: Quorum { value: f + 1 },
            strong: Quorum { value: n - f },
            prepare: Quorum { value: n - f - 1 },
            commit: Quorum { value: n - f },
            ledger_status: Quorum { value: n - f - 1 },
            consistency_proof: Quorum { value: f + 1 },
            multi_signature: Quorum { value: n - f },
        })
    }
}
