//! Bounded discrete log for lifted-ElGamal decryption (baby-step/giant-step).

use std::collections::HashMap;
use std::sync::OnceLock;

use ark_bn254::{G1Affine, G1Projective};
use ark_ec::{CurveGroup, PrimeGroup};
use ark_std::Zero;
use tracing::debug;

/// Baby-step table size. Sums below this are found without a single giant step.
pub const BABY_STEPS: u64 = 1 << 16;

/// Giant steps normalized to affine per batch. Batches start at one and double up to this.
const MAX_GIANT_BATCH: u64 = 1024;

pub struct DlogTable {
    baby: HashMap<G1Affine, u64>,
    stride: G1Projective,
    m: u64,
}

impl DlogTable {
    pub fn new(m: u64) -> Self {
        let m = m.max(1);
        let g = G1Projective::generator();
        let mut points = Vec::with_capacity(m as usize);
        let mut acc = G1Projective::zero();
        for _ in 0..m {
            points.push(acc);
            acc += g;
        }
        let baby = G1Projective::normalize_batch(&points)
            .into_iter()
            .zip(0u64..)
            .collect();
        // acc == m·G here
        Self { baby, stride: acc, m }
    }

    /// Process-wide table over the fixed generator, built on first use.
    pub fn shared() -> &'static DlogTable {
        static TABLE: OnceLock<DlogTable> = OnceLock::new();
        TABLE.get_or_init(|| {
            debug!(size = BABY_STEPS, "building discrete log table");
            DlogTable::new(BABY_STEPS)
        })
    }

    /// Find `x <= bound` with `xG == target`.
    ///
    /// At most `bound / m + 1` giant steps; a miss costs the whole range.
    pub fn solve(&self, target: G1Projective, bound: u64) -> Option<u64> {
        let giants = bound / self.m + 1;
        let mut gamma = target;
        let mut start = 0u64;
        let mut batch_len = 1u64;
        let mut batch = Vec::with_capacity(MAX_GIANT_BATCH as usize);
        while start < giants {
            let len = batch_len.min(giants - start);
            batch.clear();
            for _ in 0..len {
                batch.push(gamma);
                gamma -= self.stride;
            }
            // One field inversion for the whole batch.
            for (j, point) in (start..).zip(G1Projective::normalize_batch(&batch)) {
                if let Some(i) = self.baby.get(&point) {
                    let x = j * self.m + i;
                    return (x <= bound).then_some(x);
                }
            }
            start += len;
            batch_len = (batch_len * 2).min(MAX_GIANT_BATCH);
        }
        None
    }
}
