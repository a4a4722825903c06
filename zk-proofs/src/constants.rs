//! Crate-wide constants shared by the circuits, the witness builder and the proof service.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::{find_poseidon_ark_and_mds, PoseidonConfig};
use ark_ff::PrimeField;

/// Version of the signal schemas compiled into this crate.
///
/// Bumped whenever a circuit's private/public/output ordering changes; artifact manifests
/// carrying another version are refused at load time.
pub const SCHEMA_VERSION: u32 = 1;

/// Number of (mood, timestamp) pairs in a milestone proof.
pub const MOOD_HISTORY_LEN: usize = 30;

/// Number of interaction-quality ratings in a peer-support proof.
pub const INTERACTION_HISTORY_LEN: usize = 20;

/// Bit widths of range-checked signals.
pub const SCORE_BITS: usize = 8;
pub const COUNT_BITS: usize = 16;
pub const TIMESTAMP_BITS: usize = 40;

/// Interaction ratings are signed; the circuit sees `rating + INTERACTION_OFFSET` as an 8-bit value.
pub const INTERACTION_OFFSET: i64 = 128;

/// Sum of x = 0..MOOD_HISTORY_LEN and its square sum, used by the trend regression.
pub const TREND_SUM_X: u64 = (MOOD_HISTORY_LEN as u64 * (MOOD_HISTORY_LEN as u64 - 1)) / 2;

/// Shift applied to the trend numerator so it is always a small non-negative field element.
///
/// The numerator is bounded by 255 * 6750 < 2^21 in absolute value.
pub const TREND_OFFSET: u64 = 1 << 21;

/// Privacy score per milestone type tag (index = tag).
pub const MILESTONE_PRIVACY_SCORES: [u64; 6] = [1, 2, 3, 3, 4, 5];

// Poseidon sponge configuration.
//
// Width-3 sponge (rate=2, capacity=1) absorbing pairs of field elements per permutation.
pub const POSEIDON_RATE: usize = 2;
pub const POSEIDON_CAPACITY: usize = 1;

pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS: usize = 57;

/// Poseidon S-box exponent (alpha).
pub const POSEIDON_ALPHA: u64 = 5;

/// Deterministically derive Poseidon parameters for BN254::Fr.
///
/// Both the native hasher (used to predict public outputs) and the in-circuit gadget use this,
/// so they agree on the same round constants and MDS matrix.
pub fn poseidon_config() -> PoseidonConfig<Fr> {
    let prime_bits = Fr::MODULUS_BIT_SIZE as u64;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        POSEIDON_RATE,
        POSEIDON_FULL_ROUNDS as u64,
        POSEIDON_PARTIAL_ROUNDS as u64,
        0,
    );

    PoseidonConfig::new(
        POSEIDON_FULL_ROUNDS,
        POSEIDON_PARTIAL_ROUNDS,
        POSEIDON_ALPHA,
        mds,
        ark,
        POSEIDON_RATE,
        POSEIDON_CAPACITY,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trend_offset_covers_extreme_histories() {
        let n = MOOD_HISTORY_LEN as i64;
        let sum_x = TREND_SUM_X as i64;
        // All weight on the positive half of the regression coefficients.
        let worst: i64 = (0..n).map(|i| (n * i - sum_x).abs() * 255).sum::<i64>() / 2;
        assert!(worst < TREND_OFFSET as i64);
    }

    #[test]
    fn privacy_scores_are_bounded() {
        assert!(MILESTONE_PRIVACY_SCORES.iter().all(|s| *s <= 5));
    }
}
