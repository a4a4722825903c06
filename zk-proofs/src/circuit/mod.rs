//! The fixed circuit set and its declarative signal schemas.
//!
//! Each circuit is a pure function of (private, public) signals to public outputs. The
//! [`CircuitDefinition`] of a circuit is the single source of truth for signal order: the
//! witness builder packs values in this order, the circuits allocate them in this order, and the
//! public signal vector of a proof is `outputs ++ public_inputs`.

pub mod gadgets;
pub mod milestone;
pub mod peer_support;

use ark_bn254::Fr;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use serde::Serialize;

use crate::constants::{
    COUNT_BITS, INTERACTION_HISTORY_LEN, MOOD_HISTORY_LEN, SCHEMA_VERSION, SCORE_BITS, TIMESTAMP_BITS,
};
use crate::types::CircuitId;
use crate::witness::Witness;

pub use milestone::MilestoneCircuit;
pub use peer_support::PeerSupportCircuit;

/// Declared domain of a signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalRange {
    /// Unsigned value in `[0, 2^bits)`.
    Bits { bits: usize },
    /// Signed value in `[-128, 127]`, offset-encoded into 8 bits.
    SignedByte,
    /// Any canonical field element.
    Field,
    /// One of an enumerated set of tags.
    Tag { values: &'static [u64] },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SignalSpec {
    pub name: &'static str,
    /// 1 for scalars, the array length otherwise.
    pub len: usize,
    pub range: SignalRange,
}

const fn scalar(name: &'static str, range: SignalRange) -> SignalSpec {
    SignalSpec { name, len: 1, range }
}

const fn array(name: &'static str, len: usize, range: SignalRange) -> SignalSpec {
    SignalSpec { name, len, range }
}

const fn bits(bits: usize) -> SignalRange {
    SignalRange::Bits { bits }
}

/// Immutable description of one circuit.
#[derive(Debug, Serialize)]
pub struct CircuitDefinition {
    pub id: CircuitId,
    pub version: u32,
    pub private_signals: &'static [SignalSpec],
    pub public_inputs: &'static [SignalSpec],
    pub outputs: &'static [&'static str],
    /// Human-readable constraint set, in the order the circuit enforces it.
    pub constraints: &'static [&'static str],
}

impl CircuitDefinition {
    pub fn private_signal_count(&self) -> usize {
        self.private_signals.iter().map(|s| s.len).sum()
    }

    pub fn public_input_count(&self) -> usize {
        self.public_inputs.iter().map(|s| s.len).sum()
    }

    /// Number of public signals carried by a proof (outputs first, then public inputs).
    pub fn public_signal_count(&self) -> usize {
        self.outputs.len() + self.public_input_count()
    }
}

pub const MILESTONE_TYPES: &[u64] = &[0, 1, 2, 3, 4, 5];

pub static WELLNESS_MILESTONE: CircuitDefinition = CircuitDefinition {
    id: CircuitId::WellnessMilestone,
    version: SCHEMA_VERSION,
    private_signals: &[
        scalar("health_score", bits(SCORE_BITS)),
        scalar("session_count", bits(COUNT_BITS)),
        scalar("consistency_days", bits(COUNT_BITS)),
        scalar("improvement_score", bits(SCORE_BITS)),
        scalar("user_secret", SignalRange::Field),
        array("mood_history", MOOD_HISTORY_LEN, bits(SCORE_BITS)),
        array("mood_timestamps", MOOD_HISTORY_LEN, bits(TIMESTAMP_BITS)),
    ],
    public_inputs: &[
        scalar("min_health_score", bits(SCORE_BITS)),
        scalar("min_sessions", bits(COUNT_BITS)),
        scalar("min_consistency_days", bits(COUNT_BITS)),
        scalar("min_improvement", bits(SCORE_BITS)),
        scalar("milestone_type", SignalRange::Tag { values: MILESTONE_TYPES }),
        scalar("verification_timestamp", bits(TIMESTAMP_BITS)),
    ],
    outputs: &[
        "achieved",
        "achievement_hash",
        "consistency_proof",
        "improvement_proof",
        "privacy_score",
    ],
    constraints: &[
        "range(all bounded signals)",
        "achieved = (health_score >= min_health_score) AND (session_count >= min_sessions) AND (consistency_days >= min_consistency_days) AND (improvement_score >= min_improvement)",
        "trend = 30*sum(i*mood_i) - 435*sum(mood_i) + 2^21",
        "achievement_hash = H(health_score, session_count, consistency_days, improvement_score, milestone_type, verification_timestamp, user_secret)",
        "consistency_proof = H(consistency_days, session_count, mood_timestamps, user_secret)",
        "improvement_proof = H(improvement_score, trend, user_secret)",
        "milestone_type in {0..5}; privacy_score = table[milestone_type]",
    ],
};

pub static PEER_SUPPORT_ELIGIBILITY: CircuitDefinition = CircuitDefinition {
    id: CircuitId::PeerSupportEligibility,
    version: SCHEMA_VERSION,
    private_signals: &[
        scalar("supporter_experience", bits(COUNT_BITS)),
        scalar("supporter_wellness", bits(SCORE_BITS)),
        array("interaction_history", INTERACTION_HISTORY_LEN, SignalRange::SignedByte),
        scalar("supporter_secret", SignalRange::Field),
    ],
    public_inputs: &[
        scalar("min_experience", bits(COUNT_BITS)),
        scalar("min_wellness", bits(SCORE_BITS)),
        scalar("quality_threshold", bits(SCORE_BITS)),
    ],
    outputs: &["eligible", "quality_score", "credential_hash"],
    constraints: &[
        "range(all bounded signals)",
        "positive_i = interaction_i > 0; count = sum(positive_i) > 0",
        "sum(positive_i * interaction_i) = quality_score * count + r, r < count",
        "eligible = (supporter_experience >= min_experience) AND (supporter_wellness >= min_wellness) AND (quality_score >= quality_threshold)",
        "credential_hash = H(supporter_secret, supporter_experience, supporter_wellness, quality_score)",
    ],
};

pub fn definition(id: CircuitId) -> &'static CircuitDefinition {
    match id {
        CircuitId::WellnessMilestone => &WELLNESS_MILESTONE,
        CircuitId::PeerSupportEligibility => &PEER_SUPPORT_ELIGIBILITY,
    }
}

/// Either of the fixed circuits, ready to synthesize.
#[derive(Clone, Debug)]
pub enum WellnessCircuit {
    Milestone(MilestoneCircuit),
    PeerSupport(PeerSupportCircuit),
}

impl WellnessCircuit {
    pub fn from_witness(witness: Witness) -> Self {
        match witness.circuit_id() {
            CircuitId::WellnessMilestone => WellnessCircuit::Milestone(MilestoneCircuit::new(witness)),
            CircuitId::PeerSupportEligibility => WellnessCircuit::PeerSupport(PeerSupportCircuit::new(witness)),
        }
    }

    /// Public signals (outputs ++ public inputs) this assignment must produce.
    ///
    /// This MUST match what the circuit allocates with `new_input`.
    pub fn public_signals(&self) -> Result<Vec<Fr>, SynthesisError> {
        match self {
            WellnessCircuit::Milestone(c) => c.public_signals(),
            WellnessCircuit::PeerSupport(c) => c.public_signals(),
        }
    }
}

impl ConstraintSynthesizer<Fr> for WellnessCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        match self {
            WellnessCircuit::Milestone(c) => c.generate_constraints(cs),
            WellnessCircuit::PeerSupport(c) => c.generate_constraints(cs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_counts_follow_schema() {
        assert_eq!(WELLNESS_MILESTONE.private_signal_count(), 5 + 2 * MOOD_HISTORY_LEN);
        assert_eq!(WELLNESS_MILESTONE.public_signal_count(), 11);
        assert_eq!(PEER_SUPPORT_ELIGIBILITY.private_signal_count(), 3 + INTERACTION_HISTORY_LEN);
        assert_eq!(PEER_SUPPORT_ELIGIBILITY.public_signal_count(), 6);
    }

    #[test]
    fn definitions_are_indexed_by_id() {
        for id in CircuitId::ALL {
            assert_eq!(definition(id).id, id);
        }
    }
}
