//! Types shared between the circuits, the witness builder and the proof service.

use ark_bn254::{Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ec::AffineRepr;
use ark_ff::{PrimeField, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of one of the fixed circuits.
///
/// Unknown identifiers fail to parse, so they are rejected at the boundary instead of being
/// carried around as free-form strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitId {
    WellnessMilestone,
    PeerSupportEligibility,
}

impl CircuitId {
    pub const ALL: [CircuitId; 2] = [CircuitId::WellnessMilestone, CircuitId::PeerSupportEligibility];

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitId::WellnessMilestone => "wellness_milestone",
            CircuitId::PeerSupportEligibility => "peer_support_eligibility",
        }
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown circuit id: {0}")]
pub struct UnknownCircuitId(pub String);

impl FromStr for CircuitId {
    type Err = UnknownCircuitId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CircuitId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| UnknownCircuitId(s.to_string()))
    }
}

/// One entry of a milestone mood history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MoodEntry {
    pub mood: u64,
    pub timestamp: u64,
}

/// Private inputs of the wellness milestone circuit, as supplied by the application.
///
/// Values are deliberately wide; the witness builder checks them against the circuit's
/// declared ranges.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MilestonePrivateInputs {
    pub health_score: u64,
    pub session_count: u64,
    pub consistency_days: u64,
    pub improvement_score: u64,
    /// Decimal field element.
    pub user_secret: String,
    /// Exactly `constants::MOOD_HISTORY_LEN` entries.
    pub mood_history: Vec<MoodEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MilestonePublicInputs {
    pub min_health_score: u64,
    pub min_sessions: u64,
    pub min_consistency_days: u64,
    pub min_improvement: u64,
    pub milestone_type: u64,
    pub verification_timestamp: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerSupportPrivateInputs {
    pub supporter_experience: u64,
    pub supporter_wellness: u64,
    /// Exactly `constants::INTERACTION_HISTORY_LEN` signed ratings; non-positive ratings are ignored by the
    /// quality average.
    pub interaction_history: Vec<i64>,
    /// Decimal field element.
    pub supporter_secret: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerSupportPublicInputs {
    pub min_experience: u64,
    pub min_wellness: u64,
    pub quality_threshold: u64,
}

/// A proof request: the circuit tag selects the schema of the private and public inputs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "circuit_id", rename_all = "snake_case")]
pub enum ProofRequest {
    WellnessMilestone {
        private_inputs: MilestonePrivateInputs,
        public_inputs: MilestonePublicInputs,
    },
    PeerSupportEligibility {
        private_inputs: PeerSupportPrivateInputs,
        public_inputs: PeerSupportPublicInputs,
    },
}

impl ProofRequest {
    pub fn circuit_id(&self) -> CircuitId {
        match self {
            ProofRequest::WellnessMilestone { .. } => CircuitId::WellnessMilestone,
            ProofRequest::PeerSupportEligibility { .. } => CircuitId::PeerSupportEligibility,
        }
    }
}

/// Decimal string of a base/scalar field element, the encoding used on the wire.
pub fn field_to_decimal<F: PrimeField>(x: &F) -> String {
    x.into_bigint().to_string()
}

/// Parse a canonical decimal field element.
///
/// Returns `None` for empty strings, non-digits, leading zeros and values at or above the
/// modulus, so two strings never decode to the same element.
pub fn field_from_decimal<F: PrimeField>(s: &str) -> Option<F> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    let x = F::from_str(s).ok()?;
    // `from_str` reduces modulo p; reject anything that did not survive unchanged.
    if field_to_decimal(&x) != s {
        return None;
    }
    Some(x)
}

/// G1 point as decimal affine coordinates. The point at infinity is `(0, 0)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct G1Point {
    pub x: String,
    pub y: String,
}

/// G2 point as decimal affine coordinates over Fq2, `[c0, c1]` per coordinate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct G2Point {
    pub x: [String; 2],
    pub y: [String; 2],
}

impl G1Point {
    pub fn from_affine(p: &G1Affine) -> Self {
        match p.xy() {
            Some((x, y)) => Self { x: field_to_decimal(&x), y: field_to_decimal(&y) },
            None => Self { x: "0".into(), y: "0".into() },
        }
    }

    /// Decode and check curve and subgroup membership.
    pub fn to_affine(&self) -> Option<G1Affine> {
        let x: Fq = field_from_decimal(&self.x)?;
        let y: Fq = field_from_decimal(&self.y)?;
        if x.is_zero() && y.is_zero() {
            return Some(G1Affine::identity());
        }
        let p = G1Affine::new_unchecked(x, y);
        (p.is_on_curve() && p.is_in_correct_subgroup_assuming_on_curve()).then_some(p)
    }
}

impl G2Point {
    pub fn from_affine(p: &G2Affine) -> Self {
        match p.xy() {
            Some((x, y)) => Self {
                x: [field_to_decimal(&x.c0), field_to_decimal(&x.c1)],
                y: [field_to_decimal(&y.c0), field_to_decimal(&y.c1)],
            },
            None => Self {
                x: ["0".into(), "0".into()],
                y: ["0".into(), "0".into()],
            },
        }
    }

    pub fn to_affine(&self) -> Option<G2Affine> {
        let x = Fq2::new(field_from_decimal(&self.x[0])?, field_from_decimal(&self.x[1])?);
        let y = Fq2::new(field_from_decimal(&self.y[0])?, field_from_decimal(&self.y[1])?);
        if x.is_zero() && y.is_zero() {
            return Some(G2Affine::identity());
        }
        let p = G2Affine::new_unchecked(x, y);
        (p.is_on_curve() && p.is_in_correct_subgroup_assuming_on_curve()).then_some(p)
    }
}

/// The three group elements of a Groth16 proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPoints {
    pub a: G1Point,
    pub b: G2Point,
    pub c: G1Point,
}

impl ProofPoints {
    pub fn from_ark(proof: &ark_groth16::Proof<ark_bn254::Bn254>) -> Self {
        Self {
            a: G1Point::from_affine(&proof.a),
            b: G2Point::from_affine(&proof.b),
            c: G1Point::from_affine(&proof.c),
        }
    }

    pub fn to_ark(&self) -> Option<ark_groth16::Proof<ark_bn254::Bn254>> {
        Some(ark_groth16::Proof {
            a: self.a.to_affine()?,
            b: self.b.to_affine()?,
            c: self.c.to_affine()?,
        })
    }
}

/// The exact boundary format exchanged with an external verifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireProof {
    pub circuit_id: CircuitId,
    pub proof: ProofPoints,
    pub public_signals: Vec<String>,
}

/// A generated, self-verified proof.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    pub circuit_id: CircuitId,
    pub proof: ProofPoints,
    /// Outputs first, then public inputs, in the circuit's declared order.
    pub public_signals: Vec<String>,
    /// Hex-encoded request fingerprint.
    pub fingerprint: String,
    pub generated_at: DateTime<Utc>,
}

impl Proof {
    pub fn to_wire(&self) -> WireProof {
        WireProof {
            circuit_id: self.circuit_id,
            proof: self.proof.clone(),
            public_signals: self.public_signals.clone(),
        }
    }
}

/// Typed view of the public signals of a milestone proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MilestoneOutputs {
    pub achieved: bool,
    pub achievement_hash: Fr,
    pub consistency_proof: Fr,
    pub improvement_proof: Fr,
    pub privacy_score: u64,
}

/// Typed view of the public signals of a peer-support proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerSupportOutputs {
    pub eligible: bool,
    pub quality_score: u64,
    pub credential_hash: Fr,
}
