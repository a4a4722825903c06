//! Witness builder: validates application values and packs them into the exact ordered signal
//! vectors a circuit expects.
//!
//! This is the only place where plaintext secrets and plaintext scores are held together.
//! Nothing here is ever logged.

use ark_bn254::Fr;
use thiserror::Error;

use crate::circuit::{definition, SignalRange, SignalSpec};
use crate::constants::INTERACTION_OFFSET;
use crate::types::{
    field_from_decimal, CircuitId, MilestonePrivateInputs, MilestonePublicInputs, PeerSupportPrivateInputs,
    PeerSupportPublicInputs, ProofRequest,
};

/// An application value that does not fit its declared signal range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid `{field}`: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { field: field.into(), reason: reason.into() }
    }
}

/// A validated signal assignment for one circuit.
///
/// Only the builder (and key setup) can create one, so a `Witness` always matches its circuit's
/// schema in length and range.
#[derive(Clone)]
pub struct Witness {
    circuit_id: CircuitId,
    private: Vec<Fr>,
    public: Vec<Fr>,
}

impl std::fmt::Debug for Witness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print private signals.
        f.debug_struct("Witness")
            .field("circuit_id", &self.circuit_id)
            .field("private", &format_args!("<{} redacted>", self.private.len()))
            .field("public", &self.public)
            .finish()
    }
}

impl Witness {
    pub fn circuit_id(&self) -> CircuitId {
        self.circuit_id
    }

    pub fn private_signals(&self) -> &[Fr] {
        &self.private
    }

    pub fn public_inputs(&self) -> &[Fr] {
        &self.public
    }

    /// All-zero assignment with the right shape; only used to derive keys.
    pub(crate) fn blank(circuit_id: CircuitId) -> Self {
        let def = definition(circuit_id);
        let mut private = vec![Fr::from(0u64); def.private_signal_count()];
        if circuit_id == CircuitId::PeerSupportEligibility {
            // Keep the quality division well-defined while synthesizing.
            let first_rating = 2;
            private[first_rating] = Fr::from((INTERACTION_OFFSET + 1) as u64);
        }
        Self {
            circuit_id,
            private,
            public: vec![Fr::from(0u64); def.public_input_count()],
        }
    }
}

/// Build the witness for a proof request.
pub fn build(request: &ProofRequest) -> Result<Witness, ValidationError> {
    match request {
        ProofRequest::WellnessMilestone { private_inputs, public_inputs } => {
            build_milestone(private_inputs, public_inputs)
        }
        ProofRequest::PeerSupportEligibility { private_inputs, public_inputs } => {
            build_peer_support(private_inputs, public_inputs)
        }
    }
}

pub fn build_milestone(
    private: &MilestonePrivateInputs,
    public: &MilestonePublicInputs,
) -> Result<Witness, ValidationError> {
    let def = definition(CircuitId::WellnessMilestone);

    let mut p = SignalPacker::new(def.private_signals);
    p.unsigned("health_score", private.health_score)?;
    p.unsigned("session_count", private.session_count)?;
    p.unsigned("consistency_days", private.consistency_days)?;
    p.unsigned("improvement_score", private.improvement_score)?;
    p.field("user_secret", &private.user_secret)?;
    let moods: Vec<u64> = private.mood_history.iter().map(|e| e.mood).collect();
    let timestamps: Vec<u64> = private.mood_history.iter().map(|e| e.timestamp).collect();
    p.unsigned_array("mood_history", &moods)?;
    p.unsigned_array("mood_timestamps", &timestamps)?;
    let private_signals = p.finish()?;

    let mut q = SignalPacker::new(def.public_inputs);
    q.unsigned("min_health_score", public.min_health_score)?;
    q.unsigned("min_sessions", public.min_sessions)?;
    q.unsigned("min_consistency_days", public.min_consistency_days)?;
    q.unsigned("min_improvement", public.min_improvement)?;
    q.unsigned("milestone_type", public.milestone_type)?;
    q.unsigned("verification_timestamp", public.verification_timestamp)?;
    let public_signals = q.finish()?;

    Ok(Witness {
        circuit_id: def.id,
        private: private_signals,
        public: public_signals,
    })
}

pub fn build_peer_support(
    private: &PeerSupportPrivateInputs,
    public: &PeerSupportPublicInputs,
) -> Result<Witness, ValidationError> {
    let def = definition(CircuitId::PeerSupportEligibility);

    // An all non-positive history leaves the quality average undefined; refuse before proving.
    if !private.interaction_history.iter().any(|r| *r > 0) {
        return Err(ValidationError::new(
            "interaction_history",
            "no positive ratings, quality score is undefined",
        ));
    }

    let mut p = SignalPacker::new(def.private_signals);
    p.unsigned("supporter_experience", private.supporter_experience)?;
    p.unsigned("supporter_wellness", private.supporter_wellness)?;
    p.signed_array("interaction_history", &private.interaction_history)?;
    p.field("supporter_secret", &private.supporter_secret)?;
    let private_signals = p.finish()?;

    let mut q = SignalPacker::new(def.public_inputs);
    q.unsigned("min_experience", public.min_experience)?;
    q.unsigned("min_wellness", public.min_wellness)?;
    q.unsigned("quality_threshold", public.quality_threshold)?;
    let public_signals = q.finish()?;

    Ok(Witness {
        circuit_id: def.id,
        private: private_signals,
        public: public_signals,
    })
}

/// Walks a schema in order, checking each value against the next declared signal.
struct SignalPacker {
    specs: &'static [SignalSpec],
    next: usize,
    out: Vec<Fr>,
}

impl SignalPacker {
    fn new(specs: &'static [SignalSpec]) -> Self {
        Self { specs, next: 0, out: Vec::new() }
    }

    fn spec(&mut self, name: &str, len: usize) -> Result<SignalSpec, ValidationError> {
        let spec = self
            .specs
            .get(self.next)
            .copied()
            .ok_or_else(|| ValidationError::new(name, "signal not declared by circuit"))?;
        if spec.name != name {
            return Err(ValidationError::new(name, format!("expected signal `{}` at this position", spec.name)));
        }
        if spec.len != len {
            return Err(ValidationError::new(name, format!("expected {} entries, got {len}", spec.len)));
        }
        self.next += 1;
        Ok(spec)
    }

    fn unsigned(&mut self, name: &str, value: u64) -> Result<(), ValidationError> {
        let spec = self.spec(name, 1)?;
        check_unsigned(&spec.range, name, value)?;
        self.out.push(Fr::from(value));
        Ok(())
    }

    fn unsigned_array(&mut self, name: &str, values: &[u64]) -> Result<(), ValidationError> {
        let spec = self.spec(name, values.len())?;
        for (i, v) in values.iter().enumerate() {
            check_unsigned(&spec.range, &format!("{name}[{i}]"), *v)?;
            self.out.push(Fr::from(*v));
        }
        Ok(())
    }

    fn signed_array(&mut self, name: &str, values: &[i64]) -> Result<(), ValidationError> {
        let spec = self.spec(name, values.len())?;
        if spec.range != SignalRange::SignedByte {
            return Err(ValidationError::new(name, "signal is not signed"));
        }
        for (i, v) in values.iter().enumerate() {
            if !(-INTERACTION_OFFSET..INTERACTION_OFFSET).contains(v) {
                return Err(ValidationError::new(
                    format!("{name}[{i}]"),
                    format!("{v} outside [-{INTERACTION_OFFSET}, {}]", INTERACTION_OFFSET - 1),
                ));
            }
            self.out.push(Fr::from((v + INTERACTION_OFFSET) as u64));
        }
        Ok(())
    }

    fn field(&mut self, name: &str, decimal: &str) -> Result<(), ValidationError> {
        let spec = self.spec(name, 1)?;
        if spec.range != SignalRange::Field {
            return Err(ValidationError::new(name, "signal is not a field element"));
        }
        let x = field_from_decimal::<Fr>(decimal)
            .ok_or_else(|| ValidationError::new(name, "not a canonical decimal field element"))?;
        self.out.push(x);
        Ok(())
    }

    fn finish(self) -> Result<Vec<Fr>, ValidationError> {
        if let Some(missing) = self.specs.get(self.next) {
            return Err(ValidationError::new(missing.name, "missing signal"));
        }
        Ok(self.out)
    }
}

fn check_unsigned(range: &SignalRange, field: &str, value: u64) -> Result<(), ValidationError> {
    match range {
        SignalRange::Bits { bits } => {
            if *bits < 64 && value >> bits != 0 {
                return Err(ValidationError::new(
                    field,
                    format!("{value} does not fit in {bits} bits (max {})", (1u64 << bits) - 1),
                ));
            }
            Ok(())
        }
        SignalRange::Tag { values } => {
            if !values.contains(&value) {
                return Err(ValidationError::new(field, format!("{value} is not one of {values:?}")));
            }
            Ok(())
        }
        SignalRange::SignedByte | SignalRange::Field => {
            Err(ValidationError::new(field, "signal is not an unsigned integer"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{INTERACTION_HISTORY_LEN, MOOD_HISTORY_LEN};
    use crate::types::MoodEntry;

    fn milestone_private() -> MilestonePrivateInputs {
        MilestonePrivateInputs {
            health_score: 85,
            session_count: 12,
            consistency_days: 40,
            improvement_score: 30,
            user_secret: "123456789".into(),
            mood_history: (0..MOOD_HISTORY_LEN as u64)
                .map(|i| MoodEntry { mood: 50 + i, timestamp: 1_700_000_000 + i * 86_400 })
                .collect(),
        }
    }

    fn milestone_public() -> MilestonePublicInputs {
        MilestonePublicInputs {
            min_health_score: 80,
            min_sessions: 10,
            min_consistency_days: 30,
            min_improvement: 20,
            milestone_type: 2,
            verification_timestamp: 1_700_003_000,
        }
    }

    #[test]
    fn packs_milestone_signals_in_schema_order() {
        let w = build_milestone(&milestone_private(), &milestone_public()).unwrap();
        assert_eq!(w.private_signals().len(), 5 + 2 * MOOD_HISTORY_LEN);
        assert_eq!(w.private_signals()[0], Fr::from(85u64));
        assert_eq!(w.private_signals()[5], Fr::from(50u64));
        assert_eq!(w.public_inputs().len(), 6);
        assert_eq!(w.public_inputs()[4], Fr::from(2u64));
    }

    #[test]
    fn out_of_range_score_names_the_field() {
        let mut private = milestone_private();
        private.health_score = 256;
        let err = build_milestone(&private, &milestone_public()).unwrap_err();
        assert_eq!(err.field, "health_score");
    }

    #[test]
    fn out_of_range_history_entry_names_the_index() {
        let mut private = milestone_private();
        private.mood_history[7].mood = 300;
        let err = build_milestone(&private, &milestone_public()).unwrap_err();
        assert_eq!(err.field, "mood_history[7]");
    }

    #[test]
    fn short_history_is_rejected() {
        let mut private = milestone_private();
        private.mood_history.pop();
        let err = build_milestone(&private, &milestone_public()).unwrap_err();
        assert_eq!(err.field, "mood_history");
    }

    #[test]
    fn unknown_milestone_type_is_rejected() {
        let mut public = milestone_public();
        public.milestone_type = 9;
        let err = build_milestone(&milestone_private(), &public).unwrap_err();
        assert_eq!(err.field, "milestone_type");
    }

    #[test]
    fn non_canonical_secret_is_rejected() {
        let mut private = milestone_private();
        private.user_secret = "0x10".into();
        let err = build_milestone(&private, &milestone_public()).unwrap_err();
        assert_eq!(err.field, "user_secret");
    }

    fn peer_private(history: Vec<i64>) -> PeerSupportPrivateInputs {
        PeerSupportPrivateInputs {
            supporter_experience: 24,
            supporter_wellness: 75,
            interaction_history: history,
            supporter_secret: "42".into(),
        }
    }

    fn peer_public() -> PeerSupportPublicInputs {
        PeerSupportPublicInputs { min_experience: 12, min_wellness: 60, quality_threshold: 4 }
    }

    #[test]
    fn signed_ratings_are_offset_encoded() {
        let mut history = vec![0i64; INTERACTION_HISTORY_LEN];
        history[0] = 5;
        history[1] = -3;
        let w = build_peer_support(&peer_private(history), &peer_public()).unwrap();
        assert_eq!(w.private_signals()[2], Fr::from(133u64));
        assert_eq!(w.private_signals()[3], Fr::from(125u64));
    }

    #[test]
    fn all_non_positive_history_fails_explicitly() {
        let history = vec![0i64; INTERACTION_HISTORY_LEN];
        let err = build_peer_support(&peer_private(history), &peer_public()).unwrap_err();
        assert_eq!(err.field, "interaction_history");
    }

    #[test]
    fn rating_outside_signed_byte_is_rejected() {
        let mut history = vec![1i64; INTERACTION_HISTORY_LEN];
        history[4] = 128;
        let err = build_peer_support(&peer_private(history), &peer_public()).unwrap_err();
        assert_eq!(err.field, "interaction_history[4]");
    }

    #[test]
    fn debug_output_redacts_private_signals() {
        let w = build_milestone(&milestone_private(), &milestone_public()).unwrap();
        let printed = format!("{w:?}");
        assert!(printed.contains("redacted"));
        assert!(!printed.contains("123456789"));
    }
}
