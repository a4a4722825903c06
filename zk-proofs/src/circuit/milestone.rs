//! Wellness milestone circuit.
//!
//! Proves that four private wellness metrics meet four public minimums without revealing them,
//! binds the statement to the user through a Poseidon hash over the raw inputs and the user
//! secret, and derives a trend commitment from a linear regression over the mood history.

use ark_bn254::Fr;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use super::gadgets::{bool_to_fp, fr_to_u64, geq, one, poseidon_native, poseidon_var, range_check, zero};
use crate::constants::{
    COUNT_BITS, MILESTONE_PRIVACY_SCORES, MOOD_HISTORY_LEN, SCORE_BITS, TIMESTAMP_BITS, TREND_OFFSET, TREND_SUM_X,
};
use crate::types::MilestoneOutputs;
use crate::witness::Witness;

// Private signal layout.
const HEALTH: usize = 0;
const SESSIONS: usize = 1;
const CONSISTENCY: usize = 2;
const IMPROVEMENT: usize = 3;
const SECRET: usize = 4;
const MOODS: usize = 5;
const TIMESTAMPS: usize = MOODS + MOOD_HISTORY_LEN;
const PRIVATE_LEN: usize = TIMESTAMPS + MOOD_HISTORY_LEN;

// Public input layout.
const MIN_HEALTH: usize = 0;
const MIN_SESSIONS: usize = 1;
const MIN_CONSISTENCY: usize = 2;
const MIN_IMPROVEMENT: usize = 3;
const MILESTONE_TYPE: usize = 4;
const VERIFIED_AT: usize = 5;
const PUBLIC_LEN: usize = 6;

#[derive(Clone, Debug)]
pub struct MilestoneCircuit {
    witness: Witness,
}

impl MilestoneCircuit {
    pub fn new(witness: Witness) -> Self {
        Self { witness }
    }

    fn signals(&self) -> Result<(&[Fr], &[Fr]), SynthesisError> {
        let private = self.witness.private_signals();
        let public = self.witness.public_inputs();
        if private.len() != PRIVATE_LEN || public.len() != PUBLIC_LEN {
            return Err(SynthesisError::Unsatisfiable);
        }
        Ok((private, public))
    }

    /// Compute the outputs natively.
    ///
    /// This MUST match the constraints in `generate_constraints`.
    pub fn evaluate(&self) -> Result<MilestoneOutputs, SynthesisError> {
        let (private, public) = self.signals()?;
        let small = |x: &Fr| fr_to_u64(x).ok_or(SynthesisError::Unsatisfiable);

        let achieved = small(&private[HEALTH])? >= small(&public[MIN_HEALTH])?
            && small(&private[SESSIONS])? >= small(&public[MIN_SESSIONS])?
            && small(&private[CONSISTENCY])? >= small(&public[MIN_CONSISTENCY])?
            && small(&private[IMPROVEMENT])? >= small(&public[MIN_IMPROVEMENT])?;

        let milestone_type = small(&public[MILESTONE_TYPE])? as usize;
        let privacy_score = *MILESTONE_PRIVACY_SCORES
            .get(milestone_type)
            .ok_or(SynthesisError::Unsatisfiable)?;

        let mut moods = Vec::with_capacity(MOOD_HISTORY_LEN);
        for m in &private[MOODS..TIMESTAMPS] {
            moods.push(small(m)?);
        }
        let trend = trend_native(&moods);

        let achievement_hash = poseidon_native(&[
            private[HEALTH],
            private[SESSIONS],
            private[CONSISTENCY],
            private[IMPROVEMENT],
            public[MILESTONE_TYPE],
            public[VERIFIED_AT],
            private[SECRET],
        ]);

        let mut consistency_inputs = vec![private[CONSISTENCY], private[SESSIONS]];
        consistency_inputs.extend_from_slice(&private[TIMESTAMPS..PRIVATE_LEN]);
        consistency_inputs.push(private[SECRET]);
        let consistency_proof = poseidon_native(&consistency_inputs);

        let improvement_proof = poseidon_native(&[private[IMPROVEMENT], trend, private[SECRET]]);

        Ok(MilestoneOutputs {
            achieved,
            achievement_hash,
            consistency_proof,
            improvement_proof,
            privacy_score,
        })
    }

    /// Outputs followed by public inputs, in allocation order.
    pub fn public_signals(&self) -> Result<Vec<Fr>, SynthesisError> {
        let out = self.evaluate()?;
        let (_, public) = self.signals()?;
        let mut signals = vec![
            Fr::from(out.achieved as u64),
            out.achievement_hash,
            out.consistency_proof,
            out.improvement_proof,
            Fr::from(out.privacy_score),
        ];
        signals.extend_from_slice(public);
        Ok(signals)
    }
}

/// Least-squares slope numerator over x = 0..n, shifted to be non-negative.
fn trend_native(moods: &[u64]) -> Fr {
    let n = moods.len() as i64;
    let numerator: i64 = moods
        .iter()
        .enumerate()
        .map(|(i, m)| (n * i as i64 - TREND_SUM_X as i64) * *m as i64)
        .sum();
    Fr::from((numerator + TREND_OFFSET as i64) as u64)
}

impl ConstraintSynthesizer<Fr> for MilestoneCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let expected = self.public_signals()?;
        let (private, public) = self.signals()?;

        // --- Public signals ---
        // IMPORTANT: allocation order MUST match `public_signals`: outputs, then public inputs.
        let mut outputs = Vec::with_capacity(5);
        for v in &expected[..5] {
            outputs.push(FpVar::<Fr>::new_input(cs.clone(), || Ok(*v))?);
        }
        let mut inputs = Vec::with_capacity(PUBLIC_LEN);
        for v in public {
            inputs.push(FpVar::<Fr>::new_input(cs.clone(), || Ok(*v))?);
        }

        // --- Private signals ---
        let mut w = Vec::with_capacity(PRIVATE_LEN);
        for v in private {
            w.push(FpVar::<Fr>::new_witness(cs.clone(), || Ok(*v))?);
        }

        // Ranges. Both sides of every comparison are checked to the comparator width.
        for (value, min, width) in [
            (HEALTH, MIN_HEALTH, SCORE_BITS),
            (SESSIONS, MIN_SESSIONS, COUNT_BITS),
            (CONSISTENCY, MIN_CONSISTENCY, COUNT_BITS),
            (IMPROVEMENT, MIN_IMPROVEMENT, SCORE_BITS),
        ] {
            range_check(&cs, &w[value], width)?;
            range_check(&cs, &inputs[min], width)?;
        }
        for m in &w[MOODS..TIMESTAMPS] {
            range_check(&cs, m, SCORE_BITS)?;
        }
        for t in &w[TIMESTAMPS..PRIVATE_LEN] {
            range_check(&cs, t, TIMESTAMP_BITS)?;
        }
        range_check(&cs, &inputs[VERIFIED_AT], TIMESTAMP_BITS)?;

        // achieved = AND of the four threshold comparisons.
        let checks = [
            geq(&cs, &w[HEALTH], &inputs[MIN_HEALTH], SCORE_BITS)?,
            geq(&cs, &w[SESSIONS], &inputs[MIN_SESSIONS], COUNT_BITS)?,
            geq(&cs, &w[CONSISTENCY], &inputs[MIN_CONSISTENCY], COUNT_BITS)?,
            geq(&cs, &w[IMPROVEMENT], &inputs[MIN_IMPROVEMENT], SCORE_BITS)?,
        ];
        let achieved = Boolean::kary_and(&checks)?;
        bool_to_fp(&achieved)?.enforce_equal(&outputs[0])?;

        // Regression slope numerator; coefficients are constants so this is a linear combination.
        let n = MOOD_HISTORY_LEN as u64;
        let mut trend = FpVar::<Fr>::constant(Fr::from(TREND_OFFSET));
        for (i, m) in w[MOODS..TIMESTAMPS].iter().enumerate() {
            let coeff = Fr::from(n * i as u64) - Fr::from(TREND_SUM_X);
            trend += m * coeff;
        }

        let achievement_hash = poseidon_var(
            &cs,
            &[
                w[HEALTH].clone(),
                w[SESSIONS].clone(),
                w[CONSISTENCY].clone(),
                w[IMPROVEMENT].clone(),
                inputs[MILESTONE_TYPE].clone(),
                inputs[VERIFIED_AT].clone(),
                w[SECRET].clone(),
            ],
        )?;
        achievement_hash.enforce_equal(&outputs[1])?;

        let mut consistency_inputs = vec![w[CONSISTENCY].clone(), w[SESSIONS].clone()];
        consistency_inputs.extend(w[TIMESTAMPS..PRIVATE_LEN].iter().cloned());
        consistency_inputs.push(w[SECRET].clone());
        poseidon_var(&cs, &consistency_inputs)?.enforce_equal(&outputs[2])?;

        poseidon_var(&cs, &[w[IMPROVEMENT].clone(), trend, w[SECRET].clone()])?.enforce_equal(&outputs[3])?;

        // milestone_type must be a known tag; privacy_score is its table entry.
        let mut tag_hits = zero();
        let mut privacy_score = zero();
        for (tag, score) in MILESTONE_PRIVACY_SCORES.iter().enumerate() {
            let is_tag = inputs[MILESTONE_TYPE].is_eq(&FpVar::<Fr>::constant(Fr::from(tag as u64)))?;
            tag_hits += bool_to_fp(&is_tag)?;
            privacy_score += is_tag.select(&FpVar::<Fr>::constant(Fr::from(*score)), &zero())?;
        }
        tag_hits.enforce_equal(&one())?;
        privacy_score.enforce_equal(&outputs[4])?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MilestonePrivateInputs, MilestonePublicInputs, MoodEntry};
    use crate::witness::build_milestone;
    use ark_relations::r1cs::ConstraintSystem;

    fn private(score: u64) -> MilestonePrivateInputs {
        MilestonePrivateInputs {
            health_score: score,
            session_count: 12,
            consistency_days: 40,
            improvement_score: 30,
            user_secret: "987654321".into(),
            mood_history: (0..MOOD_HISTORY_LEN as u64)
                .map(|i| MoodEntry { mood: 40 + i, timestamp: 1_700_000_000 + i * 86_400 })
                .collect(),
        }
    }

    fn public() -> MilestonePublicInputs {
        MilestonePublicInputs {
            min_health_score: 80,
            min_sessions: 10,
            min_consistency_days: 30,
            min_improvement: 20,
            milestone_type: 3,
            verification_timestamp: 1_702_600_000,
        }
    }

    fn circuit(score: u64) -> MilestoneCircuit {
        MilestoneCircuit::new(build_milestone(&private(score), &public()).unwrap())
    }

    #[test]
    fn scenario_thresholds_met_then_missed() {
        assert!(circuit(85).evaluate().unwrap().achieved);
        assert!(!circuit(70).evaluate().unwrap().achieved);
    }

    #[test]
    fn constraints_are_satisfied_for_both_outcomes() {
        for score in [85, 70] {
            let cs = ConstraintSystem::<Fr>::new_ref();
            circuit(score).generate_constraints(cs.clone()).unwrap();
            assert!(cs.is_satisfied().unwrap(), "score {score}");
            assert_eq!(cs.num_instance_variables(), 1 + 11);
        }
    }

    #[test]
    fn privacy_score_follows_milestone_type() {
        let out = circuit(85).evaluate().unwrap();
        assert_eq!(out.privacy_score, MILESTONE_PRIVACY_SCORES[3]);
    }

    #[test]
    fn rising_moods_give_positive_trend() {
        let rising: Vec<u64> = (0..MOOD_HISTORY_LEN as u64).collect();
        let flat = vec![50u64; MOOD_HISTORY_LEN];
        assert!(fr_to_u64(&trend_native(&rising)).unwrap() > TREND_OFFSET);
        assert_eq!(fr_to_u64(&trend_native(&flat)).unwrap(), TREND_OFFSET);
    }

    #[test]
    fn hash_binds_user_secret() {
        let a = circuit(85).evaluate().unwrap();
        let mut other = private(85);
        other.user_secret = "1".into();
        let b = MilestoneCircuit::new(build_milestone(&other, &public()).unwrap()).evaluate().unwrap();
        assert_ne!(a.achievement_hash, b.achievement_hash);
        assert_ne!(a.consistency_proof, b.consistency_proof);
        assert_eq!(a.achieved, b.achieved);
    }
}
