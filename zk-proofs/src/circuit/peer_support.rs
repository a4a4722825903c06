//! Peer-support eligibility circuit.
//!
//! The quality score is the floor of the average of strictly positive interaction ratings. The
//! filtering happens inside the circuit, so which ratings were excluded is never revealed.

use ark_bn254::Fr;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use super::gadgets::{bool_to_fp, fr_to_u64, geq, one, poseidon_native, poseidon_var, range_check, zero};
use crate::constants::{COUNT_BITS, INTERACTION_HISTORY_LEN, INTERACTION_OFFSET, SCORE_BITS};
use crate::types::PeerSupportOutputs;
use crate::witness::Witness;

// Private signal layout.
const EXPERIENCE: usize = 0;
const WELLNESS: usize = 1;
const HISTORY: usize = 2;
const SECRET: usize = HISTORY + INTERACTION_HISTORY_LEN;
const PRIVATE_LEN: usize = SECRET + 1;

// Public input layout.
const MIN_EXPERIENCE: usize = 0;
const MIN_WELLNESS: usize = 1;
const QUALITY_THRESHOLD: usize = 2;
const PUBLIC_LEN: usize = 3;

#[derive(Clone, Debug)]
pub struct PeerSupportCircuit {
    witness: Witness,
}

/// Floor average of the positive ratings and the division remainder.
struct QualityParts {
    quotient: u64,
    remainder: u64,
}

impl PeerSupportCircuit {
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

    fn quality(&self) -> Result<QualityParts, SynthesisError> {
        let (private, _) = self.signals()?;
        let mut sum = 0u64;
        let mut count = 0u64;
        for encoded in &private[HISTORY..SECRET] {
            let rating = fr_to_u64(encoded).ok_or(SynthesisError::Unsatisfiable)? as i64 - INTERACTION_OFFSET;
            if rating > 0 {
                sum += rating as u64;
                count += 1;
            }
        }
        if count == 0 {
            return Err(SynthesisError::Unsatisfiable);
        }
        Ok(QualityParts { quotient: sum / count, remainder: sum % count })
    }

    /// Compute the outputs natively.
    ///
    /// This MUST match the constraints in `generate_constraints`.
    pub fn evaluate(&self) -> Result<PeerSupportOutputs, SynthesisError> {
        let (private, public) = self.signals()?;
        let small = |x: &Fr| fr_to_u64(x).ok_or(SynthesisError::Unsatisfiable);
        let quality = self.quality()?;

        let eligible = small(&private[EXPERIENCE])? >= small(&public[MIN_EXPERIENCE])?
            && small(&private[WELLNESS])? >= small(&public[MIN_WELLNESS])?
            && quality.quotient >= small(&public[QUALITY_THRESHOLD])?;

        let credential_hash = poseidon_native(&[
            private[SECRET],
            private[EXPERIENCE],
            private[WELLNESS],
            Fr::from(quality.quotient),
        ]);

        Ok(PeerSupportOutputs {
            eligible,
            quality_score: quality.quotient,
            credential_hash,
        })
    }

    /// Outputs followed by public inputs, in allocation order.
    pub fn public_signals(&self) -> Result<Vec<Fr>, SynthesisError> {
        let out = self.evaluate()?;
        let (_, public) = self.signals()?;
        let mut signals = vec![
            Fr::from(out.eligible as u64),
            Fr::from(out.quality_score),
            out.credential_hash,
        ];
        signals.extend_from_slice(public);
        Ok(signals)
    }
}

impl ConstraintSynthesizer<Fr> for PeerSupportCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let expected = self.public_signals()?;
        let quality = self.quality()?;
        let (private, public) = self.signals()?;

        // IMPORTANT: allocation order MUST match `public_signals`.
        let mut outputs = Vec::with_capacity(3);
        for v in &expected[..3] {
            outputs.push(FpVar::<Fr>::new_input(cs.clone(), || Ok(*v))?);
        }
        let mut inputs = Vec::with_capacity(PUBLIC_LEN);
        for v in public {
            inputs.push(FpVar::<Fr>::new_input(cs.clone(), || Ok(*v))?);
        }

        let mut w = Vec::with_capacity(PRIVATE_LEN);
        for v in private {
            w.push(FpVar::<Fr>::new_witness(cs.clone(), || Ok(*v))?);
        }

        range_check(&cs, &w[EXPERIENCE], COUNT_BITS)?;
        range_check(&cs, &inputs[MIN_EXPERIENCE], COUNT_BITS)?;
        range_check(&cs, &w[WELLNESS], SCORE_BITS)?;
        range_check(&cs, &inputs[MIN_WELLNESS], SCORE_BITS)?;
        range_check(&cs, &inputs[QUALITY_THRESHOLD], SCORE_BITS)?;

        // Positive-rating filter: encoded > offset  <=>  encoded >= offset + 1.
        let offset = FpVar::<Fr>::constant(Fr::from(INTERACTION_OFFSET as u64));
        let first_positive = FpVar::<Fr>::constant(Fr::from(INTERACTION_OFFSET as u64 + 1));
        let mut sum = zero();
        let mut count = zero();
        for encoded in &w[HISTORY..SECRET] {
            range_check(&cs, encoded, SCORE_BITS)?;
            let positive = geq(&cs, encoded, &first_positive, SCORE_BITS)?;
            sum += positive.select(&(encoded - &offset), &zero())?;
            count += bool_to_fp(&positive)?;
        }

        // sum = q * count + r with r < count. count >= 1 follows from r >= 0.
        let q = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(quality.quotient)))?;
        let r = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(quality.remainder)))?;
        range_check(&cs, &q, SCORE_BITS)?;
        range_check(&cs, &r, SCORE_BITS)?;
        (&q * &count + &r).enforce_equal(&sum)?;
        geq(&cs, &count, &(&r + one()), SCORE_BITS)?.enforce_equal(&Boolean::constant(true))?;
        q.enforce_equal(&outputs[1])?;

        let checks = [
            geq(&cs, &w[EXPERIENCE], &inputs[MIN_EXPERIENCE], COUNT_BITS)?,
            geq(&cs, &w[WELLNESS], &inputs[MIN_WELLNESS], SCORE_BITS)?,
            geq(&cs, &q, &inputs[QUALITY_THRESHOLD], SCORE_BITS)?,
        ];
        let eligible = Boolean::kary_and(&checks)?;
        bool_to_fp(&eligible)?.enforce_equal(&outputs[0])?;

        poseidon_var(&cs, &[w[SECRET].clone(), w[EXPERIENCE].clone(), w[WELLNESS].clone(), q])?
            .enforce_equal(&outputs[2])?;

        Ok(())
    }
}
