//! Groth16 prover/verifier orchestration for the wellness circuits.
//!
//! SECURITY NOTE (prototype): Groth16 requires a trusted setup that produces a proving key (PK)
//! and verifying key (VK). [`setup_keys`] generates them locally; production deployments load
//! ceremony output through the artifact store instead.

use ark_bn254::{Bn254, Fr};
use ark_groth16::{prepare_verifying_key, Groth16, PreparedVerifyingKey, Proof, ProvingKey, VerifyingKey};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem, SynthesisMode};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::RngCore;
use thiserror::Error;

use crate::circuit::WellnessCircuit;
use crate::types::CircuitId;
use crate::witness::Witness;

#[derive(Debug, Error)]
pub enum ZkError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("artifact manifest mismatch for {circuit_id}: {reason}")]
    Manifest { circuit_id: CircuitId, reason: String },

    #[error("arkworks error: {0}")]
    Ark(String),
}

/// Generate a Groth16 keypair for one circuit.
///
/// Constraints only depend on the circuit shape, so a blank witness is enough.
pub fn setup_keys(
    circuit_id: CircuitId,
    rng: &mut impl RngCore,
) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>), ZkError> {
    let circuit = WellnessCircuit::from_witness(Witness::blank(circuit_id));

    let pk = Groth16::<Bn254>::generate_random_parameters_with_reduction(circuit, rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;

    let vk = pk.vk.clone();
    Ok((pk, vk))
}

/// Number of R1CS constraints of a circuit, recorded in its artifact manifest.
pub fn constraint_count(circuit_id: CircuitId) -> Result<usize, ZkError> {
    let cs = ConstraintSystem::<Fr>::new_ref();
    cs.set_mode(SynthesisMode::Setup);
    WellnessCircuit::from_witness(Witness::blank(circuit_id))
        .generate_constraints(cs.clone())
        .map_err(|e| ZkError::Ark(format!("{e}")))?;
    Ok(cs.num_constraints())
}

/// Prove one assignment. Returns the proof and the public signals it commits to.
pub fn prove(
    rng: &mut impl RngCore,
    pk: &ProvingKey<Bn254>,
    circuit: WellnessCircuit,
) -> Result<(Proof<Bn254>, Vec<Fr>), ZkError> {
    let public_signals = circuit
        .public_signals()
        .map_err(|e| ZkError::Ark(format!("{e}")))?;

    let proof = Groth16::<Bn254>::create_random_proof_with_reduction(circuit, pk, rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;

    Ok((proof, public_signals))
}

/// Verify a proof against already-parsed public signals.
///
/// A wrong number of public signals is an invalid proof, not an error.
pub fn verify(
    pvk: &PreparedVerifyingKey<Bn254>,
    proof: &Proof<Bn254>,
    public_signals: &[Fr],
) -> Result<bool, ZkError> {
    if public_signals.len() + 1 != pvk.vk.gamma_abc_g1.len() {
        return Ok(false);
    }
    Groth16::<Bn254>::verify_proof(pvk, proof, public_signals).map_err(|e| ZkError::Ark(format!("{e}")))
}

pub fn prepare(vk: &VerifyingKey<Bn254>) -> PreparedVerifyingKey<Bn254> {
    prepare_verifying_key(vk)
}

/// Serialize a proving key to bytes.
pub fn serialize_pk(pk: &ProvingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    pk.serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_pk(bytes: &[u8]) -> Result<ProvingKey<Bn254>, ZkError> {
    ProvingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}

pub fn serialize_vk(vk: &VerifyingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    vk.serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_vk(bytes: &[u8]) -> Result<VerifyingKey<Bn254>, ZkError> {
    VerifyingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}
