//! The immutable circuit context: definitions plus keys, built once at startup.
//!
//! There is no global registry. The context is constructed by the boundary (which owns all
//! artifact I/O) and shared read-only with the proof service.

use std::collections::BTreeMap;
use std::sync::Arc;

use ark_bn254::Bn254;
use ark_groth16::{PreparedVerifyingKey, ProvingKey, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::circuit::{definition, CircuitDefinition};
use crate::groth16::{
    constraint_count, deserialize_pk, deserialize_vk, prepare, serialize_pk, serialize_vk, setup_keys, ZkError,
};
use crate::types::CircuitId;

/// Description of the compiled constraint system, stored next to the keys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitManifest {
    pub circuit_id: CircuitId,
    pub schema_version: u32,
    pub public_signal_count: usize,
    pub constraint_count: usize,
}

/// The three artifacts of one circuit, as raw bytes.
#[derive(Clone, Debug)]
pub struct CircuitArtifacts {
    pub manifest_json: Vec<u8>,
    pub proving_key: Vec<u8>,
    pub verifying_key: Vec<u8>,
}

/// Keys of one circuit. Immutable for the life of the process.
pub struct CircuitKeys {
    pub definition: &'static CircuitDefinition,
    pub pk: ProvingKey<Bn254>,
    pub vk: VerifyingKey<Bn254>,
    pub pvk: PreparedVerifyingKey<Bn254>,
}

impl CircuitKeys {
    pub fn from_parts(circuit_id: CircuitId, pk: ProvingKey<Bn254>, vk: VerifyingKey<Bn254>) -> Self {
        let pvk = prepare(&vk);
        Self { definition: definition(circuit_id), pk, vk, pvk }
    }

    /// Run a local (prototype) setup for one circuit.
    pub fn setup(circuit_id: CircuitId, rng: &mut impl RngCore) -> Result<Self, ZkError> {
        let (pk, vk) = setup_keys(circuit_id, rng)?;
        Ok(Self::from_parts(circuit_id, pk, vk))
    }

    /// Decode artifacts, refusing any whose manifest disagrees with the compiled-in schema.
    pub fn from_artifacts(circuit_id: CircuitId, artifacts: &CircuitArtifacts) -> Result<Self, ZkError> {
        let manifest: CircuitManifest = serde_json::from_slice(&artifacts.manifest_json)
            .map_err(|e| ZkError::Serialization(format!("{e}")))?;
        let def = definition(circuit_id);

        let mismatch = |reason: String| ZkError::Manifest { circuit_id, reason };
        if manifest.circuit_id != circuit_id {
            return Err(mismatch(format!("manifest is for {}", manifest.circuit_id)));
        }
        if manifest.schema_version != def.version {
            return Err(mismatch(format!(
                "schema version {} != {}",
                manifest.schema_version, def.version
            )));
        }
        if manifest.public_signal_count != def.public_signal_count() {
            return Err(mismatch(format!(
                "public signal count {} != {}",
                manifest.public_signal_count,
                def.public_signal_count()
            )));
        }

        let pk = deserialize_pk(&artifacts.proving_key)?;
        let vk = deserialize_vk(&artifacts.verifying_key)?;
        if vk.gamma_abc_g1.len() != def.public_signal_count() + 1 {
            return Err(mismatch("verifying key public input arity".to_string()));
        }
        Ok(Self::from_parts(circuit_id, pk, vk))
    }

    pub fn to_artifacts(&self) -> Result<CircuitArtifacts, ZkError> {
        let manifest = CircuitManifest {
            circuit_id: self.definition.id,
            schema_version: self.definition.version,
            public_signal_count: self.definition.public_signal_count(),
            constraint_count: constraint_count(self.definition.id)?,
        };
        Ok(CircuitArtifacts {
            manifest_json: serde_json::to_vec_pretty(&manifest)
                .map_err(|e| ZkError::Serialization(format!("{e}")))?,
            proving_key: serialize_pk(&self.pk)?,
            verifying_key: serialize_vk(&self.vk)?,
        })
    }
}

/// The set of circuits usable by this process.
///
/// Circuits whose artifacts failed to load are simply absent.
#[derive(Clone, Default)]
pub struct CircuitContext {
    circuits: BTreeMap<CircuitId, Arc<CircuitKeys>>,
}

impl CircuitContext {
    pub fn new(keys: impl IntoIterator<Item = CircuitKeys>) -> Self {
        let circuits = keys
            .into_iter()
            .map(|k| (k.definition.id, Arc::new(k)))
            .collect();
        Self { circuits }
    }

    pub fn get(&self, circuit_id: CircuitId) -> Option<&Arc<CircuitKeys>> {
        self.circuits.get(&circuit_id)
    }

    pub fn loaded(&self) -> impl Iterator<Item = CircuitId> + '_ {
        self.circuits.keys().copied()
    }
}
