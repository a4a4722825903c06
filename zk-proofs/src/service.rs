//! Proof service: generate, verify and batch-dispatch proofs over the immutable circuit context.
//!
//! Each request runs one linear pipeline:
//! fingerprint -> cache lookup -> witness -> prove -> self-verify -> cache -> return.
//! Every step short-circuits with its own error.

use std::sync::Arc;
use std::time::Duration;

use ark_bn254::Fr;
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cache::ProofCache;
use crate::circuit::WellnessCircuit;
use crate::context::CircuitContext;
use crate::error::ProofError;
use crate::groth16;
use crate::types::{field_from_decimal, field_to_decimal, CircuitId, Proof, ProofPoints, ProofRequest, WireProof};
use crate::witness;

/// Default cache lifetime of a generated proof.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone, Debug)]
pub struct ProofServiceConfig {
    pub cache_ttl: Duration,
    /// Maximum number of proofs generated at once.
    pub workers: usize,
}

impl Default for ProofServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
        }
    }
}

/// One entry of a batch request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchItem {
    pub correlation_id: String,
    pub request: ProofRequest,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Ok { proof: Proof },
    Error { message: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchResult {
    pub correlation_id: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

pub struct ProofService {
    context: Arc<CircuitContext>,
    cache: ProofCache,
    workers: Arc<Semaphore>,
    fingerprint_key: [u8; 32],
}

impl ProofService {
    pub fn new(context: Arc<CircuitContext>, config: ProofServiceConfig) -> Self {
        let mut fingerprint_key = [0u8; 32];
        OsRng.fill_bytes(&mut fingerprint_key);
        Self {
            context,
            cache: ProofCache::new(config.cache_ttl),
            workers: Arc::new(Semaphore::new(config.workers.max(1))),
            fingerprint_key,
        }
    }

    pub fn context(&self) -> &CircuitContext {
        &self.context
    }

    pub fn cache(&self) -> &ProofCache {
        &self.cache
    }

    /// Keyed hash over the full (circuit id, private, public) tuple.
    pub fn fingerprint(&self, request: &ProofRequest) -> Result<String, ProofError> {
        let canonical = serde_json::to_vec(request).map_err(|e| ProofError::Generation {
            circuit_id: request.circuit_id(),
            message: format!("fingerprint encoding: {e}"),
        })?;
        Ok(blake3::keyed_hash(&self.fingerprint_key, &canonical).to_hex().to_string())
    }

    /// Generate (or return the cached) proof for a request. CPU-bound; call from a blocking
    /// context or through [`ProofService::generate_proof_async`].
    pub fn generate_proof(&self, request: &ProofRequest) -> Result<Proof, ProofError> {
        let circuit_id = request.circuit_id();
        let keys = self
            .context
            .get(circuit_id)
            .ok_or(ProofError::CircuitUnavailable(circuit_id))?;

        let fingerprint = self.fingerprint(request)?;
        let short = &fingerprint[..12];
        if let Some(cached) = self.cache.get(&fingerprint) {
            debug!(%circuit_id, fingerprint = short, "proof cache hit");
            return Ok(cached);
        }

        let witness = witness::build(request)?;
        let circuit = WellnessCircuit::from_witness(witness);

        let (proof, public_signals) = groth16::prove(&mut OsRng, &keys.pk, circuit).map_err(|e| {
            error!(%circuit_id, fingerprint = short, error = %e, "proof generation failed");
            ProofError::Generation { circuit_id, message: e.to_string() }
        })?;

        // Fail closed if the proof doesn't verify under our own key.
        let verified = groth16::verify(&keys.pvk, &proof, &public_signals).unwrap_or_else(|e| {
            warn!(%circuit_id, fingerprint = short, error = %e, "verifier errored on a fresh proof");
            false
        });
        if !verified {
            error!(%circuit_id, fingerprint = short, alarm = true, "self-verification failed; key/circuit mismatch");
            return Err(ProofError::SelfVerificationFailure { circuit_id });
        }

        let proof = Proof {
            circuit_id,
            proof: ProofPoints::from_ark(&proof),
            public_signals: public_signals.iter().map(field_to_decimal).collect(),
            fingerprint: fingerprint.clone(),
            generated_at: Utc::now(),
        };

        info!(%circuit_id, fingerprint = short, "proof generated");
        Ok(self.cache.insert(fingerprint, proof))
    }

    /// Run [`ProofService::generate_proof`] on the bounded worker pool.
    pub async fn generate_proof_async(self: &Arc<Self>, request: ProofRequest) -> Result<Proof, ProofError> {
        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|e| ProofError::WorkerPool(e.to_string()))?;
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            // Held until proving finishes, even if the caller stops waiting.
            let _permit = permit;
            service.generate_proof(&request)
        })
        .await
        .map_err(|e| ProofError::WorkerPool(e.to_string()))?
    }

    /// Verify a proof the way the external verifier does.
    ///
    /// Malformed points, non-canonical signals and wrong signal counts all yield `Ok(false)`;
    /// only a circuit that is not loaded is an error.
    pub fn verify_proof(
        &self,
        circuit_id: CircuitId,
        proof: &ProofPoints,
        public_signals: &[String],
    ) -> Result<bool, ProofError> {
        let keys = self
            .context
            .get(circuit_id)
            .ok_or(ProofError::CircuitUnavailable(circuit_id))?;

        if public_signals.len() != keys.definition.public_signal_count() {
            debug!(%circuit_id, got = public_signals.len(), "public signal count mismatch");
            return Ok(false);
        }
        let Some(signals) = public_signals
            .iter()
            .map(|s| field_from_decimal::<Fr>(s))
            .collect::<Option<Vec<Fr>>>()
        else {
            debug!(%circuit_id, "non-canonical public signal");
            return Ok(false);
        };
        let Some(proof) = proof.to_ark() else {
            debug!(%circuit_id, "proof point not on curve");
            return Ok(false);
        };

        match groth16::verify(&keys.pvk, &proof, &signals) {
            Ok(ok) => Ok(ok),
            Err(e) => {
                warn!(%circuit_id, error = %e, "verifier rejected proof");
                Ok(false)
            }
        }
    }

    pub fn verify_wire(&self, wire: &WireProof) -> Result<bool, ProofError> {
        self.verify_proof(wire.circuit_id, &wire.proof, &wire.public_signals)
    }

    /// Generate every request concurrently. One failure never aborts its siblings.
    ///
    /// Results come back in request order. Dropping the returned future aborts items that have
    /// not started proving; items already on a worker run to completion.
    pub async fn generate_batch(self: &Arc<Self>, items: Vec<BatchItem>) -> Vec<BatchResult> {
        let ids: Vec<String> = items.iter().map(|i| i.correlation_id.clone()).collect();
        info!(size = items.len(), "dispatching proof batch");

        let mut set = JoinSet::new();
        for (index, item) in items.into_iter().enumerate() {
            let service = Arc::clone(self);
            set.spawn(async move { (index, service.generate_proof_async(item.request).await) });
        }

        let mut outcomes: Vec<Option<BatchOutcome>> = vec![None; ids.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(proof))) => outcomes[index] = Some(BatchOutcome::Ok { proof }),
                Ok((index, Err(e))) => {
                    warn!(correlation_id = %ids[index], error = %e, "batch item failed");
                    outcomes[index] = Some(BatchOutcome::Error { message: e.to_string() });
                }
                Err(e) => warn!(error = %e, "batch task did not complete"),
            }
        }

        ids.into_iter()
            .zip(outcomes)
            .map(|(correlation_id, outcome)| BatchResult {
                correlation_id,
                outcome: outcome.unwrap_or_else(|| BatchOutcome::Error {
                    message: "worker task did not complete".to_string(),
                }),
            })
            .collect()
    }
}
