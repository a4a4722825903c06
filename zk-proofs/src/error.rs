use thiserror::Error;

use crate::groth16::ZkError;
use crate::types::{CircuitId, UnknownCircuitId};
use crate::witness::ValidationError;

#[derive(Debug, Error)]
pub enum ProofError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    UnknownCircuit(#[from] UnknownCircuitId),

    #[error("circuit {0} is not loaded")]
    CircuitUnavailable(CircuitId),

    #[error("proof generation failed for {circuit_id}: {message}")]
    Generation { circuit_id: CircuitId, message: String },

    /// A freshly generated proof failed its own verification: the proving and verifying keys
    /// disagree. Never a user error.
    #[error("self-verification failed for {circuit_id}; proving/verifying key mismatch")]
    SelfVerificationFailure { circuit_id: CircuitId },

    #[error("proof worker pool unavailable: {0}")]
    WorkerPool(String),

    #[error(transparent)]
    Zk(#[from] ZkError),
}

impl ProofError {
    /// Integrity faults that operators must be alerted to.
    pub fn is_integrity_fault(&self) -> bool {
        matches!(self, ProofError::SelfVerificationFailure { .. })
    }
}
