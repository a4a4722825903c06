//! Zero-knowledge layer of the wellness privacy engine.
//!
//! This crate contains:
//! - Two fixed R1CS circuits (wellness milestone, peer-support eligibility) and their schemas.
//! - The witness builder that validates application values against those schemas.
//! - Groth16 prover/verifier orchestration and the external wire format.
//! - The proof service: fingerprint cache, self-verification and batch dispatch.

pub mod cache;
pub mod circuit;
pub mod constants;
pub mod context;
pub mod error;
pub mod groth16;
pub mod service;
pub mod types;
pub mod witness;

pub use context::{CircuitArtifacts, CircuitContext, CircuitKeys, CircuitManifest};
pub use error::ProofError;
pub use service::{BatchItem, BatchOutcome, BatchResult, ProofService, ProofServiceConfig};
pub use types::{CircuitId, Proof, ProofRequest, WireProof};
pub use witness::ValidationError;
