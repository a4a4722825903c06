//! Privacy-preserving aggregation of wellness metrics.
//!
//! Clients encrypt metric vectors under the engine's lifted-ElGamal public key. The engine sums
//! ciphertexts homomorphically, decrypts each field sum once, and releases the statistics with
//! Laplace noise after charging the consumer's privacy budget.
//!
//! Nothing here shares keys or types with the proof subsystem.

pub mod budget;
pub mod dlog;
pub mod dp;
pub mod elgamal;
pub mod engine;
pub mod error;
pub mod schema;

pub use budget::{BudgetError, BudgetSnapshot, PrivacyBudgetLedger};
pub use elgamal::{Ciphertext, Keypair, PublicKey};
pub use engine::{
    encrypt, AggregateResult, AggregationEngine, EncryptedMetric, FieldAggregate, MetricVector, Release,
    ReleasedStatistic,
};
pub use error::AggregationError;
pub use schema::{FieldKind, MetricField, MetricSchema, SchemaError};
