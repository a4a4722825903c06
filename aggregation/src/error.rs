use thiserror::Error;

use crate::budget::BudgetError;

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("no encrypted metrics to aggregate")]
    EmptyInput,

    /// Ciphertexts under a different public key were handed to this engine. Always a caller bug.
    #[error("ciphertext key {found} does not match engine key {expected}")]
    KeyMismatch { expected: String, found: String },

    #[error("metric record for `{user_id}` does not match schema: {reason}")]
    SchemaMismatch { user_id: String, reason: String },

    #[error("user `{0}` appears more than once in one aggregation")]
    DuplicateUser(String),

    #[error("metric `{field}` value {value} exceeds the 32-bit plaintext domain")]
    ValueOutOfRange { field: String, value: u64 },

    #[error("epsilon must be finite and > 0, got {0}")]
    InvalidEpsilon(f64),

    #[error("decryption of `{field}` failed: plaintext outside the bounded domain")]
    Decryption { field: String },

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl AggregationError {
    /// Expected, recoverable denials surfaced to the caller as-is.
    pub fn is_denial(&self) -> bool {
        matches!(self, AggregationError::EmptyInput | AggregationError::Budget(_))
    }
}
