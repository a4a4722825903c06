//! Aggregation engine: homomorphic sum, single decryption per field, differentially private
//! release under a per-consumer budget.

use std::collections::{BTreeMap, BTreeSet};

use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::budget::{BudgetSnapshot, PrivacyBudgetLedger};
use crate::dlog::DlogTable;
use crate::dp::{confidence_half_width, laplace_noise, validate_epsilon};
use crate::elgamal::{Ciphertext, Keypair, PublicKey};
use crate::error::AggregationError;
use crate::schema::{FieldKind, MetricSchema};

/// Plaintext metric values of one user for one reporting period.
pub type MetricVector = BTreeMap<String, u64>;

/// Per-field ciphertexts of one user, all under the key named by `key_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncryptedMetric {
    pub user_id: String,
    pub key_id: String,
    pub fields: BTreeMap<String, Ciphertext>,
}

/// Encrypt every field of `values` under `pk`. Values must fit in 32 bits.
pub fn encrypt<R: RngCore + CryptoRng>(
    user_id: &str,
    values: &MetricVector,
    pk: &PublicKey,
    rng: &mut R,
) -> Result<EncryptedMetric, AggregationError> {
    let fields = values
        .iter()
        .map(|(name, value)| {
            let m = u32::try_from(*value).map_err(|_| AggregationError::ValueOutOfRange {
                field: name.clone(),
                value: *value,
            })?;
            Ok((name.clone(), pk.encrypt(m, rng)))
        })
        .collect::<Result<BTreeMap<_, _>, AggregationError>>()?;
    Ok(EncryptedMetric { user_id: user_id.to_string(), key_id: pk.key_id()?, fields })
}

#[derive(Clone, Debug)]
pub struct FieldAggregate {
    pub metric: String,
    pub kind: FieldKind,
    pub summed: Ciphertext,
    pub exact_sum: u64,
    /// `exact_sum / user_count` for averaged fields, `exact_sum` for counts.
    pub value: f64,
}

/// Exact (pre-noise) aggregate. Never leaves the process; only [`Release`] does.
#[derive(Clone, Debug)]
pub struct AggregateResult {
    pub key_id: String,
    pub user_count: usize,
    pub fields: Vec<FieldAggregate>,
}

impl AggregateResult {
    pub fn field(&self, metric: &str) -> Option<&FieldAggregate> {
        self.fields.iter().find(|f| f.metric == metric)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReleasedStatistic {
    pub metric: String,
    pub value: f64,
    pub confidence_half_width: f64,
    pub epsilon: f64,
    pub user_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub consumer: String,
    pub epoch: u64,
    pub epsilon: f64,
    pub user_count: usize,
    pub statistics: Vec<ReleasedStatistic>,
}

pub struct AggregationEngine {
    keypair: Keypair,
    key_id: String,
    schema: MetricSchema,
    ledger: PrivacyBudgetLedger,
    dlog: &'static DlogTable,
}

impl AggregationEngine {
    pub fn new(keypair: Keypair, schema: MetricSchema, ledger: PrivacyBudgetLedger) -> Result<Self, AggregationError> {
        let key_id = keypair.public.key_id()?;
        Ok(Self { keypair, key_id, schema, ledger, dlog: DlogTable::shared() })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.keypair.public
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn schema(&self) -> &MetricSchema {
        &self.schema
    }

    pub fn ledger(&self) -> &PrivacyBudgetLedger {
        &self.ledger
    }

    pub fn budget(&self, consumer: &str) -> BudgetSnapshot {
        self.ledger.snapshot(consumer)
    }

    /// Encrypt one user's record after checking it against the schema, including each field's
    /// declared maximum. Sums beyond `users * max` are never searched for.
    pub fn encrypt_record<R: RngCore + CryptoRng>(
        &self,
        user_id: &str,
        values: &MetricVector,
        rng: &mut R,
    ) -> Result<EncryptedMetric, AggregationError> {
        self.schema
            .check_keys(values)
            .map_err(|reason| AggregationError::SchemaMismatch { user_id: user_id.to_string(), reason })?;
        for field in self.schema.fields() {
            if let Some(&value) = values.get(&field.name) {
                if value > u64::from(field.max) {
                    return Err(AggregationError::ValueOutOfRange { field: field.name.clone(), value });
                }
            }
        }
        encrypt(user_id, values, self.public_key(), rng)
    }

    /// Homomorphically sum every declared field across `metrics` and decrypt each sum once.
    pub fn aggregate(&self, metrics: &[EncryptedMetric]) -> Result<AggregateResult, AggregationError> {
        if metrics.is_empty() {
            return Err(AggregationError::EmptyInput);
        }

        let mut users = BTreeSet::new();
        for m in metrics {
            if m.key_id != self.key_id {
                return Err(AggregationError::KeyMismatch {
                    expected: self.key_id.clone(),
                    found: m.key_id.clone(),
                });
            }
            self.schema
                .check_keys(&m.fields)
                .map_err(|reason| AggregationError::SchemaMismatch { user_id: m.user_id.clone(), reason })?;
            if !users.insert(m.user_id.as_str()) {
                return Err(AggregationError::DuplicateUser(m.user_id.clone()));
            }
        }

        let count = metrics.len();
        let mut fields = Vec::with_capacity(self.schema.fields().len());
        for field in self.schema.fields() {
            let mut summed = Ciphertext::zero();
            for m in metrics {
                if let Some(ct) = m.fields.get(&field.name) {
                    summed += ct;
                }
            }

            let point = self.keypair.secret().decrypt_point(&summed);
            let bound = (count as u64).saturating_mul(u64::from(field.max));
            let exact_sum = self
                .dlog
                .solve(point, bound)
                .ok_or_else(|| AggregationError::Decryption { field: field.name.clone() })?;
            let value = match field.kind {
                FieldKind::Averaged => exact_sum as f64 / count as f64,
                FieldKind::Count => exact_sum as f64,
            };
            debug!(metric = %field.name, "field decrypted");
            fields.push(FieldAggregate { metric: field.name.clone(), kind: field.kind, summed, exact_sum, value });
        }

        info!(user_count = count, fields = fields.len(), "aggregated encrypted metrics");
        Ok(AggregateResult { key_id: self.key_id.clone(), user_count: count, fields })
    }

    /// Deduct `epsilon` from `consumer`'s budget, then add independent Laplace(1/ε) noise to each
    /// statistic. Nothing is released when the budget check fails.
    pub fn release<R: Rng + ?Sized>(
        &self,
        consumer: &str,
        aggregate: &AggregateResult,
        epsilon: f64,
        rng: &mut R,
    ) -> Result<Release, AggregationError> {
        if !validate_epsilon(epsilon) {
            return Err(AggregationError::InvalidEpsilon(epsilon));
        }
        if aggregate.key_id != self.key_id {
            return Err(AggregationError::KeyMismatch {
                expected: self.key_id.clone(),
                found: aggregate.key_id.clone(),
            });
        }

        let epoch = self.ledger.try_spend(consumer, epsilon)?;

        let scale = 1.0 / epsilon;
        let half_width = confidence_half_width(epsilon);
        let statistics = aggregate
            .fields
            .iter()
            .map(|f| ReleasedStatistic {
                metric: f.metric.clone(),
                value: f.value + laplace_noise(scale, rng),
                confidence_half_width: half_width,
                epsilon,
                user_count: aggregate.user_count,
            })
            .collect();

        info!(consumer, epsilon, epoch, user_count = aggregate.user_count, "aggregate released");
        Ok(Release {
            consumer: consumer.to_string(),
            epoch,
            epsilon,
            user_count: aggregate.user_count,
            statistics,
        })
    }
}
