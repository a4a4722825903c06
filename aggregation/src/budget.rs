//! Per-consumer privacy budget ledger.
//!
//! Check-and-deduct for one consumer happens while holding that consumer's map entry, so
//! concurrent releases can never jointly push `spent` past `cap`. Epoch resets come from an
//! external scheduler; the ledger never resets itself.
//!
//! Amounts are accounted in millionths of epsilon, so a run of spends that adds up to the cap
//! exactly is granted in full. Requests are rounded to the nearest unit, never below one.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BudgetError {
    #[error("privacy budget exhausted for `{consumer}`: requested {requested}, remaining {remaining}")]
    Exceeded { consumer: String, requested: f64, remaining: f64 },

    #[error("budget cap must be finite and >= 0, got {0}")]
    InvalidCap(f64),

    #[error("epsilon to spend must be finite and > 0, got {0}")]
    InvalidSpend(f64),
}

const UNITS_PER_EPSILON: f64 = 1_000_000.0;

fn to_units(epsilon: f64) -> u64 {
    // Saturating cast; callers have already rejected NaN and negatives.
    (epsilon * UNITS_PER_EPSILON).round() as u64
}

fn to_epsilon(units: u64) -> f64 {
    units as f64 / UNITS_PER_EPSILON
}

#[derive(Clone, Copy, Debug, Default)]
struct ConsumerBudget {
    spent: u64,
    releases: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub consumer: String,
    pub epoch: u64,
    pub cap: f64,
    pub spent: f64,
    pub remaining: f64,
    pub releases: u64,
}

pub struct PrivacyBudgetLedger {
    cap: f64,
    cap_units: u64,
    epoch: AtomicU64,
    budgets: DashMap<String, ConsumerBudget>,
}

impl PrivacyBudgetLedger {
    pub fn new(cap: f64) -> Result<Self, BudgetError> {
        Self::with_epoch(cap, 0)
    }

    /// Resume at a persisted epoch. Pair with [`PrivacyBudgetLedger::restore`].
    pub fn with_epoch(cap: f64, epoch: u64) -> Result<Self, BudgetError> {
        if !cap.is_finite() || cap < 0.0 {
            return Err(BudgetError::InvalidCap(cap));
        }
        Ok(Self { cap, cap_units: to_units(cap), epoch: AtomicU64::new(epoch), budgets: DashMap::new() })
    }

    pub fn cap(&self) -> f64 {
        self.cap
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Atomically deduct `epsilon` from `consumer`, or fail leaving the budget untouched.
    ///
    /// Returns the epoch the spend was charged to.
    pub fn try_spend(&self, consumer: &str, epsilon: f64) -> Result<u64, BudgetError> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(BudgetError::InvalidSpend(epsilon));
        }
        let requested = to_units(epsilon).max(1);

        let mut entry = self.budgets.entry(consumer.to_string()).or_default();
        let remaining = self.cap_units.saturating_sub(entry.spent);
        if requested > remaining {
            let remaining = to_epsilon(remaining);
            warn!(consumer, requested = epsilon, remaining, "privacy budget exceeded");
            return Err(BudgetError::Exceeded {
                consumer: consumer.to_string(),
                requested: epsilon,
                remaining,
            });
        }
        entry.spent += requested;
        entry.releases += 1;
        Ok(self.epoch())
    }

    /// Re-apply spending recorded before a restart. Clamped to the cap.
    pub fn restore(&self, consumer: &str, spent: f64, releases: u64) {
        let mut entry = self.budgets.entry(consumer.to_string()).or_default();
        let units = if spent.is_finite() { to_units(spent.max(0.0)) } else { self.cap_units };
        entry.spent = entry.spent.saturating_add(units).min(self.cap_units);
        entry.releases += releases;
    }

    pub fn snapshot(&self, consumer: &str) -> BudgetSnapshot {
        let budget = self.budgets.get(consumer).map(|b| *b).unwrap_or_default();
        BudgetSnapshot {
            consumer: consumer.to_string(),
            epoch: self.epoch(),
            cap: self.cap,
            spent: to_epsilon(budget.spent),
            remaining: to_epsilon(self.cap_units.saturating_sub(budget.spent)),
            releases: budget.releases,
        }
    }

    /// Start a new epoch: every consumer's spend returns to zero. Returns the new epoch.
    pub fn reset_epoch(&self) -> u64 {
        self.budgets.clear();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!(epoch, "privacy budget epoch reset");
        epoch
    }
}
