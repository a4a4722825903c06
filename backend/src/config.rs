use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use wellness_aggregation::MetricSchema;
use wellness_zk::service::DEFAULT_CACHE_TTL;

/// Key accepted on protected routes when `API_KEY` is unset. Local development only.
pub const DEV_API_KEY: &str = "dev-secret-key";

#[derive(Debug, Error)]
#[error("invalid {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub reason: String,
}

/// Process configuration, read once from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub addr: String,
    pub api_key: String,
    pub data_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub proof_cache_ttl: Duration,
    pub prover_workers: usize,
    pub budget_epsilon_cap: f64,
    pub metric_schema: MetricSchema,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = PathBuf::from(lookup("DATA_DIR").unwrap_or_else(|| "data".to_string()));
        let artifacts_dir = lookup("ARTIFACTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("artifacts"));

        let proof_cache_ttl = match lookup("PROOF_CACHE_TTL_SECS") {
            Some(v) => Duration::from_secs(parse("PROOF_CACHE_TTL_SECS", &v)?),
            None => DEFAULT_CACHE_TTL,
        };

        let prover_workers = match lookup("PROVER_WORKERS") {
            Some(v) => match parse::<usize>("PROVER_WORKERS", &v)? {
                0 => return Err(ConfigError { var: "PROVER_WORKERS", reason: "must be at least 1".into() }),
                n => n,
            },
            None => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
        };

        let budget_epsilon_cap = match lookup("BUDGET_EPSILON_CAP") {
            Some(v) => {
                let cap: f64 = parse("BUDGET_EPSILON_CAP", &v)?;
                if !cap.is_finite() || cap < 0.0 {
                    return Err(ConfigError { var: "BUDGET_EPSILON_CAP", reason: "must be finite and >= 0".into() });
                }
                cap
            }
            None => 1.0,
        };

        let metric_schema = match lookup("METRIC_SCHEMA") {
            Some(v) => v
                .parse()
                .map_err(|e| ConfigError { var: "METRIC_SCHEMA", reason: format!("{e}") })?,
            None => MetricSchema::default(),
        };

        Ok(Self {
            addr: lookup("BACKEND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            api_key: lookup("API_KEY").unwrap_or_else(|| DEV_API_KEY.to_string()),
            data_dir,
            artifacts_dir,
            proof_cache_ttl,
            prover_workers,
            budget_epsilon_cap,
            metric_schema,
        })
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError { var, reason: format!("`{value}`: {e}") })
}
