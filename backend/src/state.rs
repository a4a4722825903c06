use crate::config::Config;
use crate::db::{self, Db};
use crate::errors::ApiError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use wellness_aggregation::{AggregationEngine, Keypair, PrivacyBudgetLedger};
use wellness_zk::{
    CircuitArtifacts, CircuitContext, CircuitId, CircuitKeys, ProofService, ProofServiceConfig,
};

use rand::rngs::OsRng;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<Config>,
    pub proofs: Arc<ProofService>,
    pub aggregation: Arc<AggregationEngine>,
    /// Serializes read-aggregate-release-mark so a metric is consumed by at most one release.
    pub release_lock: Arc<Mutex<()>>,
}

impl AppState {
    /// Load every circuit, the aggregation key and the persisted budget state.
    pub async fn initialize(config: Config, db: Db) -> Result<Self, ApiError> {
        let artifacts_dir = config.artifacts_dir.clone();
        let context = tokio::task::spawn_blocking(move || load_circuit_context(&artifacts_dir))
            .await
            .map_err(|_| ApiError::Internal)?;

        let proofs = ProofService::new(
            Arc::new(context),
            ProofServiceConfig { cache_ttl: config.proof_cache_ttl, workers: config.prover_workers },
        );

        let keypair = load_or_create_keypair(&config.data_dir.join("aggregation.key"))?;
        let budget = db::budget_state(&db).await?;
        let ledger = PrivacyBudgetLedger::with_epoch(config.budget_epsilon_cap, budget.epoch).map_err(|e| {
            error!(error = %e, "invalid budget cap");
            ApiError::Internal
        })?;
        for (consumer, spent, releases) in &budget.spent {
            ledger.restore(consumer, *spent, *releases);
        }
        info!(epoch = budget.epoch, consumers = budget.spent.len(), "privacy budgets restored");

        let aggregation = AggregationEngine::new(keypair, config.metric_schema.clone(), ledger)?;
        info!(key_id = aggregation.key_id(), schema = %aggregation.schema(), "aggregation engine ready");

        Ok(Self {
            db,
            config: Arc::new(config),
            proofs: Arc::new(proofs),
            aggregation: Arc::new(aggregation),
            release_lock: Arc::new(Mutex::new(())),
        })
    }

    #[cfg(test)]
    pub fn from_parts(db: Db, config: Config, context: CircuitContext, aggregation: AggregationEngine) -> Self {
        let proofs = ProofService::new(
            Arc::new(context),
            ProofServiceConfig { cache_ttl: config.proof_cache_ttl, workers: config.prover_workers },
        );
        Self {
            db,
            config: Arc::new(config),
            proofs: Arc::new(proofs),
            aggregation: Arc::new(aggregation),
            release_lock: Arc::new(Mutex::new(())),
        }
    }
}

struct ArtifactPaths {
    manifest: PathBuf,
    pk: PathBuf,
    vk: PathBuf,
}

fn artifact_paths(dir: &Path, id: CircuitId) -> ArtifactPaths {
    ArtifactPaths {
        manifest: dir.join(format!("{id}.r1cs.json")),
        pk: dir.join(format!("{id}.pk.bin")),
        vk: dir.join(format!("{id}.vk.bin")),
    }
}

/// Load each circuit independently. A circuit whose artifacts fail to load is left out of the
/// context; the others stay usable.
pub fn load_circuit_context(dir: &Path) -> CircuitContext {
    let mut loaded = Vec::new();
    for id in CircuitId::ALL {
        match load_or_setup(dir, id) {
            Ok(keys) => {
                info!(circuit_id = %id, "circuit loaded");
                loaded.push(keys);
            }
            Err(e) => error!(circuit_id = %id, error = %e, "circuit unavailable"),
        }
    }
    CircuitContext::new(loaded)
}

fn load_or_setup(dir: &Path, id: CircuitId) -> Result<CircuitKeys, String> {
    let paths = artifact_paths(dir, id);
    let present = [&paths.manifest, &paths.pk, &paths.vk].map(|p| p.exists());

    if present.iter().all(|p| *p) {
        let read = |p: &Path| std::fs::read(p).map_err(|e| format!("{}: {e}", p.display()));
        let artifacts = CircuitArtifacts {
            manifest_json: read(paths.manifest.as_path())?,
            proving_key: read(paths.pk.as_path())?,
            verifying_key: read(paths.vk.as_path())?,
        };
        return CircuitKeys::from_artifacts(id, &artifacts).map_err(|e| e.to_string());
    }
    if present.iter().any(|p| *p) {
        // Never overwrite a partial artifact set; an operator has to look at it.
        return Err("incomplete artifact set".to_string());
    }

    // Trusted setup randomness (prototype).
    //
    // IMPORTANT: In production, load ceremony output instead of running a local setup.
    warn!(circuit_id = %id, "no artifacts found; running local setup");
    let keys = CircuitKeys::setup(id, &mut OsRng).map_err(|e| e.to_string())?;
    let artifacts = keys.to_artifacts().map_err(|e| e.to_string())?;

    std::fs::create_dir_all(dir).map_err(|e| format!("{}: {e}", dir.display()))?;
    let write = |p: &Path, bytes: &[u8]| std::fs::write(p, bytes).map_err(|e| format!("{}: {e}", p.display()));
    write(paths.pk.as_path(), &artifacts.proving_key)?;
    write(paths.vk.as_path(), &artifacts.verifying_key)?;
    // Manifest last: its presence marks a complete set.
    write(paths.manifest.as_path(), &artifacts.manifest_json)?;

    Ok(keys)
}

fn load_or_create_keypair(path: &Path) -> Result<Keypair, ApiError> {
    if path.exists() {
        let text = std::fs::read_to_string(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "cannot read aggregation key");
            ApiError::Internal
        })?;
        let bytes = hex::decode(text.trim()).map_err(|_| ApiError::Internal)?;
        return Ok(Keypair::from_secret_bytes(&bytes)?);
    }

    let keypair = Keypair::generate(&mut OsRng);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|_| ApiError::Internal)?;
    }
    write_secret(path, hex::encode(keypair.secret_to_bytes()?).as_bytes()).map_err(|e| {
        error!(path = %path.display(), error = %e, "cannot persist aggregation key");
        ApiError::Internal
    })?;
    info!(path = %path.display(), "generated aggregation keypair");
    Ok(keypair)
}

/// Create `path` readable by the owner only. Never overwrites.
fn write_secret(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
