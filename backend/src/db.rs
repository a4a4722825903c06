use crate::errors::ApiError;
use chrono::Utc;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use uuid::Uuid;
use wellness_aggregation::{EncryptedMetric, Release};

pub type Db = Pool<Sqlite>;

pub async fn connect(db_url: &str) -> Result<Db, ApiError> {
    Ok(SqlitePoolOptions::new().max_connections(5).connect(db_url).await?)
}

pub async fn init_schema(db: &Db) -> Result<(), ApiError> {
    // Per-user ciphertexts never leave these tables; only release rows are ever returned.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS encrypted_metrics (
  id TEXT PRIMARY KEY,
  period TEXT NOT NULL,
  user_id TEXT NOT NULL,
  key_id TEXT NOT NULL,
  metric_json TEXT NOT NULL,
  created_at TEXT NOT NULL,
  consumed_by TEXT,
  UNIQUE(period, user_id)
);

CREATE TABLE IF NOT EXISTS releases (
  id TEXT PRIMARY KEY,
  consumer TEXT NOT NULL,
  period TEXT NOT NULL,
  epoch INTEGER NOT NULL,
  epsilon REAL NOT NULL,
  user_count INTEGER NOT NULL,
  statistics_json TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS budget_epochs (
  epoch INTEGER PRIMARY KEY,
  started_at TEXT NOT NULL
);
"#,
    )
    .execute(db)
    .await?;

    Ok(())
}

/// Store one user's ciphertexts for a period. A second submission for the same
/// (period, user) is a conflict.
pub async fn insert_metric(db: &Db, id: Uuid, period: &str, metric: &EncryptedMetric) -> Result<(), ApiError> {
    let metric_json = serde_json::to_string(metric).map_err(|_| ApiError::Internal)?;

    let res = sqlx::query(
        r#"INSERT INTO encrypted_metrics (id, period, user_id, key_id, metric_json, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(id.to_string())
    .bind(period)
    .bind(&metric.user_id)
    .bind(&metric.key_id)
    .bind(metric_json)
    .bind(Utc::now().to_rfc3339())
    .execute(db)
    .await;

    match res {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(ApiError::Conflict(format!(
            "metrics already submitted for user in period `{period}`"
        ))),
        Err(e) => Err(e.into()),
    }
}

pub async fn unconsumed_metrics(db: &Db, period: &str) -> Result<Vec<(String, EncryptedMetric)>, ApiError> {
    let rows = sqlx::query(
        r#"SELECT id, metric_json FROM encrypted_metrics
           WHERE period = ? AND consumed_by IS NULL
           ORDER BY created_at, id"#,
    )
    .bind(period)
    .fetch_all(db)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.get(0);
        let metric_json: String = row.get(1);
        let metric: EncryptedMetric = serde_json::from_str(&metric_json).map_err(|e| {
            tracing::error!(metric_id = %id, error = %e, "stored metric does not decode");
            ApiError::Internal
        })?;
        out.push((id, metric));
    }

    Ok(out)
}

/// Log a release and mark the metrics it consumed, atomically.
pub async fn record_release(
    db: &Db,
    release_id: Uuid,
    period: &str,
    release: &Release,
    metric_ids: &[String],
) -> Result<(), ApiError> {
    let statistics_json = serde_json::to_string(&release.statistics).map_err(|_| ApiError::Internal)?;
    let release_id = release_id.to_string();

    let mut tx = db.begin().await?;
    sqlx::query(
        r#"INSERT INTO releases (id, consumer, period, epoch, epsilon, user_count, statistics_json, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&release_id)
    .bind(&release.consumer)
    .bind(period)
    .bind(release.epoch as i64)
    .bind(release.epsilon)
    .bind(release.user_count as i64)
    .bind(statistics_json)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *tx)
    .await?;

    for id in metric_ids {
        sqlx::query(r#"UPDATE encrypted_metrics SET consumed_by = ? WHERE id = ? AND consumed_by IS NULL"#)
            .bind(&release_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(())
}

/// Per-consumer spending recorded for the current epoch.
pub struct BudgetState {
    pub epoch: u64,
    pub spent: Vec<(String, f64, u64)>,
}

pub async fn budget_state(db: &Db) -> Result<BudgetState, ApiError> {
    let row = sqlx::query(r#"SELECT COALESCE(MAX(epoch), 0) AS e FROM budget_epochs"#)
        .fetch_one(db)
        .await?;
    let epoch: i64 = row.get("e");

    let rows = sqlx::query(
        r#"SELECT consumer, SUM(epsilon) AS spent, COUNT(*) AS n
           FROM releases WHERE epoch = ?
           GROUP BY consumer"#,
    )
    .bind(epoch)
    .fetch_all(db)
    .await?;

    let spent = rows
        .into_iter()
        .map(|row| {
            let consumer: String = row.get("consumer");
            let spent: f64 = row.get("spent");
            let n: i64 = row.get("n");
            (consumer, spent, n as u64)
        })
        .collect();

    Ok(BudgetState { epoch: epoch as u64, spent })
}

pub async fn insert_epoch(db: &Db, epoch: u64) -> Result<(), ApiError> {
    sqlx::query(r#"INSERT OR IGNORE INTO budget_epochs (epoch, started_at) VALUES (?, ?)"#)
        .bind(epoch as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(db)
        .await?;
    Ok(())
}
