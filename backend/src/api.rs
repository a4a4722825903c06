use crate::db;
use crate::errors::ApiError;
use crate::models::*;
use crate::state::AppState;
use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use rand::rngs::OsRng;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;
use wellness_aggregation::{AggregationError, BudgetSnapshot};
use wellness_zk::groth16::serialize_vk;
use wellness_zk::{BatchItem, BatchOutcome, CircuitId, Proof, ProofError, ProofRequest, WireProof};

/// Largest batch accepted by `/api/v1/proofs/batch`.
pub const MAX_BATCH_SIZE: usize = 64;
const MAX_LABEL_LEN: usize = 128;

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/v1/proofs", post(generate_proof))
        .route("/api/v1/proofs/batch", post(generate_batch))
        .route("/api/v1/aggregates", post(create_aggregate))
        .route("/api/v1/budgets/reset", post(reset_budgets))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/circuits", get(list_circuits))
        .route("/api/v1/proofs/verify", post(verify_proof))
        .route("/api/v1/aggregation/public-key", get(get_public_key))
        .route("/api/v1/metrics", post(submit_metric))
        .route("/api/v1/budgets/:consumer", get(get_budget))
        .merge(protected_routes)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(provided_key) = headers.get("X-API-KEY") {
        if provided_key == state.config.api_key.as_str() {
            return Ok(next.run(request).await);
        }
    }

    tracing::warn!(path = %request.uri().path(), "unauthorized access attempt");
    Err(StatusCode::UNAUTHORIZED)
}

fn label(field: &str, value: &str) -> Result<(), ApiError> {
    if value.is_empty() || value.len() > MAX_LABEL_LEN {
        return Err(ApiError::BadRequest(format!("{field} must be 1..={MAX_LABEL_LEN} bytes")));
    }
    Ok(())
}

/// Resolve the circuit id first so unknown ids are a 404, then decode the typed request.
fn parse_proof_request(body: Value) -> Result<ProofRequest, ApiError> {
    let id = body
        .get("circuit_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest("missing circuit_id".to_string()))?;
    id.parse::<CircuitId>().map_err(ProofError::from)?;

    serde_json::from_value(body).map_err(|e| ApiError::BadRequest(format!("invalid proof request: {e}")))
}

fn proof_response(proof: &Proof) -> ProofResponse {
    ProofResponse { proof: proof.to_wire(), generated_at: proof.generated_at }
}

async fn list_circuits(State(state): State<AppState>) -> Result<Json<CircuitsResponse>, ApiError> {
    let b64 = base64::engine::general_purpose::STANDARD;
    let context = state.proofs.context();

    let mut circuits = Vec::new();
    for id in context.loaded() {
        let Some(keys) = context.get(id) else { continue };
        let def = keys.definition;
        let vk_bytes = serialize_vk(&keys.vk).map_err(|_| ApiError::Internal)?;
        circuits.push(CircuitInfo {
            circuit_id: def.id,
            schema_version: def.version,
            public_signal_count: def.public_signal_count(),
            private_signals: def.private_signals,
            public_inputs: def.public_inputs,
            outputs: def.outputs,
            constraints: def.constraints,
            curve: "bn254",
            proof_system: "groth16",
            vk_b64: b64.encode(vk_bytes),
        });
    }

    Ok(Json(CircuitsResponse { circuits }))
}

async fn generate_proof(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Json<ProofResponse>, ApiError> {
    let request = parse_proof_request(body)?;
    let proof = state.proofs.generate_proof_async(request).await?;
    Ok(Json(proof_response(&proof)))
}

async fn generate_batch(State(state): State<AppState>, Json(req): Json<BatchRequest>) -> Result<Json<BatchResponse>, ApiError> {
    if req.items.is_empty() || req.items.len() > MAX_BATCH_SIZE {
        return Err(ApiError::BadRequest(format!("batch must hold 1..={MAX_BATCH_SIZE} items")));
    }

    // Malformed items fail in place; the rest go to the prover together.
    let mut results: Vec<Option<BatchItemResponse>> = Vec::with_capacity(req.items.len());
    let mut slots = Vec::new();
    let mut items = Vec::new();
    for (slot, item) in req.items.into_iter().enumerate() {
        match parse_proof_request(item.request) {
            Ok(request) => {
                slots.push(slot);
                items.push(BatchItem { correlation_id: item.correlation_id, request });
                results.push(None);
            }
            Err(e) => results.push(Some(BatchItemResponse {
                correlation_id: item.correlation_id,
                status: BatchStatus::Error,
                proof: None,
                error: Some(e.to_string()),
            })),
        }
    }

    let generated = state.proofs.generate_batch(items).await;
    for (slot, result) in slots.into_iter().zip(generated) {
        results[slot] = Some(match result.outcome {
            BatchOutcome::Ok { proof } => BatchItemResponse {
                correlation_id: result.correlation_id,
                status: BatchStatus::Ok,
                proof: Some(proof_response(&proof)),
                error: None,
            },
            BatchOutcome::Error { message } => BatchItemResponse {
                correlation_id: result.correlation_id,
                status: BatchStatus::Error,
                proof: None,
                error: Some(message),
            },
        });
    }

    Ok(Json(BatchResponse { results: results.into_iter().flatten().collect() }))
}

async fn verify_proof(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Json<VerifyResponse>, ApiError> {
    let id = body
        .get("circuitId")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest("missing circuitId".to_string()))?;
    id.parse::<CircuitId>().map_err(ProofError::from)?;

    let wire: WireProof =
        serde_json::from_value(body).map_err(|e| ApiError::BadRequest(format!("invalid proof: {e}")))?;

    // Pairings are CPU-bound.
    let proofs = state.proofs.clone();
    let valid = tokio::task::spawn_blocking(move || proofs.verify_wire(&wire))
        .await
        .map_err(|_| ApiError::Internal)??;

    Ok(Json(VerifyResponse { valid }))
}

async fn get_public_key(State(state): State<AppState>) -> Result<Json<PublicKeyResponse>, ApiError> {
    let engine = &state.aggregation;
    Ok(Json(PublicKeyResponse {
        scheme: "lifted-elgamal-bn254-g1",
        public_key_hex: engine.public_key().to_hex()?,
        key_id: engine.key_id().to_string(),
        max_value: u32::MAX,
        schema: engine.schema().clone(),
    }))
}

async fn submit_metric(
    State(state): State<AppState>,
    Json(req): Json<SubmitMetricRequest>,
) -> Result<(StatusCode, Json<SubmitMetricResponse>), ApiError> {
    label("period", &req.period)?;
    label("user_id", &req.metric.user_id)?;

    let engine = &state.aggregation;
    if req.metric.key_id != engine.key_id() {
        return Err(ApiError::BadRequest(format!(
            "metric encrypted under key {}; current key is {}",
            req.metric.key_id,
            engine.key_id()
        )));
    }
    engine
        .schema()
        .check_keys(&req.metric.fields)
        .map_err(|reason| ApiError::BadRequest(format!("metric does not match schema: {reason}")))?;

    let metric_id = Uuid::new_v4();
    db::insert_metric(&state.db, metric_id, &req.period, &req.metric).await?;
    info!(%metric_id, period = %req.period, "encrypted metric stored");

    Ok((StatusCode::CREATED, Json(SubmitMetricResponse { metric_id })))
}

async fn create_aggregate(
    State(state): State<AppState>,
    Json(req): Json<AggregateRequest>,
) -> Result<Json<AggregateResponse>, ApiError> {
    label("period", &req.period)?;
    label("consumer", &req.consumer)?;

    let _guard = state.release_lock.lock().await;

    let (metric_ids, metrics): (Vec<String>, Vec<_>) =
        db::unconsumed_metrics(&state.db, &req.period).await?.into_iter().unzip();

    let engine = state.aggregation.clone();
    let consumer = req.consumer.clone();
    let epsilon = req.epsilon;
    let release = tokio::task::spawn_blocking(move || {
        let aggregate = engine.aggregate(&metrics)?;
        engine.release(&consumer, &aggregate, epsilon, &mut OsRng)
    })
    .await
    .map_err(|_| ApiError::Internal)?
    .map_err(|e: AggregationError| {
        if e.is_denial() {
            info!(period = %req.period, consumer = %req.consumer, reason = %e, "aggregate denied");
        }
        ApiError::from(e)
    })?;

    let release_id = Uuid::new_v4();
    if let Err(e) = db::record_release(&state.db, release_id, &req.period, &release, &metric_ids).await {
        // Budget is already charged; the statistics are withheld.
        error!(%release_id, consumer = %req.consumer, "release charged but not recorded");
        return Err(e);
    }

    Ok(Json(AggregateResponse {
        release_id,
        period: req.period,
        consumer: req.consumer.clone(),
        epoch: release.epoch,
        statistics: release.statistics,
        budget: state.aggregation.budget(&req.consumer),
    }))
}

async fn get_budget(State(state): State<AppState>, Path(consumer): Path<String>) -> Result<Json<BudgetSnapshot>, ApiError> {
    label("consumer", &consumer)?;
    Ok(Json(state.aggregation.budget(&consumer)))
}

async fn reset_budgets(State(state): State<AppState>) -> Result<Json<BudgetResetResponse>, ApiError> {
    let _guard = state.release_lock.lock().await;
    let epoch = state.aggregation.ledger().reset_epoch();
    db::insert_epoch(&state.db, epoch).await?;
    Ok(Json(BudgetResetResponse { epoch }))
}
