use crate::db;
use crate::errors::ApiError;
use crate::jobs;
use crate::models::*;
use crate::registry;
use crate::state::AppState;
use crate::verifier;
use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use rand::rngs::OsRng;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use zk_proofs::commit::commit;
use zk_proofs::generator::{CancelToken, DisclosurePolicy};
use zk_proofs::predicate::{catalog, catalog_version};
use zk_proofs::types::{FrHex, Record};

pub fn router(state: AppState) -> Router {
    // Holder-facing routes require the API key. Verification stays
    // unauthenticated: the code itself is the capability.
    let protected_routes = Router::new()
        .route("/api/v1/records", post(import_record).get(list_records))
        .route("/api/v1/proofs", post(create_proof))
        .route("/api/v1/proofs/:code", delete(revoke_proof))
        .route("/api/v1/activity", get(list_activity))
        .layer(middleware::from_fn(auth_middleware));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/predicates", get(list_predicates))
        .route("/api/v1/verify/:code", get(verify_code))
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
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // In production, this should be a strong secret from environment.
    let expected_key = std::env::var("API_KEY").unwrap_or_else(|_| "dev-secret-key".to_string());

    if let Some(provided_key) = headers.get("X-API-KEY") {
        if provided_key == expected_key.as_str() {
            return Ok(next.run(request).await);
        }
    }

    tracing::warn!("unauthorized access attempt");
    Err(StatusCode::UNAUTHORIZED)
}

async fn import_record(
    State(state): State<AppState>,
    Json(req): Json<ImportRecordRequest>,
) -> Result<Json<ImportRecordResponse>, ApiError> {
    if req.fields.is_empty() {
        return Err(ApiError::bad_request(
            "invalid_params",
            "record must have at least one field",
        ));
    }

    let fields = req
        .fields
        .into_iter()
        .map(|f| f.into_field())
        .collect::<Result<Vec<_>, _>>()?;
    let record = Record::new(fields)?;

    // Commit-on-import: the record is immutable from here on. The secret
    // opening stays in the holder-side store, the commitment is the only
    // thing that ever leaves it.
    let mut rng = OsRng;
    let committed = commit(&record, &mut rng)?;
    let record_commitment_hex = FrHex::from_fr(&committed.record_commitment).hex;

    let record_id = state.records.insert(record, committed, state.clock.now());

    db::append_activity(
        &state.db,
        state.clock.now(),
        "record_imported",
        Some(record_id),
        None,
        "record committed on import",
    )
    .await?;
    info!(%record_id, "record imported");

    Ok(Json(ImportRecordResponse { record_id, record_commitment_hex }))
}

async fn list_records(
    State(state): State<AppState>,
) -> Result<Json<RecordListResponse>, ApiError> {
    let mut records = Vec::new();
    for (record_id, stored) in state.records.list() {
        let proofs_issued = db::count_proofs_for_record(&state.db, record_id).await?;
        records.push(RecordSummary {
            record_id,
            version: stored.record.version,
            created_at: stored.created_at,
            record_commitment_hex: FrHex::from_fr(&stored.committed.record_commitment).hex,
            fields: stored
                .record
                .fields
                .iter()
                .map(|f| FieldMeta { name: f.name.clone(), field_type: f.value.type_name() })
                .collect(),
            proofs_issued,
        });
    }

    Ok(Json(RecordListResponse { records }))
}

async fn list_predicates(State(_state): State<AppState>) -> Json<CatalogResponse> {
    Json(CatalogResponse { version: catalog_version(), templates: catalog() })
}

async fn create_proof(
    State(state): State<AppState>,
    Json(req): Json<CreateProofRequest>,
) -> Result<Json<CreateProofResponse>, ApiError> {
    let spec = PredicateDto::from_json(&req.predicate)?.into_spec()?;
    let policy = DisclosurePolicy { reveal: req.disclose };
    let ttl_seconds = req.ttl_seconds.unwrap_or(jobs::DEFAULT_TTL_SECS);

    let issued = jobs::issue_proof(
        &state,
        req.record_id,
        spec,
        policy,
        ttl_seconds,
        CancelToken::new(),
    )
    .await?;

    Ok(Json(CreateProofResponse {
        verification_code: issued.code,
        expires_at: issued.expires_at,
    }))
}

async fn verify_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<VerificationOutcome>, ApiError> {
    let keys = state.ensure_keys().await?;
    let outcome = verifier::verify(&state.db, state.clock.as_ref(), &keys, &code).await?;

    // Dead or unknown codes resolve as HTTP 200 with valid:false; status
    // codes must not leak more about code existence than `reason` does.
    Ok(Json(outcome))
}

async fn revoke_proof(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RevokeResponse>, ApiError> {
    let existed = registry::revoke(&state.db, &code)
        .await
        .map_err(|_| ApiError::Internal)?;

    if existed {
        db::append_activity(
            &state.db,
            state.clock.now(),
            "proof_revoked",
            None,
            Some(&code),
            "revoked by holder",
        )
        .await?;
        info!(code, "verification code revoked");
    }

    // Idempotent: already-revoked and never-issued codes both succeed.
    Ok(Json(RevokeResponse { code, revoked: true }))
}

async fn list_activity(
    State(state): State<AppState>,
    Query(params): Query<ActivityParams>,
) -> Result<Json<ActivityResponse>, ApiError> {
    let limit = params.limit.unwrap_or(50).min(500);
    let events = db::list_activity(&state.db, limit).await?;
    Ok(Json(ActivityResponse { events }))
}
