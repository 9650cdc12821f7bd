//! Proof issuance jobs.
//!
//! Proof generation is the most compute-heavy operation in the system
//! (seconds of pairing-friendly arithmetic): it always runs on the
//! blocking pool with a per-job RNG and a cancel token, never inline on a
//! request-handling path. Concurrent jobs share no mutable state; each
//! owns its random source.

use crate::db;
use crate::errors::ApiError;
use crate::registry;
use crate::state::AppState;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use tracing::{error, info};
use uuid::Uuid;
use zk_proofs::generator::{generate, CancelToken, DisclosurePolicy};
use zk_proofs::predicate::PredicateSpec;

pub const DEFAULT_TTL_SECS: u64 = 900;
pub const MAX_TTL_SECS: u64 = 30 * 24 * 3600;

pub struct Issued {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Generate a proof for `record_id` and register it behind a fresh
/// verification code.
///
/// No code is ever issued for a failed generation: the registry write
/// happens only after the bundle has been produced and self-verified.
pub async fn issue_proof(
    state: &AppState,
    record_id: Uuid,
    spec: PredicateSpec,
    policy: DisclosurePolicy,
    ttl_seconds: u64,
    cancel: CancelToken,
) -> Result<Issued, ApiError> {
    if ttl_seconds == 0 || ttl_seconds > MAX_TTL_SECS {
        return Err(ApiError::bad_request(
            "invalid_params",
            format!("ttl_seconds must be in 1..={MAX_TTL_SECS}"),
        ));
    }

    let stored = state
        .records
        .get(&record_id)
        .ok_or_else(|| ApiError::NotFound("record not found".to_string()))?;

    let keys = state.ensure_keys().await?;
    let today = state.clock.now().date_naive();

    let record = stored.record.clone();
    let committed = stored.committed.clone();
    let spec_for_job = spec.clone();
    let started = std::time::Instant::now();

    // Per-job RNG: random sources are never shared across concurrent
    // generations.
    let bundle = tokio::task::spawn_blocking(move || {
        let mut rng = OsRng;
        generate(
            &record,
            &committed,
            &spec_for_job,
            &policy,
            today,
            &keys,
            &mut rng,
            &cancel,
        )
    })
    .await
    .map_err(|_| ApiError::Internal)??;

    info!(
        %record_id,
        template = spec.template_id(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "proof generated"
    );

    let issued = registry::issue(
        &state.db,
        state.clock.as_ref(),
        &bundle,
        &record_id.to_string(),
        Duration::seconds(ttl_seconds as i64),
    )
    .await
    .map_err(|e| {
        error!(error = %e, "registry issuance failed after proof generation");
        ApiError::Internal
    })?;

    db::append_activity(
        &state.db,
        state.clock.now(),
        "proof_issued",
        Some(record_id),
        Some(&issued.code),
        &format!("template {} ttl {}s", spec.template_id(), ttl_seconds),
    )
    .await?;

    Ok(Issued { code: issued.code, expires_at: issued.expires_at })
}
