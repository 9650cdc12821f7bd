//! Verifier: drives one verification attempt from code to outcome.
//!
//! Attempt state machine: Fetching -> Checking(registry) ->
//! Checking(crypto) -> Resolved. A registry-dead code (expired/revoked)
//! resolves without
//! paying for the pairing check; that skip is observable as a timing
//! difference between "expired" and "proof_rejected"; threat models where
//! that distinction is sensitive need response padding upstream.
//!
//! Every resolvable attempt is a value, never an HTTP error; only store
//! failures propagate as errors for the caller to retry.

use crate::clock::Clock;
use crate::db::{self, Db};
use crate::errors::ApiError;
use crate::models::{VerificationOutcome, VerifyReason};
use crate::registry::{self, RegistryError};
use tracing::{info, warn};
use zk_proofs::generator::verify_bundle;
use zk_proofs::groth16::PredicateKeys;

pub async fn verify(
    db: &Db,
    clock: &dyn Clock,
    keys: &PredicateKeys,
    code: &str,
) -> Result<VerificationOutcome, ApiError> {
    // Fetching + registry-state checks. Distinct registry error kinds map
    // to distinct resolved outcomes.
    let redemption = match registry::redeem(db, clock, code).await {
        Ok(r) => r,
        Err(RegistryError::NotFound) => {
            return resolve(db, clock, code, VerificationOutcome::invalid(VerifyReason::NotFound))
                .await;
        }
        Err(RegistryError::Expired) => {
            return resolve(db, clock, code, VerificationOutcome::invalid(VerifyReason::Expired))
                .await;
        }
        Err(RegistryError::Revoked) => {
            return resolve(db, clock, code, VerificationOutcome::invalid(VerifyReason::Revoked))
                .await;
        }
        Err(e) => {
            warn!(error = %e, "registry read failed during verification");
            return Err(ApiError::Internal);
        }
    };

    // Substitution defense: the bundle must still match the pairing
    // recorded at issuance for THIS code.
    let pairing_ok = redemption.bundle.record_commitment.hex == redemption.record_commitment_hex
        && redemption.bundle.statement.predicate.template_id() == redemption.predicate_template;

    // Cryptographic check: pairing math is CPU-bound, keep it off the
    // async path. The bundle re-binds proof, statement and commitments
    // internally.
    let crypto_ok = if pairing_ok {
        let bundle = redemption.bundle.clone();
        let keys = keys.clone();
        let today = clock.now().date_naive();
        tokio::task::spawn_blocking(move || verify_bundle(&bundle, &keys, today).is_ok())
            .await
            .map_err(|_| ApiError::Internal)?
    } else {
        false
    };

    let outcome = if crypto_ok {
        VerificationOutcome {
            valid: true,
            reason: VerifyReason::Ok,
            // Verbatim from the proof's disclosure set; the verifier never
            // re-derives claims from anything it could manipulate.
            disclosed_claims: redemption.bundle.statement.disclosed.clone(),
            predicate_template: Some(redemption.predicate_template.clone()),
            predicate: Some(redemption.bundle.statement.predicate.clone()),
            issued_at: Some(redemption.issued_at),
        }
    } else {
        VerificationOutcome {
            valid: false,
            reason: VerifyReason::ProofRejected,
            disclosed_claims: Vec::new(),
            predicate_template: Some(redemption.predicate_template.clone()),
            predicate: None,
            issued_at: Some(redemption.issued_at),
        }
    };

    resolve(db, clock, code, outcome).await
}

/// Resolve the attempt: log it to the activity feed and return it.
async fn resolve(
    db: &Db,
    clock: &dyn Clock,
    code: &str,
    outcome: VerificationOutcome,
) -> Result<VerificationOutcome, ApiError> {
    let kind = if outcome.valid { "proof_verified" } else { "proof_rejected" };
    let reason = serde_json::to_string(&outcome.reason)
        .unwrap_or_else(|_| "\"unknown\"".to_string());

    info!(code, valid = outcome.valid, reason = %reason, "verification attempt resolved");
    db::append_activity(db, clock.now(), kind, None, Some(code), &format!("reason {reason}"))
        .await?;

    Ok(outcome)
}
