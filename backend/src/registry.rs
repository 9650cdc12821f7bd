//! Proof registry: issuance, redemption and revocation of verification
//! codes.
//!
//! Policy: a code may be redeemed any number of times until it expires or
//! is revoked; `redemption_count` is incremented per redemption for audit.
//! A patient showing one proof to several front-desk staff is the normal
//! case; callers needing single-use semantics issue with a short TTL or
//! revoke after first use.
//!
//! Atomicity is per code: redemption runs in a per-row transaction, so a
//! concurrent revoke either lands before the expiry/revocation checks or
//! after the count increment, never between them. Different codes share
//! no app-level lock.

use crate::clock::Clock;
use crate::db::Db;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sqlx::Row;
use thiserror::Error;
use tracing::warn;
use zk_proofs::generator::ProofBundle;

/// Verification codes carry 128 bits of CSPRNG entropy.
const CODE_BYTES: usize = 16;

/// Fresh-code retries before declaring the code space broken. A collision
/// on 128 random bits means the random source is compromised; retrying
/// forever would paper over that.
const MAX_CODE_ATTEMPTS: usize = 4;

/// Expired rows stay retrievable for audit this long past expiry.
const GRACE_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("verification code not found")]
    NotFound,

    #[error("verification code expired")]
    Expired,

    #[error("verification code revoked")]
    Revoked,

    #[error("verification code space exhausted")]
    CollisionExhausted,

    #[error("registry store error: {0}")]
    Store(String),
}

impl From<sqlx::Error> for RegistryError {
    fn from(e: sqlx::Error) -> Self {
        RegistryError::Store(e.to_string())
    }
}

pub struct IssuedCode {
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct Redemption {
    pub bundle: ProofBundle,
    pub issued_at: DateTime<Utc>,
    pub record_commitment_hex: String,
    pub predicate_template: String,
    pub redemption_count: i64,
}

fn new_code() -> String {
    let mut bytes = [0u8; CODE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Issue a verification code for a proof bundle.
///
/// A code colliding with an existing row is never overwritten: the insert
/// aborts and a fresh code is drawn, up to [`MAX_CODE_ATTEMPTS`].
pub async fn issue(
    db: &Db,
    clock: &dyn Clock,
    bundle: &ProofBundle,
    record_id: &str,
    ttl: Duration,
) -> Result<IssuedCode, RegistryError> {
    let bundle_json =
        serde_json::to_string(bundle).map_err(|e| RegistryError::Store(e.to_string()))?;
    let issued_at = clock.now();
    let expires_at = issued_at + ttl;

    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = new_code();
        let res = sqlx::query(
            r#"INSERT INTO verification_records
               (code, record_id, record_commitment_hex, predicate_template, bundle_json,
                issued_at, expires_at, revoked, redemption_count)
               VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0)"#,
        )
        .bind(&code)
        .bind(record_id)
        .bind(&bundle.record_commitment.hex)
        .bind(bundle.statement.predicate.template_id())
        .bind(&bundle_json)
        .bind(issued_at.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(db)
        .await;

        match res {
            Ok(_) => {
                if let Err(e) = sweep_expired(db, clock).await {
                    warn!(error = %e, "registry sweep failed");
                }
                return Ok(IssuedCode { code, issued_at, expires_at });
            }
            Err(sqlx::Error::Database(db_err))
                if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                warn!("verification code collision, drawing a fresh code");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(RegistryError::CollisionExhausted)
}

/// Redeem a code: fetch its bundle and count the redemption.
///
/// Expiry end is inclusive: the code is live while `now <= expires_at` and
/// dead strictly after. Revocation wins over expiry when both apply.
pub async fn redeem(db: &Db, clock: &dyn Clock, code: &str) -> Result<Redemption, RegistryError> {
    let mut tx = db.begin().await?;

    let row = sqlx::query(
        r#"SELECT bundle_json, issued_at, expires_at, revoked, record_commitment_hex,
                  predicate_template, redemption_count
           FROM verification_records WHERE code = ?"#,
    )
    .bind(code)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else { return Err(RegistryError::NotFound) };

    let issued_at = parse_timestamp(row.get(1))?;
    let expires_at = parse_timestamp(row.get(2))?;
    let revoked: i64 = row.get(3);

    if revoked != 0 {
        return Err(RegistryError::Revoked);
    }
    if clock.now() > expires_at {
        return Err(RegistryError::Expired);
    }

    sqlx::query(
        r#"UPDATE verification_records
           SET redemption_count = redemption_count + 1 WHERE code = ?"#,
    )
    .bind(code)
    .execute(&mut *tx)
    .await?;

    let bundle_json: String = row.get(0);
    let bundle: ProofBundle = serde_json::from_str(&bundle_json)
        .map_err(|e| RegistryError::Store(e.to_string()))?;
    let redemption_count: i64 = row.get(6);

    tx.commit().await?;

    Ok(Redemption {
        bundle,
        issued_at,
        record_commitment_hex: row.get(4),
        predicate_template: row.get(5),
        redemption_count: redemption_count + 1,
    })
}

/// Revoke a code. Idempotent; returns whether the code exists. The row and
/// its bundle stay retrievable for audit.
pub async fn revoke(db: &Db, code: &str) -> Result<bool, RegistryError> {
    let res = sqlx::query(r#"UPDATE verification_records SET revoked = 1 WHERE code = ?"#)
        .bind(code)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Drop rows whose expiry passed more than the grace period ago.
///
/// Timestamps are stored as RFC 3339 text, so the comparison happens here
/// rather than in SQL. Row counts are small; a full scan is fine.
pub async fn sweep_expired(db: &Db, clock: &dyn Clock) -> Result<u64, RegistryError> {
    let horizon = clock.now() - Duration::days(GRACE_DAYS);

    let rows = sqlx::query(r#"SELECT code, expires_at FROM verification_records"#)
        .fetch_all(db)
        .await?;

    let mut removed = 0u64;
    for row in rows {
        let code: String = row.get(0);
        let expires_at = parse_timestamp(row.get(1))?;
        if expires_at < horizon {
            sqlx::query(r#"DELETE FROM verification_records WHERE code = ?"#)
                .bind(&code)
                .execute(db)
                .await?;
            removed += 1;
        }
    }

    Ok(removed)
}

fn parse_timestamp(raw: String) -> Result<DateTime<Utc>, RegistryError> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RegistryError::Store(format!("bad timestamp in registry: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::test_db;
    use zk_proofs::generator::{NamedCommitment, ProofBundle, PublicStatement};
    use zk_proofs::predicate::{PredicateInstance, PredicateSpec};
    use zk_proofs::types::FrHex;

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-06T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Registry tests only exercise lifecycle, not cryptography, so a
    /// structurally valid bundle with a bogus proof body is enough.
    fn dummy_bundle() -> ProofBundle {
        ProofBundle {
            record_commitment: FrHex { hex: "aa".into() },
            field_commitments: vec![NamedCommitment {
                name: "birth_date".into(),
                commitment: FrHex { hex: "bb".into() },
            }],
            statement: PublicStatement {
                catalog_version: 1,
                predicate: PredicateSpec::AgeGte { field: "birth_date".into(), years: 2 },
                instance: PredicateInstance::Range { min: 0, max: 100 },
                field_index: 0,
                disclosed: vec![],
            },
            proof_b64: "cHJvb2Y".into(),
        }
    }

    #[tokio::test]
    async fn issue_then_redeem_round_trips() {
        let db = test_db().await;
        let clock = ManualClock::new(base_time());

        let issued = issue(&db, &clock, &dummy_bundle(), "rec-1", Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(issued.expires_at, issued.issued_at + Duration::seconds(60));
        // 128 bits of entropy, base64url: 22 chars.
        assert_eq!(issued.code.len(), 22);

        let r = redeem(&db, &clock, &issued.code).await.unwrap();
        assert_eq!(r.predicate_template, "age_gte");
        assert_eq!(r.redemption_count, 1);

        // Unlimited-redemption policy: the count grows, the code stays live.
        let r = redeem(&db, &clock, &issued.code).await.unwrap();
        assert_eq!(r.redemption_count, 2);
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let db = test_db().await;
        let clock = ManualClock::new(base_time());
        assert!(matches!(
            redeem(&db, &clock, "missing").await,
            Err(RegistryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn expiry_end_is_inclusive() {
        let db = test_db().await;
        let clock = ManualClock::new(base_time());

        let issued = issue(&db, &clock, &dummy_bundle(), "rec-1", Duration::seconds(60))
            .await
            .unwrap();

        // Exactly at expires_at: still live.
        clock.advance_secs(60);
        assert!(redeem(&db, &clock, &issued.code).await.is_ok());

        // One second past: dead.
        clock.advance_secs(1);
        assert!(matches!(
            redeem(&db, &clock, &issued.code).await,
            Err(RegistryError::Expired)
        ));
    }

    #[tokio::test]
    async fn revoke_is_idempotent_and_wins_over_redeem() {
        let db = test_db().await;
        let clock = ManualClock::new(base_time());

        let issued = issue(&db, &clock, &dummy_bundle(), "rec-1", Duration::seconds(600))
            .await
            .unwrap();

        assert!(revoke(&db, &issued.code).await.unwrap());
        assert!(revoke(&db, &issued.code).await.unwrap());
        assert!(!revoke(&db, "missing").await.unwrap());

        assert!(matches!(
            redeem(&db, &clock, &issued.code).await,
            Err(RegistryError::Revoked)
        ));
    }

    #[tokio::test]
    async fn revoke_concurrent_with_redeem_leaves_code_revoked() {
        let db = test_db().await;
        let clock = ManualClock::new(base_time());

        let issued = issue(&db, &clock, &dummy_bundle(), "rec-1", Duration::seconds(600))
            .await
            .unwrap();

        // Either interleaving is fine; afterwards the code must read as
        // revoked.
        let (revoked, _redeemed) = tokio::join!(
            revoke(&db, &issued.code),
            redeem(&db, &clock, &issued.code)
        );
        assert!(revoked.unwrap());

        assert!(matches!(
            redeem(&db, &clock, &issued.code).await,
            Err(RegistryError::Revoked)
        ));
    }

    #[tokio::test]
    async fn sweep_removes_rows_past_grace() {
        let db = test_db().await;
        let clock = ManualClock::new(base_time());

        let issued = issue(&db, &clock, &dummy_bundle(), "rec-1", Duration::seconds(1))
            .await
            .unwrap();

        // Expired but inside grace: kept for audit.
        clock.advance_secs(3600);
        assert_eq!(sweep_expired(&db, &clock).await.unwrap(), 0);
        assert!(matches!(
            redeem(&db, &clock, &issued.code).await,
            Err(RegistryError::Expired)
        ));

        // Past grace: gone.
        clock.advance_secs((GRACE_DAYS + 1) * 24 * 3600);
        assert_eq!(sweep_expired(&db, &clock).await.unwrap(), 1);
        assert!(matches!(
            redeem(&db, &clock, &issued.code).await,
            Err(RegistryError::NotFound)
        ));
    }
}
