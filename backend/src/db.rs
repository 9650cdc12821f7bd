use crate::errors::ApiError;
use crate::models::ActivityItem;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use uuid::Uuid;

pub type Db = Pool<Sqlite>;

pub async fn connect(db_url: &str) -> Result<Db, ApiError> {
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .map_err(|_| ApiError::Internal)
}

pub async fn init_schema(db: &Db) -> Result<(), ApiError> {
    // NOTE: Registry rows are only ever mutated by the registry module
    // (revoked / redemption_count); the activity table is append-only.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS verification_records (
  code TEXT PRIMARY KEY,
  record_id TEXT NOT NULL,
  record_commitment_hex TEXT NOT NULL,
  predicate_template TEXT NOT NULL,
  bundle_json TEXT NOT NULL,
  issued_at TEXT NOT NULL,
  expires_at TEXT NOT NULL,
  revoked INTEGER NOT NULL DEFAULT 0,
  redemption_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS activity (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  created_at TEXT NOT NULL,
  kind TEXT NOT NULL,
  record_id TEXT,
  code TEXT,
  detail TEXT NOT NULL
);
"#,
    )
    .execute(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    Ok(())
}

pub async fn append_activity(
    db: &Db,
    created_at: DateTime<Utc>,
    kind: &str,
    record_id: Option<Uuid>,
    code: Option<&str>,
    detail: &str,
) -> Result<(), ApiError> {
    sqlx::query(
        r#"INSERT INTO activity (created_at, kind, record_id, code, detail)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(created_at.to_rfc3339())
    .bind(kind)
    .bind(record_id.map(|id| id.to_string()))
    .bind(code)
    .bind(detail)
    .execute(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    Ok(())
}

pub async fn list_activity(db: &Db, limit: u64) -> Result<Vec<ActivityItem>, ApiError> {
    let rows = sqlx::query(
        r#"SELECT id, created_at, kind, record_id, code, detail
           FROM activity
           ORDER BY id DESC
           LIMIT ?"#,
    )
    .bind(limit as i64)
    .fetch_all(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let created_at: String = row.get(1);
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|_| ApiError::Internal)?
            .with_timezone(&Utc);

        out.push(ActivityItem {
            id: row.get(0),
            created_at,
            kind: row.get(2),
            record_id: row.get(3),
            code: row.get(4),
            detail: row.get(5),
        });
    }

    Ok(out)
}

pub async fn count_proofs_for_record(db: &Db, record_id: Uuid) -> Result<u64, ApiError> {
    let row =
        sqlx::query(r#"SELECT COUNT(*) AS c FROM verification_records WHERE record_id = ?"#)
            .bind(record_id.to_string())
            .fetch_one(db)
            .await
            .map_err(|_| ApiError::Internal)?;
    let c: i64 = row.get("c");
    Ok(c as u64)
}

/// In-memory database for tests. A single connection keeps every handle on
/// the same `:memory:` instance.
#[cfg(test)]
pub(crate) async fn test_db() -> Db {
    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&db).await.unwrap();
    db
}
