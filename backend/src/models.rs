use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zk_proofs::error::ZkError;
use zk_proofs::generator::DisclosedClaim;
use zk_proofs::predicate::{catalog, days_from_epoch, PredicateSpec, TemplateDescriptor};
use zk_proofs::types::{FieldValue, RecordField};

/// One incoming record field. Dates travel as ISO `YYYY-MM-DD`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldValueDto {
    Number { value: u64 },
    Date { value: NaiveDate },
    Flag { value: bool },
    Category { value: String },
}

#[derive(Debug, Deserialize)]
pub struct FieldDto {
    pub name: String,
    #[serde(flatten)]
    pub value: FieldValueDto,
}

impl FieldDto {
    pub fn into_field(self) -> Result<RecordField, ZkError> {
        let value = match self.value {
            FieldValueDto::Number { value } => FieldValue::Number(value),
            FieldValueDto::Date { value } => FieldValue::Date(
                days_from_epoch(value).ok_or(ZkError::InvalidFieldType {
                    field: self.name.clone(),
                    expected: "date on or after 1970-01-01",
                })?,
            ),
            FieldValueDto::Flag { value } => FieldValue::Flag(value),
            FieldValueDto::Category { value } => FieldValue::Category(value),
        };
        Ok(RecordField { name: self.name, value })
    }
}

/// Wire form of a predicate: same templates as the catalog, with calendar
/// dates instead of epoch-day numbers.
#[derive(Debug, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum PredicateDto {
    AgeGte { field: String, years: u32 },
    DateRange { field: String, min: NaiveDate, max: NaiveDate },
    NumberRange { field: String, min: u64, max: u64 },
    FlagIs { field: String, expected: bool },
    MemberOf { field: String, allowed: Vec<String> },
}

impl PredicateDto {
    /// Parse from JSON, distinguishing an unknown template id (catalog
    /// miss) from malformed parameters of a known template.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ZkError> {
        let template = value
            .get("template")
            .and_then(|t| t.as_str())
            .ok_or_else(|| ZkError::InvalidParams("missing 'template'".into()))?;

        if !catalog().iter().any(|t| t.id == template) {
            return Err(ZkError::UnknownPredicate(template.to_string()));
        }

        serde_json::from_value(value.clone()).map_err(|e| ZkError::InvalidParams(format!("{e}")))
    }

    pub fn into_spec(self) -> Result<PredicateSpec, ZkError> {
        let bad_date = |field: &str| ZkError::InvalidParams(format!(
            "'{field}': range bounds must be on or after 1970-01-01"
        ));
        Ok(match self {
            PredicateDto::AgeGte { field, years } => PredicateSpec::AgeGte { field, years },
            PredicateDto::DateRange { field, min, max } => {
                let min_days = days_from_epoch(min).ok_or_else(|| bad_date(&field))?;
                let max_days = days_from_epoch(max).ok_or_else(|| bad_date(&field))?;
                PredicateSpec::DateRange { field, min_days, max_days }
            }
            PredicateDto::NumberRange { field, min, max } => {
                PredicateSpec::NumberRange { field, min, max }
            }
            PredicateDto::FlagIs { field, expected } => PredicateSpec::FlagIs { field, expected },
            PredicateDto::MemberOf { field, allowed } => {
                PredicateSpec::MemberOf { field, allowed }
            }
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportRecordRequest {
    pub fields: Vec<FieldDto>,
}

#[derive(Debug, Serialize)]
pub struct ImportRecordResponse {
    pub record_id: Uuid,
    pub record_commitment_hex: String,
}

#[derive(Debug, Serialize)]
pub struct FieldMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: &'static str,
}

/// Metadata-only view of a stored record. Plaintext values never appear.
#[derive(Debug, Serialize)]
pub struct RecordSummary {
    pub record_id: Uuid,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub record_commitment_hex: String,
    pub fields: Vec<FieldMeta>,
    pub proofs_issued: u64,
}

#[derive(Debug, Serialize)]
pub struct RecordListResponse {
    pub records: Vec<RecordSummary>,
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub version: u32,
    pub templates: &'static [TemplateDescriptor],
}

#[derive(Debug, Deserialize)]
pub struct CreateProofRequest {
    pub record_id: Uuid,
    pub predicate: serde_json::Value,
    /// Field names revealed in the clear; defaults to revealing nothing.
    #[serde(default)]
    pub disclose: Vec<String>,
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CreateProofResponse {
    pub verification_code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyReason {
    Ok,
    NotFound,
    Expired,
    Revoked,
    ProofRejected,
}

/// Resolved result of one verification attempt. Always a value, never an
/// HTTP error: a dead or unknown code is `valid: false` plus a reason.
#[derive(Debug, Serialize)]
pub struct VerificationOutcome {
    pub valid: bool,
    pub reason: VerifyReason,
    pub disclosed_claims: Vec<DisclosedClaim>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<PredicateSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
}

impl VerificationOutcome {
    pub fn invalid(reason: VerifyReason) -> Self {
        Self {
            valid: false,
            reason,
            disclosed_claims: Vec::new(),
            predicate_template: None,
            predicate: None,
            issued_at: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub code: String,
    pub revoked: bool,
}

#[derive(Debug, Serialize)]
pub struct ActivityItem {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub kind: String,
    pub record_id: Option<String>,
    pub code: Option<String>,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub events: Vec<ActivityItem>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityParams {
    pub limit: Option<u64>,
}
