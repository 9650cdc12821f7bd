use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use thiserror::Error;
use zk_proofs::error::ZkError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request ({kind}): {message}")]
    BadRequest { kind: &'static str, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn bad_request(kind: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest { kind, message: message.into() }
    }
}

/// HTTP mapping: validation and policy failures are the caller's to fix
/// (400); security invariant violations and store failures never degrade
/// to anything weaker than a 500.
impl From<ZkError> for ApiError {
    fn from(e: ZkError) -> Self {
        let message = e.to_string();
        match e {
            ZkError::InvalidFieldType { .. } => ApiError::bad_request("invalid_field_type", message),
            ZkError::UnknownField(_) | ZkError::InvalidParams(_) => {
                ApiError::bad_request("invalid_params", message)
            }
            ZkError::UnknownPredicate(_) => ApiError::bad_request("unknown_predicate", message),
            ZkError::PredicateNotSatisfied => {
                ApiError::bad_request("predicate_not_satisfied", message)
            }
            ZkError::DisclosureNotPermitted(_) => {
                ApiError::bad_request("disclosure_not_permitted", message)
            }
            ZkError::Cancelled => ApiError::Conflict(message),
            ZkError::BlindingReuse
            | ZkError::Serialization(_)
            | ZkError::VerificationFailed
            | ZkError::Ark(_) => ApiError::Internal,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, msg) = match &self {
            ApiError::BadRequest { kind, message } => {
                (StatusCode::BAD_REQUEST, Some(*kind), message.clone())
            }
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, None, m.clone()),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, None, m.clone()),
            ApiError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, None, "internal error".to_string())
            }
        };

        (status, Json(ErrorBody { error: msg, kind })).into_response()
    }
}
