//! Error taxonomy of the proving core.
//!
//! Validation errors (`InvalidFieldType`, `UnknownPredicate`,
//! `InvalidParams`) are the caller's fault and recoverable by correcting
//! input. Policy violations (`PredicateNotSatisfied`,
//! `DisclosureNotPermitted`) must surface to the holder and are never
//! retried. Security violations (`BlindingReuse`) abort the operation
//! outright rather than degrade to a weaker guarantee.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZkError {
    #[error("field '{field}' is not a {expected} value")]
    InvalidFieldType { field: String, expected: &'static str },

    #[error("record has no field named '{0}'")]
    UnknownField(String),

    #[error("unknown predicate template '{0}'")]
    UnknownPredicate(String),

    #[error("invalid predicate parameters: {0}")]
    InvalidParams(String),

    #[error("predicate does not hold for this record")]
    PredicateNotSatisfied,

    #[error("disclosure of field '{0}' is not permitted")]
    DisclosureNotPermitted(String),

    #[error("blinding factor reused across distinct values")]
    BlindingReuse,

    #[error("proof generation cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("proof verification failed")]
    VerificationFailed,

    #[error("arkworks error: {0}")]
    Ark(String),
}
