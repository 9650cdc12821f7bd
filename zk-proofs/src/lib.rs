//! ZK core of the selective-disclosure health proof engine.
//!
//! This crate contains:
//! - Binding + hiding Poseidon commitments per record field, aggregated
//!   into a record commitment.
//! - The versioned predicate catalog and its plaintext reference semantics.
//! - SNARK circuits proving a predicate holds for a committed field without
//!   revealing it.
//! - Prover + verifier orchestration and proof-bundle packaging.
//! - Serialization helpers for transporting proofs and public inputs.

pub mod circuit;
pub mod commit;
pub mod constants;
pub mod error;
pub mod generator;
pub mod groth16;
pub mod predicate;
pub mod types;
