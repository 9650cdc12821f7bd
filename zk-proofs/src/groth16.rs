//! Groth16 prover/verifier orchestration for the predicate circuits.
//!
//! SECURITY NOTE (prototype): Groth16 requires a trusted setup that produces
//! a proving key (PK) and verifying key (VK) per circuit shape. This
//! prototype generates keys locally. In production, an MPC ceremony (or a
//! transparent system) should be used.

use crate::circuit::{MembershipPredicateCircuit, RangePredicateCircuit};
use crate::commit::field_commitment;
use crate::constants::MAX_SET_SIZE;
use crate::error::ZkError;
use ark_bn254::{Bn254, Fr};
use ark_groth16::{prepare_verifying_key, Groth16, Proof, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::RngCore;
use std::sync::Arc;

/// Key material for both circuit shapes.
///
/// Generated once (per deployment) and shared; proving keys are large, so
/// they travel behind `Arc`.
#[derive(Clone)]
pub struct PredicateKeys {
    pub range_pk: Arc<ProvingKey<Bn254>>,
    pub range_vk: Arc<VerifyingKey<Bn254>>,
    pub membership_pk: Arc<ProvingKey<Bn254>>,
    pub membership_vk: Arc<VerifyingKey<Bn254>>,
}

/// Generate a Groth16 keypair for the range circuit.
pub fn setup_range_keys(
    rng: &mut impl RngCore,
) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>), ZkError> {
    // Satisfiable dummy witness; the constraint shape is input-independent.
    let blinding = Fr::from(0u64);
    let circuit = RangePredicateCircuit {
        value: 0,
        blinding,
        public_field_commitment: field_commitment(0, Fr::from(0u64), blinding),
        public_field_index: 0,
        public_min: 0,
        public_max: 0,
    };

    let pk = Groth16::<Bn254>::generate_random_parameters_with_reduction(circuit, rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;
    let vk = pk.vk.clone();
    Ok((pk, vk))
}

/// Generate a Groth16 keypair for the membership circuit (set size
/// [`MAX_SET_SIZE`]).
pub fn setup_membership_keys(
    rng: &mut impl RngCore,
) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>), ZkError> {
    let blinding = Fr::from(0u64);
    let circuit = MembershipPredicateCircuit::<MAX_SET_SIZE> {
        value: Fr::from(0u64),
        blinding,
        public_field_commitment: field_commitment(0, Fr::from(0u64), blinding),
        public_field_index: 0,
        public_set: [Fr::from(0u64); MAX_SET_SIZE],
    };

    let pk = Groth16::<Bn254>::generate_random_parameters_with_reduction(circuit, rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;
    let vk = pk.vk.clone();
    Ok((pk, vk))
}

/// Public-input vector of a range proof.
///
/// ORDERING MUST MATCH the circuit's `new_input` allocation order.
pub fn range_public_inputs(commitment: Fr, field_index: u64, min: u64, max: u64) -> Vec<Fr> {
    vec![commitment, Fr::from(field_index), Fr::from(min), Fr::from(max)]
}

/// Public-input vector of a membership proof.
///
/// ORDERING MUST MATCH the circuit's `new_input` allocation order.
pub fn membership_public_inputs(
    commitment: Fr,
    field_index: u64,
    set: &[Fr; MAX_SET_SIZE],
) -> Vec<Fr> {
    let mut v = Vec::with_capacity(2 + MAX_SET_SIZE);
    v.push(commitment);
    v.push(Fr::from(field_index));
    v.extend_from_slice(set);
    v
}

/// Prove `min <= value <= max` for a committed value.
///
/// Proving is randomized: repeated calls yield distinct proofs that all
/// verify against the same public inputs.
pub fn prove_range(
    rng: &mut impl RngCore,
    pk: &ProvingKey<Bn254>,
    value: u64,
    blinding: Fr,
    field_index: u64,
    min: u64,
    max: u64,
) -> Result<Proof<Bn254>, ZkError> {
    let circuit = RangePredicateCircuit {
        value,
        blinding,
        public_field_commitment: field_commitment(field_index, Fr::from(value), blinding),
        public_field_index: field_index,
        public_min: min,
        public_max: max,
    };

    Groth16::<Bn254>::create_random_proof_with_reduction(circuit, pk, rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))
}

/// Prove membership of a committed element in a public set.
pub fn prove_membership(
    rng: &mut impl RngCore,
    pk: &ProvingKey<Bn254>,
    value: Fr,
    blinding: Fr,
    field_index: u64,
    set: &[Fr; MAX_SET_SIZE],
) -> Result<Proof<Bn254>, ZkError> {
    let circuit = MembershipPredicateCircuit::<MAX_SET_SIZE> {
        value,
        blinding,
        public_field_commitment: field_commitment(field_index, value, blinding),
        public_field_index: field_index,
        public_set: *set,
    };

    Groth16::<Bn254>::create_random_proof_with_reduction(circuit, pk, rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))
}

/// Verify a range proof. Deterministic.
pub fn verify_range_proof(
    vk: &VerifyingKey<Bn254>,
    proof: &Proof<Bn254>,
    commitment: Fr,
    field_index: u64,
    min: u64,
    max: u64,
) -> Result<(), ZkError> {
    let pvk = prepare_verifying_key(vk);
    let inputs = range_public_inputs(commitment, field_index, min, max);
    let ok = Groth16::<Bn254>::verify_proof(&pvk, proof, &inputs)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;
    if !ok {
        return Err(ZkError::VerificationFailed);
    }
    Ok(())
}

/// Verify a membership proof. Deterministic.
pub fn verify_membership_proof(
    vk: &VerifyingKey<Bn254>,
    proof: &Proof<Bn254>,
    commitment: Fr,
    field_index: u64,
    set: &[Fr; MAX_SET_SIZE],
) -> Result<(), ZkError> {
    let pvk = prepare_verifying_key(vk);
    let inputs = membership_public_inputs(commitment, field_index, set);
    let ok = Groth16::<Bn254>::verify_proof(&pvk, proof, &inputs)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;
    if !ok {
        return Err(ZkError::VerificationFailed);
    }
    Ok(())
}

/// Serialize a proving key to bytes.
pub fn serialize_pk(pk: &ProvingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    pk.serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_pk(bytes: &[u8]) -> Result<ProvingKey<Bn254>, ZkError> {
    ProvingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}

pub fn serialize_vk(vk: &VerifyingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    vk.serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_vk(bytes: &[u8]) -> Result<VerifyingKey<Bn254>, ZkError> {
    VerifyingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}

pub fn serialize_proof(proof: &Proof<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    proof
        .serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_proof(bytes: &[u8]) -> Result<Proof<Bn254>, ZkError> {
    Proof::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}
