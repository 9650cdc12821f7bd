//! R1CS circuits for predicate proofs over committed fields.
//!
//! Each circuit proves, for one public field commitment `C`:
//! 1) The prover knows `(value, blinding)` with
//!    `Poseidon(DOMAIN_FIELD, index, value, blinding) = C` (binding the
//!    proof to the committed field).
//! 2) The predicate holds for `value`.
//!
//! Privacy: `value` and `blinding` are witnesses (never public). Only the
//! commitment, the field index and the predicate parameters are public.
//!
//! Every catalog template lowers to one of the two shapes here: an
//! inclusive 64-bit range or membership in a fixed-size set.

use crate::constants::{poseidon_config, DOMAIN_FIELD};
use ark_bn254::Fr;
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_r1cs_std::eq::EqGadget;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

/// Convert little-endian boolean bits into an FpVar.
fn bits_le_to_fp(bits_le: &[Boolean<Fr>]) -> Result<FpVar<Fr>, SynthesisError> {
    let mut acc = FpVar::<Fr>::constant(Fr::from(0u64));
    let mut coeff = FpVar::<Fr>::constant(Fr::from(1u64));

    for b in bits_le {
        // b ? coeff : 0
        let term = b.select(&coeff, &FpVar::<Fr>::constant(Fr::from(0u64)))?;
        acc += term;
        coeff += coeff.clone();
    }

    Ok(acc)
}

/// Enforce that `v` fits in 64 bits.
fn enforce_fits_u64(v: &FpVar<Fr>) -> Result<(), SynthesisError> {
    let bits = v.to_bits_le()?;
    let lo = bits[..64].to_vec();
    let rebuilt = bits_le_to_fp(&lo)?;
    rebuilt.enforce_equal(v)
}

/// In-circuit mirror of `commit::field_commitment`.
fn field_commitment_gadget(
    cs: ConstraintSystemRef<Fr>,
    index: &FpVar<Fr>,
    value: &FpVar<Fr>,
    blinding: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    let cfg = poseidon_config();
    let mut sponge = PoseidonSpongeVar::<Fr>::new(cs, &cfg);
    sponge.absorb(&[
        FpVar::<Fr>::constant(Fr::from(DOMAIN_FIELD)),
        index.clone(),
        value.clone(),
        blinding.clone(),
    ].as_slice())?;
    Ok(sponge.squeeze_field_elements(1)?[0].clone())
}

/// Circuit proving `min <= value <= max` for a committed 64-bit value.
#[derive(Clone, Debug)]
pub struct RangePredicateCircuit {
    /// Private: the committed value, in its 64-bit encoding.
    pub value: u64,
    /// Private: the blinding factor of the field commitment.
    pub blinding: Fr,

    /// Public inputs.
    pub public_field_commitment: Fr,
    pub public_field_index: u64,
    pub public_min: u64,
    pub public_max: u64,
}

impl ConstraintSynthesizer<Fr> for RangePredicateCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // IMPORTANT: Public input ordering MUST match
        // `groth16::range_public_inputs`.
        let commitment = FpVar::<Fr>::new_input(cs.clone(), || Ok(self.public_field_commitment))?;
        let index = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(self.public_field_index)))?;
        let min = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(self.public_min)))?;
        let max = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(self.public_max)))?;

        let value = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(self.value)))?;
        let blinding = FpVar::<Fr>::new_witness(cs.clone(), || Ok(self.blinding))?;

        // The value is a genuine u64, and both `value - min` and
        // `max - value` fit 64 bits. With min/max themselves below 2^64
        // (the verifier recomputes them from u64 statement parameters),
        // any out-of-range value wraps past the field modulus and cannot
        // satisfy the decomposition.
        enforce_fits_u64(&value)?;
        enforce_fits_u64(&(value.clone() - &min))?;
        enforce_fits_u64(&(max.clone() - &value))?;

        let computed = field_commitment_gadget(cs, &index, &value, &blinding)?;
        computed.enforce_equal(&commitment)
    }
}

/// Circuit proving a committed element lies in a public set of size `K`.
///
/// `K` is fixed at key-generation time; callers pad smaller sets.
#[derive(Clone, Debug)]
pub struct MembershipPredicateCircuit<const K: usize> {
    /// Private: the committed value, already encoded as a field element.
    pub value: Fr,
    /// Private: the blinding factor of the field commitment.
    pub blinding: Fr,

    /// Public inputs.
    pub public_field_commitment: Fr,
    pub public_field_index: u64,
    pub public_set: [Fr; K],
}

impl<const K: usize> ConstraintSynthesizer<Fr> for MembershipPredicateCircuit<K> {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // IMPORTANT: Public input ordering MUST match
        // `groth16::membership_public_inputs`.
        let commitment = FpVar::<Fr>::new_input(cs.clone(), || Ok(self.public_field_commitment))?;
        let index = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(self.public_field_index)))?;

        let mut set = Vec::<FpVar<Fr>>::with_capacity(K);
        for e in self.public_set {
            set.push(FpVar::<Fr>::new_input(cs.clone(), || Ok(e))?);
        }

        let value = FpVar::<Fr>::new_witness(cs.clone(), || Ok(self.value))?;
        let blinding = FpVar::<Fr>::new_witness(cs.clone(), || Ok(self.blinding))?;

        // value ∈ set  <=>  Π (value - e_j) = 0
        let mut prod = FpVar::<Fr>::constant(Fr::from(1u64));
        for e in &set {
            prod *= value.clone() - e;
        }
        prod.enforce_equal(&FpVar::<Fr>::constant(Fr::from(0u64)))?;

        let computed = field_commitment_gadget(cs, &index, &value, &blinding)?;
        computed.enforce_equal(&commitment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::field_commitment;
    use crate::constants::MAX_SET_SIZE;
    use ark_relations::r1cs::ConstraintSystem;

    fn range_circuit(value: u64, min: u64, max: u64) -> RangePredicateCircuit {
        let blinding = Fr::from(1234u64);
        RangePredicateCircuit {
            value,
            blinding,
            public_field_commitment: field_commitment(3, Fr::from(value), blinding),
            public_field_index: 3,
            public_min: min,
            public_max: max,
        }
    }

    fn is_satisfied(circuit: impl ConstraintSynthesizer<Fr>) -> bool {
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        cs.is_satisfied().unwrap()
    }

    #[test]
    fn range_satisfied_inside_and_on_bounds() {
        assert!(is_satisfied(range_circuit(50, 10, 100)));
        assert!(is_satisfied(range_circuit(10, 10, 100)));
        assert!(is_satisfied(range_circuit(100, 10, 100)));
    }

    #[test]
    fn range_unsatisfied_outside_bounds() {
        assert!(!is_satisfied(range_circuit(9, 10, 100)));
        assert!(!is_satisfied(range_circuit(101, 10, 100)));
    }

    #[test]
    fn range_unsatisfied_for_wrong_commitment() {
        let mut circuit = range_circuit(50, 10, 100);
        circuit.public_field_commitment = field_commitment(3, Fr::from(51u64), circuit.blinding);
        assert!(!is_satisfied(circuit));
    }

    #[test]
    fn range_unsatisfied_for_wrong_index() {
        let mut circuit = range_circuit(50, 10, 100);
        circuit.public_field_index = 4;
        assert!(!is_satisfied(circuit));
    }

    #[test]
    fn membership_satisfied_iff_value_in_set() {
        let blinding = Fr::from(9u64);
        let value = Fr::from(777u64);
        let mut set = [Fr::from(1u64); MAX_SET_SIZE];
        set[5] = value;

        let circuit = MembershipPredicateCircuit::<MAX_SET_SIZE> {
            value,
            blinding,
            public_field_commitment: field_commitment(0, value, blinding),
            public_field_index: 0,
            public_set: set,
        };
        assert!(is_satisfied(circuit.clone()));

        let mut missing = circuit;
        missing.public_set[5] = Fr::from(2u64);
        assert!(!is_satisfied(missing));
    }
}
