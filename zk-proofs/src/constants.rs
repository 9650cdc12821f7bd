//! Crate-wide constants shared by the native commitment layer and the
//! in-circuit gadgets. Both sides MUST agree on every value here.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::{find_poseidon_ark_and_mds, PoseidonConfig};
use ark_ff::PrimeField;

/// Version of the predicate catalog. Adding a template is additive;
/// removing or changing one bumps this.
pub const CATALOG_VERSION: u32 = 1;

/// Fixed set size of the membership circuit. Smaller allowed-sets are padded
/// by repeating their first element; larger ones are rejected before proving.
pub const MAX_SET_SIZE: usize = 16;

/// Maximum byte length of a category string accepted by the encoder.
pub const MAX_CATEGORY_BYTES: usize = 256;

// Domain separation tags, absorbed as the first sponge element so that
// field commitments, record commitments and category encodings can never
// collide with each other.
pub const DOMAIN_FIELD: u64 = 0x464C445F434D5431; // "FLD_CMT1"
pub const DOMAIN_RECORD: u64 = 0x5245435F434D5431; // "REC_CMT1"
pub const DOMAIN_CATEGORY: u64 = 0x4341545F454E4331; // "CAT_ENC1"

// Poseidon sponge configuration.
//
// Width-3 sponge (rate=2, capacity=1); round counts consistent with widely
// used Poseidon instantiations for BN254.
//
// NOTE: This is a prototype. For production, parameters should be reviewed
// by cryptographers and ideally fixed via audited constants / standard sets.
pub const POSEIDON_RATE: usize = 2;
pub const POSEIDON_CAPACITY: usize = 1;
pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS: usize = 57;

/// Poseidon S-box exponent (alpha).
pub const POSEIDON_ALPHA: u64 = 5;

/// Deterministically derive Poseidon parameters for BN254::Fr.
///
/// Uses arkworks' parameter derivation helper (Ark + MDS) so the native
/// hasher and the in-circuit gadget agree on the same constants.
pub fn poseidon_config() -> PoseidonConfig<Fr> {
    let prime_bits = Fr::MODULUS_BIT_SIZE as u64;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        POSEIDON_RATE,
        POSEIDON_FULL_ROUNDS as u64,
        POSEIDON_PARTIAL_ROUNDS as u64,
        0,
    );

    PoseidonConfig::new(
        POSEIDON_FULL_ROUNDS,
        POSEIDON_PARTIAL_ROUNDS,
        POSEIDON_ALPHA,
        mds,
        ark,
        POSEIDON_RATE,
        POSEIDON_CAPACITY,
    )
}
