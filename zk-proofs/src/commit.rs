//! Commitment layer: binding + hiding Poseidon commitments, one per field,
//! aggregated into a record commitment.
//!
//! Per field `i` with encoded value `v_i` and fresh blinding `r_i`:
//!
//! ```text
//! C_i = Poseidon(DOMAIN_FIELD, i, v_i, r_i)
//! R   = Poseidon(DOMAIN_RECORD, C_0, ..., C_{n-1})
//! ```
//!
//! Blinding factors MUST come from a cryptographically secure source on
//! every call. The same blinding appearing for two distinct values is a
//! fatal `BlindingReuse`: it means the random source is broken, and the
//! layer fails closed instead of emitting a hiding-compromised commitment.

use crate::constants::{poseidon_config, DOMAIN_FIELD, DOMAIN_RECORD};
use crate::error::ZkError;
use crate::types::Record;
use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::PoseidonSponge;
use ark_crypto_primitives::sponge::CryptographicSponge;
use ark_serialize::CanonicalSerialize;
use ark_std::UniformRand;
use rand::{CryptoRng, RngCore};
use std::collections::HashMap;

/// Opening material for one field.
#[derive(Clone)]
pub struct OpeningEntry {
    pub name: String,
    pub encoded: Fr,
    pub blinding: Fr,
}

/// The secret side of a committed record.
///
/// Deliberately not serde-serializable: the opening never crosses a wire.
/// Persisting it (holder-side only) is the holder's responsibility.
#[derive(Clone)]
pub struct SecretOpening {
    entries: Vec<OpeningEntry>,
}

impl SecretOpening {
    pub fn entry(&self, index: usize) -> Option<&OpeningEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A record's public commitments plus the holder-side opening.
#[derive(Clone)]
pub struct CommittedRecord {
    pub record_commitment: Fr,
    pub field_commitments: Vec<Fr>,
    pub opening: SecretOpening,
}

/// Commit to one encoded field value under a blinding factor.
pub fn field_commitment(index: u64, encoded: Fr, blinding: Fr) -> Fr {
    let cfg = poseidon_config();
    let mut sponge = PoseidonSponge::<Fr>::new(&cfg);
    sponge.absorb(&[Fr::from(DOMAIN_FIELD), Fr::from(index), encoded, blinding].as_slice());
    sponge.squeeze_field_elements(1)[0]
}

/// Aggregate ordered field commitments into the record commitment.
pub fn record_commitment(field_commitments: &[Fr]) -> Fr {
    let cfg = poseidon_config();
    let mut sponge = PoseidonSponge::<Fr>::new(&cfg);
    sponge.absorb(&[Fr::from(DOMAIN_RECORD)].as_slice());
    for c in field_commitments {
        sponge.absorb(c);
    }
    sponge.squeeze_field_elements(1)[0]
}

/// Commit a record, drawing one fresh blinding factor per field.
pub fn commit(
    record: &Record,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<CommittedRecord, ZkError> {
    let blindings: Vec<Fr> = (0..record.fields.len()).map(|_| Fr::rand(rng)).collect();
    commit_with_blindings(record, &blindings)
}

/// Commit a record under caller-supplied blinding factors.
///
/// Exposed for deterministic tests; production callers use [`commit`].
pub fn commit_with_blindings(
    record: &Record,
    blindings: &[Fr],
) -> Result<CommittedRecord, ZkError> {
    if blindings.len() != record.fields.len() {
        return Err(ZkError::InvalidParams(format!(
            "expected {} blinding factors, got {}",
            record.fields.len(),
            blindings.len()
        )));
    }

    let mut seen: HashMap<Vec<u8>, Fr> = HashMap::new();
    let mut entries = Vec::with_capacity(record.fields.len());
    let mut field_commitments = Vec::with_capacity(record.fields.len());

    for (i, (field, blinding)) in record.fields.iter().zip(blindings).enumerate() {
        let encoded = field.value.encode()?;

        let mut key = Vec::new();
        blinding
            .serialize_compressed(&mut key)
            .map_err(|e| ZkError::Serialization(format!("{e}")))?;
        match seen.get(&key) {
            Some(prev) if *prev != encoded => return Err(ZkError::BlindingReuse),
            _ => {
                seen.insert(key, encoded);
            }
        }

        field_commitments.push(field_commitment(i as u64, encoded, *blinding));
        entries.push(OpeningEntry {
            name: field.name.clone(),
            encoded,
            blinding: *blinding,
        });
    }

    let record_commitment = record_commitment(&field_commitments);

    Ok(CommittedRecord {
        record_commitment,
        field_commitments,
        opening: SecretOpening { entries },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldValue, RecordField};
    use ark_serialize::CanonicalSerialize;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn sample_record() -> Record {
        Record::new(vec![
            RecordField { name: "birth_date".into(), value: FieldValue::Date(19_000) },
            RecordField { name: "vaccinated".into(), value: FieldValue::Flag(true) },
            RecordField {
                name: "blood_type".into(),
                value: FieldValue::Category("O+".into()),
            },
        ])
        .unwrap()
    }

    #[test]
    fn binding_distinct_values_distinct_commitments() {
        // Fixed blinding, two values: the commitments must differ, otherwise
        // one commitment would open to two values.
        let r = Fr::from(42u64);
        let a = field_commitment(0, Fr::from(100u64), r);
        let b = field_commitment(0, Fr::from(101u64), r);
        assert_ne!(a, b);
    }

    #[test]
    fn hiding_shape_commitments_are_uniform_length_and_blinding_sensitive() {
        let v = Fr::from(7u64);
        let c1 = field_commitment(0, v, Fr::from(1u64));
        let c2 = field_commitment(0, v, Fr::from(2u64));
        assert_ne!(c1, c2, "same value, different blinding must be unlinkable");

        // Shape check over a spread of values and blindings: equal byte
        // length everywhere, no repeats.
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let mut seen = std::collections::HashSet::new();
        let mut len = None;
        for i in 0..64u64 {
            let c = field_commitment(0, Fr::from(i % 2), Fr::rand(&mut rng));
            let mut bytes = Vec::new();
            c.serialize_compressed(&mut bytes).unwrap();
            assert_eq!(*len.get_or_insert(bytes.len()), bytes.len());
            assert!(seen.insert(bytes), "commitment repeated across samples");
        }
    }

    #[test]
    fn commit_is_deterministic_under_fixed_blindings() {
        let record = sample_record();
        let blindings: Vec<Fr> = (1..=3).map(|i| Fr::from(i as u64)).collect();

        let a = commit_with_blindings(&record, &blindings).unwrap();
        let b = commit_with_blindings(&record, &blindings).unwrap();
        assert_eq!(a.record_commitment, b.record_commitment);
        assert_eq!(a.field_commitments, b.field_commitments);
    }

    #[test]
    fn fresh_blindings_give_unlinkable_commitments() {
        let record = sample_record();
        let mut rng = ChaCha20Rng::seed_from_u64(7);

        let a = commit(&record, &mut rng).unwrap();
        let b = commit(&record, &mut rng).unwrap();
        assert_ne!(a.record_commitment, b.record_commitment);
        for (ca, cb) in a.field_commitments.iter().zip(&b.field_commitments) {
            assert_ne!(ca, cb);
        }
    }

    #[test]
    fn blinding_reuse_across_distinct_values_is_fatal() {
        let record = Record::new(vec![
            RecordField { name: "a".into(), value: FieldValue::Number(1) },
            RecordField { name: "b".into(), value: FieldValue::Number(2) },
        ])
        .unwrap();

        let reused = Fr::from(99u64);
        let err = commit_with_blindings(&record, &[reused, reused]).unwrap_err();
        assert!(matches!(err, ZkError::BlindingReuse));
    }

    #[test]
    fn blinding_count_mismatch_rejected() {
        let record = sample_record();
        assert!(commit_with_blindings(&record, &[Fr::from(1u64)]).is_err());
    }
}
