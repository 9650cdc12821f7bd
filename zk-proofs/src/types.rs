//! Value types shared between the commitment layer, the predicate catalog
//! and the circuits.

use crate::constants::{poseidon_config, DOMAIN_CATEGORY, MAX_CATEGORY_BYTES};
use crate::error::ZkError;
use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::PoseidonSponge;
use ark_crypto_primitives::sponge::CryptographicSponge;
use ark_ff::PrimeField;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use serde::{Deserialize, Serialize};

/// One typed field value of a holder record.
///
/// Dates are days since the Unix epoch; the service layer owns calendar
/// parsing. Every variant maps injectively to a BN254 field element via
/// [`FieldValue::encode`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Number(u64),
    Date(u64),
    Flag(bool),
    Category(String),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Number(_) => "number",
            FieldValue::Date(_) => "date",
            FieldValue::Flag(_) => "flag",
            FieldValue::Category(_) => "category",
        }
    }

    /// The 64-bit representation the range circuit constrains, if the value
    /// has one. Categories do not; they only support membership.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Date(d) => Some(*d),
            FieldValue::Flag(b) => Some(u64::from(*b)),
            FieldValue::Category(_) => None,
        }
    }

    /// Encode the value as a field element.
    ///
    /// Numbers, dates and flags embed directly. Category strings absorb
    /// through a domain-separated, length-prefixed Poseidon sponge so that
    /// two distinct strings cannot encode to the same element by chunk
    /// boundary ambiguity.
    pub fn encode(&self) -> Result<Fr, ZkError> {
        match self {
            FieldValue::Number(n) | FieldValue::Date(n) => Ok(Fr::from(*n)),
            FieldValue::Flag(b) => Ok(Fr::from(u64::from(*b))),
            FieldValue::Category(s) => encode_category(s),
        }
    }
}

/// Hash a category string to a field element.
pub fn encode_category(s: &str) -> Result<Fr, ZkError> {
    let bytes = s.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_CATEGORY_BYTES {
        return Err(ZkError::InvalidParams(format!(
            "category must be 1..={MAX_CATEGORY_BYTES} bytes, got {}",
            bytes.len()
        )));
    }

    let cfg = poseidon_config();
    let mut sponge = PoseidonSponge::<Fr>::new(&cfg);
    sponge.absorb(&[Fr::from(DOMAIN_CATEGORY), Fr::from(bytes.len() as u64)].as_slice());

    // 31-byte chunks always fit below the BN254 modulus.
    for chunk in bytes.chunks(31) {
        sponge.absorb(&[Fr::from_le_bytes_mod_order(chunk)].as_slice());
    }

    Ok(sponge.squeeze_field_elements(1)[0])
}

/// One named field of a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub value: FieldValue,
}

/// A holder-owned record: an ordered mapping from field name to typed value.
///
/// Immutable once committed; edits create a new `Record` with a bumped
/// version. Plaintext values never leave holder custody.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Record {
    pub version: u32,
    pub fields: Vec<RecordField>,
}

impl Record {
    /// Build a version-1 record, rejecting duplicate field names.
    pub fn new(fields: Vec<RecordField>) -> Result<Self, ZkError> {
        for (i, f) in fields.iter().enumerate() {
            if fields[..i].iter().any(|g| g.name == f.name) {
                return Err(ZkError::InvalidParams(format!(
                    "duplicate field name '{}'",
                    f.name
                )));
            }
        }
        Ok(Self { version: 1, fields })
    }

    /// Look up a field by name, returning its position and value.
    pub fn field(&self, name: &str) -> Option<(usize, &FieldValue)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
            .map(|(i, f)| (i, &f.value))
    }
}

/// JSON-friendly representation of a field element.
///
/// Fr values travel as hex strings of their canonical compressed encoding
/// to avoid ambiguities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrHex {
    pub hex: String,
}

impl FrHex {
    pub fn from_fr(x: &Fr) -> Self {
        let mut bytes = Vec::new();
        x.serialize_compressed(&mut bytes)
            .expect("in-memory serialization");
        Self { hex: hex::encode(bytes) }
    }

    pub fn to_fr(&self) -> Result<Fr, ZkError> {
        let bytes = hex::decode(&self.hex)
            .map_err(|e| ZkError::Serialization(format!("invalid hex: {e}")))?;
        Fr::deserialize_compressed(&bytes[..])
            .map_err(|e| ZkError::Serialization(format!("invalid field bytes: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_type_stable() {
        assert_eq!(
            FieldValue::Number(7).encode().unwrap(),
            FieldValue::Date(7).encode().unwrap()
        );
        assert_eq!(FieldValue::Flag(true).encode().unwrap(), Fr::from(1u64));
        assert_eq!(FieldValue::Flag(false).encode().unwrap(), Fr::from(0u64));
    }

    #[test]
    fn category_encoding_distinguishes_strings() {
        let a = encode_category("penicillin").unwrap();
        let b = encode_category("peanuts").unwrap();
        assert_ne!(a, b);

        // Chunk-boundary neighbours must not collide.
        let long_a = encode_category(&"x".repeat(31)).unwrap();
        let long_b = encode_category(&"x".repeat(32)).unwrap();
        assert_ne!(long_a, long_b);
    }

    #[test]
    fn category_length_limits() {
        assert!(encode_category("").is_err());
        assert!(encode_category(&"y".repeat(MAX_CATEGORY_BYTES + 1)).is_err());
    }

    #[test]
    fn record_rejects_duplicate_names() {
        let fields = vec![
            RecordField { name: "age".into(), value: FieldValue::Number(3) },
            RecordField { name: "age".into(), value: FieldValue::Number(4) },
        ];
        assert!(Record::new(fields).is_err());
    }

    #[test]
    fn fr_hex_round_trips() {
        let x = Fr::from(123456789u64);
        assert_eq!(FrHex::from_fr(&x).to_fr().unwrap(), x);
    }
}
