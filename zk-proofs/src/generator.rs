//! Proof generation and self-contained bundle verification.
//!
//! `generate` turns (record, opening, predicate, disclosure policy) into a
//! [`ProofBundle`]: the public statement, the commitments it is about, and
//! the Groth16 proof. The central privacy invariant lives here: no field
//! value reaches the statement unless the disclosure policy names it, and
//! no partial artifact survives any error or cancellation path.
//!
//! `verify_bundle` is the cryptographic half of the verifier: it re-binds
//! proof, statement and commitments to each other, so a proof spliced into
//! a different statement (or a statement claiming more than the proven
//! instance) fails.

use crate::commit::{record_commitment, CommittedRecord};
use crate::constants::{CATALOG_VERSION, MAX_SET_SIZE};
use crate::error::ZkError;
use crate::groth16::{
    deserialize_proof, prove_membership, prove_range, serialize_proof, verify_membership_proof,
    verify_range_proof, PredicateKeys,
};
use crate::predicate::{age_cutoff_days, PredicateInstance, PredicateSpec};
use crate::types::{encode_category, FieldValue, FrHex, Record};
use ark_bn254::Fr;
use base64::Engine;
use chrono::NaiveDate;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation handle for an in-flight `generate`.
///
/// Checked at phase boundaries (lowering, proving, packaging). A cancelled
/// run returns `ZkError::Cancelled` and drops every intermediate value.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn checkpoint(&self) -> Result<(), ZkError> {
        if self.is_cancelled() {
            return Err(ZkError::Cancelled);
        }
        Ok(())
    }
}

/// Explicit allow-list of fields the holder reveals in the clear.
///
/// Empty policy (the default) reveals nothing beyond the claim itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DisclosurePolicy {
    pub reveal: Vec<String>,
}

/// One field revealed verbatim inside the public statement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisclosedClaim {
    pub field: String,
    pub value: FieldValue,
}

/// A field commitment labelled with its (non-secret) field name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamedCommitment {
    pub name: String,
    pub commitment: FrHex,
}

/// The public statement a proof is about.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicStatement {
    pub catalog_version: u32,
    pub predicate: PredicateSpec,
    /// Resolved circuit parameters; for `age_gte` these depend on the
    /// proving-time clock and are therefore carried, not re-derived.
    pub instance: PredicateInstance,
    pub field_index: u64,
    pub disclosed: Vec<DisclosedClaim>,
}

/// Opaque proof artifact: everything a verifier needs, nothing more.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProofBundle {
    pub record_commitment: FrHex,
    pub field_commitments: Vec<NamedCommitment>,
    pub statement: PublicStatement,
    pub proof_b64: String,
}

/// Generate a proof that `spec` holds over `record`'s committed fields.
///
/// Fails with `PredicateNotSatisfied` before any proving work if the
/// plaintext evaluation is false; the system never issues a proof of a
/// false statement. The proof is self-checked before it leaves this
/// function (fail closed).
#[allow(clippy::too_many_arguments)]
pub fn generate(
    record: &Record,
    committed: &CommittedRecord,
    spec: &PredicateSpec,
    policy: &DisclosurePolicy,
    today: NaiveDate,
    keys: &PredicateKeys,
    rng: &mut (impl RngCore + CryptoRng),
    cancel: &CancelToken,
) -> Result<ProofBundle, ZkError> {
    cancel.checkpoint()?;

    // Disclosure allow-list resolves first: naming an absent field is a
    // policy violation, not a silent narrowing.
    let mut disclosed = Vec::with_capacity(policy.reveal.len());
    for name in &policy.reveal {
        let (_, value) = record
            .field(name)
            .ok_or_else(|| ZkError::DisclosureNotPermitted(name.clone()))?;
        disclosed.push(DisclosedClaim { field: name.clone(), value: value.clone() });
    }

    // Soundness fast-fail gate.
    if !spec.evaluate(record, today)? {
        return Err(ZkError::PredicateNotSatisfied);
    }

    let lowered = spec.lower(record, today)?;
    let (_, field_value) = record
        .field(spec.field())
        .ok_or_else(|| ZkError::UnknownField(spec.field().to_string()))?;
    let entry = committed
        .opening
        .entry(lowered.field_index as usize)
        .ok_or_else(|| ZkError::InvalidParams("opening does not cover the proved field".into()))?;

    cancel.checkpoint()?;

    let proof = match &lowered.instance {
        PredicateInstance::Range { min, max } => {
            let v = field_value.as_u64().ok_or_else(|| ZkError::InvalidFieldType {
                field: spec.field().to_string(),
                expected: "number, date or flag",
            })?;
            prove_range(rng, &keys.range_pk, v, entry.blinding, lowered.field_index, *min, *max)?
        }
        PredicateInstance::Membership { set } => {
            let set = decode_set(set)?;
            prove_membership(
                rng,
                &keys.membership_pk,
                entry.encoded,
                entry.blinding,
                lowered.field_index,
                &set,
            )?
        }
    };

    cancel.checkpoint()?;

    // Fail closed if the fresh proof does not verify.
    let field_commitment = committed.field_commitments[lowered.field_index as usize];
    match &lowered.instance {
        PredicateInstance::Range { min, max } => verify_range_proof(
            &keys.range_vk,
            &proof,
            field_commitment,
            lowered.field_index,
            *min,
            *max,
        )?,
        PredicateInstance::Membership { set } => {
            let set = decode_set(set)?;
            verify_membership_proof(
                &keys.membership_vk,
                &proof,
                field_commitment,
                lowered.field_index,
                &set,
            )?
        }
    }

    let proof_b64 =
        base64::engine::general_purpose::STANDARD.encode(serialize_proof(&proof)?);

    Ok(ProofBundle {
        record_commitment: FrHex::from_fr(&committed.record_commitment),
        field_commitments: record
            .fields
            .iter()
            .zip(&committed.field_commitments)
            .map(|(f, c)| NamedCommitment { name: f.name.clone(), commitment: FrHex::from_fr(c) })
            .collect(),
        statement: PublicStatement {
            catalog_version: CATALOG_VERSION,
            predicate: spec.clone(),
            instance: lowered.instance,
            field_index: lowered.field_index,
            disclosed,
        },
        proof_b64,
    })
}

/// Verify a bundle against its own embedded statement. Deterministic.
///
/// Checks, in order: the record commitment binds the listed field
/// commitments; the statement's field index names the predicate's field;
/// the resolved instance is consistent with (at least as strong as) the
/// claimed predicate at `today`; and the Groth16 proof verifies against
/// public inputs recomputed from the statement. Any mismatch is
/// `VerificationFailed`: a bundle cannot be redeemed under a statement it
/// was not built for.
pub fn verify_bundle(
    bundle: &ProofBundle,
    keys: &PredicateKeys,
    today: NaiveDate,
) -> Result<(), ZkError> {
    let field_commitments: Vec<Fr> = bundle
        .field_commitments
        .iter()
        .map(|c| c.commitment.to_fr())
        .collect::<Result<_, _>>()?;
    if record_commitment(&field_commitments) != bundle.record_commitment.to_fr()? {
        return Err(ZkError::VerificationFailed);
    }

    let index = bundle.statement.field_index as usize;
    let named = bundle
        .field_commitments
        .get(index)
        .ok_or(ZkError::VerificationFailed)?;
    if named.name != bundle.statement.predicate.field() {
        return Err(ZkError::VerificationFailed);
    }

    check_instance(&bundle.statement, today)?;

    let proof_bytes = base64::engine::general_purpose::STANDARD
        .decode(&bundle.proof_b64)
        .map_err(|e| ZkError::Serialization(format!("invalid proof encoding: {e}")))?;
    let proof = deserialize_proof(&proof_bytes)?;

    let commitment = field_commitments[index];
    match &bundle.statement.instance {
        PredicateInstance::Range { min, max } => verify_range_proof(
            &keys.range_vk,
            &proof,
            commitment,
            bundle.statement.field_index,
            *min,
            *max,
        ),
        PredicateInstance::Membership { set } => {
            let set = decode_set(set)?;
            verify_membership_proof(
                &keys.membership_vk,
                &proof,
                commitment,
                bundle.statement.field_index,
                &set,
            )
        }
    }
}

/// The statement's resolved instance must claim no more than the predicate
/// it is labelled with. Time-independent templates must match exactly;
/// `age_gte` must be at least as strong as the claim evaluated at `today`
/// (verification never runs before proving, so the proving-time cutoff is a
/// lower bound).
fn check_instance(statement: &PublicStatement, today: NaiveDate) -> Result<(), ZkError> {
    let ok = match (&statement.predicate, &statement.instance) {
        (PredicateSpec::AgeGte { years, .. }, PredicateInstance::Range { min, max }) => {
            *min == 0 && *max <= age_cutoff_days(*years, today)?
        }
        (
            PredicateSpec::DateRange { min_days, max_days, .. },
            PredicateInstance::Range { min, max },
        ) => min == min_days && max == max_days,
        (PredicateSpec::NumberRange { min: lo, max: hi, .. }, PredicateInstance::Range { min, max }) => {
            min == lo && max == hi
        }
        (PredicateSpec::FlagIs { expected, .. }, PredicateInstance::Range { min, max }) => {
            min == max && *min == u64::from(*expected)
        }
        (PredicateSpec::MemberOf { allowed, .. }, PredicateInstance::Membership { set }) => {
            let encoded: Vec<Fr> = allowed
                .iter()
                .map(|s| encode_category(s))
                .collect::<Result<_, _>>()?;
            // Padding may repeat entries but must never widen the set.
            set.len() == MAX_SET_SIZE
                && set
                    .iter()
                    .map(|e| e.to_fr())
                    .collect::<Result<Vec<_>, _>>()?
                    .iter()
                    .all(|e| encoded.contains(e))
        }
        _ => false,
    };

    if ok {
        Ok(())
    } else {
        Err(ZkError::VerificationFailed)
    }
}

fn decode_set(set: &[FrHex]) -> Result<[Fr; MAX_SET_SIZE], ZkError> {
    if set.len() != MAX_SET_SIZE {
        return Err(ZkError::Serialization(format!(
            "membership set must have {MAX_SET_SIZE} elements, got {}",
            set.len()
        )));
    }
    let elems: Vec<Fr> = set.iter().map(|h| h.to_fr()).collect::<Result<_, _>>()?;
    Ok(elems.try_into().expect("length checked"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::commit;
    use crate::groth16::tests::test_keys;
    use crate::predicate::days_from_epoch;
    use crate::types::RecordField;
    use rand::rngs::OsRng;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 6).unwrap()
    }

    fn child_record(birth: NaiveDate) -> Record {
        Record::new(vec![
            RecordField {
                name: "birth_date".into(),
                value: FieldValue::Date(days_from_epoch(birth).unwrap()),
            },
            RecordField { name: "vaccinated".into(), value: FieldValue::Flag(true) },
            RecordField {
                name: "blood_type".into(),
                value: FieldValue::Category("O+".into()),
            },
        ])
        .unwrap()
    }

    fn age_spec(years: u32) -> PredicateSpec {
        PredicateSpec::AgeGte { field: "birth_date".into(), years }
    }

    #[test]
    fn generate_then_verify_succeeds_with_empty_disclosure() {
        let record = child_record(NaiveDate::from_ymd_opt(2023, 5, 1).unwrap());
        let mut rng = OsRng;
        let committed = commit(&record, &mut rng).unwrap();

        let bundle = generate(
            &record,
            &committed,
            &age_spec(2),
            &DisclosurePolicy::default(),
            today(),
            test_keys(),
            &mut rng,
            &CancelToken::new(),
        )
        .unwrap();

        assert!(bundle.statement.disclosed.is_empty());
        verify_bundle(&bundle, test_keys(), today()).unwrap();

        // Still verifies later in time (age only grows).
        verify_bundle(&bundle, test_keys(), today() + chrono::Days::new(400)).unwrap();
    }

    #[test]
    fn unsatisfied_predicate_never_produces_an_artifact() {
        let record = child_record(NaiveDate::from_ymd_opt(2025, 5, 1).unwrap());
        let mut rng = OsRng;
        let committed = commit(&record, &mut rng).unwrap();

        let err = generate(
            &record,
            &committed,
            &age_spec(2),
            &DisclosurePolicy::default(),
            today(),
            test_keys(),
            &mut rng,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ZkError::PredicateNotSatisfied));
    }

    #[test]
    fn disclosure_lists_exactly_the_policy_fields() {
        let record = child_record(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let mut rng = OsRng;
        let committed = commit(&record, &mut rng).unwrap();

        let policy = DisclosurePolicy { reveal: vec!["vaccinated".into()] };
        let bundle = generate(
            &record,
            &committed,
            &age_spec(2),
            &policy,
            today(),
            test_keys(),
            &mut rng,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(bundle.statement.disclosed.len(), 1);
        assert_eq!(bundle.statement.disclosed[0].field, "vaccinated");
        assert_eq!(bundle.statement.disclosed[0].value, FieldValue::Flag(true));
    }

    #[test]
    fn disclosing_an_absent_field_is_a_policy_violation() {
        let record = child_record(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let mut rng = OsRng;
        let committed = commit(&record, &mut rng).unwrap();

        let policy = DisclosurePolicy { reveal: vec!["ssn".into()] };
        let err = generate(
            &record,
            &committed,
            &age_spec(2),
            &policy,
            today(),
            test_keys(),
            &mut rng,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ZkError::DisclosureNotPermitted(f) if f == "ssn"));
    }

    #[test]
    fn substituted_commitments_fail_verification() {
        let record_a = child_record(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let record_b = child_record(NaiveDate::from_ymd_opt(2021, 6, 1).unwrap());
        let mut rng = OsRng;
        let committed_a = commit(&record_a, &mut rng).unwrap();
        let committed_b = commit(&record_b, &mut rng).unwrap();

        let bundle_a = generate(
            &record_a,
            &committed_a,
            &age_spec(2),
            &DisclosurePolicy::default(),
            today(),
            test_keys(),
            &mut rng,
            &CancelToken::new(),
        )
        .unwrap();

        // Splice record B's commitments under record A's proof.
        let mut spliced = bundle_a.clone();
        spliced.record_commitment = FrHex::from_fr(&committed_b.record_commitment);
        spliced.field_commitments = record_b
            .fields
            .iter()
            .zip(&committed_b.field_commitments)
            .map(|(f, c)| NamedCommitment {
                name: f.name.clone(),
                commitment: FrHex::from_fr(c),
            })
            .collect();

        assert!(matches!(
            verify_bundle(&spliced, test_keys(), today()),
            Err(ZkError::VerificationFailed)
        ));
    }

    #[test]
    fn statement_cannot_claim_more_than_the_instance_proves() {
        let record = child_record(NaiveDate::from_ymd_opt(2023, 5, 1).unwrap());
        let mut rng = OsRng;
        let committed = commit(&record, &mut rng).unwrap();

        let bundle = generate(
            &record,
            &committed,
            &age_spec(2),
            &DisclosurePolicy::default(),
            today(),
            test_keys(),
            &mut rng,
            &CancelToken::new(),
        )
        .unwrap();

        // Relabel the 2-year proof as an 18-year claim: the instance is now
        // weaker than the claimed predicate and must be rejected.
        let mut inflated = bundle;
        inflated.statement.predicate = age_spec(18);
        assert!(matches!(
            verify_bundle(&inflated, test_keys(), today()),
            Err(ZkError::VerificationFailed)
        ));
    }

    #[test]
    fn membership_bundle_round_trips() {
        let record = child_record(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let mut rng = OsRng;
        let committed = commit(&record, &mut rng).unwrap();

        let spec = PredicateSpec::MemberOf {
            field: "blood_type".into(),
            allowed: vec!["O+".into(), "O-".into()],
        };
        let bundle = generate(
            &record,
            &committed,
            &spec,
            &DisclosurePolicy::default(),
            today(),
            test_keys(),
            &mut rng,
            &CancelToken::new(),
        )
        .unwrap();
        verify_bundle(&bundle, test_keys(), today()).unwrap();
    }

    #[test]
    fn cancelled_token_aborts_before_any_work() {
        let record = child_record(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let mut rng = OsRng;
        let committed = commit(&record, &mut rng).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = generate(
            &record,
            &committed,
            &age_spec(2),
            &DisclosurePolicy::default(),
            today(),
            test_keys(),
            &mut rng,
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, ZkError::Cancelled));
    }
}
