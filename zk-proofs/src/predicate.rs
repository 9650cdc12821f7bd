//! Predicate catalog: the fixed, versioned set of typed predicate templates
//! that can be proved about committed fields.
//!
//! Templates are immutable once published; adding one is additive, removing
//! or changing one bumps [`crate::constants::CATALOG_VERSION`]. Every
//! template lowers to one of two circuit shapes (range, membership), so new
//! templates extend the catalog without new trusted setups as long as they
//! lower to an existing shape.

use crate::constants::{CATALOG_VERSION, MAX_SET_SIZE};
use crate::error::ZkError;
use crate::types::{encode_category, FieldValue, FrHex, Record};
use ark_bn254::Fr;
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Upper bound on `age_gte` thresholds; keeps month arithmetic in range.
const MAX_AGE_YEARS: u32 = 200;

/// A predicate template instance: template id plus parameters and the field
/// it reads. Pure value type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum PredicateSpec {
    /// Age derived from a birth-date field is at least `years` today.
    AgeGte { field: String, years: u32 },
    /// Date field lies in `[min_days, max_days]` (days since epoch, inclusive).
    DateRange { field: String, min_days: u64, max_days: u64 },
    /// Number field lies in `[min, max]` (inclusive).
    NumberRange { field: String, min: u64, max: u64 },
    /// Boolean field equals `expected`.
    FlagIs { field: String, expected: bool },
    /// Category field is one of `allowed` (at most [`MAX_SET_SIZE`] entries).
    MemberOf { field: String, allowed: Vec<String> },
}

/// Resolved public parameters of a predicate, in circuit terms.
///
/// `age_gte` resolves against the clock at proving time, so the instance is
/// part of the public statement rather than re-derived by verifiers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum PredicateInstance {
    Range { min: u64, max: u64 },
    /// Encoded allowed-set, padded to exactly [`MAX_SET_SIZE`] elements by
    /// repeating the first entry. Padding never widens the set.
    Membership { set: Vec<FrHex> },
}

/// A predicate lowered against a concrete record.
#[derive(Clone, Debug)]
pub struct LoweredPredicate {
    pub field_index: u64,
    pub instance: PredicateInstance,
}

impl PredicateSpec {
    pub fn template_id(&self) -> &'static str {
        match self {
            PredicateSpec::AgeGte { .. } => "age_gte",
            PredicateSpec::DateRange { .. } => "date_range",
            PredicateSpec::NumberRange { .. } => "number_range",
            PredicateSpec::FlagIs { .. } => "flag_is",
            PredicateSpec::MemberOf { .. } => "member_of",
        }
    }

    pub fn field(&self) -> &str {
        match self {
            PredicateSpec::AgeGte { field, .. }
            | PredicateSpec::DateRange { field, .. }
            | PredicateSpec::NumberRange { field, .. }
            | PredicateSpec::FlagIs { field, .. }
            | PredicateSpec::MemberOf { field, .. } => field,
        }
    }

    /// Parse a spec from JSON, distinguishing an unknown template id from
    /// malformed parameters of a known one.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ZkError> {
        let template = value
            .get("template")
            .and_then(|t| t.as_str())
            .ok_or_else(|| ZkError::InvalidParams("missing 'template'".into()))?;

        if !catalog().iter().any(|t| t.id == template) {
            return Err(ZkError::UnknownPredicate(template.to_string()));
        }

        serde_json::from_value(value.clone())
            .map_err(|e| ZkError::InvalidParams(format!("{e}")))
    }

    /// Parameter sanity independent of any record.
    pub fn validate_params(&self) -> Result<(), ZkError> {
        match self {
            PredicateSpec::AgeGte { years, .. } if *years > MAX_AGE_YEARS => Err(
                ZkError::InvalidParams(format!("years must be <= {MAX_AGE_YEARS}")),
            ),
            PredicateSpec::DateRange { min_days, max_days, .. } if min_days > max_days => {
                Err(ZkError::InvalidParams("min_days > max_days".into()))
            }
            PredicateSpec::NumberRange { min, max, .. } if min > max => {
                Err(ZkError::InvalidParams("min > max".into()))
            }
            PredicateSpec::MemberOf { allowed, .. }
                if allowed.is_empty() || allowed.len() > MAX_SET_SIZE =>
            {
                Err(ZkError::InvalidParams(format!(
                    "allowed set must have 1..={MAX_SET_SIZE} entries"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Resolve this spec against a record into circuit-shaped public
    /// parameters. `today` anchors age arithmetic (calendar-aware).
    pub fn lower(&self, record: &Record, today: NaiveDate) -> Result<LoweredPredicate, ZkError> {
        self.validate_params()?;

        let (field_index, value) = record
            .field(self.field())
            .ok_or_else(|| ZkError::UnknownField(self.field().to_string()))?;

        let instance = match self {
            PredicateSpec::AgeGte { field, years } => {
                expect_type(field, value, "date")?;
                // age >= years  <=>  birth_date <= today - years
                PredicateInstance::Range { min: 0, max: age_cutoff_days(*years, today)? }
            }
            PredicateSpec::DateRange { field, min_days, max_days } => {
                expect_type(field, value, "date")?;
                PredicateInstance::Range { min: *min_days, max: *max_days }
            }
            PredicateSpec::NumberRange { field, min, max } => {
                expect_type(field, value, "number")?;
                PredicateInstance::Range { min: *min, max: *max }
            }
            PredicateSpec::FlagIs { field, expected } => {
                expect_type(field, value, "flag")?;
                let b = u64::from(*expected);
                PredicateInstance::Range { min: b, max: b }
            }
            PredicateSpec::MemberOf { field, allowed } => {
                expect_type(field, value, "category")?;
                let mut set: Vec<Fr> = allowed
                    .iter()
                    .map(|s| encode_category(s))
                    .collect::<Result<_, _>>()?;
                let first = set[0];
                set.resize(MAX_SET_SIZE, first);
                PredicateInstance::Membership {
                    set: set.iter().map(FrHex::from_fr).collect(),
                }
            }
        };

        Ok(LoweredPredicate { field_index: field_index as u64, instance })
    }

    /// Plaintext reference semantics: "what the circuit computes".
    ///
    /// Used only by the proof generator's fast-fail path and tests, never
    /// against commitments.
    pub fn evaluate(&self, record: &Record, today: NaiveDate) -> Result<bool, ZkError> {
        let lowered = self.lower(record, today)?;
        let (_, value) = record
            .field(self.field())
            .ok_or_else(|| ZkError::UnknownField(self.field().to_string()))?;

        match &lowered.instance {
            PredicateInstance::Range { min, max } => {
                let v = value.as_u64().ok_or_else(|| ZkError::InvalidFieldType {
                    field: self.field().to_string(),
                    expected: "number, date or flag",
                })?;
                Ok(*min <= v && v <= *max)
            }
            PredicateInstance::Membership { set } => {
                let encoded = value.encode()?;
                let set: Vec<Fr> = set.iter().map(|h| h.to_fr()).collect::<Result<_, _>>()?;
                Ok(set.contains(&encoded))
            }
        }
    }
}

fn expect_type(field: &str, value: &FieldValue, expected: &'static str) -> Result<(), ZkError> {
    if value.type_name() == expected {
        Ok(())
    } else {
        Err(ZkError::InvalidFieldType { field: field.to_string(), expected })
    }
}

/// Latest birth date, in epoch days, whose age is at least `years` at
/// `today`. Calendar-aware (leap days clamp the way chrono clamps).
pub fn age_cutoff_days(years: u32, today: NaiveDate) -> Result<u64, ZkError> {
    let months = years
        .checked_mul(12)
        .ok_or_else(|| ZkError::InvalidParams("age threshold out of range".into()))?;
    let cutoff = today
        .checked_sub_months(Months::new(months))
        .ok_or_else(|| ZkError::InvalidParams("age threshold out of range".into()))?;
    days_from_epoch(cutoff)
        .ok_or_else(|| ZkError::InvalidParams("age threshold predates representable dates".into()))
}

/// Days since the Unix epoch, if the date is on or after it.
pub fn days_from_epoch(date: NaiveDate) -> Option<u64> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch");
    u64::try_from(date.signed_duration_since(epoch).num_days()).ok()
}

/// Descriptor of one catalog template, for the holder-facing listing.
#[derive(Clone, Debug, Serialize)]
pub struct TemplateDescriptor {
    pub id: &'static str,
    pub field_type: &'static str,
    pub params: &'static str,
    pub description: &'static str,
}

/// The published catalog, version [`CATALOG_VERSION`].
pub fn catalog() -> &'static [TemplateDescriptor] {
    &[
        TemplateDescriptor {
            id: "age_gte",
            field_type: "date",
            params: "field, years",
            description: "age derived from a birth-date field is at least N years",
        },
        TemplateDescriptor {
            id: "date_range",
            field_type: "date",
            params: "field, min_days, max_days",
            description: "date field lies in an inclusive range",
        },
        TemplateDescriptor {
            id: "number_range",
            field_type: "number",
            params: "field, min, max",
            description: "number field lies in an inclusive range",
        },
        TemplateDescriptor {
            id: "flag_is",
            field_type: "flag",
            params: "field, expected",
            description: "boolean field equals the expected value",
        },
        TemplateDescriptor {
            id: "member_of",
            field_type: "category",
            params: "field, allowed",
            description: "category field is one of an allowed set",
        },
    ]
}

pub fn catalog_version() -> u32 {
    CATALOG_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordField;
    use serde_json::json;

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

    #[test]
    fn age_gte_holds_for_three_year_old() {
        let record = child_record(NaiveDate::from_ymd_opt(2023, 5, 1).unwrap());
        let spec = PredicateSpec::AgeGte { field: "birth_date".into(), years: 2 };
        assert!(spec.evaluate(&record, today()).unwrap());
    }

    #[test]
    fn age_gte_fails_for_one_year_old() {
        let record = child_record(NaiveDate::from_ymd_opt(2025, 5, 1).unwrap());
        let spec = PredicateSpec::AgeGte { field: "birth_date".into(), years: 2 };
        assert!(!spec.evaluate(&record, today()).unwrap());
    }

    #[test]
    fn age_gte_is_inclusive_on_the_birthday() {
        // Turns 2 exactly today.
        let record = child_record(NaiveDate::from_ymd_opt(2024, 8, 6).unwrap());
        let spec = PredicateSpec::AgeGte { field: "birth_date".into(), years: 2 };
        assert!(spec.evaluate(&record, today()).unwrap());

        // One day short.
        let record = child_record(NaiveDate::from_ymd_opt(2024, 8, 7).unwrap());
        assert!(!spec.evaluate(&record, today()).unwrap());
    }

    #[test]
    fn flag_and_membership_evaluate() {
        let record = child_record(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());

        let spec = PredicateSpec::FlagIs { field: "vaccinated".into(), expected: true };
        assert!(spec.evaluate(&record, today()).unwrap());

        let spec = PredicateSpec::MemberOf {
            field: "blood_type".into(),
            allowed: vec!["O+".into(), "O-".into()],
        };
        assert!(spec.evaluate(&record, today()).unwrap());

        let spec = PredicateSpec::MemberOf {
            field: "blood_type".into(),
            allowed: vec!["AB+".into()],
        };
        assert!(!spec.evaluate(&record, today()).unwrap());
    }

    #[test]
    fn type_mismatch_is_invalid_field_type() {
        let record = child_record(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let spec = PredicateSpec::NumberRange { field: "vaccinated".into(), min: 0, max: 1 };
        assert!(matches!(
            spec.evaluate(&record, today()),
            Err(ZkError::InvalidFieldType { .. })
        ));
    }

    #[test]
    fn missing_field_is_unknown_field() {
        let record = child_record(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let spec = PredicateSpec::FlagIs { field: "nope".into(), expected: true };
        assert!(matches!(spec.evaluate(&record, today()), Err(ZkError::UnknownField(_))));
    }

    #[test]
    fn unknown_template_id_is_distinguished() {
        let err = PredicateSpec::from_json(&json!({"template": "iq_gte", "field": "x"}))
            .unwrap_err();
        assert!(matches!(err, ZkError::UnknownPredicate(_)));

        // Known template, malformed params.
        let err =
            PredicateSpec::from_json(&json!({"template": "age_gte", "field": "x"})).unwrap_err();
        assert!(matches!(err, ZkError::InvalidParams(_)));
    }

    #[test]
    fn oversized_set_rejected() {
        let spec = PredicateSpec::MemberOf {
            field: "blood_type".into(),
            allowed: (0..=MAX_SET_SIZE).map(|i| format!("c{i}")).collect(),
        };
        assert!(matches!(spec.validate_params(), Err(ZkError::InvalidParams(_))));
    }

    #[test]
    fn membership_padding_never_widens_the_set() {
        let record = child_record(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let spec = PredicateSpec::MemberOf {
            field: "blood_type".into(),
            allowed: vec!["A+".into()],
        };
        let lowered = spec.lower(&record, today()).unwrap();
        let PredicateInstance::Membership { set } = lowered.instance else {
            panic!("expected membership instance");
        };
        assert_eq!(set.len(), MAX_SET_SIZE);
        assert!(set.iter().all(|e| *e == set[0]));
    }
}
