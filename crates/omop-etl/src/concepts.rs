//! Well-known OMOP concept ids used by the mappers.

/// Gender.
pub const GENDER_FEMALE: i64 = 8532;
pub const GENDER_MALE: i64 = 8507;

/// Type concepts (provenance of a record).
pub const TYPE_EHR: i64 = 32817;
pub const TYPE_LAB: i64 = 32856;
pub const TYPE_EHR_BILLING: i64 = 32821;
pub const TYPE_EHR_ORDER: i64 = 32833;

/// Visit concepts.
pub const VISIT_INPATIENT: i64 = 9201;
pub const VISIT_EMERGENCY: i64 = 9203;

/// Fact-relationship link concepts (specimen/organism hierarchy).
pub const REL_SPECIMEN_OF: i64 = 44818854;
pub const REL_HAS_SPECIMEN: i64 = 44818756;

/// Measurement operator concepts.
pub const OPERATOR_LT: i64 = 4171756;
pub const OPERATOR_LE: i64 = 4171754;
pub const OPERATOR_GT: i64 = 4172704;
pub const OPERATOR_GE: i64 = 4171755;
pub const OPERATOR_EQ: i64 = 4172703;

pub fn operator_concept_id(operator: &str) -> Option<i64> {
    match operator {
        "<" => Some(OPERATOR_LT),
        "<=" => Some(OPERATOR_LE),
        ">" => Some(OPERATOR_GT),
        ">=" => Some(OPERATOR_GE),
        "=" => Some(OPERATOR_EQ),
        _ => None,
    }
}
