use std::fmt;
use std::ops::{Add, Mul};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Validation failures raised while constructing value types from raw input.
///
/// Every variant carries the attribute name, the offending value, and what was
/// expected, so a caller can render an actionable message without reparsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    #[error("attribute '{name}' value '{actual}' does not match pattern '{pattern}'")]
    MismatchToPattern {
        name: &'static str,
        actual: String,
        pattern: &'static str,
    },
    #[error("attribute '{name}' value '{actual}' is not a valid {expected}")]
    FormatMismatch {
        name: &'static str,
        actual: String,
        expected: &'static str,
    },
    #[error("attribute '{name}' value '{actual}' must not be negative")]
    NegativeValue { name: &'static str, actual: String },
    #[error("attribute '{name}' value '{actual}' exceeds {max_scale} fractional digits")]
    ScaleExceeded {
        name: &'static str,
        actual: String,
        max_scale: u32,
    },
}

impl DataError {
    pub fn code(&self) -> &'static str {
        match self {
            DataError::MismatchToPattern { .. } => "data.pattern",
            DataError::FormatMismatch { .. } => "data.format",
            DataError::NegativeValue { .. } => "scoring.negative",
            DataError::ScaleExceeded { .. } => "scoring.scale",
        }
    }
}

const CPID_PATTERN: &str = r"^ocds-[a-z0-9]{6}-[A-Z]{2}-[0-9]{13}$";
const OCID_PATTERN: &str = r"^ocds-[a-z0-9]{6}-[A-Z]{2}-[0-9]{13}-[A-Z]{2}-[0-9]{13}$";

fn cpid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CPID_PATTERN).expect("static pattern compiles"))
}

fn ocid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(OCID_PATTERN).expect("static pattern compiles"))
}

/// Contracting-process identifier, e.g. `ocds-t1s2t3-MD-1580458690892`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Cpid(String);

impl Cpid {
    pub fn parse(raw: &str) -> Result<Self, DataError> {
        let trimmed = raw.trim();
        if cpid_regex().is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(DataError::MismatchToPattern {
                name: "cpid",
                actual: raw.to_string(),
                pattern: CPID_PATTERN,
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cpid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Cpid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Cpid::parse(&raw).map_err(D::Error::custom)
    }
}

/// Contract (stage) identifier, the cpid extended with a stage segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Ocid(String);

impl Ocid {
    pub fn parse(raw: &str) -> Result<Self, DataError> {
        let trimmed = raw.trim();
        if ocid_regex().is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(DataError::MismatchToPattern {
                name: "ocid",
                actual: raw.to_string(),
                pattern: OCID_PATTERN,
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ocid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Ocid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ocid::parse(&raw).map_err(D::Error::custom)
    }
}

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $attribute:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, DataError> {
                Uuid::parse_str(raw.trim())
                    .map(Self)
                    .map_err(|_| DataError::FormatMismatch {
                        name: $attribute,
                        actual: raw.to_string(),
                        expected: "UUID",
                    })
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_identifier!(QualificationId, "qualification.id");
uuid_identifier!(SubmissionId, "submission.id");
uuid_identifier!(RequirementResponseId, "requirementResponse.id");
uuid_identifier!(ConversionId, "conversion.id");

/// Non-negative candidate score, held at three fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Scoring(Decimal);

impl Scoring {
    pub const SCALE: u32 = 3;

    /// Validating constructor: rejects negative input and input carrying more
    /// than [`Scoring::SCALE`] fractional digits, each as a distinct failure.
    pub fn try_create(value: Decimal) -> Result<Self, DataError> {
        if value < Decimal::ZERO {
            return Err(DataError::NegativeValue {
                name: "scoring",
                actual: value.to_string(),
            });
        }
        if value.scale() > Self::SCALE {
            return Err(DataError::ScaleExceeded {
                name: "scoring",
                actual: value.to_string(),
                max_scale: Self::SCALE,
            });
        }

        let mut normalized = value;
        normalized.rescale(Self::SCALE);
        Ok(Self(normalized))
    }

    pub fn parse(raw: &str) -> Result<Self, DataError> {
        let value = raw
            .trim()
            .parse::<Decimal>()
            .map_err(|_| DataError::FormatMismatch {
                name: "scoring",
                actual: raw.to_string(),
                expected: "decimal number",
            })?;
        Self::try_create(value)
    }

    /// Scale-and-round constructor for values produced by coefficient
    /// multiplication. Rounds half-up to [`Scoring::SCALE`] digits; the
    /// non-negativity invariant holds here too, so a product driven negative
    /// by externally supplied rates is rejected, not stored.
    pub(crate) fn from_product(value: Decimal) -> Result<Self, DataError> {
        if value < Decimal::ZERO {
            return Err(DataError::NegativeValue {
                name: "scoring",
                actual: value.to_string(),
            });
        }
        let mut rounded =
            value.round_dp_with_strategy(Self::SCALE, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(Self::SCALE);
        Ok(Self(rounded))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl Add for Scoring {
    type Output = Scoring;

    fn add(self, rhs: Scoring) -> Scoring {
        Scoring(self.0 + rhs.0)
    }
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Scoring {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Decimal has an inherent `deserialize(bytes)`; name the trait method.
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Scoring::try_create(value).map_err(D::Error::custom)
    }
}

/// Multiplier applied when a requirement response matches a conversion
/// coefficient. Rates compose by multiplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoefficientRate(Decimal);

impl CoefficientRate {
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl Mul for CoefficientRate {
    type Output = CoefficientRate;

    fn mul(self, rhs: CoefficientRate) -> CoefficientRate {
        CoefficientRate(self.0 * rhs.0)
    }
}

impl fmt::Display for CoefficientRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tagged value a conversion coefficient is keyed on. Matching against a
/// response value is exact by variant and value; there is no cross-type
/// coercion (an integer 5 never matches a number 5.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dataType", content = "value", rename_all = "camelCase")]
pub enum CoefficientValue {
    Boolean(bool),
    String(String),
    Integer(i64),
    Number(Decimal),
}

/// Tagged value carried by a candidate's requirement response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dataType", content = "value", rename_all = "camelCase")]
pub enum RequirementResponseValue {
    Boolean(bool),
    String(String),
    Integer(i64),
    Number(Decimal),
}

/// Workflow status of a qualification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QualificationStatus {
    Pending,
    Active,
    Unsuccessful,
}

impl QualificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            QualificationStatus::Pending => "pending",
            QualificationStatus::Active => "active",
            QualificationStatus::Unsuccessful => "unsuccessful",
        }
    }
}

/// Finer-grained workflow position. `None` on a qualification means the
/// record is either freshly created or fully decided by a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QualificationStatusDetails {
    Awaiting,
    Consideration,
    Active,
    Unsuccessful,
    BasedOnHumanDecision,
}

impl QualificationStatusDetails {
    pub const fn label(self) -> &'static str {
        match self {
            QualificationStatusDetails::Awaiting => "awaiting",
            QualificationStatusDetails::Consideration => "consideration",
            QualificationStatusDetails::Active => "active",
            QualificationStatusDetails::Unsuccessful => "unsuccessful",
            QualificationStatusDetails::BasedOnHumanDecision => "basedOnHumanDecision",
        }
    }
}

/// Reduction criteria configured on the case: whether candidates are trimmed
/// by score before qualification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReductionCriteria {
    Scoring,
    None,
}

/// How qualification decisions are produced for the case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QualificationSystemMethod {
    Automated,
    Manual,
}

/// ISO country code the rule data is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Country(String);

impl Country {
    pub fn parse(raw: &str) -> Result<Self, DataError> {
        non_blank(raw, "country").map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Country {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Country::parse(&raw).map_err(D::Error::custom)
    }
}

/// Procurement method details (pmd) the rule data is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProcurementMethod(String);

impl ProcurementMethod {
    pub fn parse(raw: &str) -> Result<Self, DataError> {
        non_blank(raw, "pmd").map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcurementMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ProcurementMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ProcurementMethod::parse(&raw).map_err(D::Error::custom)
    }
}

/// Operation kind used to select valid-state rule rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OperationType(String);

impl OperationType {
    pub fn parse(raw: &str) -> Result<Self, DataError> {
        non_blank(raw, "operationType").map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for OperationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        OperationType::parse(&raw).map_err(D::Error::custom)
    }
}

fn non_blank(raw: &str, name: &'static str) -> Result<String, DataError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(DataError::FormatMismatch {
            name,
            actual: raw.to_string(),
            expected: "non-empty string",
        })
    } else {
        Ok(trimmed.to_string())
    }
}

/// A date window. Start is strictly before end for any valid period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Stored qualification period for a case. Start date is immutable once
/// saved; the end date may only be extended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodEntity {
    pub cpid: Cpid,
    pub ocid: Ocid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl PeriodEntity {
    pub fn window(&self) -> Period {
        Period {
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

/// Reference from a requirement response back to the requirement it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementReference {
    pub id: String,
}

/// A candidate's answer to a single requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementResponse {
    pub id: RequirementResponseId,
    pub value: RequirementResponseValue,
    pub requirement: RequirementReference,
}

/// Candidate submission the qualification is derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub requirement_responses: Vec<RequirementResponse>,
}

/// One coefficient of a conversion: the value it is keyed on and the rate
/// contributed when a response matches that value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub value: CoefficientValue,
    pub rate: CoefficientRate,
}

/// Conversion mapping one requirement (`related_item`) to its coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversion {
    pub id: ConversionId,
    pub related_item: String,
    pub coefficients: Vec<Coefficient>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementGroup {
    pub id: String,
    pub requirements: Vec<Requirement>,
}

/// Evaluation criterion grouping the requirements that may contribute
/// coefficients to a candidate's score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub id: String,
    pub requirement_groups: Vec<RequirementGroup>,
}

/// Qualification record owned by the repository. Created on submission
/// intake, mutated by the lifecycle operations, never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Qualification {
    pub id: QualificationId,
    pub date: DateTime<Utc>,
    pub status: QualificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_details: Option<QualificationStatusDetails>,
    pub token: Uuid,
    pub owner: String,
    pub related_submission: SubmissionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<Scoring>,
    #[serde(default)]
    pub requirement_responses: Vec<RequirementResponse>,
}
