//! External reference-data lookups. Rule rows are maintained outside this
//! service and keyed by `(country, pmd[, operationType], parameter)`; this
//! module owns the lookup traits and the parsers for the raw JSON values the
//! store hands back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{
    Country, OperationType, ProcurementMethod, QualificationStatus, QualificationStatusDetails,
};

pub const VALID_STATES_PARAMETER: &str = "validStates";
pub const FINAL_STATES_PARAMETER: &str = "finalStates";
pub const ADVANCE_COUNT_PARAMETER: &str = "advanceCount";

/// Incident-class failures from the rules backend. Lookup misses are not
/// errors here; they surface as `Ok(None)` and the caller decides whether a
/// missing row is a validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    #[error("rules backend unavailable: {0}")]
    Backend(String),
    #[error("rule '{parameter}' for country '{country}', pmd '{pmd}' is not parseable: {detail}")]
    Malformed {
        parameter: String,
        country: String,
        pmd: String,
        detail: String,
    },
}

/// Lookup of the minimum allowed period term in seconds.
pub trait PeriodRules: Send + Sync {
    fn minimum_term_seconds(
        &self,
        country: &Country,
        pmd: &ProcurementMethod,
    ) -> Result<Option<i64>, RulesError>;
}

/// Key addressing one qualification rule row.
#[derive(Debug, Clone, Copy)]
pub struct RuleQuery<'a> {
    pub country: &'a Country,
    pub pmd: &'a ProcurementMethod,
    pub operation_type: Option<&'a OperationType>,
    pub parameter: &'a str,
}

/// Lookup of raw qualification rule values (JSON-encoded strings).
pub trait QualificationRules: Send + Sync {
    fn find(&self, query: &RuleQuery<'_>) -> Result<Option<String>, RulesError>;
}

/// One permitted state the rules allow an operation to leave a qualification
/// in (or act from).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRow {
    pub status: QualificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_details: Option<QualificationStatusDetails>,
}

/// Parsed `validStates` rule value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidStates(Vec<StateRow>);

impl ValidStates {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Vec<StateRow>>(raw).map(Self)
    }

    pub fn permits(
        &self,
        status: QualificationStatus,
        status_details: Option<QualificationStatusDetails>,
    ) -> bool {
        self.0
            .iter()
            .any(|row| row.status == status && row.status_details == status_details)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parsed `finalStates` rule value: terminal status per current statusDetails.
pub type FinalStates = BTreeMap<QualificationStatusDetails, QualificationStatus>;

pub fn parse_final_states(raw: &str) -> Result<FinalStates, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Parsed `advanceCount` rule value: how many ranked candidates advance to
/// consideration in one selection round.
pub fn parse_advance_count(raw: &str) -> Result<u32, std::num::ParseIntError> {
    raw.trim().parse::<u32>()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeriodTermRow {
    country: String,
    pmd: String,
    minimum_term_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParameterRow {
    country: String,
    pmd: String,
    #[serde(default)]
    operation_type: Option<String>,
    parameter: String,
    value: String,
}

/// Rule table loaded from a JSON document at startup. Rows with no
/// `operationType` match any operation; rows carrying one match only that
/// operation and win over the generic rows.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticRuleSet {
    #[serde(default)]
    period_terms: Vec<PeriodTermRow>,
    #[serde(default)]
    parameters: Vec<ParameterRow>,
}

impl StaticRuleSet {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl PeriodRules for StaticRuleSet {
    fn minimum_term_seconds(
        &self,
        country: &Country,
        pmd: &ProcurementMethod,
    ) -> Result<Option<i64>, RulesError> {
        Ok(self
            .period_terms
            .iter()
            .find(|row| row.country == country.as_str() && row.pmd == pmd.as_str())
            .map(|row| row.minimum_term_seconds))
    }
}

impl QualificationRules for StaticRuleSet {
    fn find(&self, query: &RuleQuery<'_>) -> Result<Option<String>, RulesError> {
        let candidates = self.parameters.iter().filter(|row| {
            row.country == query.country.as_str()
                && row.pmd == query.pmd.as_str()
                && row.parameter == query.parameter
        });

        let mut fallback = None;
        for row in candidates {
            match (&row.operation_type, query.operation_type) {
                (Some(row_operation), Some(requested))
                    if row_operation == requested.as_str() =>
                {
                    return Ok(Some(row.value.clone()));
                }
                (None, _) => fallback = fallback.or_else(|| Some(row.value.clone())),
                _ => {}
            }
        }
        Ok(fallback)
    }
}
