//! Status/statusDetails transition engine. Which state pairs an operation may
//! act from or leave behind is authorized by externally supplied rule rows,
//! never hardcoded here.

use std::fmt;
use std::sync::Arc;

use super::domain::{
    Country, OperationType, ProcurementMethod, Qualification, QualificationId,
    QualificationStatus, QualificationStatusDetails,
};
use super::rules::{
    self, FinalStates, QualificationRules, RuleQuery, RulesError, ValidStates,
    ADVANCE_COUNT_PARAMETER, FINAL_STATES_PARAMETER, VALID_STATES_PARAMETER,
};

/// Client-correctable state-engine failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("unknown qualification(s): {}", format_ids(.ids))]
    UnknownQualifications { ids: Vec<QualificationId> },
    #[error(
        "no valid-states rule configured for country '{country}', pmd '{pmd}', operation '{operation}'"
    )]
    StatesRuleNotFound {
        country: String,
        pmd: String,
        operation: String,
    },
    #[error("state {target} is not permitted for this operation")]
    TransitionNotAllowed { target: StateTarget },
    #[error("no terminal status mapping for status details {details:?}")]
    FinalStateMissing {
        details: Option<QualificationStatusDetails>,
    },
}

impl StateError {
    pub fn code(&self) -> &'static str {
        match self {
            StateError::UnknownQualifications { .. } => "qualification.unknown",
            StateError::StatesRuleNotFound { .. } => "qualification.states_rule_not_found",
            StateError::TransitionNotAllowed { .. } => "qualification.state_not_allowed",
            StateError::FinalStateMissing { .. } => "qualification.finalize_rule_missing",
        }
    }
}

fn format_ids(ids: &[QualificationId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validation or rules-backend failure from an engine lookup.
#[derive(Debug, thiserror::Error)]
pub enum StateEngineError {
    #[error(transparent)]
    Validation(#[from] StateError),
    #[error(transparent)]
    Rules(#[from] RulesError),
}

/// Rule-row key for one lifecycle operation on one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    pub country: Country,
    pub pmd: ProcurementMethod,
    pub operation_type: OperationType,
}

/// A status/statusDetails pair checked against the authorized set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTarget {
    pub status: QualificationStatus,
    pub status_details: Option<QualificationStatusDetails>,
}

impl StateTarget {
    pub fn of(qualification: &Qualification) -> Self {
        Self {
            status: qualification.status,
            status_details: qualification.status_details,
        }
    }
}

impl fmt::Display for StateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_details {
            Some(details) => write!(f, "'{}'/'{}'", self.status.label(), details.label()),
            None => write!(f, "'{}'", self.status.label()),
        }
    }
}

/// Authorizes state transitions against the rules store.
pub struct StateEngine<Q> {
    rules: Arc<Q>,
}

impl<Q> StateEngine<Q>
where
    Q: QualificationRules,
{
    pub fn new(rules: Arc<Q>) -> Self {
        Self { rules }
    }

    fn fetch(
        &self,
        context: &OperationContext,
        parameter: &'static str,
    ) -> Result<Option<String>, RulesError> {
        self.rules.find(&RuleQuery {
            country: &context.country,
            pmd: &context.pmd,
            operation_type: Some(&context.operation_type),
            parameter,
        })
    }

    fn malformed(
        &self,
        context: &OperationContext,
        parameter: &str,
        detail: impl fmt::Display,
    ) -> RulesError {
        RulesError::Malformed {
            parameter: parameter.to_string(),
            country: context.country.as_str().to_string(),
            pmd: context.pmd.as_str().to_string(),
            detail: detail.to_string(),
        }
    }

    /// The authorized state set for the operation; a missing rule row is a
    /// validation failure, an unparseable one an incident.
    pub fn authorized_states(
        &self,
        context: &OperationContext,
    ) -> Result<ValidStates, StateEngineError> {
        let raw = self.fetch(context, VALID_STATES_PARAMETER)?.ok_or_else(|| {
            StateError::StatesRuleNotFound {
                country: context.country.as_str().to_string(),
                pmd: context.pmd.as_str().to_string(),
                operation: context.operation_type.as_str().to_string(),
            }
        })?;

        ValidStates::parse(&raw)
            .map_err(|err| self.malformed(context, VALID_STATES_PARAMETER, err).into())
    }

    /// Rejects any target not present in the authorized set.
    pub fn authorize(
        &self,
        context: &OperationContext,
        target: StateTarget,
    ) -> Result<(), StateEngineError> {
        let states = self.authorized_states(context)?;
        if states.permits(target.status, target.status_details) {
            Ok(())
        } else {
            Err(StateError::TransitionNotAllowed { target }.into())
        }
    }

    /// Terminal `statusDetails -> status` mapping for finalization; a missing
    /// rule row is a validation failure since finalize cannot proceed at all.
    pub fn final_states(
        &self,
        context: &OperationContext,
    ) -> Result<FinalStates, StateEngineError> {
        let raw = self.fetch(context, FINAL_STATES_PARAMETER)?.ok_or_else(|| {
            StateError::StatesRuleNotFound {
                country: context.country.as_str().to_string(),
                pmd: context.pmd.as_str().to_string(),
                operation: context.operation_type.as_str().to_string(),
            }
        })?;

        rules::parse_final_states(&raw)
            .map_err(|err| self.malformed(context, FINAL_STATES_PARAMETER, err).into())
    }

    /// How many ranked candidates advance in one selection round. Absent rule
    /// row falls back to promoting a single candidate.
    pub fn advance_count(&self, context: &OperationContext) -> Result<u32, StateEngineError> {
        match self.fetch(context, ADVANCE_COUNT_PARAMETER)? {
            None => Ok(1),
            Some(raw) => rules::parse_advance_count(&raw)
                .map_err(|err| self.malformed(context, ADVANCE_COUNT_PARAMETER, err).into()),
        }
    }
}
