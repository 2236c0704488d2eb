//! Period validation rules: a requested window against the configured
//! minimum term, against a previously stored window, and a single date
//! against the stored qualification window.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::domain::{Country, Period, ProcurementMethod};
use super::rules::{PeriodRules, RulesError};

/// Client-correctable period failures, each with a stable code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeriodError {
    #[error("period start date must be strictly before its end date")]
    Invalid,
    #[error("no minimum-term rule configured for country '{country}', pmd '{pmd}'")]
    RuleNotFound { country: String, pmd: String },
    #[error("period term is shorter than the allowed minimum of {minimum_seconds} seconds")]
    TermTooShort { minimum_seconds: i64 },
    #[error("requested period start date must be strictly before its end date")]
    InvalidOnCheck,
    #[error("requested end date {requested} precedes the stored end date {stored}")]
    EndDateBeforeStored {
        requested: DateTime<Utc>,
        stored: DateTime<Utc>,
    },
    #[error("date {date} is not after the period start {start}")]
    DateNotAfterStart {
        date: DateTime<Utc>,
        start: DateTime<Utc>,
    },
    #[error("date {date} is not before the period end {end}")]
    DateNotBeforeEnd {
        date: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl PeriodError {
    pub fn code(&self) -> &'static str {
        match self {
            PeriodError::Invalid => "period.invalid",
            PeriodError::RuleNotFound { .. } => "period.rule_not_found",
            PeriodError::TermTooShort { .. } => "period.term",
            PeriodError::InvalidOnCheck => "period.invalid_on_check",
            PeriodError::EndDateBeforeStored { .. } => "period.end_date",
            PeriodError::DateNotAfterStart { .. } => "period.date_not_after_start",
            PeriodError::DateNotBeforeEnd { .. } => "period.date_not_before_end",
        }
    }
}

/// Failure surface of the rules-backed validation: either a validation error
/// for the caller or an incident from the rules backend.
#[derive(Debug, thiserror::Error)]
pub enum PeriodPolicyError {
    #[error(transparent)]
    Validation(#[from] PeriodError),
    #[error(transparent)]
    Rules(#[from] RulesError),
}

/// Outcome of checking a requested period against the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodCheckOutcome {
    pub end_date_changed: bool,
    /// Stored start combined with the requested end; what the case period
    /// becomes if the caller applies the change.
    pub effective: Period,
}

/// Validates periods against the externally maintained minimum-term rules.
pub struct PeriodPolicy<R> {
    rules: Arc<R>,
}

impl<R> PeriodPolicy<R>
where
    R: PeriodRules,
{
    pub fn new(rules: Arc<R>) -> Self {
        Self { rules }
    }

    /// Rules, in order: start strictly before end; a minimum-term rule must
    /// exist for the country/pmd pair; the window must span at least that
    /// many seconds.
    pub fn validate(
        &self,
        period: &Period,
        country: &Country,
        pmd: &ProcurementMethod,
    ) -> Result<(), PeriodPolicyError> {
        if period.start_date >= period.end_date {
            return Err(PeriodError::Invalid.into());
        }

        let minimum_seconds = self
            .rules
            .minimum_term_seconds(country, pmd)?
            .ok_or_else(|| PeriodError::RuleNotFound {
                country: country.as_str().to_string(),
                pmd: pmd.as_str().to_string(),
            })?;

        let term = period
            .end_date
            .signed_duration_since(period.start_date)
            .num_seconds();
        if term < minimum_seconds {
            return Err(PeriodError::TermTooShort {
                minimum_seconds,
            }
            .into());
        }

        Ok(())
    }
}

/// Compares a requested period against the stored one. The start date is
/// immutable; the end date may only move forward. Reports whether the end
/// date changed so callers know if dependent periods need recalculation.
pub fn check_against_stored(
    requested: &Period,
    stored: &Period,
) -> Result<PeriodCheckOutcome, PeriodError> {
    if requested.start_date >= requested.end_date {
        return Err(PeriodError::InvalidOnCheck);
    }
    if requested.end_date < stored.end_date {
        return Err(PeriodError::EndDateBeforeStored {
            requested: requested.end_date,
            stored: stored.end_date,
        });
    }

    Ok(PeriodCheckOutcome {
        end_date_changed: requested.end_date != stored.end_date,
        effective: Period {
            start_date: stored.start_date,
            end_date: requested.end_date,
        },
    })
}

/// Requires the date to fall strictly inside the stored window.
pub fn check_window(stored: &Period, date: DateTime<Utc>) -> Result<(), PeriodError> {
    if date <= stored.start_date {
        return Err(PeriodError::DateNotAfterStart {
            date,
            start: stored.start_date,
        });
    }
    if date >= stored.end_date {
        return Err(PeriodError::DateNotBeforeEnd {
            date,
            end: stored.end_date,
        });
    }
    Ok(())
}
