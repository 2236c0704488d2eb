use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::{
    Conversion, Country, Cpid, Criterion, DataError, Ocid, Period, PeriodEntity,
    ProcurementMethod, Qualification, QualificationId, QualificationStatus,
    QualificationStatusDetails, QualificationSystemMethod, ReductionCriteria,
    RequirementResponse, Scoring, Submission, SubmissionId,
};
use super::evaluation::{
    calculate_scoring, matched_coefficients, pending_for_processing, rank_for_selection,
    scoring_required,
};
use super::period::{
    check_against_stored, check_window, PeriodCheckOutcome, PeriodError, PeriodPolicy,
    PeriodPolicyError,
};
use super::repository::{PeriodRepository, QualificationRepository, StorageError};
use super::rules::{PeriodRules, QualificationRules, RulesError};
use super::states::{
    OperationContext, StateEngine, StateEngineError, StateError, StateTarget,
};

/// Client-correctable failures across all qualification operations. Each
/// carries a stable code and a human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Period(#[from] PeriodError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("no qualification period is stored for this case")]
    PeriodNotFound,
    #[error("a qualification period already exists for this case")]
    PeriodAlreadyExists,
    #[error("token does not match the qualification")]
    TokenMismatch,
    #[error("owner does not match the qualification")]
    OwnerMismatch,
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Data(err) => err.code(),
            ValidationError::Period(err) => err.code(),
            ValidationError::State(err) => err.code(),
            ValidationError::PeriodNotFound => "period.not_found",
            ValidationError::PeriodAlreadyExists => "period.already_exists",
            ValidationError::TokenMismatch => "access.token",
            ValidationError::OwnerMismatch => "access.owner",
        }
    }
}

/// Two-tier failure surface: validation errors go back to the caller with
/// their code; storage and rules failures are incidents.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Rules(#[from] RulesError),
}

impl From<DataError> for ServiceError {
    fn from(value: DataError) -> Self {
        Self::Validation(ValidationError::Data(value))
    }
}

impl From<PeriodError> for ServiceError {
    fn from(value: PeriodError) -> Self {
        Self::Validation(ValidationError::Period(value))
    }
}

impl From<StateError> for ServiceError {
    fn from(value: StateError) -> Self {
        Self::Validation(ValidationError::State(value))
    }
}

impl From<PeriodPolicyError> for ServiceError {
    fn from(value: PeriodPolicyError) -> Self {
        match value {
            PeriodPolicyError::Validation(err) => err.into(),
            PeriodPolicyError::Rules(err) => Self::Rules(err),
        }
    }
}

impl From<StateEngineError> for ServiceError {
    fn from(value: StateEngineError) -> Self {
        match value {
            StateEngineError::Validation(err) => err.into(),
            StateEngineError::Rules(err) => Self::Rules(err),
        }
    }
}

/// Parameters for qualification intake: one qualification is created per
/// submission; scoring is computed when the case configuration asks for it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQualificationsParams {
    pub cpid: Cpid,
    pub ocid: Ocid,
    pub date: DateTime<Utc>,
    pub owner: String,
    pub submissions: Vec<Submission>,
    #[serde(default)]
    pub conversions: Vec<Conversion>,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    pub reduction_criteria: ReductionCriteria,
    pub qualification_system_method: QualificationSystemMethod,
}

/// Echo of a freshly created qualification, including the owner credentials.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedQualificationView {
    pub id: QualificationId,
    pub token: Uuid,
    pub related_submission: SubmissionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring: Option<Scoring>,
}

impl From<&Qualification> for CreatedQualificationView {
    fn from(qualification: &Qualification) -> Self {
        Self {
            id: qualification.id,
            token: qualification.token,
            related_submission: qualification.related_submission,
            scoring: qualification.scoring,
        }
    }
}

/// Sanitized state echo returned by the lifecycle operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualificationStateView {
    pub id: QualificationId,
    pub status: QualificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_details: Option<QualificationStatusDetails>,
    pub related_submission: SubmissionId,
}

impl From<&Qualification> for QualificationStateView {
    fn from(qualification: &Qualification) -> Self {
        Self {
            id: qualification.id,
            status: qualification.status,
            status_details: qualification.status_details,
            related_submission: qualification.related_submission,
        }
    }
}

/// Decision input for the do-qualification operation; the parameter type
/// restricts callers to the two accepted outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QualificationResolution {
    Active,
    Unsuccessful,
}

impl QualificationResolution {
    fn status_details(self) -> QualificationStatusDetails {
        match self {
            QualificationResolution::Active => QualificationStatusDetails::Active,
            QualificationResolution::Unsuccessful => QualificationStatusDetails::Unsuccessful,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoQualificationItem {
    pub id: QualificationId,
    pub resolution: QualificationResolution,
}

/// Facade composing the period policy, state engine, evaluation functions,
/// and the repository collaborators. Handlers call one method per command.
pub struct QualificationService<S, P, R> {
    qualifications: Arc<S>,
    periods: Arc<P>,
    period_policy: PeriodPolicy<R>,
    states: StateEngine<R>,
}

impl<S, P, R> QualificationService<S, P, R>
where
    S: QualificationRepository + 'static,
    P: PeriodRepository + 'static,
    R: PeriodRules + QualificationRules + 'static,
{
    pub fn new(qualifications: Arc<S>, periods: Arc<P>, rules: Arc<R>) -> Self {
        Self {
            qualifications,
            periods,
            period_policy: PeriodPolicy::new(rules.clone()),
            states: StateEngine::new(rules),
        }
    }

    /// Creates one pending qualification per submission. Scoring is computed
    /// only when the case reduces by scoring under automated qualification.
    pub fn create_qualifications(
        &self,
        params: CreateQualificationsParams,
    ) -> Result<Vec<CreatedQualificationView>, ServiceError> {
        let with_scoring = scoring_required(
            params.reduction_criteria,
            params.qualification_system_method,
        );

        let mut created = Vec::with_capacity(params.submissions.len());
        for submission in &params.submissions {
            let scoring = if with_scoring {
                let rates = matched_coefficients(
                    &params.conversions,
                    &params.criteria,
                    &submission.requirement_responses,
                );
                Some(calculate_scoring(&rates)?)
            } else {
                None
            };

            created.push(Qualification {
                id: QualificationId::generate(),
                date: params.date,
                status: QualificationStatus::Pending,
                status_details: None,
                token: Uuid::new_v4(),
                owner: params.owner.clone(),
                related_submission: submission.id,
                scoring,
                requirement_responses: Vec::new(),
            });
        }

        let applied = self
            .qualifications
            .save_all(&params.cpid, &params.ocid, &created)?;
        if !applied {
            return Err(StorageError::Corrupted(
                "qualification id collision on insert".to_string(),
            )
            .into());
        }

        Ok(created.iter().map(CreatedQualificationView::from).collect())
    }

    /// Credential gate for mutating commands issued by the owner.
    pub fn check_access(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        id: &QualificationId,
        token: &Uuid,
        owner: &str,
    ) -> Result<(), ServiceError> {
        let qualification = self.find_one(cpid, ocid, id)?;
        if qualification.token != *token {
            return Err(ValidationError::TokenMismatch.into());
        }
        if qualification.owner != owner {
            return Err(ValidationError::OwnerMismatch.into());
        }
        Ok(())
    }

    /// Pure validation of a requested period against the minimum-term rules.
    pub fn validate_period(
        &self,
        period: &Period,
        country: &Country,
        pmd: &ProcurementMethod,
    ) -> Result<(), ServiceError> {
        self.period_policy.validate(period, country, pmd)?;
        Ok(())
    }

    /// Validates and stores the case period. Creation is idempotent; a second
    /// save for the same case reports `period.already_exists`.
    pub fn save_period(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        period: Period,
        country: &Country,
        pmd: &ProcurementMethod,
    ) -> Result<(), ServiceError> {
        self.period_policy.validate(&period, country, pmd)?;

        let entity = PeriodEntity {
            cpid: cpid.clone(),
            ocid: ocid.clone(),
            start_date: period.start_date,
            end_date: period.end_date,
        };
        let applied = self.periods.save_new(&entity)?;
        if !applied {
            return Err(ValidationError::PeriodAlreadyExists.into());
        }
        Ok(())
    }

    /// Compares a requested period against the stored one and persists the
    /// extended end date when it moved. Callers use the outcome to decide
    /// whether dependent periods need recalculation.
    pub fn check_period(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        requested: &Period,
    ) -> Result<PeriodCheckOutcome, ServiceError> {
        let stored = self
            .periods
            .find(cpid, ocid)?
            .ok_or(ValidationError::PeriodNotFound)?;

        let outcome = check_against_stored(requested, &stored.window())?;
        if outcome.end_date_changed {
            self.periods
                .update_end(cpid, ocid, outcome.effective.end_date)?;
        }
        Ok(outcome)
    }

    /// Requires the request date to fall strictly inside the stored window.
    pub fn check_qualification_period(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        date: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let stored = self
            .periods
            .find(cpid, ocid)?
            .ok_or(ValidationError::PeriodNotFound)?;
        check_window(&stored.window(), date)?;
        Ok(())
    }

    /// Read-only check that the qualification's current state permits the
    /// operation, per the rules-provided valid-state set.
    pub fn check_qualification_state(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        id: &QualificationId,
        context: &OperationContext,
    ) -> Result<(), ServiceError> {
        let qualification = self.find_one(cpid, ocid, id)?;
        self.states
            .authorize(context, StateTarget::of(&qualification))?;
        Ok(())
    }

    /// Records or replaces the candidate's declaration response on the named
    /// qualification. Responses are keyed by the requirement they answer.
    pub fn do_declaration(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        id: &QualificationId,
        response: RequirementResponse,
    ) -> Result<QualificationStateView, ServiceError> {
        let mut qualification = self.find_one(cpid, ocid, id)?;

        match qualification
            .requirement_responses
            .iter_mut()
            .find(|existing| existing.requirement.id == response.requirement.id)
        {
            Some(existing) => *existing = response,
            None => qualification.requirement_responses.push(response),
        }

        let view = QualificationStateView::from(&qualification);
        self.qualifications
            .update_all(cpid, ocid, std::slice::from_ref(&qualification))?;
        Ok(view)
    }

    /// Transitions every named qualification to consideration. All-or-nothing:
    /// one unknown id fails the whole command and nothing is written.
    pub fn do_consideration(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        ids: &[QualificationId],
    ) -> Result<Vec<QualificationStateView>, ServiceError> {
        let stored = self.qualifications.find_all(cpid, ocid)?;

        let unknown: Vec<QualificationId> = ids
            .iter()
            .filter(|id| !stored.iter().any(|qualification| qualification.id == **id))
            .copied()
            .collect();
        if !unknown.is_empty() {
            return Err(StateError::UnknownQualifications { ids: unknown }.into());
        }

        let mut updated: Vec<Qualification> = stored
            .into_iter()
            .filter(|qualification| ids.contains(&qualification.id))
            .collect();
        for qualification in &mut updated {
            qualification.status_details = Some(QualificationStatusDetails::Consideration);
        }

        self.qualifications.update_all(cpid, ocid, &updated)?;
        Ok(updated.iter().map(QualificationStateView::from).collect())
    }

    /// Applies active/unsuccessful decisions to the named qualifications.
    /// Every resulting state must be authorized by the valid-state rules for
    /// the operation; the batch persists as one write.
    pub fn do_qualification(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        context: &OperationContext,
        items: &[DoQualificationItem],
    ) -> Result<Vec<QualificationStateView>, ServiceError> {
        let stored = self.qualifications.find_all(cpid, ocid)?;
        let states = self.states.authorized_states(context)?;

        let mut updated = Vec::with_capacity(items.len());
        let mut unknown = Vec::new();
        for item in items {
            let Some(qualification) = stored
                .iter()
                .find(|qualification| qualification.id == item.id)
            else {
                unknown.push(item.id);
                continue;
            };

            let mut qualification = qualification.clone();
            let details = item.resolution.status_details();
            if !states.permits(qualification.status, Some(details)) {
                return Err(StateError::TransitionNotAllowed {
                    target: StateTarget {
                        status: qualification.status,
                        status_details: Some(details),
                    },
                }
                .into());
            }
            qualification.status_details = Some(details);
            updated.push(qualification);
        }
        if !unknown.is_empty() {
            return Err(StateError::UnknownQualifications { ids: unknown }.into());
        }

        self.qualifications.update_all(cpid, ocid, &updated)?;
        Ok(updated.iter().map(QualificationStateView::from).collect())
    }

    /// Derives the final status of every qualification in the case from its
    /// statusDetails, using the rules-provided terminal mapping, and persists
    /// the whole case in one batch.
    pub fn finalize_qualifications(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        context: &OperationContext,
    ) -> Result<Vec<QualificationStateView>, ServiceError> {
        let mut stored = self.qualifications.find_all(cpid, ocid)?;
        let mapping = self.states.final_states(context)?;

        for qualification in &mut stored {
            let status = qualification
                .status_details
                .and_then(|details| mapping.get(&details).copied())
                .ok_or(StateError::FinalStateMissing {
                    details: qualification.status_details,
                })?;
            qualification.status = status;
        }

        self.qualifications.update_all(cpid, ocid, &stored)?;
        Ok(stored.iter().map(QualificationStateView::from).collect())
    }

    /// Selects the next qualifications to process: filters out candidates
    /// still awaiting or under consideration, ranks the rest, promotes the
    /// rules-configured number to consideration, and parks the remainder as
    /// awaiting. Returns the updated records, promoted first.
    pub fn set_next_for_qualification(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        context: &OperationContext,
        reduction_criteria: ReductionCriteria,
        method: QualificationSystemMethod,
    ) -> Result<Vec<QualificationStateView>, ServiceError> {
        let stored = self.qualifications.find_all(cpid, ocid)?;
        let mut candidates = pending_for_processing(stored);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        rank_for_selection(&mut candidates, scoring_required(reduction_criteria, method));

        let advance = self.states.advance_count(context)? as usize;
        for (position, qualification) in candidates.iter_mut().enumerate() {
            qualification.status_details = if position < advance {
                Some(QualificationStatusDetails::Consideration)
            } else {
                Some(QualificationStatusDetails::Awaiting)
            };
        }

        self.qualifications.update_all(cpid, ocid, &candidates)?;
        Ok(candidates.iter().map(QualificationStateView::from).collect())
    }

    fn find_one(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        id: &QualificationId,
    ) -> Result<Qualification, ServiceError> {
        self.qualifications
            .find_by_id(cpid, ocid, id)?
            .ok_or_else(|| StateError::UnknownQualifications { ids: vec![*id] }.into())
    }
}
