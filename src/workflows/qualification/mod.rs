//! Qualification lifecycle for the procurement workflow: candidate intake,
//! period rules, status transitions, weighted-coefficient scoring, and
//! next-qualification selection.

pub mod domain;
pub mod evaluation;
pub mod period;
pub mod repository;
pub mod router;
pub mod rules;
pub mod service;
pub mod states;
pub mod store;

#[cfg(test)]
mod tests;

pub use domain::{
    Coefficient, CoefficientRate, CoefficientValue, Conversion, ConversionId, Country, Cpid,
    Criterion, DataError, Ocid, OperationType, Period, PeriodEntity, ProcurementMethod,
    Qualification, QualificationId, QualificationStatus, QualificationStatusDetails,
    QualificationSystemMethod, ReductionCriteria, Requirement, RequirementGroup,
    RequirementResponse, RequirementResponseId, RequirementResponseValue, RequirementReference,
    Scoring, Submission, SubmissionId,
};
pub use evaluation::{
    calculate_scoring, matched_coefficients, pending_for_processing, rank_for_selection,
    scoring_required,
};
pub use period::{PeriodCheckOutcome, PeriodError, PeriodPolicy};
pub use repository::{PeriodRepository, QualificationRepository, StorageError};
pub use router::qualification_router;
pub use rules::{PeriodRules, QualificationRules, RuleQuery, RulesError, StaticRuleSet};
pub use service::{
    CreateQualificationsParams, CreatedQualificationView, DoQualificationItem,
    QualificationResolution, QualificationService, QualificationStateView, ServiceError,
    ValidationError,
};
pub use states::{OperationContext, StateEngine, StateError, StateTarget};
pub use store::{InMemoryPeriodStore, InMemoryQualificationStore};
