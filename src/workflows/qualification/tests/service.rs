use rust_decimal::Decimal;
use uuid::Uuid;

use super::common::*;
use crate::workflows::qualification::domain::{
    Coefficient, CoefficientRate, CoefficientValue, Conversion, ConversionId, Criterion, Period,
    PeriodEntity, QualificationStatus, QualificationStatusDetails, QualificationSystemMethod,
    ReductionCriteria, Requirement, RequirementGroup, RequirementReference, RequirementResponse,
    RequirementResponseId, RequirementResponseValue, Submission, SubmissionId,
};
use crate::workflows::qualification::rules::{
    ADVANCE_COUNT_PARAMETER, FINAL_STATES_PARAMETER, VALID_STATES_PARAMETER,
};
use crate::workflows::qualification::service::{
    CreateQualificationsParams, DoQualificationItem, QualificationResolution, ServiceError,
    ValidationError,
};

fn validation_code(err: ServiceError) -> &'static str {
    match err {
        ServiceError::Validation(validation) => validation.code(),
        other => panic!("expected validation failure, got {other:?}"),
    }
}

fn submission(when: &str, responses: Vec<RequirementResponse>) -> Submission {
    Submission {
        id: SubmissionId::generate(),
        date: date(when),
        requirement_responses: responses,
    }
}

fn response(requirement_id: &str, value: RequirementResponseValue) -> RequirementResponse {
    RequirementResponse {
        id: RequirementResponseId::generate(),
        value,
        requirement: RequirementReference {
            id: requirement_id.to_string(),
        },
    }
}

fn create_params(
    submissions: Vec<Submission>,
    reduction_criteria: ReductionCriteria,
    method: QualificationSystemMethod,
) -> CreateQualificationsParams {
    let conversions = vec![Conversion {
        id: ConversionId::generate(),
        related_item: "req-certified".to_string(),
        coefficients: vec![
            Coefficient {
                value: CoefficientValue::Boolean(true),
                rate: CoefficientRate::new(Decimal::new(5, 1)),
            },
            Coefficient {
                value: CoefficientValue::Boolean(false),
                rate: CoefficientRate::new(Decimal::new(25, 2)),
            },
        ],
    }];
    let criteria = vec![Criterion {
        id: "crit-certification".to_string(),
        requirement_groups: vec![RequirementGroup {
            id: "crit-certification-group".to_string(),
            requirements: vec![Requirement {
                id: "req-certified".to_string(),
            }],
        }],
    }];

    CreateQualificationsParams {
        cpid: cpid(),
        ocid: ocid(),
        date: date("2020-03-10T10:00:00Z"),
        owner: OWNER.to_string(),
        submissions,
        conversions,
        criteria,
        reduction_criteria,
        qualification_system_method: method,
    }
}

#[test]
fn create_builds_one_pending_qualification_per_submission() {
    let (service, repository, _) = build_service(MemoryRules::default());

    let submissions = vec![
        submission(
            "2020-03-09T10:00:00Z",
            vec![response("req-certified", RequirementResponseValue::Boolean(true))],
        ),
        submission(
            "2020-03-09T11:00:00Z",
            vec![response("req-certified", RequirementResponseValue::Boolean(false))],
        ),
    ];
    let params = create_params(
        submissions.clone(),
        ReductionCriteria::Scoring,
        QualificationSystemMethod::Automated,
    );

    let created = service.create_qualifications(params).expect("creates");
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].related_submission, submissions[0].id);
    assert_eq!(
        created[0].scoring.expect("scored").to_string(),
        "0.500"
    );
    assert_eq!(
        created[1].scoring.expect("scored").to_string(),
        "0.250"
    );

    let stored = repository.snapshot(&cpid(), &ocid());
    assert_eq!(stored.len(), 2);
    assert!(stored
        .iter()
        .all(|qualification| qualification.status == QualificationStatus::Pending
            && qualification.status_details.is_none()));
}

#[test]
fn create_skips_scoring_unless_scoring_and_automated() {
    let (service, _, _) = build_service(MemoryRules::default());

    let params = create_params(
        vec![submission(
            "2020-03-09T10:00:00Z",
            vec![response("req-certified", RequirementResponseValue::Boolean(true))],
        )],
        ReductionCriteria::Scoring,
        QualificationSystemMethod::Manual,
    );

    let created = service.create_qualifications(params).expect("creates");
    assert!(created[0].scoring.is_none());
}

#[test]
fn create_rejects_conversions_with_negative_rates() {
    let (service, repository, _) = build_service(MemoryRules::default());

    let mut params = create_params(
        vec![submission(
            "2020-03-09T10:00:00Z",
            vec![response("req-certified", RequirementResponseValue::Boolean(true))],
        )],
        ReductionCriteria::Scoring,
        QualificationSystemMethod::Automated,
    );
    params.conversions[0].coefficients[0].rate = CoefficientRate::new(Decimal::new(-5, 1));

    let err = service
        .create_qualifications(params)
        .expect_err("negative rate drives the product negative");
    assert_eq!(validation_code(err), "scoring.negative");
    assert!(repository.snapshot(&cpid(), &ocid()).is_empty());
}

#[test]
fn check_access_verifies_token_then_owner() {
    let (service, repository, _) = build_service(MemoryRules::default());
    let stored = qualification("2020-03-09T10:00:00Z", None, None);
    repository.seed(&cpid(), &ocid(), vec![stored.clone()]);

    service
        .check_access(&cpid(), &ocid(), &stored.id, &stored.token, OWNER)
        .expect("matching credentials");

    let err = service
        .check_access(&cpid(), &ocid(), &stored.id, &Uuid::new_v4(), OWNER)
        .expect_err("wrong token");
    assert_eq!(validation_code(err), "access.token");

    let err = service
        .check_access(&cpid(), &ocid(), &stored.id, &stored.token, "intruder")
        .expect_err("wrong owner");
    assert_eq!(validation_code(err), "access.owner");
}

#[test]
fn save_period_is_idempotent_per_case() {
    let (service, _, periods) = build_service(MemoryRules::default().with_term("MD", "gpa", 60));
    let period = Period {
        start_date: date("2020-03-10T10:00:00Z"),
        end_date: date("2020-03-12T10:00:00Z"),
    };

    service
        .save_period(&cpid(), &ocid(), period, &country(), &pmd())
        .expect("first save applies");
    assert!(periods.stored(&cpid(), &ocid()).is_some());

    let err = service
        .save_period(&cpid(), &ocid(), period, &country(), &pmd())
        .expect_err("second save is rejected");
    assert_eq!(validation_code(err), "period.already_exists");
}

#[test]
fn check_period_persists_extended_end_date() {
    let (service, _, periods) = build_service(MemoryRules::default());
    periods.seed(PeriodEntity {
        cpid: cpid(),
        ocid: ocid(),
        start_date: date("2020-02-10T08:49:55Z"),
        end_date: date("2020-02-20T08:49:55Z"),
    });

    let outcome = service
        .check_period(
            &cpid(),
            &ocid(),
            &Period {
                start_date: date("2020-02-10T08:49:55Z"),
                end_date: date("2020-02-25T08:49:55Z"),
            },
        )
        .expect("valid extension");

    assert!(outcome.end_date_changed);
    let stored = periods.stored(&cpid(), &ocid()).expect("still stored");
    assert_eq!(stored.end_date, date("2020-02-25T08:49:55Z"));
    // Start date never moves.
    assert_eq!(stored.start_date, date("2020-02-10T08:49:55Z"));
}

#[test]
fn check_period_requires_a_stored_period() {
    let (service, _, _) = build_service(MemoryRules::default());
    let err = service
        .check_period(
            &cpid(),
            &ocid(),
            &Period {
                start_date: date("2020-02-10T08:49:55Z"),
                end_date: date("2020-02-25T08:49:55Z"),
            },
        )
        .expect_err("nothing stored");
    assert_eq!(validation_code(err), "period.not_found");
}

#[test]
fn qualification_period_rejects_request_date_equal_to_start() {
    let (service, _, periods) = build_service(MemoryRules::default());
    periods.seed(PeriodEntity {
        cpid: cpid(),
        ocid: ocid(),
        start_date: date("2020-02-10T08:49:55Z"),
        end_date: date("2020-02-20T08:49:55Z"),
    });

    let err = service
        .check_qualification_period(&cpid(), &ocid(), date("2020-02-10T08:49:55Z"))
        .expect_err("start bound is exclusive");
    assert_eq!(validation_code(err), "period.date_not_after_start");
}

#[test]
fn consideration_updates_all_named_ids_in_one_batch() {
    let (service, repository, _) = build_service(MemoryRules::default());
    let first = qualification("2020-03-09T10:00:00Z", None, None);
    let second = qualification("2020-03-09T11:00:00Z", None, None);
    repository.seed(&cpid(), &ocid(), vec![first.clone(), second.clone()]);

    let updated = service
        .do_consideration(&cpid(), &ocid(), &[first.id, second.id])
        .expect("both ids known");

    assert_eq!(updated.len(), 2);
    assert!(updated.iter().all(|view| view.status_details
        == Some(QualificationStatusDetails::Consideration)));
    assert_eq!(repository.update_batches(), vec![2]);
}

#[test]
fn consideration_with_unknown_id_writes_nothing() {
    let (service, repository, _) = build_service(MemoryRules::default());
    let known = qualification("2020-03-09T10:00:00Z", None, None);
    repository.seed(&cpid(), &ocid(), vec![known.clone()]);

    let missing = crate::workflows::qualification::domain::QualificationId::generate();
    let err = service
        .do_consideration(&cpid(), &ocid(), &[known.id, missing])
        .expect_err("one unknown id fails the batch");

    assert_eq!(validation_code(err), "qualification.unknown");
    assert!(repository.update_batches().is_empty());
    let stored = repository.snapshot(&cpid(), &ocid());
    assert!(stored[0].status_details.is_none());
}

#[test]
fn do_qualification_applies_authorized_decisions() {
    let rules = MemoryRules::default().with_rule(
        VALID_STATES_PARAMETER,
        r#"[
            {"status": "pending", "statusDetails": "active"},
            {"status": "pending", "statusDetails": "unsuccessful"}
        ]"#,
    );
    let (service, repository, _) = build_service(rules);
    let first = qualification("2020-03-09T10:00:00Z", None, None);
    let second = qualification("2020-03-09T11:00:00Z", None, None);
    repository.seed(&cpid(), &ocid(), vec![first.clone(), second.clone()]);

    let updated = service
        .do_qualification(
            &cpid(),
            &ocid(),
            &context(),
            &[
                DoQualificationItem {
                    id: first.id,
                    resolution: QualificationResolution::Active,
                },
                DoQualificationItem {
                    id: second.id,
                    resolution: QualificationResolution::Unsuccessful,
                },
            ],
        )
        .expect("both transitions authorized");

    assert_eq!(
        updated[0].status_details,
        Some(QualificationStatusDetails::Active)
    );
    assert_eq!(
        updated[1].status_details,
        Some(QualificationStatusDetails::Unsuccessful)
    );
    assert_eq!(repository.update_batches(), vec![2]);
}

#[test]
fn do_qualification_rejects_unauthorized_transition() {
    // Only the active outcome is permitted by the rule row.
    let rules = MemoryRules::default().with_rule(
        VALID_STATES_PARAMETER,
        r#"[{"status": "pending", "statusDetails": "active"}]"#,
    );
    let (service, repository, _) = build_service(rules);
    let stored = qualification("2020-03-09T10:00:00Z", None, None);
    repository.seed(&cpid(), &ocid(), vec![stored.clone()]);

    let err = service
        .do_qualification(
            &cpid(),
            &ocid(),
            &context(),
            &[DoQualificationItem {
                id: stored.id,
                resolution: QualificationResolution::Unsuccessful,
            }],
        )
        .expect_err("transition not in the rule set");

    assert_eq!(validation_code(err), "qualification.state_not_allowed");
    assert!(repository.update_batches().is_empty());
}

#[test]
fn finalize_derives_status_from_rule_mapping() {
    let rules = MemoryRules::default().with_rule(
        FINAL_STATES_PARAMETER,
        r#"{"active": "active", "unsuccessful": "unsuccessful", "consideration": "unsuccessful"}"#,
    );
    let (service, repository, _) = build_service(rules);
    let winner = qualification(
        "2020-03-09T10:00:00Z",
        None,
        Some(QualificationStatusDetails::Active),
    );
    let loser = qualification(
        "2020-03-09T11:00:00Z",
        None,
        Some(QualificationStatusDetails::Consideration),
    );
    repository.seed(&cpid(), &ocid(), vec![winner.clone(), loser.clone()]);

    let finalized = service
        .finalize_qualifications(&cpid(), &ocid(), &context())
        .expect("mapping covers every statusDetails");

    assert_eq!(finalized.len(), 2);
    assert_eq!(finalized[0].status, QualificationStatus::Active);
    assert_eq!(finalized[1].status, QualificationStatus::Unsuccessful);
    assert_eq!(finalized[0].related_submission, winner.related_submission);
}

#[test]
fn finalize_fails_when_mapping_lacks_a_status_details() {
    let rules =
        MemoryRules::default().with_rule(FINAL_STATES_PARAMETER, r#"{"active": "active"}"#);
    let (service, repository, _) = build_service(rules);
    repository.seed(
        &cpid(),
        &ocid(),
        vec![qualification(
            "2020-03-09T10:00:00Z",
            None,
            Some(QualificationStatusDetails::Unsuccessful),
        )],
    );

    let err = service
        .finalize_qualifications(&cpid(), &ocid(), &context())
        .expect_err("unsuccessful is not mapped");
    assert_eq!(validation_code(err), "qualification.finalize_rule_missing");
    assert!(repository.update_batches().is_empty());
}

#[test]
fn next_selection_promotes_top_scored_candidate() {
    let (service, repository, _) = build_service(MemoryRules::default());
    let best = qualification("2020-03-09T10:00:00Z", Some("0.9"), None);
    let runner_up = qualification("2020-03-09T09:00:00Z", Some("0.5"), None);
    let already_decided = qualification(
        "2020-03-09T08:00:00Z",
        Some("1"),
        Some(QualificationStatusDetails::Consideration),
    );
    repository.seed(
        &cpid(),
        &ocid(),
        vec![runner_up.clone(), already_decided.clone(), best.clone()],
    );

    let updated = service
        .set_next_for_qualification(
            &cpid(),
            &ocid(),
            &context(),
            ReductionCriteria::Scoring,
            QualificationSystemMethod::Automated,
        )
        .expect("selection succeeds");

    assert_eq!(updated.len(), 2);
    assert_eq!(updated[0].id, best.id);
    assert_eq!(
        updated[0].status_details,
        Some(QualificationStatusDetails::Consideration)
    );
    assert_eq!(updated[1].id, runner_up.id);
    assert_eq!(
        updated[1].status_details,
        Some(QualificationStatusDetails::Awaiting)
    );

    // The already-considered candidate was not touched.
    let stored = repository.snapshot(&cpid(), &ocid());
    let untouched = stored
        .iter()
        .find(|row| row.id == already_decided.id)
        .expect("still stored");
    assert_eq!(
        untouched.status_details,
        Some(QualificationStatusDetails::Consideration)
    );
}

#[test]
fn next_selection_advance_count_comes_from_rules() {
    let rules = MemoryRules::default().with_rule(ADVANCE_COUNT_PARAMETER, "2");
    let (service, repository, _) = build_service(rules);
    repository.seed(
        &cpid(),
        &ocid(),
        vec![
            qualification("2020-03-09T10:00:00Z", Some("0.9"), None),
            qualification("2020-03-09T11:00:00Z", Some("0.5"), None),
            qualification("2020-03-09T12:00:00Z", Some("0.1"), None),
        ],
    );

    let updated = service
        .set_next_for_qualification(
            &cpid(),
            &ocid(),
            &context(),
            ReductionCriteria::Scoring,
            QualificationSystemMethod::Automated,
        )
        .expect("selection succeeds");

    let promoted = updated
        .iter()
        .filter(|view| view.status_details == Some(QualificationStatusDetails::Consideration))
        .count();
    assert_eq!(promoted, 2);
}

#[test]
fn next_selection_without_scoring_uses_submission_date() {
    let (service, repository, _) = build_service(MemoryRules::default());
    let late = qualification("2020-03-09T12:00:00Z", Some("0.9"), None);
    let early = qualification("2020-03-09T09:00:00Z", Some("0.1"), None);
    repository.seed(&cpid(), &ocid(), vec![late.clone(), early.clone()]);

    let updated = service
        .set_next_for_qualification(
            &cpid(),
            &ocid(),
            &context(),
            ReductionCriteria::None,
            QualificationSystemMethod::Automated,
        )
        .expect("selection succeeds");

    assert_eq!(updated[0].id, early.id);
    assert_eq!(
        updated[0].status_details,
        Some(QualificationStatusDetails::Consideration)
    );
}

#[test]
fn declaration_upserts_response_by_requirement() {
    let (service, repository, _) = build_service(MemoryRules::default());
    let stored = qualification("2020-03-09T10:00:00Z", None, None);
    repository.seed(&cpid(), &ocid(), vec![stored.clone()]);

    service
        .do_declaration(
            &cpid(),
            &ocid(),
            &stored.id,
            response("req-declaration", RequirementResponseValue::Boolean(false)),
        )
        .expect("first declaration recorded");

    service
        .do_declaration(
            &cpid(),
            &ocid(),
            &stored.id,
            response("req-declaration", RequirementResponseValue::Boolean(true)),
        )
        .expect("second declaration replaces the first");

    let current = repository.snapshot(&cpid(), &ocid());
    assert_eq!(current[0].requirement_responses.len(), 1);
    assert_eq!(
        current[0].requirement_responses[0].value,
        RequirementResponseValue::Boolean(true)
    );
    assert_eq!(repository.update_batches(), vec![1, 1]);
}

#[test]
fn declaration_for_unknown_qualification_fails() {
    let (service, _, _) = build_service(MemoryRules::default());
    let err = service
        .do_declaration(
            &cpid(),
            &ocid(),
            &crate::workflows::qualification::domain::QualificationId::generate(),
            response("req-declaration", RequirementResponseValue::Boolean(true)),
        )
        .expect_err("nothing stored for the case");
    assert_eq!(validation_code(err), "qualification.unknown");
}

#[test]
fn validation_error_codes_are_stable() {
    assert_eq!(ValidationError::PeriodNotFound.code(), "period.not_found");
    assert_eq!(
        ValidationError::PeriodAlreadyExists.code(),
        "period.already_exists"
    );
    assert_eq!(ValidationError::TokenMismatch.code(), "access.token");
    assert_eq!(ValidationError::OwnerMismatch.code(), "access.owner");
}
