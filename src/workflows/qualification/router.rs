use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use super::domain::{
    Country, Cpid, Ocid, OperationType, Period, ProcurementMethod, QualificationId,
    QualificationSystemMethod, ReductionCriteria, RequirementResponse,
};
use super::repository::{PeriodRepository, QualificationRepository};
use super::rules::{PeriodRules, QualificationRules};
use super::service::{
    CreateQualificationsParams, DoQualificationItem, QualificationService, ServiceError,
};
use super::states::OperationContext;

/// Router exposing the qualification commands as JSON endpoints.
pub fn qualification_router<S, P, R>(service: Arc<QualificationService<S, P, R>>) -> Router
where
    S: QualificationRepository + 'static,
    P: PeriodRepository + 'static,
    R: PeriodRules + QualificationRules + 'static,
{
    Router::new()
        .route("/api/v1/qualifications", post(create_handler::<S, P, R>))
        .route(
            "/api/v1/qualifications/consideration",
            post(consideration_handler::<S, P, R>),
        )
        .route(
            "/api/v1/qualifications/declaration",
            post(declaration_handler::<S, P, R>),
        )
        .route(
            "/api/v1/qualifications/qualification",
            post(do_qualification_handler::<S, P, R>),
        )
        .route(
            "/api/v1/qualifications/finalization",
            post(finalization_handler::<S, P, R>),
        )
        .route(
            "/api/v1/qualifications/next",
            post(next_handler::<S, P, R>),
        )
        .route(
            "/api/v1/qualifications/state-check",
            post(state_check_handler::<S, P, R>),
        )
        .route("/api/v1/period", post(save_period_handler::<S, P, R>))
        .route(
            "/api/v1/period/validate",
            post(validate_period_handler::<S, P, R>),
        )
        .route(
            "/api/v1/period/check",
            post(check_period_handler::<S, P, R>),
        )
        .route(
            "/api/v1/period/date-check",
            post(date_check_handler::<S, P, R>),
        )
        .with_state(service)
}

/// Maps the two-tier error taxonomy to HTTP: validation failures return their
/// code and description, incidents return an opaque reference and are logged
/// with full context.
fn error_response(err: ServiceError) -> Response {
    match err {
        ServiceError::Validation(validation) => {
            let payload = json!({
                "errors": [{
                    "code": validation.code(),
                    "description": validation.to_string(),
                }],
            });
            (StatusCode::BAD_REQUEST, Json(payload)).into_response()
        }
        incident => {
            let reference = Uuid::new_v4();
            error!(incident = %reference, detail = %incident, "qualification command failed");
            let payload = json!({ "incident": { "id": reference.to_string() } });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

async fn create_handler<S, P, R>(
    State(service): State<Arc<QualificationService<S, P, R>>>,
    Json(params): Json<CreateQualificationsParams>,
) -> Response
where
    S: QualificationRepository + 'static,
    P: PeriodRepository + 'static,
    R: PeriodRules + QualificationRules + 'static,
{
    match service.create_qualifications(params) {
        Ok(created) => {
            (StatusCode::CREATED, Json(json!({ "qualifications": created }))).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsiderationRequest {
    cpid: Cpid,
    ocid: Ocid,
    qualification_ids: Vec<QualificationId>,
}

async fn consideration_handler<S, P, R>(
    State(service): State<Arc<QualificationService<S, P, R>>>,
    Json(request): Json<ConsiderationRequest>,
) -> Response
where
    S: QualificationRepository + 'static,
    P: PeriodRepository + 'static,
    R: PeriodRules + QualificationRules + 'static,
{
    match service.do_consideration(&request.cpid, &request.ocid, &request.qualification_ids) {
        Ok(updated) => (StatusCode::OK, Json(json!({ "qualifications": updated }))).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeclarationRequest {
    cpid: Cpid,
    ocid: Ocid,
    qualification_id: QualificationId,
    token: Uuid,
    owner: String,
    requirement_response: RequirementResponse,
}

async fn declaration_handler<S, P, R>(
    State(service): State<Arc<QualificationService<S, P, R>>>,
    Json(request): Json<DeclarationRequest>,
) -> Response
where
    S: QualificationRepository + 'static,
    P: PeriodRepository + 'static,
    R: PeriodRules + QualificationRules + 'static,
{
    let granted = service.check_access(
        &request.cpid,
        &request.ocid,
        &request.qualification_id,
        &request.token,
        &request.owner,
    );
    if let Err(err) = granted {
        return error_response(err);
    }

    match service.do_declaration(
        &request.cpid,
        &request.ocid,
        &request.qualification_id,
        request.requirement_response,
    ) {
        Ok(updated) => (StatusCode::OK, Json(json!({ "qualification": updated }))).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DoQualificationRequest {
    cpid: Cpid,
    ocid: Ocid,
    country: Country,
    pmd: ProcurementMethod,
    operation_type: OperationType,
    qualifications: Vec<DoQualificationItem>,
}

async fn do_qualification_handler<S, P, R>(
    State(service): State<Arc<QualificationService<S, P, R>>>,
    Json(request): Json<DoQualificationRequest>,
) -> Response
where
    S: QualificationRepository + 'static,
    P: PeriodRepository + 'static,
    R: PeriodRules + QualificationRules + 'static,
{
    let context = OperationContext {
        country: request.country,
        pmd: request.pmd,
        operation_type: request.operation_type,
    };
    match service.do_qualification(
        &request.cpid,
        &request.ocid,
        &context,
        &request.qualifications,
    ) {
        Ok(updated) => (StatusCode::OK, Json(json!({ "qualifications": updated }))).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaseOperationRequest {
    cpid: Cpid,
    ocid: Ocid,
    country: Country,
    pmd: ProcurementMethod,
    operation_type: OperationType,
}

async fn finalization_handler<S, P, R>(
    State(service): State<Arc<QualificationService<S, P, R>>>,
    Json(request): Json<CaseOperationRequest>,
) -> Response
where
    S: QualificationRepository + 'static,
    P: PeriodRepository + 'static,
    R: PeriodRules + QualificationRules + 'static,
{
    let context = OperationContext {
        country: request.country,
        pmd: request.pmd,
        operation_type: request.operation_type,
    };
    match service.finalize_qualifications(&request.cpid, &request.ocid, &context) {
        Ok(updated) => (StatusCode::OK, Json(json!({ "qualifications": updated }))).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextForQualificationRequest {
    cpid: Cpid,
    ocid: Ocid,
    country: Country,
    pmd: ProcurementMethod,
    operation_type: OperationType,
    reduction_criteria: ReductionCriteria,
    qualification_system_method: QualificationSystemMethod,
}

async fn next_handler<S, P, R>(
    State(service): State<Arc<QualificationService<S, P, R>>>,
    Json(request): Json<NextForQualificationRequest>,
) -> Response
where
    S: QualificationRepository + 'static,
    P: PeriodRepository + 'static,
    R: PeriodRules + QualificationRules + 'static,
{
    let context = OperationContext {
        country: request.country,
        pmd: request.pmd,
        operation_type: request.operation_type,
    };
    match service.set_next_for_qualification(
        &request.cpid,
        &request.ocid,
        &context,
        request.reduction_criteria,
        request.qualification_system_method,
    ) {
        Ok(updated) => (StatusCode::OK, Json(json!({ "qualifications": updated }))).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateCheckRequest {
    cpid: Cpid,
    ocid: Ocid,
    qualification_id: QualificationId,
    country: Country,
    pmd: ProcurementMethod,
    operation_type: OperationType,
}

async fn state_check_handler<S, P, R>(
    State(service): State<Arc<QualificationService<S, P, R>>>,
    Json(request): Json<StateCheckRequest>,
) -> Response
where
    S: QualificationRepository + 'static,
    P: PeriodRepository + 'static,
    R: PeriodRules + QualificationRules + 'static,
{
    let context = OperationContext {
        country: request.country,
        pmd: request.pmd,
        operation_type: request.operation_type,
    };
    match service.check_qualification_state(
        &request.cpid,
        &request.ocid,
        &request.qualification_id,
        &context,
    ) {
        Ok(()) => (StatusCode::OK, Json(json!({ "permitted": true }))).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavePeriodRequest {
    cpid: Cpid,
    ocid: Ocid,
    period: Period,
    country: Country,
    pmd: ProcurementMethod,
}

async fn save_period_handler<S, P, R>(
    State(service): State<Arc<QualificationService<S, P, R>>>,
    Json(request): Json<SavePeriodRequest>,
) -> Response
where
    S: QualificationRepository + 'static,
    P: PeriodRepository + 'static,
    R: PeriodRules + QualificationRules + 'static,
{
    match service.save_period(
        &request.cpid,
        &request.ocid,
        request.period,
        &request.country,
        &request.pmd,
    ) {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "period": request.period }))).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidatePeriodRequest {
    period: Period,
    country: Country,
    pmd: ProcurementMethod,
}

async fn validate_period_handler<S, P, R>(
    State(service): State<Arc<QualificationService<S, P, R>>>,
    Json(request): Json<ValidatePeriodRequest>,
) -> Response
where
    S: QualificationRepository + 'static,
    P: PeriodRepository + 'static,
    R: PeriodRules + QualificationRules + 'static,
{
    match service.validate_period(&request.period, &request.country, &request.pmd) {
        Ok(()) => (StatusCode::OK, Json(json!({ "valid": true }))).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckPeriodRequest {
    cpid: Cpid,
    ocid: Ocid,
    period: Period,
}

async fn check_period_handler<S, P, R>(
    State(service): State<Arc<QualificationService<S, P, R>>>,
    Json(request): Json<CheckPeriodRequest>,
) -> Response
where
    S: QualificationRepository + 'static,
    P: PeriodRepository + 'static,
    R: PeriodRules + QualificationRules + 'static,
{
    match service.check_period(&request.cpid, &request.ocid, &request.period) {
        Ok(outcome) => {
            let payload = json!({
                "endDateChanged": outcome.end_date_changed,
                "period": outcome.effective,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DateCheckRequest {
    cpid: Cpid,
    ocid: Ocid,
    date: DateTime<Utc>,
}

async fn date_check_handler<S, P, R>(
    State(service): State<Arc<QualificationService<S, P, R>>>,
    Json(request): Json<DateCheckRequest>,
) -> Response
where
    S: QualificationRepository + 'static,
    P: PeriodRepository + 'static,
    R: PeriodRules + QualificationRules + 'static,
{
    match service.check_qualification_period(&request.cpid, &request.ocid, request.date) {
        Ok(()) => (StatusCode::OK, Json(json!({ "valid": true }))).into_response(),
        Err(err) => error_response(err),
    }
}
