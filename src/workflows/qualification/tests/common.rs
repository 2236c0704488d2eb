use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::workflows::qualification::domain::{
    Country, Cpid, Ocid, OperationType, PeriodEntity, ProcurementMethod, Qualification,
    QualificationId, QualificationStatus, QualificationStatusDetails, Scoring, SubmissionId,
};
use crate::workflows::qualification::repository::{
    PeriodRepository, QualificationRepository, StorageError,
};
use crate::workflows::qualification::rules::{
    PeriodRules, QualificationRules, RuleQuery, RulesError,
};
use crate::workflows::qualification::service::QualificationService;
use crate::workflows::qualification::states::OperationContext;

pub(super) const OWNER: &str = "platform-7";

pub(super) fn cpid() -> Cpid {
    Cpid::parse("ocds-t1s2t3-MD-1580458690892").expect("valid cpid")
}

pub(super) fn ocid() -> Ocid {
    Ocid::parse("ocds-t1s2t3-MD-1580458690892-QA-1580458791496").expect("valid ocid")
}

pub(super) fn country() -> Country {
    Country::parse("MD").expect("valid country")
}

pub(super) fn pmd() -> ProcurementMethod {
    ProcurementMethod::parse("gpa").expect("valid pmd")
}

pub(super) fn context() -> OperationContext {
    OperationContext {
        country: country(),
        pmd: pmd(),
        operation_type: OperationType::parse("qualification").expect("valid operation"),
    }
}

pub(super) fn date(raw: &str) -> DateTime<Utc> {
    raw.parse().expect("valid RFC 3339 date")
}

pub(super) fn qualification(
    when: &str,
    scoring: Option<&str>,
    status_details: Option<QualificationStatusDetails>,
) -> Qualification {
    Qualification {
        id: QualificationId::generate(),
        date: date(when),
        status: QualificationStatus::Pending,
        status_details,
        token: Uuid::new_v4(),
        owner: OWNER.to_string(),
        related_submission: SubmissionId::generate(),
        scoring: scoring.map(|raw| Scoring::parse(raw).expect("valid scoring")),
        requirement_responses: Vec::new(),
    }
}

type CaseKey = (String, String);

fn case_key(cpid: &Cpid, ocid: &Ocid) -> CaseKey {
    (cpid.as_str().to_string(), ocid.as_str().to_string())
}

#[derive(Default)]
pub(super) struct MemoryQualificationRepository {
    rows: Mutex<HashMap<CaseKey, Vec<Qualification>>>,
    update_batches: Mutex<Vec<usize>>,
}

impl MemoryQualificationRepository {
    pub(super) fn seed(&self, cpid: &Cpid, ocid: &Ocid, qualifications: Vec<Qualification>) {
        self.rows
            .lock()
            .expect("repository mutex poisoned")
            .insert(case_key(cpid, ocid), qualifications);
    }

    pub(super) fn snapshot(&self, cpid: &Cpid, ocid: &Ocid) -> Vec<Qualification> {
        self.rows
            .lock()
            .expect("repository mutex poisoned")
            .get(&case_key(cpid, ocid))
            .cloned()
            .unwrap_or_default()
    }

    /// Sizes of the `update_all` batches submitted, in call order.
    pub(super) fn update_batches(&self) -> Vec<usize> {
        self.update_batches
            .lock()
            .expect("repository mutex poisoned")
            .clone()
    }
}

impl QualificationRepository for MemoryQualificationRepository {
    fn find_all(&self, cpid: &Cpid, ocid: &Ocid) -> Result<Vec<Qualification>, StorageError> {
        Ok(self.snapshot(cpid, ocid))
    }

    fn find_by_id(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        id: &QualificationId,
    ) -> Result<Option<Qualification>, StorageError> {
        Ok(self
            .snapshot(cpid, ocid)
            .into_iter()
            .find(|qualification| qualification.id == *id))
    }

    fn save_all(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        qualifications: &[Qualification],
    ) -> Result<bool, StorageError> {
        let mut guard = self.rows.lock().expect("repository mutex poisoned");
        let stored = guard.entry(case_key(cpid, ocid)).or_default();
        if qualifications
            .iter()
            .any(|new| stored.iter().any(|row| row.id == new.id))
        {
            return Ok(false);
        }
        stored.extend_from_slice(qualifications);
        Ok(true)
    }

    fn update_all(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        qualifications: &[Qualification],
    ) -> Result<(), StorageError> {
        self.update_batches
            .lock()
            .expect("repository mutex poisoned")
            .push(qualifications.len());

        let mut guard = self.rows.lock().expect("repository mutex poisoned");
        let stored = guard.entry(case_key(cpid, ocid)).or_default();
        for updated in qualifications {
            match stored.iter_mut().find(|row| row.id == updated.id) {
                Some(row) => *row = updated.clone(),
                None => stored.push(updated.clone()),
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryPeriodRepository {
    rows: Mutex<HashMap<CaseKey, PeriodEntity>>,
}

impl MemoryPeriodRepository {
    pub(super) fn seed(&self, entity: PeriodEntity) {
        self.rows
            .lock()
            .expect("period mutex poisoned")
            .insert(case_key(&entity.cpid, &entity.ocid), entity);
    }

    pub(super) fn stored(&self, cpid: &Cpid, ocid: &Ocid) -> Option<PeriodEntity> {
        self.rows
            .lock()
            .expect("period mutex poisoned")
            .get(&case_key(cpid, ocid))
            .cloned()
    }
}

impl PeriodRepository for MemoryPeriodRepository {
    fn find(&self, cpid: &Cpid, ocid: &Ocid) -> Result<Option<PeriodEntity>, StorageError> {
        Ok(self.stored(cpid, ocid))
    }

    fn save_new(&self, entity: &PeriodEntity) -> Result<bool, StorageError> {
        let mut guard = self.rows.lock().expect("period mutex poisoned");
        let key = case_key(&entity.cpid, &entity.ocid);
        if guard.contains_key(&key) {
            return Ok(false);
        }
        guard.insert(key, entity.clone());
        Ok(true)
    }

    fn update_end(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        end_date: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.rows.lock().expect("period mutex poisoned");
        if let Some(entity) = guard.get_mut(&case_key(cpid, ocid)) {
            entity.end_date = end_date;
        }
        Ok(())
    }
}

/// In-memory rules store. Terms are keyed by (country, pmd); qualification
/// rule values by parameter name only, which is enough for single-case tests.
#[derive(Default)]
pub(super) struct MemoryRules {
    terms: HashMap<(String, String), i64>,
    values: HashMap<String, String>,
}

impl MemoryRules {
    pub(super) fn with_term(mut self, country: &str, pmd: &str, seconds: i64) -> Self {
        self.terms
            .insert((country.to_string(), pmd.to_string()), seconds);
        self
    }

    pub(super) fn with_rule(mut self, parameter: &str, raw: &str) -> Self {
        self.values.insert(parameter.to_string(), raw.to_string());
        self
    }
}

impl PeriodRules for MemoryRules {
    fn minimum_term_seconds(
        &self,
        country: &Country,
        pmd: &ProcurementMethod,
    ) -> Result<Option<i64>, RulesError> {
        Ok(self
            .terms
            .get(&(country.as_str().to_string(), pmd.as_str().to_string()))
            .copied())
    }
}

impl QualificationRules for MemoryRules {
    fn find(&self, query: &RuleQuery<'_>) -> Result<Option<String>, RulesError> {
        Ok(self.values.get(query.parameter).cloned())
    }
}

/// Rules collaborator whose backend is down; every lookup is an incident.
pub(super) struct UnavailableRules;

impl PeriodRules for UnavailableRules {
    fn minimum_term_seconds(
        &self,
        _country: &Country,
        _pmd: &ProcurementMethod,
    ) -> Result<Option<i64>, RulesError> {
        Err(RulesError::Backend("rules store offline".to_string()))
    }
}

impl QualificationRules for UnavailableRules {
    fn find(&self, _query: &RuleQuery<'_>) -> Result<Option<String>, RulesError> {
        Err(RulesError::Backend("rules store offline".to_string()))
    }
}

pub(super) type TestService =
    QualificationService<MemoryQualificationRepository, MemoryPeriodRepository, MemoryRules>;

pub(super) fn build_service(
    rules: MemoryRules,
) -> (
    Arc<TestService>,
    Arc<MemoryQualificationRepository>,
    Arc<MemoryPeriodRepository>,
) {
    let qualifications = Arc::new(MemoryQualificationRepository::default());
    let periods = Arc::new(MemoryPeriodRepository::default());
    let service = Arc::new(QualificationService::new(
        qualifications.clone(),
        periods.clone(),
        Arc::new(rules),
    ));
    (service, qualifications, periods)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
