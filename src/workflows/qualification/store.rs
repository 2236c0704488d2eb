//! Process-local storage backend. Suitable for single-node deployments and
//! demos; the repository traits are the seam a clustered backend plugs into.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::domain::{Cpid, Ocid, PeriodEntity, Qualification, QualificationId};
use super::repository::{PeriodRepository, QualificationRepository, StorageError};

type CaseKey = (String, String);

fn case_key(cpid: &Cpid, ocid: &Ocid) -> CaseKey {
    (cpid.as_str().to_string(), ocid.as_str().to_string())
}

fn poisoned() -> StorageError {
    StorageError::Unavailable("storage lock poisoned".to_string())
}

/// Qualification rows held in memory, keyed by case.
#[derive(Default)]
pub struct InMemoryQualificationStore {
    rows: RwLock<HashMap<CaseKey, Vec<Qualification>>>,
}

impl InMemoryQualificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<CaseKey, Vec<Qualification>>>, StorageError>
    {
        self.rows.read().map_err(|_| poisoned())
    }

    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<CaseKey, Vec<Qualification>>>, StorageError> {
        self.rows.write().map_err(|_| poisoned())
    }
}

impl QualificationRepository for InMemoryQualificationStore {
    fn find_all(&self, cpid: &Cpid, ocid: &Ocid) -> Result<Vec<Qualification>, StorageError> {
        Ok(self
            .read()?
            .get(&case_key(cpid, ocid))
            .cloned()
            .unwrap_or_default())
    }

    fn find_by_id(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        id: &QualificationId,
    ) -> Result<Option<Qualification>, StorageError> {
        Ok(self
            .read()?
            .get(&case_key(cpid, ocid))
            .and_then(|rows| rows.iter().find(|row| row.id == *id).cloned()))
    }

    fn save_all(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        qualifications: &[Qualification],
    ) -> Result<bool, StorageError> {
        let mut guard = self.write()?;
        let stored = guard.entry(case_key(cpid, ocid)).or_default();
        let collision = qualifications
            .iter()
            .any(|new| stored.iter().any(|row| row.id == new.id));
        if collision {
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
        let mut guard = self.write()?;
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

/// Qualification-period rows held in memory, one per case.
#[derive(Default)]
pub struct InMemoryPeriodStore {
    rows: RwLock<HashMap<CaseKey, PeriodEntity>>,
}

impl InMemoryPeriodStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PeriodRepository for InMemoryPeriodStore {
    fn find(&self, cpid: &Cpid, ocid: &Ocid) -> Result<Option<PeriodEntity>, StorageError> {
        Ok(self
            .rows
            .read()
            .map_err(|_| poisoned())?
            .get(&case_key(cpid, ocid))
            .cloned())
    }

    fn save_new(&self, entity: &PeriodEntity) -> Result<bool, StorageError> {
        let mut guard = self.rows.write().map_err(|_| poisoned())?;
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
        let mut guard = self.rows.write().map_err(|_| poisoned())?;
        if let Some(entity) = guard.get_mut(&case_key(cpid, ocid)) {
            entity.end_date = end_date;
        }
        Ok(())
    }
}
