use chrono::{DateTime, Utc};

use super::domain::{Cpid, Ocid, PeriodEntity, Qualification, QualificationId};

/// Incident-class storage failures. Details are logged, never exposed to the
/// caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("stored record is corrupted: {0}")]
    Corrupted(String),
}

/// Storage abstraction over the qualification column family. Batched writes
/// (`save_all`, `update_all`) are submitted as a single atomic batch; the
/// service treats them as all-or-nothing and performs no retries.
pub trait QualificationRepository: Send + Sync {
    fn find_all(&self, cpid: &Cpid, ocid: &Ocid) -> Result<Vec<Qualification>, StorageError>;

    fn find_by_id(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        id: &QualificationId,
    ) -> Result<Option<Qualification>, StorageError>;

    /// Inserts the batch IF NOT EXISTS: when any id is already present,
    /// nothing is written and the call reports `false`.
    fn save_all(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        qualifications: &[Qualification],
    ) -> Result<bool, StorageError>;

    fn update_all(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        qualifications: &[Qualification],
    ) -> Result<(), StorageError>;
}

/// Storage abstraction over the qualification-period row. Creation is
/// idempotent (`save_new` carries IF NOT EXISTS semantics and reports whether
/// the write was applied); end-date extension is a plain update.
pub trait PeriodRepository: Send + Sync {
    fn find(&self, cpid: &Cpid, ocid: &Ocid) -> Result<Option<PeriodEntity>, StorageError>;

    fn save_new(&self, entity: &PeriodEntity) -> Result<bool, StorageError>;

    fn update_end(
        &self,
        cpid: &Cpid,
        ocid: &Ocid,
        end_date: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}
