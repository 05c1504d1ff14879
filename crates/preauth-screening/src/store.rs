//! In-memory declared-condition store.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::info;

use preauth_contracts::{
    error::{PreauthError, PreauthResult},
    screening::HdRecord,
};
use preauth_core::traits::HdRecordStore;

/// Read-mostly HD record store keyed by member id.
///
/// Screening takes the read lock; only `add_record` takes the write lock.
#[derive(Debug, Default)]
pub struct InMemoryHdStore {
    records: RwLock<HashMap<String, Vec<HdRecord>>>,
}

impl InMemoryHdStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members with at least one declaration.
    pub fn member_count(&self) -> PreauthResult<usize> {
        let records = self
            .records
            .read()
            .map_err(|e| PreauthError::store(format!("hd store lock poisoned: {e}")))?;
        Ok(records.len())
    }
}

impl HdRecordStore for InMemoryHdStore {
    fn get_records(&self, member_id: &str) -> PreauthResult<Vec<HdRecord>> {
        let records = self
            .records
            .read()
            .map_err(|e| PreauthError::store(format!("hd store lock poisoned: {e}")))?;
        Ok(records.get(member_id).cloned().unwrap_or_default())
    }

    fn add_record(&self, member_id: &str, mut record: HdRecord) -> PreauthResult<()> {
        if record.icd10_code.trim().is_empty() {
            return Err(PreauthError::store(format!(
                "hd record for member '{member_id}' has no icd10 code"
            )));
        }
        record.member_id = member_id.to_string();

        let mut records = self
            .records
            .write()
            .map_err(|e| PreauthError::store(format!("hd store lock poisoned: {e}")))?;
        info!(
            member_id = %member_id,
            icd10_code = %record.icd10_code,
            condition = %record.condition_name,
            "hd record added"
        );
        records.entry(member_id.to_string()).or_default().push(record);
        Ok(())
    }
}
