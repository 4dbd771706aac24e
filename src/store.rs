use anyhow::Result;
use std::collections::BTreeMap;

use crate::models::{EmployerRecord, employer_key};

/// Per-employer persistence. Keys are normalised with [`employer_key`] by
/// every implementation, so callers may pass display names.
pub trait RecordStore {
    fn find(&self, employer: &str) -> Result<Option<EmployerRecord>>;
    fn upsert(&mut self, record: &EmployerRecord) -> Result<()>;
    fn all(&self) -> Result<Vec<EmployerRecord>>;
    /// Makes everything written so far durable.
    fn flush(&mut self) -> Result<()>;
}

/// In-memory store, used for previews and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, EmployerRecord>,
    flushes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = EmployerRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|r| (employer_key(&r.employer_key), r))
                .collect(),
            flushes: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl RecordStore for MemoryStore {
    fn find(&self, employer: &str) -> Result<Option<EmployerRecord>> {
        Ok(self.records.get(&employer_key(employer)).cloned())
    }

    fn upsert(&mut self, record: &EmployerRecord) -> Result<()> {
        self.records
            .insert(employer_key(&record.employer_key), record.clone());
        Ok(())
    }

    fn all(&self) -> Result<Vec<EmployerRecord>> {
        Ok(self.records.values().cloned().collect())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
