use crate::models::{ChangeRecord, Version};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

// In-memory change history keyed by file id, each list in version order.
// Readers always get an owned snapshot.
#[derive(Debug, Default)]
pub struct HistoryStore {
    histories: RwLock<HashMap<String, Vec<ChangeRecord>>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, file_id: &str) -> Vec<ChangeRecord> {
        self.histories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn latest(&self, file_id: &str) -> Option<ChangeRecord> {
        self.histories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file_id)
            .and_then(|records| records.iter().max_by_key(|r| r.version).cloned())
    }

    pub fn find(&self, file_id: &str, version: Version) -> Option<ChangeRecord> {
        self.histories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file_id)
            .and_then(|records| records.iter().find(|r| r.version == version).cloned())
    }

    // Swaps in the full list for one file
    pub fn replace(&self, file_id: &str, records: Vec<ChangeRecord>) {
        self.histories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file_id.to_string(), records);
    }

    pub fn load(&self, histories: HashMap<String, Vec<ChangeRecord>>) {
        let mut current = self.histories.write().unwrap_or_else(PoisonError::into_inner);
        current.extend(histories);
    }

    pub fn total_records(&self) -> usize {
        self.histories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }
}
