use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::models::{RecordUpdate, UserAttemptRecord};
use super::{RecordStore, Result, StoreError};

/// Process-local record store, used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<String, UserAttemptRecord>>,
    logs: Mutex<HashMap<String, Vec<serde_json::Value>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, user_key: &str, record: UserAttemptRecord) -> Self {
        self.records.lock().insert(user_key.to_string(), record);
        self
    }

    pub fn record(&self, user_key: &str) -> Option<UserAttemptRecord> {
        self.records.lock().get(user_key).cloned()
    }

    pub fn log_entries(&self, collection: &str) -> Vec<serde_json::Value> {
        self.logs.lock().get(collection).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, user_key: &str) -> Result<Option<UserAttemptRecord>> {
        Ok(self.records.lock().get(user_key).cloned())
    }

    async fn create(&self, user_key: &str, record: &UserAttemptRecord) -> Result<()> {
        self.records.lock().insert(user_key.to_string(), record.clone());
        Ok(())
    }

    async fn update(&self, user_key: &str, update: &RecordUpdate) -> Result<()> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(user_key)
            .ok_or_else(|| StoreError::RecordNotFound(user_key.to_string()))?;
        record.apply(update);
        Ok(())
    }

    async fn append_log(&self, collection: &str, entry: serde_json::Value) -> Result<()> {
        self.logs
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(entry);
        Ok(())
    }
}
