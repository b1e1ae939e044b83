pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::InMemoryRecordStore;
pub use models::{InterviewLogEntry, PaymentStatus, RecordUpdate, ReviewEntry, UserAttemptRecord};
pub use postgres::PostgresRecordStore;

use async_trait::async_trait;
use thiserror::Error;

/// Collection receiving one entry per started interview.
pub const INTERVIEW_LOGS: &str = "interview_logs";
/// Collection receiving post-interview reviews.
pub const VOICE_REVIEWS: &str = "ai_voice_reviews";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Record not found: {0}")]
    RecordNotFound(String),
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Document store holding per-user attempt records and append-only logs.
///
/// No transactional guarantees are required: every user has at most one
/// active session and the only counter mutation is a monotonic increment.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, user_key: &str) -> Result<Option<UserAttemptRecord>>;

    async fn create(&self, user_key: &str, record: &UserAttemptRecord) -> Result<()>;

    /// Merges the set fields of `update` into an existing record.
    async fn update(&self, user_key: &str, update: &RecordUpdate) -> Result<()>;

    async fn append_log(&self, collection: &str, entry: serde_json::Value) -> Result<()>;
}

/// Reads the record for `user_key`, creating the default one when absent.
pub async fn get_or_create(store: &dyn RecordStore, user_key: &str) -> Result<UserAttemptRecord> {
    if let Some(record) = store.get(user_key).await? {
        return Ok(record);
    }

    log::info!("Creating attempt record for {}", user_key);
    let record = UserAttemptRecord::new(user_key);
    store.create(user_key, &record).await?;
    Ok(record)
}
