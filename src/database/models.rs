use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Free,
    Pending,
    Approved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAttemptRecord {
    pub email: String,
    #[serde(default)]
    pub mock_attempts: u32,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub payment_name: String,
    #[serde(default)]
    pub payment_number: String,
}

impl UserAttemptRecord {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            mock_attempts: 0,
            payment_status: PaymentStatus::Free,
            payment_name: String::new(),
            payment_number: String::new(),
        }
    }

    /// Applies a partial update in place, mirroring a document merge.
    pub fn apply(&mut self, update: &RecordUpdate) {
        if let Some(attempts) = update.mock_attempts {
            self.mock_attempts = attempts;
        }
        if let Some(status) = update.payment_status {
            self.payment_status = status;
        }
        if let Some(name) = &update.payment_name {
            self.payment_name = name.clone();
        }
        if let Some(number) = &update.payment_number {
            self.payment_number = number.clone();
        }
    }
}

/// Partial update of a [`UserAttemptRecord`]; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mock_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_number: Option<String>,
}

impl RecordUpdate {
    pub fn attempts(mock_attempts: u32) -> Self {
        Self {
            mock_attempts: Some(mock_attempts),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewLogEntry {
    pub email: String,
    pub attempt_number: u32,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEntry {
    pub email: String,
    pub review: String,
    pub rating: u8,
    pub result: String,
    pub timestamp: DateTime<Utc>,
}
