use log::info;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::database::{get_or_create, PaymentStatus, RecordStore, RecordUpdate, UserAttemptRecord};
use crate::error::InterviewError;

/// Interviews a user may take before an approved payment is required.
pub const FREE_ATTEMPT_LIMIT: u32 = 5;

/// Gate applied before a session may ask its first question.
///
/// A pending payment blocks regardless of the counter; otherwise the user
/// needs free attempts left or an approved payment.
pub fn check_entitlement(record: &UserAttemptRecord) -> Result<(), InterviewError> {
    match record.payment_status {
        PaymentStatus::Pending => Err(InterviewError::ApprovalPending),
        PaymentStatus::Approved => Ok(()),
        PaymentStatus::Free if record.mock_attempts < FREE_ATTEMPT_LIMIT => Ok(()),
        PaymentStatus::Free => Err(InterviewError::EntitlementDenied),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptsLeft {
    Limited(u32),
    Unlimited,
}

pub fn attempts_left(record: &UserAttemptRecord) -> AttemptsLeft {
    if record.payment_status == PaymentStatus::Approved {
        AttemptsLeft::Unlimited
    } else {
        AttemptsLeft::Limited(FREE_ATTEMPT_LIMIT.saturating_sub(record.mock_attempts))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaymentDetails {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 5, max = 20))]
    pub number: String,
}

/// Submits payment details and parks the account in `pending` until an
/// administrator approves it.
pub async fn request_upgrade(
    store: &dyn RecordStore,
    user_key: &str,
    details: &PaymentDetails,
) -> Result<UserAttemptRecord, InterviewError> {
    details
        .validate()
        .map_err(|e| InterviewError::InvalidPaymentDetails(e.to_string()))?;

    let mut record = get_or_create(store, user_key).await?;
    let update = RecordUpdate {
        payment_status: Some(PaymentStatus::Pending),
        payment_name: Some(details.name.trim().to_string()),
        payment_number: Some(details.number.trim().to_string()),
        ..Default::default()
    };
    store.update(user_key, &update).await?;
    record.apply(&update);

    info!("💳 Payment details submitted for {}, awaiting approval", user_key);
    Ok(record)
}
