use thiserror::Error;

use crate::database::StoreError;

/// Failures the turn controller can run into. None of these escape the
/// controller as faults; each one is turned into a status line for the user
/// and, where it makes sense, a retry action.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterviewError {
    #[error("Free interview attempts exhausted")]
    EntitlementDenied,
    #[error("Payment is pending approval")]
    ApprovalPending,
    #[error("Speech recognition failed: {0}")]
    RecognitionFailure(String),
    #[error("Completion reply is not a valid new question: {reply}")]
    InvalidCompletionReply { reply: String },
    #[error("Completion service failed: {0}")]
    CompletionServiceFailure(String),
    #[error("Applicant profile missing: {0}")]
    ProfileMissing(String),
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid review: {0}")]
    InvalidReview(String),
    #[error("Invalid payment details: {0}")]
    InvalidPaymentDetails(String),
}

impl InterviewError {
    /// Text shown to the user in place of the raw error.
    pub fn status_message(&self) -> String {
        match self {
            InterviewError::EntitlementDenied => {
                "You have used your 5 free AI mock interviews. Submit your payment details to continue.".to_string()
            }
            InterviewError::ApprovalPending => {
                "Your payment is pending approval. Please wait for admin approval.".to_string()
            }
            InterviewError::RecognitionFailure(_) => {
                "Voice recognition stopped. Restart listening to continue your answer.".to_string()
            }
            InterviewError::InvalidCompletionReply { reply } => format!(
                "AI did not provide a valid new question. Please retry.\nAI Response: {}",
                reply
            ),
            InterviewError::CompletionServiceFailure(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            InterviewError::ProfileMissing(_) => {
                "Please complete your I-20 details before starting the interview.".to_string()
            }
            InterviewError::Store(_) => {
                "Could not reach your account record. Please try again later.".to_string()
            }
            InterviewError::InvalidReview(reason) => format!("Review not accepted: {}", reason),
            InterviewError::InvalidPaymentDetails(_) => {
                "Failed to submit payment info. Please check your details and try again.".to_string()
            }
        }
    }

    /// Whether the user has an explicit retry action for this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InterviewError::RecognitionFailure(_)
                | InterviewError::InvalidCompletionReply { .. }
                | InterviewError::CompletionServiceFailure(_)
                | InterviewError::Store(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_and_denied_are_distinct() {
        let pending = InterviewError::ApprovalPending;
        let denied = InterviewError::EntitlementDenied;
        assert_ne!(pending.status_message(), denied.status_message());
        assert!(!pending.is_retryable());
        assert!(!denied.is_retryable());
    }

    #[test]
    fn test_invalid_reply_surfaces_raw_reply() {
        let err = InterviewError::InvalidCompletionReply {
            reply: "I see.".to_string(),
        };
        assert!(err.status_message().contains("I see."));
        assert!(err.is_retryable());
    }
}
