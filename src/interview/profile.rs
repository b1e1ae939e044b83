use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::InterviewError;

/// The applicant's I-20 figures. The persona prompt and the opening question
/// are built from it, so an interview cannot start without one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantProfile {
    #[validate(custom = "not_blank")]
    pub university_name: String,
    #[validate(custom = "not_blank")]
    pub program_name: String,
    #[serde(default)]
    pub tuition: String,
    #[serde(default)]
    pub living_cost: String,
    #[serde(default)]
    pub scholarship: String,
    #[serde(default, rename = "totalCOA")]
    pub total_coa: String,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

impl ApplicantProfile {
    pub fn from_json(json: &str) -> Result<Self, InterviewError> {
        let profile: ApplicantProfile = serde_json::from_str(json)
            .map_err(|e| InterviewError::ProfileMissing(format!("unreadable profile: {}", e)))?;
        profile
            .validate()
            .map_err(|e| InterviewError::ProfileMissing(e.to_string()))?;
        Ok(profile)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, InterviewError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            warn!("No applicant profile at {}: {}", path.display(), e);
            InterviewError::ProfileMissing(format!("{}: {}", path.display(), e))
        })?;
        let profile = Self::from_json(&json)?;
        info!("📋 Loaded profile for {} ({})", profile.university_name, profile.program_name);
        Ok(profile)
    }
}
