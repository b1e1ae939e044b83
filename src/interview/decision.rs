use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_VERDICT: &str = "Your visa application is denied.";
pub const DEFAULT_FEEDBACK: &str = "No feedback available.";

static DECISION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)DECISION:\s*(.*?)\s*(?:FEEDBACK:|$)").expect("valid decision pattern"));
static FEEDBACK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)FEEDBACK:\s*(.*)$").expect("valid feedback pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: String,
    pub feedback: String,
    pub accepted: bool,
    /// False when the verdict is the conservative default rather than the
    /// service's own words.
    pub extracted: bool,
}

impl Decision {
    /// Used whenever no verdict can be obtained from the service.
    pub fn conservative_default() -> Self {
        Self {
            verdict: DEFAULT_VERDICT.to_string(),
            feedback: DEFAULT_FEEDBACK.to_string(),
            accepted: false,
            extracted: false,
        }
    }
}

/// Extracts the `DECISION:` and `FEEDBACK:` segments of a closing reply.
/// Missing segments are replaced by the defaults; this never fails.
pub fn extract_decision(reply: &str) -> Decision {
    let verdict = capture(&DECISION_RE, reply);
    let feedback = capture(&FEEDBACK_RE, reply);

    if verdict.is_none() {
        warn!(
            "No DECISION segment in reply, using default: {}",
            reply.chars().take(50).collect::<String>()
        );
    }

    let extracted = verdict.is_some();
    let verdict = verdict.unwrap_or_else(|| DEFAULT_VERDICT.to_string());
    Decision {
        accepted: verdict.to_lowercase().contains("accepted"),
        verdict,
        feedback: feedback.unwrap_or_else(|| DEFAULT_FEEDBACK.to_string()),
        extracted,
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}
