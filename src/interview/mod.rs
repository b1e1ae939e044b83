pub mod decision;
pub mod driver;
pub mod engine;
pub mod entitlement;
pub mod profile;
pub mod prompts;
pub mod questions;
pub mod session;

pub use decision::{extract_decision, Decision};
pub use driver::{run_interview, CommandReceiver, CommandSender, UserCommand};
pub use engine::{InterviewController, Outcome};
pub use entitlement::{attempts_left, check_entitlement, request_upgrade, AttemptsLeft, PaymentDetails};
pub use profile::ApplicantProfile;
pub use session::{InterviewSession, Phase, Turn};
