use crate::completion::ChatMessage;

use super::profile::ApplicantProfile;
use super::session::Turn;

/// System prompt for the visa-officer persona, built from the applicant's
/// program and cost figures.
pub fn build_persona_prompt(profile: &ApplicantProfile) -> String {
    let mut prompt = String::from("You are a US visa officer conducting an F1 student visa interview.");

    prompt.push_str(&format!(
        "\nThe applicant plans to study at {} in the {} program.",
        profile.university_name, profile.program_name
    ));
    prompt.push_str(&format!(
        "\nTheir total cost of attendance is ${}, with tuition of ${} and living costs of ${}.",
        profile.total_coa, profile.tuition, profile.living_cost
    ));
    prompt.push_str(&format!("\nThey have a scholarship of ${}.", profile.scholarship));

    prompt.push_str("\n\nRules for the interview:");
    prompt.push_str("\n1. First ask whether this is their first attempt; if not, ask what has changed since the last one.");
    prompt.push_str("\n2. Ask only short, direct questions about study plans, finances and ties to the home country.");
    prompt.push_str("\n3. Never say 'thank you for your response', 'I appreciate' or 'for example'.");
    prompt.push_str("\n4. Do not explain or give examples in your questions.");
    prompt.push_str("\n5. Ask exactly one concise question at a time, on the first line of your reply.");
    prompt.push_str("\n6. If an answer is unclear, ask a short follow-up question to clarify it.");

    prompt
}

pub fn opening_question(profile: &ApplicantProfile) -> String {
    format!("Why did you choose to study at {}?", profile.university_name)
}

/// Message list for the next-question call. The service keeps no state, so
/// the full history is replayed every time: persona, then each turn as an
/// assistant question and user answer, then the open question and the newest
/// answer.
pub fn build_conversation(
    system_prompt: &str,
    turns: &[Turn],
    open_question: &str,
    answer: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len() * 2 + 3);
    messages.push(ChatMessage::system(system_prompt));
    for turn in turns {
        messages.push(ChatMessage::assistant(turn.question.as_str()));
        messages.push(ChatMessage::user(turn.answer.as_str()));
    }
    messages.push(ChatMessage::assistant(open_question));
    messages.push(ChatMessage::user(answer));
    messages
}

const DECISION_PROMPT: &str = "You are a US visa officer. Based on the applicant's interview below, evaluate their F1 visa application. Consider:
1. Financial stability and ability to pay for education
2. Strong ties to the home country
3. Clear study plans and career goals
4. Consistency of the answers
5. Academic preparation

Decide with exactly one of these sentences:
- 'Your visa is accepted.' (strong financial backing, clear goals and strong home ties)
- 'Your visa application is denied.' (concerns about finances, weak ties or unclear plans)

Then give specific feedback: their strongest points, the areas that need improvement, and concrete advice for their next attempt.

Format your response exactly like this:
DECISION: [Your decision sentence]
FEEDBACK: [Your detailed feedback]";

/// Message list for the closing call that asks for a verdict instead of a
/// question. The transcript includes the final, not yet committed answer.
pub fn build_decision_conversation(
    profile: &ApplicantProfile,
    turns: &[Turn],
    open_question: &str,
    answer: &str,
) -> Vec<ChatMessage> {
    let mut transcript = format!(
        "Applicant: {} program at {} (total cost ${}, scholarship ${}).\n",
        profile.program_name, profile.university_name, profile.total_coa, profile.scholarship
    );
    let history = turns
        .iter()
        .map(|t| (t.question.as_str(), t.answer.as_str()))
        .chain(std::iter::once((open_question, answer)));
    for (i, (question, answer)) in history.enumerate() {
        transcript.push_str(&format!("\nQ{}: {}\nA{}: {}", i + 1, question, i + 1, answer));
    }

    vec![ChatMessage::system(DECISION_PROMPT), ChatMessage::user(transcript)]
}
