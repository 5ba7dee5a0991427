use crate::models::chat::ConversationHistoryEntry;

pub const DEMO_BUTTON_SENTINEL: &str = "DEMO_BUTTON";

const RECENT_WINDOW: usize = 4;

// two prior exchanges
const MIN_HISTORY_FOR_SOFT_INTENT: usize = 4;

pub const HIGH_INTENT_KEYWORDS: &[&str] = &[
    "price",
    "pricing",
    "cost",
    "demo",
    "schedule",
    "book",
    "trial",
    "consultation",
    "meeting",
    "get started",
    "sign up",
    "ready to",
    "want to try",
];

pub const MEDIUM_INTENT_PHRASES: &[&str] = &[
    "tell me more",
    "sounds good",
    "how does it work",
    "interested",
    "learn more",
    "more information",
    "makes sense",
];

pub fn should_show_demo_button(
    message: &str,
    reply: &str,
    history: &[ConversationHistoryEntry]
) -> bool {
    if demo_recently_shown(history) {
        return false;
    }

    let message = message.to_lowercase();
    let reply = reply.to_lowercase();

    let high_intent =
        contains_any(&message, HIGH_INTENT_KEYWORDS) || contains_any(&reply, HIGH_INTENT_KEYWORDS);
    let soft_intent =
        contains_any(&message, MEDIUM_INTENT_PHRASES) &&
        history.len() >= MIN_HISTORY_FOR_SOFT_INTENT;

    high_intent || soft_intent
}

pub fn demo_recently_shown(history: &[ConversationHistoryEntry]) -> bool {
    history
        .iter()
        .rev()
        .take(RECENT_WINDOW)
        .any(|entry| entry.content == DEMO_BUTTON_SENTINEL)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
