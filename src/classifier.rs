//! Intent Router
//!
//! Classifies each user message as one of:
//! - customer_request: banking operations on the user's own cards
//! - friendly_chat: greetings and small talk
//! - general_query: questions answered from the knowledge base
//! - fallback: everything else
//!
//! Short replies to a banking question ("5000214044289662", "the second one")
//! take a fast path that skips the model.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::llm::{invoke_within, ChatModel};
use crate::memory::Turn;
use crate::models::Intent;
use crate::prompts::INTENT_PROMPT;

/// Static cue list, zero allocation
const BANKING_CUES: &[&str] = &[
    // Instruments
    "card", "pin", "account",
    // Data
    "transaction", "balance", "statement",
    // Asks
    "provide", "which", "confirm", "enter",
];

const FAST_PATH_MAX_TOKENS: usize = 3;

/// Characters of the previous assistant turn inspected for cues
const CUE_WINDOW_CHARS: usize = 300;

pub struct IntentRouter {
    model: Arc<dyn ChatModel>,
    timeout: Duration,
}

impl IntentRouter {
    pub fn new(model: Arc<dyn ChatModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// Classify `user_text`, given the previous assistant turn if any.
    pub async fn classify(&self, user_text: &str, previous_assistant: Option<&str>) -> Intent {
        if is_banking_follow_up(user_text, previous_assistant) {
            debug!("Fast path: short reply to banking question");
            return Intent::CustomerRequest;
        }

        let mut prompt = String::from(INTENT_PROMPT);
        if let Some(previous) = previous_assistant {
            prompt.push_str("\n\nPrevious assistant message:\n");
            prompt.push_str(tail(previous, CUE_WINDOW_CHARS));
        }

        let messages = [Turn::system(prompt), Turn::user(user_text)];

        match invoke_within(self.model.as_ref(), &messages, &[], self.timeout).await {
            Ok(response) => {
                let intent = Intent::from_label(&response.content);
                debug!(label = %response.content, intent = %intent, "Classifier label");
                intent
            }
            Err(e) => {
                warn!(error = %e, "Intent classification failed, using fallback");
                Intent::Fallback
            }
        }
    }
}

/// Fast path heuristic
fn is_banking_follow_up(user_text: &str, previous_assistant: Option<&str>) -> bool {
    let Some(previous) = previous_assistant else {
        return false;
    };

    let previous = tail(previous, CUE_WINDOW_CHARS).to_lowercase();
    if !BANKING_CUES.iter().any(|cue| previous.contains(cue)) {
        return false;
    }

    let text = user_text.trim();
    if text.is_empty() {
        return false;
    }

    let numeric = text
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_whitespace() || c == '-' || c == '*');

    numeric || text.split_whitespace().count() <= FAST_PATH_MAX_TOKENS
}

/// Last `max_chars` characters, respecting char boundaries
fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((index, _)) => &text[index..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::DEFAULT_ROUND_TIMEOUT;
    use crate::llm::{ScriptStep, ScriptedModel};
    use crate::models::ModelResponse;

    fn router_with(steps: Vec<ScriptStep>) -> (IntentRouter, Arc<ScriptedModel>) {
        let model = Arc::new(ScriptedModel::new(steps));
        (IntentRouter::new(model.clone(), DEFAULT_ROUND_TIMEOUT), model)
    }

    #[tokio::test]
    async fn test_numeric_reply_after_card_question_skips_model() {
        let (router, model) = router_with(vec![]);

        let intent = router
            .classify("5000214044289662", Some("Which card would you like to use?"))
            .await;

        assert_eq!(intent, Intent::CustomerRequest);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_short_reply_after_pin_question_skips_model() {
        let (router, model) = router_with(vec![]);

        let intent = router
            .classify("it's 4321", Some("Please provide your current PIN."))
            .await;

        assert_eq!(intent, Intent::CustomerRequest);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_model_labels() {
        let cases = vec![
            ("customer_request", Intent::CustomerRequest),
            ("friendly_chat", Intent::FriendlyChat),
            ("general_query", Intent::GeneralQuery),
            ("sql_query", Intent::Fallback),
        ];

        for (label, expected) in cases {
            let (router, model) = router_with(vec![ScriptStep::Reply(ModelResponse::text(label))]);
            let intent = router.classify("what are your branch opening hours?", None).await;
            assert_eq!(intent, expected, "label {}", label);
            assert_eq!(model.call_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_short_reply_without_banking_context_uses_model() {
        let (router, model) =
            router_with(vec![ScriptStep::Reply(ModelResponse::text("friendly_chat"))]);

        let intent = router.classify("thanks!", Some("Have a great day!")).await;

        assert_eq!(intent, Intent::FriendlyChat);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_classifier_failure_is_fallback() {
        let (router, _) = router_with(vec![ScriptStep::Fail("timeout".into())]);
        assert_eq!(router.classify("hello there friend", None).await, Intent::Fallback);
    }

    #[tokio::test]
    async fn test_hung_classifier_is_fallback() {
        let model = Arc::new(ScriptedModel::new(vec![ScriptStep::Delay(
            Duration::from_secs(3600),
            ModelResponse::text("customer_request"),
        )]));
        let router = IntentRouter::new(model, Duration::from_millis(50));

        let intent = tokio::time::timeout(
            Duration::from_secs(2),
            router.classify("show my balance please", None),
        )
        .await
        .unwrap();
        assert_eq!(intent, Intent::Fallback);
    }

    #[test]
    fn test_tail_handles_multibyte_text() {
        assert_eq!(tail("héllo", 3), "llo");
        assert_eq!(tail("hi", 10), "hi");
    }
}
