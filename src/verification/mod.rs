//! Output guard
//!
//! Rules-based rewriting of every assistant answer before it is stored or
//! returned. Deterministic enforcement; no model involved.

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;
use tracing::info;

lazy_static! {
    /// 13 to 19 contiguous digits, or four-digit groups joined by one kind of
    /// separator ("5000 2140 4428 9662", "5000-2140-4428-9662")
    static ref CARD_NUMBER_RE: Regex = Regex::new(
        r"\b(?:\d{13,19}|\d{4}(?: \d{4}){3}(?: \d{1,3})?|\d{4}(?:-\d{4}){3}(?:-\d{1,3})?)\b"
    )
    .unwrap();
}

const PIN_PLACEHOLDER: &str = "[PIN REDACTED]";
const MIN_REDACTED_PIN_LEN: usize = 3;

/// What a rule may look at besides the text itself
#[derive(Debug, Default, Clone)]
pub struct GuardContext {
    /// PIN values supplied during the current exchange
    pub supplied_pins: Vec<String>,
}

/// Trait for guard rules
pub trait GuardRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rewritten text, or `Cow::Borrowed` when the rule did not fire
    fn apply<'a>(&self, text: &'a str, context: &GuardContext) -> Cow<'a, str>;
}

#[derive(Debug, Clone)]
pub struct GuardResult {
    pub text: String,
    pub fired_rules: Vec<&'static str>,
}

pub struct OutputGuard {
    rules: Vec<Box<dyn GuardRule>>,
}

impl OutputGuard {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn GuardRule>) {
        self.rules.push(rule);
    }

    /// Run every rule in order (SYNC, no async overhead)
    pub fn enforce(&self, text: &str, context: &GuardContext) -> GuardResult {
        let mut current = text.to_string();
        let mut fired_rules = Vec::new();

        for rule in &self.rules {
            let rewritten = match rule.apply(&current, context) {
                Cow::Owned(text) => Some(text),
                Cow::Borrowed(_) => None,
            };
            if let Some(text) = rewritten {
                fired_rules.push(rule.name());
                current = text;
            }
        }

        if !fired_rules.is_empty() {
            info!(?fired_rules, "Output guard rewrote answer");
        }

        GuardResult {
            text: current,
            fired_rules,
        }
    }
}

impl Default for OutputGuard {
    fn default() -> Self {
        Self::new()
    }
}

//
// ========== Rules ==========
//

/// Rule: never echo a PIN the user or model supplied this exchange
pub struct PinRedactionRule;

impl GuardRule for PinRedactionRule {
    fn name(&self) -> &'static str {
        "pin_redaction"
    }

    fn apply<'a>(&self, text: &'a str, context: &GuardContext) -> Cow<'a, str> {
        let mut result: Cow<'a, str> = Cow::Borrowed(text);

        for pin in &context.supplied_pins {
            if pin.len() < MIN_REDACTED_PIN_LEN {
                continue;
            }
            let Ok(pattern) = Regex::new(&format!(r"\b{}\b", regex::escape(pin))) else {
                continue;
            };
            if pattern.is_match(&result) {
                result = Cow::Owned(pattern.replace_all(&result, PIN_PLACEHOLDER).into_owned());
            }
        }

        result
    }
}

/// Rule: card numbers only ever appear as their last four digits
pub struct CardNumberMaskRule;

impl GuardRule for CardNumberMaskRule {
    fn name(&self) -> &'static str {
        "card_number_mask"
    }

    fn apply<'a>(&self, text: &'a str, _context: &GuardContext) -> Cow<'a, str> {
        CARD_NUMBER_RE.replace_all(text, |caps: &regex::Captures| {
            let digits: String = caps[0].chars().filter(|c| c.is_ascii_digit()).collect();
            format!("**** {}", &digits[digits.len() - 4..])
        })
    }
}

/// Guard with the standard rules
pub fn create_default_output_guard() -> OutputGuard {
    let mut guard = OutputGuard::new();
    guard.add_rule(Box::new(PinRedactionRule));
    guard.add_rule(Box::new(CardNumberMaskRule));
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_passes_untouched() {
        let guard = create_default_output_guard();
        let result = guard.enforce("Your card **** 9662 is active.", &GuardContext::default());

        assert_eq!(result.text, "Your card **** 9662 is active.");
        assert!(result.fired_rules.is_empty());
    }

    #[test]
    fn test_full_card_numbers_are_masked() {
        let guard = create_default_output_guard();
        let result = guard.enforce(
            "Cards: 5000214044289662 and 5000 9876 1234 5678.",
            &GuardContext::default(),
        );

        assert_eq!(result.text, "Cards: **** 9662 and **** 5678.");
        assert_eq!(result.fired_rules, vec!["card_number_mask"]);
    }

    #[test]
    fn test_dates_and_references_are_left_alone() {
        let guard = create_default_output_guard();
        let text = "On 28/10/2025 (28102025) ref REF281020252550 you spent 25.50";
        assert_eq!(guard.enforce(text, &GuardContext::default()).text, text);

        let ranges = "Between 01022025-04022025 (or 01022025 - 04022025), ticket 123456789012.";
        assert_eq!(guard.enforce(ranges, &GuardContext::default()).text, ranges);
    }

    #[test]
    fn test_dashed_card_groups_are_masked() {
        let guard = create_default_output_guard();
        let result = guard.enforce("Card 5000-2140-4428-9662 is active.", &GuardContext::default());
        assert_eq!(result.text, "Card **** 9662 is active.");
    }

    #[test]
    fn test_supplied_pins_are_redacted() {
        let guard = create_default_output_guard();
        let context = GuardContext {
            supplied_pins: vec!["1234".into(), "9876".into()],
        };

        let result = guard.enforce("Changed from 1234 to 9876. Ref 12345.", &context);

        assert_eq!(
            result.text,
            "Changed from [PIN REDACTED] to [PIN REDACTED]. Ref 12345."
        );
        assert_eq!(result.fired_rules, vec!["pin_redaction"]);
    }
}
