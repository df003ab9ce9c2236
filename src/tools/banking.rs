//! Banking tools
//!
//! Every tool checks card ownership through `BoundContext::resolve_card`
//! before touching data.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::auth::pin::{hash_pin, is_valid_pin_format, verify_pin};
use crate::error::OrchestrationError;
use crate::models::{ToolInput, ToolOutput, TransactionRecord};
use crate::tools::dates::{display_date, normalize_date, parse_stored_date};
use crate::tools::{
    ensure_object_parameters, optional_str, require_str, warn_on_identity_arguments,
    BoundContext, Tool,
};
use crate::Result;

const CARD_KEYS: &[&str] = &["card_number", "cardNumber"];
const DEFAULT_RECENT_COUNT: usize = 5;
const MAX_RECENT_COUNT: usize = 50;

fn card_number_schema() -> Value {
    json!({
        "type": "string",
        "description": "Full card number or its last four digits"
    })
}

fn summarize_transaction(txn: &TransactionRecord) -> String {
    let time = match (txn.time.get(0..2), txn.time.get(2..4)) {
        (Some(hours), Some(minutes)) => format!("{}:{}", hours, minutes),
        _ => txn.time.clone(),
    };

    format!(
        "- {} {} | {} | {} | {} {} | ref {}",
        display_date(&txn.date),
        time,
        txn.description,
        txn.terminal_location,
        txn.amount,
        txn.currency,
        txn.reference_number
    )
}

//
// ================= change_pin =================
//

pub struct ChangePinTool {
    context: BoundContext,
}

impl ChangePinTool {
    pub fn new(context: BoundContext) -> Self {
        Self { context }
    }
}

#[async_trait::async_trait]
impl Tool for ChangePinTool {
    fn name(&self) -> &'static str {
        "change_pin"
    }

    fn description(&self) -> &'static str {
        "Change the PIN of one of the user's cards after verifying the current PIN"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "card_number": card_number_schema(),
                "old_pin": { "type": "string", "description": "Current PIN" },
                "new_pin": { "type": "string", "description": "New 4 to 6 digit PIN" }
            },
            "required": ["card_number", "old_pin", "new_pin"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;
        warn_on_identity_arguments(input);

        let card_ref = require_str(input, CARD_KEYS)?;
        let old_pin = require_str(input, &["old_pin", "oldPin"])?;
        let new_pin = require_str(input, &["new_pin", "newPin"])?;

        let card = self.context.resolve_card(Some(&card_ref)).await?;

        if !verify_pin(old_pin.trim(), &card.pin_hash) {
            info!(card = %card.masked_number(), "PIN change rejected: old PIN mismatch");
            return Err(OrchestrationError::InvalidCredential(
                "The current PIN provided is incorrect.".to_string(),
            ));
        }

        let new_pin = new_pin.trim();
        if !is_valid_pin_format(new_pin) {
            return Err(OrchestrationError::MalformedInput(
                "The new PIN must be 4 to 6 digits.".to_string(),
            ));
        }
        if new_pin == old_pin.trim() {
            return Err(OrchestrationError::MalformedInput(
                "The new PIN must differ from the current PIN.".to_string(),
            ));
        }

        let new_hash = hash_pin(new_pin)?;
        let modified = self
            .context
            .directory()
            .update_pin_hash(self.context.identity(), &card.card_number, &new_hash)
            .await?;

        if modified == 0 {
            return Err(OrchestrationError::NotFound(
                "No card with that number was found on this profile.".to_string(),
            ));
        }

        info!(card = %card.masked_number(), "PIN changed");

        Ok(ToolOutput {
            content: format!("PIN changed successfully for card {}.", card.masked_number()),
            data: json!({ "card": card.masked_number(), "changed": true }),
        })
    }
}

//
// ================= view_card_details =================
//

pub struct ViewCardDetailsTool {
    context: BoundContext,
}

impl ViewCardDetailsTool {
    pub fn new(context: BoundContext) -> Self {
        Self { context }
    }
}

#[async_trait::async_trait]
impl Tool for ViewCardDetailsTool {
    fn name(&self) -> &'static str {
        "view_card_details"
    }

    fn description(&self) -> &'static str {
        "List the user's cards with masked numbers, status and balances"
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;
        warn_on_identity_arguments(input);

        let cards = self.context.owned_cards().await?;

        if cards.is_empty() {
            return Ok(ToolOutput {
                content: "No cards were found on this profile.".to_string(),
                data: json!({ "cards": [] }),
            });
        }

        let mut content = format!("{} card(s) on this profile:\n", cards.len());
        let mut data = Vec::with_capacity(cards.len());

        for card in &cards {
            content.push_str(&format!(
                "- {} | {} {} | status {} | expires {} | available {:.2} {} | current {:.2} {} | limit {:.2} | cashback {:.2}\n",
                card.masked_number(),
                card.card_type,
                card.product_type,
                card.status,
                display_date(&card.expiry_date),
                card.available_balance,
                card.currency,
                card.current_balance,
                card.currency,
                card.card_limit,
                card.cashback,
            ));

            data.push(json!({
                "card": card.masked_number(),
                "type": card.card_type,
                "product_type": card.product_type,
                "status": card.status,
                "currency": card.currency,
                "available_balance": card.available_balance,
            }));
        }

        Ok(ToolOutput {
            content: content.trim_end().to_string(),
            data: json!({ "cards": data }),
        })
    }
}

//
// ================= list_recent_transactions =================
//

pub struct ListRecentTransactionsTool {
    context: BoundContext,
}

impl ListRecentTransactionsTool {
    pub fn new(context: BoundContext) -> Self {
        Self { context }
    }
}

fn parse_count(input: &ToolInput) -> Result<usize> {
    let raw = match input.parameters.get("count").or_else(|| input.parameters.get("limit")) {
        None | Some(Value::Null) => return Ok(DEFAULT_RECENT_COUNT),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    match raw {
        Some(n) if n >= 1 => Ok((n as usize).min(MAX_RECENT_COUNT)),
        _ => Err(OrchestrationError::MalformedInput(
            "count must be a positive whole number.".to_string(),
        )),
    }
}

#[async_trait::async_trait]
impl Tool for ListRecentTransactionsTool {
    fn name(&self) -> &'static str {
        "list_recent_transactions"
    }

    fn description(&self) -> &'static str {
        "List the most recent transactions of one card, newest first"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "card_number": card_number_schema(),
                "count": {
                    "type": "integer",
                    "description": "How many transactions to return (default 5)"
                }
            }
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;
        warn_on_identity_arguments(input);

        let count = parse_count(input)?;
        let card_ref = optional_str(input, CARD_KEYS);
        let card = self.context.resolve_card(card_ref.as_deref()).await?;

        let transactions = self
            .context
            .directory()
            .find_transactions(self.context.identity(), &card.card_number)
            .await?;

        let recent: Vec<&TransactionRecord> = transactions.iter().take(count).collect();
        debug!(card = %card.masked_number(), requested = count, returned = recent.len(), "Recent transactions");

        if recent.is_empty() {
            return Ok(ToolOutput {
                content: format!("No transactions found for card {}.", card.masked_number()),
                data: json!({ "card": card.masked_number(), "transactions": [] }),
            });
        }

        let lines: Vec<String> = recent.iter().map(|t| summarize_transaction(t)).collect();

        Ok(ToolOutput {
            content: format!(
                "Last {} transaction(s) for card {}:\n{}",
                recent.len(),
                card.masked_number(),
                lines.join("\n")
            ),
            data: json!({ "card": card.masked_number(), "transactions": recent }),
        })
    }
}

//
// ================= list_transactions_date_range =================
//

pub struct ListTransactionsDateRangeTool {
    context: BoundContext,
}

impl ListTransactionsDateRangeTool {
    pub fn new(context: BoundContext) -> Self {
        Self { context }
    }
}

#[async_trait::async_trait]
impl Tool for ListTransactionsDateRangeTool {
    fn name(&self) -> &'static str {
        "list_transactions_date_range"
    }

    fn description(&self) -> &'static str {
        "List a card's transactions between two dates, both inclusive (DDMMYYYY)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "card_number": card_number_schema(),
                "start_date": { "type": "string", "description": "First day, DDMMYYYY" },
                "end_date": { "type": "string", "description": "Last day, DDMMYYYY" }
            },
            "required": ["start_date", "end_date"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;
        warn_on_identity_arguments(input);

        let start = normalize_date(&require_str(input, &["start_date", "startDate"])?)?;
        let end = normalize_date(&require_str(input, &["end_date", "endDate"])?)?;

        if start > end {
            return Err(OrchestrationError::MalformedInput(
                "start_date must not be after end_date.".to_string(),
            ));
        }

        let card_ref = optional_str(input, CARD_KEYS);
        let card = self.context.resolve_card(card_ref.as_deref()).await?;

        let transactions = self
            .context
            .directory()
            .find_transactions(self.context.identity(), &card.card_number)
            .await?;

        let in_range: Vec<&TransactionRecord> = transactions
            .iter()
            .filter(|t| match parse_stored_date(&t.date) {
                Some(date) => start <= date && date <= end,
                None => {
                    debug!(reference = %t.reference_number, "Skipping transaction with unparseable date");
                    false
                }
            })
            .collect();

        let range_label = format!(
            "{} to {}",
            start.format("%d/%m/%Y"),
            end.format("%d/%m/%Y")
        );

        if in_range.is_empty() {
            return Ok(ToolOutput {
                content: format!(
                    "No transactions for card {} between {}.",
                    card.masked_number(),
                    range_label
                ),
                data: json!({ "card": card.masked_number(), "transactions": [] }),
            });
        }

        let lines: Vec<String> = in_range.iter().map(|t| summarize_transaction(t)).collect();

        Ok(ToolOutput {
            content: format!(
                "{} transaction(s) for card {} from {}:\n{}",
                in_range.len(),
                card.masked_number(),
                range_label,
                lines.join("\n")
            ),
            data: json!({ "card": card.masked_number(), "transactions": in_range }),
        })
    }
}
