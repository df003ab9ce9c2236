//! Tool trait and registry
//!
//! Banking tools are built per request by `create_banking_registry`, each
//! closed over one `AuthenticatedIdentity`. The identity is not a tool
//! parameter, so neither the model nor the user can point a tool at another
//! client's data.

pub mod banking;
pub mod dates;

use crate::directory::BankDirectory;
use crate::error::OrchestrationError;
use crate::models::{AuthenticatedIdentity, CardRecord, ToolDefinition, ToolInput, ToolOutput};
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

pub use banking::{
    ChangePinTool, ListRecentTransactionsTool, ListTransactionsDateRangeTool, ViewCardDetailsTool,
};

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the accepted arguments
    fn parameters(&self) -> Value;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Declarations advertised to the model, in name order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The identity and directory every banking tool is closed over
#[derive(Clone)]
pub struct BoundContext {
    identity: AuthenticatedIdentity,
    directory: Arc<dyn BankDirectory>,
}

impl BoundContext {
    pub fn new(identity: AuthenticatedIdentity, directory: Arc<dyn BankDirectory>) -> Self {
        Self {
            identity,
            directory,
        }
    }

    pub fn identity(&self) -> &AuthenticatedIdentity {
        &self.identity
    }

    pub fn directory(&self) -> &dyn BankDirectory {
        self.directory.as_ref()
    }

    pub async fn owned_cards(&self) -> Result<Vec<CardRecord>> {
        self.directory.find_cards(&self.identity).await
    }

    /// Resolve a card reference against the identity's own cards.
    ///
    /// `None` picks the only card when there is exactly one. A reference is
    /// either a full card number or its last four digits. Cards owned by
    /// anyone else are reported exactly like cards that do not exist.
    pub async fn resolve_card(&self, reference: Option<&str>) -> Result<CardRecord> {
        let cards = self.owned_cards().await?;

        let Some(reference) = reference.map(str::trim).filter(|r| !r.is_empty()) else {
            if cards.len() > 1 {
                return Err(OrchestrationError::AmbiguousCard(format!(
                    "Ask the user which card to use. Available cards: {}.",
                    masked_list(&cards)
                )));
            }
            return cards.into_iter().next().ok_or_else(|| {
                OrchestrationError::NotFound("There are no cards on this profile.".to_string())
            });
        };

        let digits: String = reference
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '*'))
            .collect();

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(OrchestrationError::MalformedInput(
                "A card number must contain digits only.".to_string(),
            ));
        }

        let mut matches: Vec<CardRecord> = if digits.len() == 4 {
            cards
                .into_iter()
                .filter(|c| c.last_four() == digits)
                .collect()
        } else {
            cards
                .into_iter()
                .filter(|c| c.card_number == digits)
                .collect()
        };

        match matches.len() {
            0 => Err(OrchestrationError::NotFound(
                "No card with that number was found on this profile.".to_string(),
            )),
            1 => Ok(matches.remove(0)),
            _ => Err(OrchestrationError::AmbiguousCard(format!(
                "Several cards end in {}; ask for the full card number.",
                digits
            ))),
        }
    }
}

fn masked_list(cards: &[CardRecord]) -> String {
    cards
        .iter()
        .map(|c| c.masked_number())
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn ensure_object_parameters(input: &ToolInput) -> Result<()> {
    if input.parameters.is_object() || input.parameters.is_null() {
        Ok(())
    } else {
        Err(OrchestrationError::InvalidToolInput(
            "tool arguments must be a JSON object".to_string(),
        ))
    }
}

/// First present string argument among `keys`. Numbers are accepted and
/// rendered as strings since models often send card numbers unquoted.
pub(crate) fn optional_str(input: &ToolInput, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match input.parameters.get(*key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

pub(crate) fn require_str(input: &ToolInput, keys: &[&str]) -> Result<String> {
    optional_str(input, keys)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            OrchestrationError::InvalidToolInput(format!("Expected '{}' in tool arguments", keys[0]))
        })
}

/// Arguments that try to name a client are dropped on the floor.
pub(crate) fn warn_on_identity_arguments(input: &ToolInput) {
    const IDENTITY_KEYS: &[&str] = &["client_id", "clientId", "user_id", "customer_id"];

    if IDENTITY_KEYS
        .iter()
        .any(|key| input.parameters.get(*key).is_some())
    {
        warn!(
            tool_name = %input.tool_name,
            "Ignoring identity argument supplied to bound tool"
        );
    }
}

/// Build the fixed banking toolset for one identity.
pub fn create_banking_registry(
    identity: AuthenticatedIdentity,
    directory: Arc<dyn BankDirectory>,
) -> ToolRegistry {
    let context = BoundContext::new(identity, directory);
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(ChangePinTool::new(context.clone())));
    registry.register(Arc::new(ViewCardDetailsTool::new(context.clone())));
    registry.register(Arc::new(ListRecentTransactionsTool::new(context.clone())));
    registry.register(Arc::new(ListTransactionsDateRangeTool::new(context)));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::fixtures::{card, user};
    use crate::directory::InMemoryDirectory;

    fn context(client_id: &str) -> BoundContext {
        let directory = InMemoryDirectory::from_records(
            vec![user("1001", &["U_A"]), user("1002", &["U_B"])],
            vec![
                (card("1001", "5000000000001111"), vec![]),
                (card("1001", "5000000000002222"), vec![]),
                (card("1002", "5000000000003333"), vec![]),
            ],
        );
        BoundContext::new(AuthenticatedIdentity::new(client_id), Arc::new(directory))
    }

    #[test]
    fn test_registry_exposes_no_identity_parameter() {
        let registry = create_banking_registry(
            AuthenticatedIdentity::new("1001"),
            Arc::new(InMemoryDirectory::new()),
        );
        assert_eq!(
            registry.list(),
            vec![
                "change_pin",
                "list_recent_transactions",
                "list_transactions_date_range",
                "view_card_details"
            ]
        );
        for definition in registry.definitions() {
            let schema = definition.parameters.to_string();
            assert!(!schema.contains("client"), "{} leaks identity", definition.name);
        }
    }

    #[tokio::test]
    async fn test_resolve_card_by_full_number_and_suffix() {
        let ctx = context("1001");
        let by_full = ctx.resolve_card(Some("5000 0000 0000 1111")).await.unwrap();
        assert_eq!(by_full.card_number, "5000000000001111");

        let by_suffix = ctx.resolve_card(Some("**** 2222")).await.unwrap();
        assert_eq!(by_suffix.card_number, "5000000000002222");
    }

    #[tokio::test]
    async fn test_resolve_card_requires_choice_with_many_cards() {
        let err = context("1001").resolve_card(None).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::AmbiguousCard(_)));
        assert!(err.to_string().contains("**** 1111"));

        let single = context("1002").resolve_card(None).await.unwrap();
        assert_eq!(single.card_number, "5000000000003333");
    }

    #[tokio::test]
    async fn test_foreign_card_looks_like_missing_card() {
        let ctx = context("1001");
        let foreign = ctx.resolve_card(Some("5000000000003333")).await.unwrap_err();
        let missing = ctx.resolve_card(Some("5000000000009999")).await.unwrap_err();

        assert!(matches!(foreign, OrchestrationError::NotFound(_)));
        assert_eq!(foreign.to_string(), missing.to_string());
    }

    #[tokio::test]
    async fn test_non_numeric_reference_is_malformed() {
        let err = context("1001").resolve_card(Some("my gold card")).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::MalformedInput(_)));
    }
}
