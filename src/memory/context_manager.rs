//! Context window management
//!
//! Builds the message list submitted to the model: exactly one system turn
//! first, then a bounded tail of the stored history, then the new user turn.

use crate::memory::store::{ConversationHistory, Role, Turn};
use tracing::debug;

/// Configuration for context window management
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Number of recent stored turns handed to the model
    pub preserve_recent_count: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            preserve_recent_count: 20,
        }
    }
}

/// Prepares model context from session history
#[derive(Debug, Clone)]
pub struct ContextManager {
    config: ContextConfig,
}

impl ContextManager {
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Recent user/assistant turns, oldest first.
    ///
    /// The window never starts on an assistant turn so the model always sees
    /// the question an answer belongs to.
    pub fn recent_turns<'a>(&self, history: &'a ConversationHistory) -> &'a [Turn] {
        let turns = history.turns();
        let mut start = turns.len().saturating_sub(self.config.preserve_recent_count);

        while start < turns.len() && turns[start].role != Role::User {
            start += 1;
        }

        &turns[start..]
    }

    /// Assemble `system + history window + user` for one exchange.
    pub fn prepare_context_for_llm(
        &self,
        system_prompt: &str,
        history: &ConversationHistory,
        user_turn: &Turn,
    ) -> Vec<Turn> {
        let window = self.recent_turns(history);
        let mut messages = Vec::with_capacity(window.len() + 2);

        messages.push(Turn::system(system_prompt));
        messages.extend(
            window
                .iter()
                .filter(|t| matches!(t.role, Role::User | Role::Assistant))
                .cloned(),
        );
        messages.push(user_turn.clone());

        debug!(
            history_turns = history.len(),
            window_turns = messages.len() - 2,
            "Prepared model context"
        );

        messages
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}
