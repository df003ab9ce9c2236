//! Conversation memory
//!
//! Turn types, append-only session history, and the context window that is
//! submitted to the model on each exchange.

pub mod context_manager;
pub mod store;

pub use context_manager::{ContextConfig, ContextManager};
pub use store::{ConversationHistory, Role, ToolInvocation, Turn};
