//! Banking Assistant Orchestrator
//!
//! A conversational banking assistant that:
//! - Routes each message to banking, small talk, knowledge answers or fallback
//! - Binds banking tools to an identity taken from the channel, never from text
//! - Lets the model call tools in a bounded loop
//! - Keeps per-session history with a continuation marker for follow-ups
//! - Audits every tool call and guards every answer before it is stored
//!
//! EXCHANGE:
//! LOCK → LOAD → ROUTE → (BIND → MODEL ⇄ TOOLS) → GUARD → APPEND → PERSIST

pub mod agent;
pub mod api;
pub mod audit;
pub mod auth;
pub mod classifier;
pub mod config;
pub mod conversational;
pub mod directory;
pub mod error;
pub mod execution;
pub mod gemini;
pub mod llm;
pub mod memory;
pub mod models;
pub mod prompts;
pub mod state;
pub mod tools;
pub mod verification;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::{ChatRequest, Orchestrator, OrchestratorDeps};
pub use classifier::IntentRouter;
pub use config::{AppConfig, OrchestratorConfig};
