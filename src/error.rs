//! Error types for the banking assistant orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Identity & Authorization
    // =============================

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    // =============================
    // Tool-Level Errors
    // =============================

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Card selection required: {0}")]
    AmbiguousCard(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    // =============================
    // Boundary Errors
    // =============================

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Tool-level errors are reported back to the model as tool-result text.
    /// Everything else aborts the exchange.
    pub fn is_tool_level(&self) -> bool {
        matches!(
            self,
            OrchestrationError::Unauthenticated(_)
                | OrchestrationError::NotFound(_)
                | OrchestrationError::InvalidCredential(_)
                | OrchestrationError::MalformedInput(_)
                | OrchestrationError::AmbiguousCard(_)
                | OrchestrationError::ToolNotFound(_)
                | OrchestrationError::InvalidToolInput(_)
        )
    }

    /// Text handed to the model in place of a tool result
    pub fn tool_feedback(&self) -> String {
        match self {
            OrchestrationError::Unauthenticated(_) => {
                "Error: this user is not authorized for banking operations.".to_string()
            }
            OrchestrationError::NotFound(detail) => format!("Error: not found. {}", detail),
            OrchestrationError::InvalidCredential(detail) => {
                format!("Error: invalid credential. {}", detail)
            }
            OrchestrationError::MalformedInput(detail) => {
                format!("Error: malformed input. {}", detail)
            }
            OrchestrationError::AmbiguousCard(detail) => {
                format!("Error: card selection required. {}", detail)
            }
            OrchestrationError::ToolNotFound(name) => format!("Error: unknown tool '{}'.", name),
            OrchestrationError::InvalidToolInput(detail) => {
                format!("Error: invalid arguments. {}", detail)
            }
            other => format!("Error: {}", other),
        }
    }
}
