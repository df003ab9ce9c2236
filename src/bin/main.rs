//! Offline demo: a scripted conversation against the demo directory.

use banking_assistant::{
    audit::AuditLog,
    conversational::default_bank_knowledge,
    directory::fixtures::{seed_demo_directory, DEMO_PIN},
    llm::{ScriptStep, ScriptedModel},
    memory::ToolInvocation,
    state::InMemorySessionStore,
    ChatRequest, ModelResponse, Orchestrator, OrchestratorConfig, OrchestratorDeps,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn call(id: &str, name: &str, args: serde_json::Value) -> ScriptStep {
    ScriptStep::Reply(ModelResponse::calls(vec![ToolInvocation::new(id, name, args)]))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    info!("Banking Assistant demo starting");

    let router = ScriptedModel::new(vec![
        ScriptStep::Reply(ModelResponse::text("friendly_chat")),
        ScriptStep::Reply(ModelResponse::text("customer_request")),
        ScriptStep::Reply(ModelResponse::text("customer_request")),
    ]);

    let model = ScriptedModel::new(vec![
        ScriptStep::Reply(ModelResponse::text("Hello! How can I help with your cards today?")),
        call("call_1", "view_card_details", json!({})),
        ScriptStep::Reply(ModelResponse::text(
            "You have two cards: **** 5678 and **** 7777. Which one would you like the transactions for?",
        )),
        call("call_2", "list_recent_transactions", json!({"card_number": "5678", "count": 3})),
        ScriptStep::EchoLastToolResult,
        call(
            "call_3",
            "change_pin",
            json!({"card_number": "7777", "old_pin": DEMO_PIN, "new_pin": "4321"}),
        ),
        ScriptStep::EchoLastToolResult,
    ]);

    let orchestrator = Orchestrator::new(
        OrchestratorDeps {
            directory: Arc::new(seed_demo_directory()),
            model: Arc::new(model),
            router_model: Arc::new(router),
            sessions: Arc::new(InMemorySessionStore::new()),
            knowledge: Arc::new(default_bank_knowledge()),
            audit_log: Arc::new(AuditLog::new()),
        },
        OrchestratorConfig::default(),
    );

    let session_key = Orchestrator::new_session_key();
    let script = [
        "hi there",
        "show me my recent transactions",
        "5678",
        "change the pin of card 7777 from 1234 to 4321",
    ];

    println!("\n=== DEMO CONVERSATION ({}) ===", session_key);
    for message in script {
        let response = orchestrator
            .handle_message(ChatRequest {
                session_key: session_key.clone(),
                handle: Some("U02MOHAMED".to_string()),
                message: message.to_string(),
            })
            .await;

        println!("\nuser> {}", message);
        println!("bot [{} / {:?}]> {}", response.intent, response.result.result_type, response.response_text);
    }

    let audit = orchestrator.audit_log().list_for_client("1002").await?;
    println!("\nAudit trail:");
    for record in audit {
        println!("  {} {:?} args={}", record.tool_name, record.outcome, &record.arguments_digest[..12]);
    }

    Ok(())
}
