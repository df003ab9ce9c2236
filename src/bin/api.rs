use banking_assistant::{
    api::{start_server, ApiState, SlackClient, SlackNotifier},
    audit::AuditLog,
    conversational::default_bank_knowledge,
    directory::{fixtures::seed_demo_directory, BankDirectory, PgDirectory},
    gemini::GeminiClient,
    llm::ChatModel,
    state::InMemorySessionStore,
    AppConfig, Orchestrator, OrchestratorDeps,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    info!("Banking Assistant - API Server");
    info!("Port: {}", config.port);

    let api_key = config.gemini_api_key.clone().unwrap_or_else(|| {
        warn!("GEMINI_API_KEY not set; model calls will fail with the apology message");
        String::new()
    });
    let model: Arc<dyn ChatModel> = Arc::new(GeminiClient::new(api_key, config.gemini_model.clone())?);

    let directory: Arc<dyn BankDirectory> = match &config.database_url {
        Some(url) => {
            info!("Using PostgreSQL bank directory");
            Arc::new(PgDirectory::connect_lazy(url)?)
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory demo directory");
            Arc::new(seed_demo_directory())
        }
    };

    let slack: Option<Arc<dyn SlackNotifier>> = match &config.slack_bot_token {
        Some(token) => Some(Arc::new(SlackClient::new(token.clone()))),
        None => {
            warn!("SLACK_BOT_TOKEN not set; Slack replies are disabled");
            None
        }
    };

    let orchestrator = Arc::new(Orchestrator::new(
        OrchestratorDeps {
            directory,
            model: model.clone(),
            router_model: model,
            sessions: Arc::new(InMemorySessionStore::new()),
            knowledge: Arc::new(default_bank_knowledge()),
            audit_log: Arc::new(AuditLog::new()),
        },
        config.orchestrator.clone(),
    ));

    info!("Orchestrator initialized");

    start_server(ApiState { orchestrator, slack }, config.port).await?;

    Ok(())
}
