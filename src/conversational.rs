//! Conversational handlers
//!
//! Friendly small talk and knowledge-base answers. Neither touches banking
//! data and neither gets tools; each is a single model call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::llm::{invoke_within, ChatModel};
use crate::memory::{ContextManager, ConversationHistory, Turn};
use crate::prompts::{FRIENDLY_PROMPT, RAG_PROMPT};
use crate::Result;

/// Words too common to count as overlap
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "can", "do", "does", "for", "how", "i", "in", "is", "it", "me",
    "my", "of", "on", "or", "the", "to", "what", "when", "where", "which", "with", "you", "your",
];

const DEFAULT_TOP_K: usize = 3;

//
// ================= Knowledge Base =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSnippet {
    pub title: String,
    pub text: String,
}

/// Retrieval boundary for general questions
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Best matching snippets, most relevant first; empty when nothing matches
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeSnippet>>;
}

/// Keyword-overlap retrieval over an in-memory snippet list
pub struct InMemoryKnowledgeBase {
    snippets: Arc<RwLock<Vec<KnowledgeSnippet>>>,
}

impl InMemoryKnowledgeBase {
    pub fn new(snippets: Vec<KnowledgeSnippet>) -> Self {
        Self {
            snippets: Arc::new(RwLock::new(snippets)),
        }
    }

    pub async fn add(&self, title: impl Into<String>, text: impl Into<String>) {
        self.snippets.write().await.push(KnowledgeSnippet {
            title: title.into(),
            text: text.into(),
        });
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

#[async_trait]
impl KnowledgeBase for InMemoryKnowledgeBase {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeSnippet>> {
        let query_words = keywords(query);
        if query_words.is_empty() {
            return Ok(Vec::new());
        }

        let snippets = self.snippets.read().await;
        let mut scored: Vec<(usize, &KnowledgeSnippet)> = snippets
            .iter()
            .map(|snippet| {
                let words = keywords(&format!("{} {}", snippet.title, snippet.text));
                (query_words.intersection(&words).count(), snippet)
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        // Stable sort keeps insertion order among ties
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, snippet)| snippet.clone())
            .collect())
    }
}

/// Small general-information set used by the demo binaries
pub fn default_bank_knowledge() -> InMemoryKnowledgeBase {
    let snippet = |title: &str, text: &str| KnowledgeSnippet {
        title: title.to_string(),
        text: text.to_string(),
    };

    InMemoryKnowledgeBase::new(vec![
        snippet(
            "Branch hours",
            "Branches are open Monday to Friday from 8:30 to 14:00 and Saturday from 8:30 to 12:00.",
        ),
        snippet(
            "Lost or stolen card",
            "If your card is lost or stolen, call the 24/7 hotline immediately so the card can be blocked.",
        ),
        snippet(
            "Card types",
            "The bank offers debit cards, prepaid cards and credit cards in Classic and Gold tiers.",
        ),
        snippet(
            "PIN security",
            "Never share your PIN. Bank staff will never ask for it by phone, email or chat.",
        ),
    ])
}

//
// ================= Agents =================
//

/// Small talk with the history window, no tools
pub struct FriendlyAgent {
    model: Arc<dyn ChatModel>,
    context_manager: ContextManager,
    timeout: Duration,
}

impl FriendlyAgent {
    pub fn new(model: Arc<dyn ChatModel>, context_manager: ContextManager, timeout: Duration) -> Self {
        Self {
            model,
            context_manager,
            timeout,
        }
    }

    pub async fn respond(&self, history: &ConversationHistory, user_text: &str) -> Result<String> {
        let messages = self.context_manager.prepare_context_for_llm(
            FRIENDLY_PROMPT,
            history,
            &Turn::user(user_text),
        );

        let response = invoke_within(self.model.as_ref(), &messages, &[], self.timeout).await?;
        debug!(len = response.content.len(), "Friendly reply");
        Ok(response.content.trim().to_string())
    }
}

/// Retrieval-augmented answers over a `KnowledgeBase`
pub struct RagAgent {
    model: Arc<dyn ChatModel>,
    knowledge: Arc<dyn KnowledgeBase>,
    top_k: usize,
    timeout: Duration,
}

impl RagAgent {
    pub fn new(model: Arc<dyn ChatModel>, knowledge: Arc<dyn KnowledgeBase>, timeout: Duration) -> Self {
        Self {
            model,
            knowledge,
            top_k: DEFAULT_TOP_K,
            timeout,
        }
    }

    /// `None` when retrieval finds nothing to ground an answer on
    pub async fn answer(&self, user_text: &str) -> Result<Option<String>> {
        let snippets = self.knowledge.search(user_text, self.top_k).await?;
        if snippets.is_empty() {
            info!("No knowledge matched query");
            return Ok(None);
        }

        let context = snippets
            .iter()
            .map(|s| format!("[{}] {}", s.title, s.text))
            .collect::<Vec<_>>()
            .join("\n");

        let messages = [
            Turn::system(format!("{}\n\nContext:\n{}", RAG_PROMPT, context)),
            Turn::user(user_text),
        ];

        let response = invoke_within(self.model.as_ref(), &messages, &[], self.timeout).await?;
        info!(snippets = snippets.len(), "Knowledge answer generated");
        Ok(Some(response.content.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestrationError;
    use crate::execution::DEFAULT_ROUND_TIMEOUT;
    use crate::llm::{ScriptStep, ScriptedModel};
    use crate::memory::Role;
    use crate::models::ModelResponse;

    #[tokio::test]
    async fn test_keyword_search_ranks_by_overlap() {
        let kb = default_bank_knowledge();

        let results = kb.search("What should I do if my card is stolen?", 2).await.unwrap();
        assert_eq!(results[0].title, "Lost or stolen card");

        let none = kb.search("what is the weather", 3).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_rag_answer_includes_context() {
        let model = Arc::new(ScriptedModel::new(vec![ScriptStep::Reply(ModelResponse::text(
            "Branches open at 8:30.",
        ))]));
        let agent = RagAgent::new(model.clone(), Arc::new(default_bank_knowledge()), DEFAULT_ROUND_TIMEOUT);

        let answer = agent.answer("When are branch hours?").await.unwrap();
        assert_eq!(answer.as_deref(), Some("Branches open at 8:30."));

        let request = &model.requests()[0];
        assert_eq!(request[0].role, Role::System);
        assert!(request[0].content.contains("Monday to Friday"));
    }

    #[tokio::test]
    async fn test_rag_without_matches_skips_model() {
        let model = Arc::new(ScriptedModel::silent());
        let agent = RagAgent::new(model.clone(), Arc::new(default_bank_knowledge()), DEFAULT_ROUND_TIMEOUT);

        assert!(agent.answer("tell me a joke").await.unwrap().is_none());
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_friendly_sees_history() {
        let model = Arc::new(ScriptedModel::new(vec![ScriptStep::Reply(ModelResponse::text(
            " Hi again! ",
        ))]));
        let agent = FriendlyAgent::new(model.clone(), ContextManager::new(), DEFAULT_ROUND_TIMEOUT);

        let mut history = ConversationHistory::new();
        history.append_exchange(Turn::user("hello"), Turn::assistant("Hello!"));

        let reply = agent.respond(&history, "hi again").await.unwrap();
        assert_eq!(reply, "Hi again!");
        assert_eq!(model.requests()[0].len(), 4);
    }

    #[tokio::test]
    async fn test_hung_model_times_out() {
        let hang = || {
            Arc::new(ScriptedModel::new(vec![ScriptStep::Delay(
                Duration::from_secs(3600),
                ModelResponse::text("too late"),
            )]))
        };
        let limit = Duration::from_millis(50);

        let friendly = FriendlyAgent::new(hang(), ContextManager::new(), limit);
        let err = friendly.respond(&ConversationHistory::new(), "hi").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::UpstreamUnavailable(_)));

        let rag = RagAgent::new(hang(), Arc::new(default_bank_knowledge()), limit);
        let err = rag.answer("When are branch hours?").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::UpstreamUnavailable(_)));
    }
}
