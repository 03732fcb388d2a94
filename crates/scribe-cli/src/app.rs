//! Wiring from configuration to stores and a ready [`ChatService`].

use anyhow::{Context, Result};
use scribe_api::AnthropicProvider;
use scribe_config::{APP_NAME, ScribeConfig};
use scribe_core::{Agent, ChatService, SYSTEM_INSTRUCTION};
use scribe_store::{KnowledgeStore, SessionStore};
use scribe_tools::{GithubClient, ResumeProcessor, Summarizer, ToolDeps, ToolRegistry};
use scribe_types::provider::Provider;
use std::sync::Arc;

/// Both JSON databases, opened once per process.
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<SessionStore>,
    pub knowledge: Arc<KnowledgeStore>,
}

impl Stores {
    pub async fn open(config: &ScribeConfig) -> Result<Self> {
        let sessions = SessionStore::open(config.chat_db_path())
            .await
            .context("Failed to open chat history database")?;
        let knowledge = KnowledgeStore::open(config.knowledge_db_path())
            .await
            .context("Failed to open knowledge database")?;
        Ok(Self {
            sessions: Arc::new(sessions),
            knowledge: Arc::new(knowledge),
        })
    }
}

fn provider(config: &ScribeConfig) -> Result<Arc<dyn Provider>> {
    let api_key = config.require_api_key().map_err(|e| anyhow::anyhow!("{e}"))?;
    let provider = AnthropicProvider::new(api_key, &config.api_base_url)
        .context("Failed to create API client")?;
    Ok(Arc::new(provider))
}

fn summarizer(config: &ScribeConfig, provider: Arc<dyn Provider>) -> Summarizer {
    Summarizer::new(provider, config.model.clone(), config.max_tokens)
}

/// Résumé processing without the chat loop, for `scribe process`.
pub fn resume_processor(config: &ScribeConfig, stores: &Stores) -> Result<ResumeProcessor> {
    let provider = provider(config)?;
    Ok(ResumeProcessor::new(
        stores.knowledge.clone(),
        summarizer(config, provider),
    ))
}

/// The full assistant: provider, tools, agent and service.
pub fn chat_service(config: &ScribeConfig, stores: &Stores) -> Result<ChatService> {
    let provider = provider(config)?;

    let github = GithubClient::new(&config.github.base_url, config.github.token.clone())
        .context("Failed to create GitHub client")?;
    let registry = ToolRegistry::with_defaults(ToolDeps {
        knowledge: stores.knowledge.clone(),
        summarizer: summarizer(config, provider.clone()),
        resumes_dir: config.resumes_dir(),
        github,
        github_username: config.github.username.clone(),
    });
    tracing::debug!("Registered {} tools", registry.len());

    let mut agent = Agent::new(
        provider,
        registry,
        config.model.clone(),
        config.max_tokens,
        config.project_root.clone(),
    );
    agent.set_system_prompt(SYSTEM_INSTRUCTION);

    Ok(ChatService::new(
        agent,
        stores.sessions.clone(),
        stores.knowledge.clone(),
        APP_NAME,
        config.resumes_dir(),
    ))
}
