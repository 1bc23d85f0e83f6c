//! Tasktalk application binary - composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Install the tracing subscriber
//! 3. Build retrieval (embedder, vector index, knowledge, turn memory)
//! 4. Build the classifier (model tier when enabled, rules always)
//! 5. Start the idle-state and turn-memory sweeper
//! 6. Run the interactive REPL

mod cli;
mod repl;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use tasktalk_chat::{
    ConversationOrchestrator, KeywordModeration, OrchestratorSettings, StateSweeper,
    TracingAuditSink,
};
use tasktalk_core::TasktalkConfig;
use tasktalk_dialog::{
    ActionExecutor, ConfirmationController, ConversationStateStore, InMemoryTaskBackend,
    IntentClassifier, ModelIntentStrategy, SlotFillingEngine,
};
use tasktalk_inference::OllamaClient;
use tasktalk_retrieval::{
    ContextRetriever, DynEmbeddingService, InMemoryTurnMemory, InMemoryVectorStore,
    KnowledgeCache, MockEmbedding, RetrieverSettings,
};

use cli::CliArgs;
use repl::Repl;

/// Classifier and embedder, backed by Ollama when the model is enabled and
/// reachable at construction time.
fn build_models(
    config: &TasktalkConfig,
    use_model: bool,
) -> (IntentClassifier, Arc<dyn DynEmbeddingService>) {
    let dimensions = config.retrieval.embedding_dimensions;
    if use_model {
        match OllamaClient::from_config(&config.inference, dimensions) {
            Ok(client) => {
                let client = Arc::new(client);
                let model = ModelIntentStrategy::from_config(client.clone(), &config.classifier);
                tracing::info!(url = %config.inference.base_url, "Model classification tier enabled");
                let embedder: Arc<dyn DynEmbeddingService> = client;
                return (IntentClassifier::with_model(Arc::new(model)), embedder);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ollama client unavailable, using rules and mock embeddings");
            }
        }
    } else {
        tracing::info!("Model tier disabled, classifying with rules only");
    }
    (
        IntentClassifier::rule_based(),
        Arc::new(MockEmbedding::with_dimensions(dimensions)),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config first: the log level may come from it.
    let config_file = args.resolve_config_path();
    let loaded = TasktalkConfig::load(&config_file);
    let config = loaded.as_ref().ok().cloned().unwrap_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(
                args.resolve_log_filter(&config.general.log_level),
            )
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Tasktalk v{}", env!("CARGO_PKG_VERSION"));
    match &loaded {
        Ok(_) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Err(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Configuration unavailable, using defaults"
        ),
    }

    // Retrieval.
    let (classifier, embedder) = build_models(&config, args.use_model(config.classifier.use_model));
    let memory = Arc::new(InMemoryTurnMemory::new(config.chat.memory_turns));
    let retriever = Arc::new(ContextRetriever::new(
        embedder,
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(KnowledgeCache::with_default_entries()),
        memory.clone(),
        RetrieverSettings::from(&config.retrieval),
    ));
    match retriever.index_knowledge().await {
        Ok(count) => tracing::info!(count, "Knowledge entries indexed"),
        Err(e) => tracing::warn!(error = %e, "Knowledge indexing failed, keyword fallback only"),
    }

    // Dialog.
    let states = Arc::new(ConversationStateStore::new());
    let confirmations = Arc::new(ConfirmationController::new(Duration::from_secs(
        config.state.confirmation_timeout_secs,
    )));
    let executor = ActionExecutor::new(Arc::new(InMemoryTaskBackend::new()));

    let orchestrator = Arc::new(
        ConversationOrchestrator::new(
            retriever,
            memory.clone(),
            classifier,
            executor,
            OrchestratorSettings::from(&config),
        )
        .with_slot_engine(SlotFillingEngine::new(Arc::clone(&states)))
        .with_confirmations(Arc::clone(&confirmations))
        .with_audit(Arc::new(TracingAuditSink)),
    );

    // === Background tasks ===

    let sweeper = Arc::new(
        StateSweeper::from_config(Arc::clone(&states), Arc::clone(&confirmations), &config.state)
            .with_turn_memory(memory),
    );
    let sweeper_task = {
        let sweeper = Arc::clone(&sweeper);
        tokio::spawn(async move { sweeper.run().await })
    };

    // === REPL ===

    let moderation = Arc::new(KeywordModeration::from_config(&config.moderation));
    let mut repl = Repl::new(orchestrator, moderation, args.user.clone());
    let result = repl.run().await;

    sweeper.shutdown();
    if let Err(e) = sweeper_task.await {
        tracing::warn!(error = %e, "Sweeper task ended abnormally");
    }
    result?;
    Ok(())
}
