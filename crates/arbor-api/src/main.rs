use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use arbor_api::{
    config::{Config, EstimatorKind},
    router,
    state::AppState,
};
use arbor_context::TiktokenEstimator;
use arbor_engine::ConversationService;
use arbor_llm::{ClientFactory, CompletionProvider, OpenAIConfig, ProviderConfig, ProviderType};
use arbor_persist::StoreBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    init_logging(&config);

    tracing::info!("Starting Arbor API server");
    tracing::info!("Config loaded: {}:{}", config.server.host, config.server.port);

    tracing::info!(provider = ?config.llm.provider, model = %config.llm.model, "Initializing completion provider");
    let provider = build_provider(&config)?;

    tracing::info!(backend = %config.storage.backend, "Opening message store");
    let mut store = StoreBuilder::new()
        .backend(config.storage.backend)
        .database(&config.storage.database);
    if let Some(uri) = &config.mongodb_uri {
        store = store.mongodb_uri(uri);
    }
    let store = store.build().await?;

    let mut service = ConversationService::builder()
        .store(store)
        .provider(provider)
        .config(config.conversation());
    if config.context.estimator == EstimatorKind::Tiktoken {
        service = service.estimator(Arc::new(TiktokenEstimator::new()?));
    }
    let service = service.build()?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, service));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn build_provider(config: &Config) -> anyhow::Result<Arc<dyn CompletionProvider>> {
    let provider_config = match config.llm.provider {
        ProviderType::OpenAI => {
            let mut openai = OpenAIConfig::new(&config.openai_api_key)
                .with_default_model(&config.llm.model);
            if let Some(url) = &config.llm.base_url {
                openai = openai.with_base_url(url);
            }
            ProviderConfig::openai_with(openai)
        }
        ProviderType::Mock => {
            tracing::warn!(
                replies = config.llm.mock_replies.len(),
                "Using the mock provider; replies are canned"
            );
            ProviderConfig::mock(config.llm.mock_replies.clone())
        }
    };

    ClientFactory::create_provider(provider_config)
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}
