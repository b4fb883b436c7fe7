// Main entry point for the automation scheduler

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use automation_core::kernel::{
    AzureGenerator, BaseContentGenerator, BoundedStore, FallbackContentGenerator,
    GbpPublisherAdapter, GeminiGenerator, OAuthTokenAdapter, PostgresStore, ServerDeps,
    ServerKernel, ServiceHost,
};
use automation_core::server::{build_app, AppState, HttpService};
use automation_core::Config;
use gbp_client::{GbpClient, OAuthClient};
use genai_client::{AzureOpenAiClient, GeminiClient};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,automation_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting GBP automation scheduler");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let store_timeout = config.scheduler.store_timeout;
    let connect_options = PgConnectOptions::from_str(&config.database_url)
        .context("Invalid DATABASE_URL")?
        .options([("statement_timeout", store_timeout.as_millis().to_string())]);
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(store_timeout)
        .connect_with(connect_options)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // External clients
    let call_timeout = config.scheduler.external_call_timeout;
    let gbp = Arc::new(GbpClient::with_timeout(call_timeout));
    let oauth = Arc::new(OAuthClient::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
    ));

    let mut gemini = GeminiClient::new(config.gemini_api_key.clone()).with_timeout(call_timeout);
    if let Some(model) = &config.gemini_model {
        gemini = gemini.with_model(model.clone());
    }
    let fallback: Option<Arc<dyn BaseContentGenerator>> = config.azure_openai.as_ref().map(|azure| {
        let client = AzureOpenAiClient::new(
            azure.endpoint.clone(),
            azure.api_key.clone(),
            azure.deployment.clone(),
        )
        .with_timeout(call_timeout);
        Arc::new(AzureGenerator(Arc::new(client))) as Arc<dyn BaseContentGenerator>
    });
    if fallback.is_some() {
        tracing::info!("Azure OpenAI fallback configured");
    }
    let generator = Arc::new(FallbackContentGenerator::new(
        Arc::new(GeminiGenerator(Arc::new(gemini))),
        fallback,
    ));

    // Wire the kernel
    let deps = ServerDeps::from_store(
        Arc::new(BoundedStore::new(
            Arc::new(PostgresStore::new(pool.clone())),
            store_timeout,
        )),
        generator,
        Arc::new(GbpPublisherAdapter::new(gbp)),
        Arc::new(OAuthTokenAdapter::new(oauth)),
    );
    let kernel = ServerKernel::build(deps, config.scheduler.clone());
    tracing::info!(holder_id = %kernel.coordinator.holder_id(), "Scheduler kernel built");

    // Build application
    let app = build_app(AppState {
        db_pool: pool,
        kernel: kernel.clone(),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    ServiceHost::new()
        .with_service(kernel.coordinator.clone())
        .with_service(Arc::new(HttpService::new(addr, app)))
        .run_until_shutdown()
        .await;

    tracing::info!("Scheduler stopped");
    Ok(())
}
