use anyhow::{Context, Result};
use scribe::ai::GeminiClient;
use scribe::bot::BotHandler;
use scribe::config::Config;
use scribe::installation::SqliteInstallationStore;
use scribe::meetings::MeetingStore;
use scribe::oauth::{
    create_oauth_router, run_state_cleanup, AuthorizeUrlGenerator, OAuthAppState, StateStore,
};
use scribe::slack::{SlackClient, SocketModeGateway};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scribe=info".into()),
        )
        .init();

    info!("Scribe starting...");

    let config = Config::from_env().context("Configuration error")?;
    let settings = config.settings.clone();
    let timeout = Duration::from_secs(settings.request_timeout_seconds);

    info!(
        listen_addr = %settings.listen_addr,
        installations_db = %settings.installations_db,
        state_ttl_seconds = settings.state_ttl_seconds,
        "Configuration loaded"
    );

    // Shared stores
    let installation_store = Arc::new(
        SqliteInstallationStore::new(&settings.installations_db, &config.encryption_key)
            .context("Failed to initialize installation store")?,
    );
    info!("Installation store initialized");

    let state_store = StateStore::new(settings.state_ttl_seconds);
    tokio::spawn(run_state_cleanup(
        state_store.clone(),
        settings.state_cleanup_interval_seconds,
    ));

    let meetings = Arc::new(MeetingStore::with_sample_data());

    // Collaborator clients
    let slack = Arc::new(
        SlackClient::with_base_url(
            config.client_id.clone(),
            config.client_secret.clone(),
            timeout,
            settings.slack_api_base.clone(),
        )
        .context("Failed to initialize Slack client")?,
    );
    let ai = Arc::new(
        GeminiClient::with_base_url(
            config.google_api_key.clone(),
            settings.gemini_model.clone(),
            timeout,
            settings.gemini_api_base.clone(),
        )
        .context("Failed to initialize Gemini client")?,
    );

    // OAuth HTTP server
    let oauth_state = OAuthAppState {
        slack: slack.clone(),
        installation_store: installation_store.clone(),
        state_store,
        authorize_url: AuthorizeUrlGenerator::new(
            config.client_id.clone(),
            config.redirect_uri.clone(),
        ),
        signing_secret: config.signing_secret.clone(),
    };
    let router = create_oauth_router(oauth_state);
    let listener = tokio::net::TcpListener::bind(&settings.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.listen_addr))?;
    info!(listen_addr = %settings.listen_addr, "OAuth endpoints listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    // Socket Mode gateway
    let handler = Arc::new(BotHandler::new(
        slack.clone(),
        ai,
        installation_store,
        meetings,
        config.bot_token.clone(),
    ));
    let gateway = SocketModeGateway::new(
        slack,
        handler,
        config.app_token.clone(),
        Duration::from_secs(settings.reconnect_delay_seconds),
    );
    let gateway_handle = tokio::spawn(async move { gateway.run().await });
    info!("Socket Mode gateway started");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    gateway_handle.abort();
    server_handle.abort();
    info!("Scribe stopped");

    Ok(())
}
