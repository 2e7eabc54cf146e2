use crate::cli::ServeArgs;
use crate::config::AppConfig;
use crate::http;
use anyhow::Context;
use pgresource::create_pool_with_settings;

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    let config = AppConfig::load(&args.config)?;
    let database_url = args.database.unwrap_or_else(|| config.file.database.url.clone());
    let bind = args.bind.unwrap_or_else(|| config.file.server.bind.clone());

    let pool = create_pool_with_settings(&database_url, &config.pool_settings())?;
    let registry = config.registry()?;
    let app = http::router(&registry, pool, config.request_timeout());

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(
        bind = %bind,
        resources = ?registry.names().collect::<Vec<_>>(),
        schema_cache_ttl_secs = config.file.engine.schema_cache_ttl_secs,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // Without a signal handler the server runs until killed.
        std::future::pending::<()>().await;
    }
}
