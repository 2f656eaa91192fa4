mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use flowz_gemini::{GeminiClient, RetryPolicy};

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(flowz_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = flowz_db::PoolConfig::from_app_config(&config);
    let pool = flowz_db::connect_pool(&config.database_url, pool_config).await?;
    flowz_db::run_migrations(&pool).await?;

    let gemini = match &config.gemini_api_key {
        Some(key) => Some(Arc::new(GeminiClient::with_base_url(
            key,
            config.gemini_request_timeout_secs,
            RetryPolicy::from_app_config(&config),
            &config.gemini_base_url,
        )?)),
        None => {
            tracing::warn!("GEMINI_API_KEY not set; batch generation requests will be rejected");
            None
        }
    };

    let _scheduler = scheduler::build_scheduler(pool.clone(), Arc::clone(&config)).await?;

    // Bearer auth is always on outside development, matching the hosted
    // deployments; locally it can run open for iteration.
    let auth_enabled = !matches!(config.env, flowz_core::Environment::Development);
    let auth = AuthState::new(
        pool.clone(),
        config.api_key_hash_salt.clone(),
        auth_enabled,
    );

    let state = AppState {
        pool,
        config: Arc::clone(&config),
        gemini,
    };
    let app = build_app(state, auth, default_rate_limit_state());

    tracing::info!(addr = %config.bind_addr, env = %config.env, "flowz server listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
