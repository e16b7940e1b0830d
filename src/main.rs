use tracing_subscriber::EnvFilter;

use article_reco_api::{
    api::{create_router, AppState},
    config::Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    config.log_summary();

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
