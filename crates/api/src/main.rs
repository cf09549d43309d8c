use harvest_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    harvest_observability::init();

    let config = ApiConfig::from_env()?;
    let bind_addr = config.bind_addr.clone();
    let app = harvest_api::app::build_app(config)?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
