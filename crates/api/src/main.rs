use anyhow::Context;

use waypoint_infra::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    waypoint_observability::init();

    let config = EngineConfig::from_env().context("invalid engine configuration")?;
    let addr = config.bind_addr;

    let app = waypoint_api::app::build_app(config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
