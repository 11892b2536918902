use std::sync::Arc;

use anyhow::Context;

use bizsuite_api::app::{self, AppServices};
use bizsuite_infra::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bizsuite_observability::init();

    let config = EngineConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(AppServices::from_config(&config).context("failed to wire services")?);
    let activity = services
        .watch_invoice_activity()
        .context("failed to start invoice activity watcher")?;
    let app = app::router(services, &config.jwt_secret);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app).await;
    activity.shutdown();
    served?;
    Ok(())
}
