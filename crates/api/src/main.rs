use anyhow::Context;

use splitledger_infra::LedgerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    splitledger_observability::init();

    let config = LedgerConfig::from_env().context("invalid configuration")?;
    let app = splitledger_api::app::build_app(&config)
        .await
        .context("failed to wire ledger services")?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        persistent = config.database.is_some(),
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
