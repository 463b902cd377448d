use crate::{config::AppConfig, dashboard::Dashboard, server};
use anyhow::{Context, Result};
use std::sync::Arc;

/// High-level application orchestrator.
pub struct App {
    config: Arc<AppConfig>,
    dashboard: Arc<Dashboard>,
}

impl App {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let paths = config.paths.resolve()?;
        let dashboard = Dashboard::new(paths, config.display);
        tracing::info!(
            stats = %dashboard.usage().snapshot_path().display(),
            store = %dashboard.store().path().display(),
            "resolved data sources"
        );

        Ok(Self {
            config: Arc::new(config),
            dashboard: Arc::new(dashboard),
        })
    }

    pub async fn run(self) -> Result<()> {
        let handle = server::spawn(&self.config.server.listen_addr, self.dashboard.clone()).await?;
        tracing::info!(url = %format!("http://{}/api/overview", handle.local_addr()), "dashboard ready");

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        tracing::info!("shutdown requested");

        handle.shutdown().await
    }
}
