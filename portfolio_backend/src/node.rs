use crate::api::{self, AppState};
use crate::bootstrap::{self, BootstrapResources};
use crate::config::PortfolioConfig;
use crate::store::RecordStore;
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Bootstraps persistent state once and hands out the pieces the HTTP server
/// and CLI need.
pub struct PortfolioNode {
    config: PortfolioConfig,
    bootstrap: BootstrapResources,
}

impl PortfolioNode {
    pub async fn start(config: PortfolioConfig) -> Result<Self> {
        let bootstrap = bootstrap::initialize(&config).await?;
        tracing::info!(
            directories_created = ?bootstrap.directories_created,
            storage = bootstrap.store.backend_name(),
            ownership_key_created = bootstrap.ownership_key_created,
            "portfolio node initialized"
        );
        Ok(Self { config, bootstrap })
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.bootstrap.store.clone()
    }

    pub fn app_state(&self, shutdown: CancellationToken) -> AppState {
        AppState::new(
            self.config.clone(),
            self.store(),
            self.bootstrap.ownership.clone(),
            self.bootstrap.site.clone(),
            shutdown,
        )
    }

    /// Runs the HTTP server until `shutdown` is cancelled.
    pub async fn run_http_server(&self, shutdown: CancellationToken) -> Result<()> {
        api::serve_http(self.app_state(shutdown)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PortfolioPaths, StorageConfig};
    use tempfile::tempdir;

    #[tokio::test]
    async fn server_stops_when_shutdown_is_cancelled() {
        let dir = tempdir().unwrap();
        let paths = PortfolioPaths::from_base_dir(dir.path()).unwrap();
        let node = PortfolioNode::start(PortfolioConfig::new(0, paths, StorageConfig::Local))
            .await
            .unwrap();
        assert_eq!(node.store().backend_name(), "sqlite");

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            node.run_http_server(shutdown),
        )
        .await
        .expect("server shut down")
        .unwrap();
    }
}
