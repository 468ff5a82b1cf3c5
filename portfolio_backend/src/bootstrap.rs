use crate::config::{PortfolioConfig, StorageConfig};
use crate::ownership::{ensure_ownership_key, OwnershipKey};
use crate::site::SiteProfile;
use crate::store::{RecordStore, RestStore, SqliteStore};
use anyhow::{Context, Result};
use std::fs;
use std::sync::Arc;

pub struct BootstrapResources {
    pub directories_created: Vec<String>,
    pub store: Arc<dyn RecordStore>,
    pub ownership: OwnershipKey,
    pub ownership_key_created: bool,
    pub site: SiteProfile,
}

pub async fn initialize(config: &PortfolioConfig) -> Result<BootstrapResources> {
    let mut directories_created = Vec::new();
    if matches!(config.storage, StorageConfig::Local) {
        create_dir_if_missing(&config.paths.data_dir, &mut directories_created)?;
    }
    if config.ownership_secret.is_none() {
        create_dir_if_missing(&config.paths.keys_dir, &mut directories_created)?;
    }

    let store = open_store(config)?;
    let (ownership, ownership_key_created) =
        ensure_ownership_key(&config.paths, config.ownership_secret.as_deref())?;
    let site = SiteProfile::load(config.site_file.as_deref())?;

    Ok(BootstrapResources {
        directories_created,
        store,
        ownership,
        ownership_key_created,
        site,
    })
}

/// Hosted storage when configured, otherwise the local SQLite file with its
/// tables created. Hosted tables are provisioned by an operator.
pub fn open_store(config: &PortfolioConfig) -> Result<Arc<dyn RecordStore>> {
    match &config.storage {
        StorageConfig::Hosted(hosted) => {
            let store = RestStore::new(hosted)
                .with_context(|| format!("failed to configure hosted storage at {}", hosted.url))?;
            Ok(Arc::new(store))
        }
        StorageConfig::Local => {
            if let Some(parent) = config.paths.db_path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let store = SqliteStore::open(&config.paths.db_path).with_context(|| {
                format!("failed to open {}", config.paths.db_path.display())
            })?;
            store.ensure_schema()?;
            Ok(Arc::new(store))
        }
    }
}

fn create_dir_if_missing(path: &std::path::Path, created: &mut Vec<String>) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        created.push(path.display().to_string());
    }
    Ok(())
}
