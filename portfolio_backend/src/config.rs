use anyhow::{anyhow, Result};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_API_PORT: u16 = 8080;
const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone)]
pub struct PortfolioConfig {
    pub api_port: u16,
    pub paths: PortfolioPaths,
    pub storage: StorageConfig,
    pub ownership_secret: Option<String>,
    pub site_file: Option<PathBuf>,
}

impl PortfolioConfig {
    pub fn from_env() -> Result<Self> {
        let paths = PortfolioPaths::discover()?;
        let api_port = env::var("PORTFOLIO_API_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_API_PORT);
        let storage = StorageConfig::from_vars(
            non_empty_var("PORTFOLIO_STORAGE_URL"),
            non_empty_var("PORTFOLIO_STORAGE_KEY"),
            non_empty_var("PORTFOLIO_STORAGE_TIMEOUT_SECS"),
        );
        Ok(Self {
            api_port,
            paths,
            storage,
            ownership_secret: non_empty_var("PORTFOLIO_OWNERSHIP_SECRET"),
            site_file: non_empty_var("PORTFOLIO_SITE_FILE").map(PathBuf::from),
        })
    }

    pub fn new(api_port: u16, paths: PortfolioPaths, storage: StorageConfig) -> Self {
        Self {
            api_port,
            paths,
            storage,
            ownership_secret: None,
            site_file: None,
        }
    }
}

/// Where comments and contact messages are persisted.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Hosted database service reached over its REST interface.
    Hosted(HostedStorageConfig),
    /// SQLite file under the data directory.
    Local,
}

impl StorageConfig {
    /// The hosted backend is only selected when both the URL and the key
    /// are present. Nothing falls back to credentials baked into the binary.
    pub fn from_vars(
        url: Option<String>,
        api_key: Option<String>,
        timeout_secs: Option<String>,
    ) -> Self {
        match (url, api_key) {
            (Some(url), Some(api_key)) => {
                let timeout = timeout_secs
                    .and_then(|raw| raw.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_STORAGE_TIMEOUT_SECS);
                StorageConfig::Hosted(HostedStorageConfig::new(
                    url,
                    api_key,
                    Duration::from_secs(timeout),
                ))
            }
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!(
                    "PORTFOLIO_STORAGE_URL and PORTFOLIO_STORAGE_KEY must both be set; using local storage"
                );
                StorageConfig::Local
            }
            (None, None) => StorageConfig::Local,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            StorageConfig::Hosted(_) => "hosted",
            StorageConfig::Local => "sqlite",
        }
    }
}

#[derive(Clone)]
pub struct HostedStorageConfig {
    pub url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl HostedStorageConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let mut url = url.into().trim().to_string();
        while url.ends_with('/') {
            url.pop();
        }
        Self {
            url,
            api_key: api_key.into().trim().to_string(),
            timeout,
        }
    }
}

impl fmt::Debug for HostedStorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedStorageConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Settings for the command-line client talking to a running server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub state_path: PathBuf,
}

impl ClientConfig {
    pub fn from_env(paths: &PortfolioPaths) -> Self {
        let api_url =
            non_empty_var("PORTFOLIO_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let state_path = non_empty_var("PORTFOLIO_CLIENT_STATE")
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.client_state_path.clone());
        Self {
            api_url,
            state_path,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PortfolioPaths {
    pub base: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub keys_dir: PathBuf,
    pub ownership_key_path: PathBuf,
    pub client_state_path: PathBuf,
}

impl PortfolioPaths {
    pub fn discover() -> Result<Self> {
        if let Some(home) = non_empty_var("PORTFOLIO_HOME") {
            return Self::from_base_dir(home);
        }
        let exe_path = std::env::current_exe()
            .map_err(|err| anyhow!("failed to resolve current executable: {err}"))?;
        let base = exe_path
            .parent()
            .ok_or_else(|| anyhow!("executable path missing parent"))?
            .to_path_buf();
        Self::from_base_dir(base)
    }

    pub fn from_base_dir<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let data_dir = base.join("data");
        let db_path = data_dir.join("portfolio.db");
        let keys_dir = base.join("keys");
        let ownership_key_path = keys_dir.join("ownership.key");
        let client_state_path = base.join("client_state.json");

        Ok(Self {
            base,
            data_dir,
            db_path,
            keys_dir,
            ownership_key_path,
            client_state_path,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().and_then(|raw| {
        if raw.trim().is_empty() {
            None
        } else {
            Some(raw)
        }
    })
}
