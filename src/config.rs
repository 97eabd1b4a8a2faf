//! Configuration management

use anyhow::Result;
use std::path::PathBuf;

/// Client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend API base URL
    pub api_base_url: String,

    /// Hostname this client runs under; drives tenant resolution
    pub hostname: String,

    /// Directory for the durable session store
    pub storage_dir: PathBuf,

    /// Default store for the inactivity monitor (optional)
    pub default_loja_id: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api_base_url = std::env::var("SELFMACHINE_API_URL")
            .unwrap_or_else(|_| "https://toylandbackend.onrender.com/api".to_string());

        let hostname =
            std::env::var("SELFMACHINE_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());

        let storage_dir = std::env::var("SELFMACHINE_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("selfmachine")
                    .join("session")
            });

        let default_loja_id = std::env::var("SELFMACHINE_LOJA_ID").ok();

        Ok(Self {
            api_base_url,
            hostname,
            storage_dir,
            default_loja_id,
        })
    }
}
