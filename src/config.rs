// src/config.rs
use serde::Deserialize;

/// Runtime configuration, read from `PAYROLL_`-prefixed environment
/// variables (a `.env` file is honored when present).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Seeds a small demo dataset at startup so the preview and
    /// generation endpoints have something to work with out of the box.
    #[serde(default = "default_seed_demo_data")]
    pub seed_demo_data: bool,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_log_filter() -> String {
    "payroll_core=info,tower_http=info".to_string()
}

fn default_seed_demo_data() -> bool {
    true
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("PAYROLL_").from_env()
    }
}
