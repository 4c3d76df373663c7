use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_eia_base_url")]
    pub eia_base_url: String,
    pub eia_api_key: String,
    #[serde(default = "default_fetch_window_days")]
    pub fetch_window_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Z-score magnitude that flags a statistical anomaly.
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,
    /// Baseline window size per series, in samples.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Cap on the system-wide recent-observation fetch.
    #[serde(default = "default_recent_fetch_limit")]
    pub recent_fetch_limit: usize,
    /// Day-over-day percentage move that raises a price alert.
    #[serde(default = "default_price_change_alert_percent")]
    pub price_change_alert_percent: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            z_threshold: default_z_threshold(),
            history_size: default_history_size(),
            recent_fetch_limit: default_recent_fetch_limit(),
            price_change_alert_percent: default_price_change_alert_percent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub api_base_url: String,
    pub api_key: String,
    pub sender: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_path: String,
    pub check_interval_seconds: u64,
    #[serde(default = "default_task_retries")]
    pub task_retries: u32,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
    pub providers: ProviderConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    pub email: EmailConfig,
}

fn default_eia_base_url() -> String {
    "https://api.eia.gov/v2".to_string()
}

fn default_fetch_window_days() -> i64 {
    1
}

fn default_z_threshold() -> f64 {
    3.0
}

fn default_history_size() -> usize {
    30
}

fn default_recent_fetch_limit() -> usize {
    5000
}

fn default_price_change_alert_percent() -> f64 {
    5.0
}

fn default_task_retries() -> u32 {
    3
}

fn default_retry_delay_seconds() -> u64 {
    300
}

pub fn load_config(path: &str) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}
