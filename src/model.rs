// Core structs: Observation, Trend, Anomaly, PriceAlert
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One recorded fuel price at a place and time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub fuel_type: String,
    pub price: f64,
    pub currency: String,
    pub region: Option<String>,
    pub station_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub source: String,
    pub source_id: String,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_valid: bool,
    pub validation_errors: Option<serde_json::Value>,
}

/// Day-over-day price change summary for a (fuel type, region) pair.
///
/// The longer-horizon fields stay `None` for now: the daily calculator fills
/// only the day horizon, the columns exist for a future backfill job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trend {
    pub fuel_type: String,
    pub region: Option<String>,
    pub current_price: f64,
    pub yesterday_price: f64,
    pub week_ago_price: Option<f64>,
    pub month_ago_price: Option<f64>,
    pub day_change: f64,
    pub day_change_percent: f64,
    pub week_change_percent: Option<f64>,
    pub month_change_percent: Option<f64>,
    pub rolling_7d_avg: Option<f64>,
    pub rolling_30d_avg: Option<f64>,
    pub volatility_7d: Option<f64>,
    pub calculated_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyKind {
    Spike,
    Drop,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::Spike => "spike",
            AnomalyKind::Drop => "drop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// A statistically significant deviation of the latest price from its
/// recent baseline.
#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub fuel_type: String,
    pub region: String,
    pub latest_price: f64,
    pub baseline_mean: f64,
    pub z_score: f64,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,
    pub observation_id: Option<String>,
}

/// A percentage-move alert from the fixed threshold check. Distinct from
/// `Anomaly`: it triggers on the size of the day-over-day move, not on
/// statistical deviation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceAlert {
    pub fuel_type: String,
    pub region: Option<String>,
    pub change_percent: f64,
    pub current_price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceResult {
    pub source: String,
    pub fetched: usize,
    pub ingested: usize,
    pub response_time_ms: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionSummary {
    pub total_ingested: usize,
    pub sources: Vec<SourceResult>,
    pub errors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("z-score threshold must be positive and finite, got {0}")]
    InvalidThreshold(f64),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("mail api request failed: {0}")]
    Api(#[from] reqwest::Error),
    #[error("mail api rejected message: status {0}")]
    Rejected(reqwest::StatusCode),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no data ingested from any source")]
    NoData,
    #[error("data validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}
