// Pipeline runner: ingest -> validate -> analyze trends -> {detect anomalies,
// check thresholds} -> report -> notify, with per-task retry.
use crate::analyzer::threshold::check_thresholds;
use crate::analyzer::{AnomalyDetector, TrendCalculator};
use crate::config::AppConfig;
use crate::ingest::DataLoader;
use crate::model::{Anomaly, IngestionSummary, PipelineError, PriceAlert, Trend};
use crate::notifier::Notifier;
use crate::storage::SqliteStorage;
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

/// The typed handoff between pipeline stages: each stage's output feeds the
/// next as a plain value, nothing is stashed in shared state.
#[derive(Debug)]
pub struct PipelineRun {
    pub ingestion: IngestionSummary,
    pub trends: Vec<Trend>,
    pub anomalies: Vec<Anomaly>,
    pub alerts: Vec<PriceAlert>,
    pub report: String,
}

pub struct PipelineRunner {
    config: Arc<AppConfig>,
    storage: Arc<Mutex<SqliteStorage>>,
    loader: DataLoader,
    trend_calculator: TrendCalculator,
    anomaly_detector: AnomalyDetector,
    notifier: Arc<dyn Notifier>,
}

impl PipelineRunner {
    pub fn new(
        config: Arc<AppConfig>,
        storage: Arc<Mutex<SqliteStorage>>,
        loader: DataLoader,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let trend_calculator = TrendCalculator::new(storage.clone());
        let anomaly_detector =
            AnomalyDetector::new(storage.clone(), config.analysis.recent_fetch_limit);
        Self {
            config,
            storage,
            loader,
            trend_calculator,
            anomaly_detector,
            notifier,
        }
    }

    /// One full pipeline run. Stage failures are retried per the configured
    /// policy; a stage that exhausts its retries fails the run.
    pub async fn run_once(&self) -> Result<PipelineRun, PipelineError> {
        let retries = self.config.task_retries;
        let delay = StdDuration::from_secs(self.config.retry_delay_seconds);

        info!("Task: ingest_data");
        let ingestion =
            run_with_retry("ingest_data", retries, delay, || self.loader.ingest_all_sources())
                .await?;
        if ingestion.total_ingested == 0 {
            return Err(PipelineError::NoData);
        }

        info!("Task: validate_data");
        run_with_retry("validate_data", retries, delay, || self.validate_data()).await?;

        info!("Task: analyze_trends");
        let trends = run_with_retry("analyze_trends", retries, delay, || {
            self.trend_calculator.compute_daily_trends()
        })
        .await?;

        info!("Task: detect_anomalies");
        let anomalies = run_with_retry("detect_anomalies", retries, delay, || {
            self.anomaly_detector.detect_price_anomalies(
                self.config.analysis.z_threshold,
                self.config.analysis.history_size,
            )
        })
        .await?;

        info!("Task: check_thresholds");
        let alerts = check_thresholds(&trends, self.config.analysis.price_change_alert_percent);

        {
            let storage = self.storage.lock().await;
            for trend in &trends {
                storage.insert_trend(trend)?;
            }
            for anomaly in &anomalies {
                storage.insert_anomaly(anomaly)?;
            }
        }

        info!(
            "Computed {} trends, {} anomalies, {} price alerts",
            trends.len(),
            anomalies.len(),
            alerts.len()
        );

        let now = Utc::now();
        let report = build_report(now, &ingestion, &trends, &alerts, &anomalies);
        let subject = format!("Daily Fuel Price Report - {}", now.format("%Y-%m-%d"));

        info!("Task: send_daily_report");
        run_with_retry("send_daily_report", retries, delay, || {
            self.notifier.send(&subject, &report)
        })
        .await?;

        Ok(PipelineRun {
            ingestion,
            trends,
            anomalies,
            alerts,
            report,
        })
    }

    /// Fails the run when freshly ingested rows were flagged invalid.
    async fn validate_data(&self) -> Result<(), PipelineError> {
        let since = Utc::now() - Duration::hours(1);
        let invalid = self.storage.lock().await.count_invalid_since(since)?;
        if invalid > 0 {
            return Err(PipelineError::Validation(format!(
                "found {} invalid observations ingested in the last hour",
                invalid
            )));
        }
        Ok(())
    }
}

/// Runs `op`, retrying up to `retries` additional attempts with `delay`
/// between them. The last error is surfaced unchanged.
pub(crate) async fn run_with_retry<T, E, F, Fut>(
    task: &str,
    retries: u32,
    delay: StdDuration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retries => {
                attempt += 1;
                warn!(
                    "Task {} failed (attempt {}/{}): {}. Retrying in {:?}...",
                    task,
                    attempt,
                    retries + 1,
                    e,
                    delay
                );
                sleep(delay).await;
            }
            Err(e) => {
                warn!("Task {} failed after {} attempts: {}", task, attempt + 1, e);
                return Err(e);
            }
        }
    }
}

fn region_label(region: Option<&str>) -> &str {
    region.unwrap_or("unknown")
}

/// Plain-text daily report consumed by the notifier.
pub(crate) fn build_report(
    date: DateTime<Utc>,
    ingestion: &IngestionSummary,
    trends: &[Trend],
    alerts: &[PriceAlert],
    anomalies: &[Anomaly],
) -> String {
    let sources: Vec<&str> = ingestion.sources.iter().map(|s| s.source.as_str()).collect();

    let mut report = format!("Daily Fuel Price Report - {}\n\n", date.format("%Y-%m-%d"));
    report.push_str("Summary:\n");
    report.push_str(&format!("- Records ingested: {}\n", ingestion.total_ingested));
    report.push_str(&format!("- Sources: {}\n", sources.join(", ")));

    report.push_str("\nTop Trends:\n");
    if trends.is_empty() {
        report.push_str("- none\n");
    }
    for trend in trends.iter().take(5) {
        report.push_str(&format!(
            "- {} in {}: {:.2}% change\n",
            trend.fuel_type,
            region_label(trend.region.as_deref()),
            trend.day_change_percent
        ));
    }

    report.push_str("\nPrice Alerts:\n");
    if alerts.is_empty() {
        report.push_str("- none\n");
    }
    for alert in alerts {
        report.push_str(&format!(
            "- {} in {}: {:.2}% move, now {:.4}\n",
            alert.fuel_type,
            region_label(alert.region.as_deref()),
            alert.change_percent,
            alert.current_price
        ));
    }

    report.push_str("\nAnomalies:\n");
    if anomalies.is_empty() {
        report.push_str("- none\n");
    }
    for anomaly in anomalies {
        report.push_str(&format!(
            "- {} in {}: {} to {:.4} (baseline {:.4}, z={:.4}, severity {})\n",
            anomaly.fuel_type,
            anomaly.region,
            anomaly.kind.as_str(),
            anomaly.latest_price,
            anomaly.baseline_mean,
            anomaly.z_score,
            anomaly.severity.as_str()
        ));
    }

    report
}
