mod analyzer;
mod config;
mod ingest;
mod model;
mod notifier;
mod pipeline;
mod storage;
mod utils;

use config::{AppConfig, load_config};
use ingest::{DataLoader, EiaClient, KenyaFuelClient, PriceProvider};
use notifier::{EmailNotifier, Notifier};
use pipeline::PipelineRunner;
use std::sync::Arc;
use storage::SqliteStorage;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Log details about any panic before the process dies
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Panic occurred: {:?}", panic_info);
    }));

    let config: Arc<AppConfig> = match load_config("config.json") {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!("Config load error: {}", e);
            return;
        }
    };

    let storage = match SqliteStorage::new(&config.database_path) {
        Ok(s) => Arc::new(Mutex::new(s)),
        Err(e) => {
            error!("Failed to initialize storage: {:?}", e);
            return;
        }
    };

    let providers: Vec<Box<dyn PriceProvider>> = vec![
        Box::new(EiaClient::new(&config.providers)),
        Box::new(KenyaFuelClient::new()),
    ];
    let loader = DataLoader::new(providers, storage.clone());
    let email_notifier: Arc<dyn Notifier> = Arc::new(EmailNotifier::new(&config.email));
    let runner = PipelineRunner::new(
        config.clone(),
        storage.clone(),
        loader,
        email_notifier.clone(),
    );

    info!("Fuel price monitor started");

    loop {
        info!("Starting pipeline run...");
        match runner.run_once().await {
            Ok(run) => {
                info!(
                    "Pipeline finished: {} records ingested, {} trends, {} anomalies, {} price alerts",
                    run.ingestion.total_ingested,
                    run.trends.len(),
                    run.anomalies.len(),
                    run.alerts.len()
                );
            }
            Err(e) => {
                error!("Pipeline run failed: {}", e);
                let body = format!(
                    "The fuel price pipeline failed and exhausted its retries.\n\nError: {}",
                    e
                );
                if let Err(send_err) = email_notifier
                    .send("Fuel price pipeline failure", &body)
                    .await
                {
                    warn!("Failure alert could not be sent: {}", send_err);
                }
            }
        }

        info!(
            "Sleeping {}s until the next scheduled run...",
            config.check_interval_seconds
        );
        sleep(Duration::from_secs(config.check_interval_seconds)).await;
    }
}
