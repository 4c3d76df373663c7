use crate::ingest::PriceProvider;
use crate::model::{IngestionSummary, Observation, SourceResult, StorageError};
use crate::storage::SqliteStorage;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Fetches every configured provider, validates and upserts the results, and
/// reports what happened.
pub struct DataLoader {
    providers: Vec<Box<dyn PriceProvider>>,
    storage: Arc<Mutex<SqliteStorage>>,
}

impl DataLoader {
    pub fn new(providers: Vec<Box<dyn PriceProvider>>, storage: Arc<Mutex<SqliteStorage>>) -> Self {
        Self { providers, storage }
    }

    pub async fn ingest_all_sources(&self) -> Result<IngestionSummary, StorageError> {
        let started = Instant::now();
        let mut summary = IngestionSummary::default();

        let fetches = self.providers.iter().map(|provider| async move {
            let fetch_started = Instant::now();
            let result = provider.fetch_prices().await;
            (provider.name().to_string(), fetch_started.elapsed(), result)
        });
        let results = join_all(fetches).await;

        for (source, elapsed, result) in results {
            let response_time_ms = elapsed.as_secs_f64() * 1000.0;
            match result {
                Ok(mut observations) => {
                    for obs in observations.iter_mut() {
                        validate_observation(obs);
                    }

                    let fetched = observations.len();
                    let mut ingested = 0;
                    {
                        let storage = self.storage.lock().await;
                        for obs in &observations {
                            // A single bad row must not sink the whole batch.
                            if let Err(e) = storage.upsert_observation(obs) {
                                warn!("DB save error for {}: {:?}", source, e);
                                continue;
                            }
                            ingested += 1;
                        }
                    }

                    info!("Ingested {}/{} records from {}", ingested, fetched, source);
                    summary.total_ingested += ingested;
                    summary.sources.push(SourceResult {
                        source,
                        fetched,
                        ingested,
                        response_time_ms,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("Fetch from {} failed: {}", source, e);
                    summary.errors.push(format!("{}: {}", source, e));
                    summary.sources.push(SourceResult {
                        source,
                        fetched: 0,
                        ingested: 0,
                        response_time_ms,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let status_code = if summary.errors.is_empty() { 200 } else { 500 };
        let error_message = if summary.errors.is_empty() {
            None
        } else {
            Some(summary.errors.join("; "))
        };
        self.storage.lock().await.log_api_call(
            "ingestion_pipeline",
            "ingest_all",
            status_code,
            summary.total_ingested as i64,
            error_message.as_deref(),
            started.elapsed().as_secs_f64() * 1000.0,
        )?;

        Ok(summary)
    }
}

/// Flags observations that fail basic quality checks. Invalid rows are kept
/// for audit, the validation stage decides whether the run may proceed.
fn validate_observation(obs: &mut Observation) {
    let mut errors: Vec<String> = Vec::new();

    if !obs.price.is_finite() || obs.price < 0.0 {
        errors.push("price must be a non-negative number".to_string());
    }
    if obs.fuel_type.trim().is_empty() {
        errors.push("fuel_type must not be empty".to_string());
    }

    if errors.is_empty() {
        obs.is_valid = true;
        obs.validation_errors = None;
    } else {
        obs.is_valid = false;
        obs.validation_errors = Some(serde_json::json!({ "errors": errors }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FetchError;
    use crate::utils::generate_id;
    use chrono::Utc;

    struct FixedProvider {
        name: &'static str,
        prices: Vec<f64>,
    }

    #[async_trait::async_trait]
    impl PriceProvider for FixedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_prices(&self) -> Result<Vec<Observation>, FetchError> {
            let now = Utc::now();
            Ok(self
                .prices
                .iter()
                .enumerate()
                .map(|(i, &price)| Observation {
                    id: generate_id(),
                    fuel_type: "petrol".to_string(),
                    price,
                    currency: "KES".to_string(),
                    region: Some("Nairobi".to_string()),
                    station_name: None,
                    latitude: None,
                    longitude: None,
                    source: self.name.to_string(),
                    source_id: format!("{}_{}", self.name, i),
                    recorded_at: now,
                    created_at: now,
                    updated_at: None,
                    is_valid: true,
                    validation_errors: None,
                })
                .collect())
        }
    }

    struct FailingProvider;

    #[async_trait::async_trait]
    impl PriceProvider for FailingProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn fetch_prices(&self) -> Result<Vec<Observation>, FetchError> {
            Err(FetchError::InvalidResponse("status 503".to_string()))
        }
    }

    #[tokio::test]
    async fn ingests_from_all_providers() {
        let storage = Arc::new(Mutex::new(SqliteStorage::open_in_memory().unwrap()));
        let loader = DataLoader::new(
            vec![
                Box::new(FixedProvider { name: "alpha", prices: vec![200.0, 210.0] }),
                Box::new(FixedProvider { name: "beta", prices: vec![190.0] }),
            ],
            storage.clone(),
        );

        let summary = loader.ingest_all_sources().await.unwrap();
        assert_eq!(summary.total_ingested, 3);
        assert_eq!(summary.sources.len(), 2);
        assert!(summary.errors.is_empty());

        let rows = storage.lock().await.recent_observations(10).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn provider_failure_is_recorded_not_raised() {
        let storage = Arc::new(Mutex::new(SqliteStorage::open_in_memory().unwrap()));
        let loader = DataLoader::new(
            vec![
                Box::new(FailingProvider),
                Box::new(FixedProvider { name: "alpha", prices: vec![200.0] }),
            ],
            storage.clone(),
        );

        let summary = loader.ingest_all_sources().await.unwrap();
        assert_eq!(summary.total_ingested, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("flaky"));

        let failed = summary.sources.iter().find(|s| s.source == "flaky").unwrap();
        assert_eq!(failed.ingested, 0);
        assert!(failed.error.is_some());
    }

    #[tokio::test]
    async fn invalid_prices_are_flagged_but_stored() {
        let storage = Arc::new(Mutex::new(SqliteStorage::open_in_memory().unwrap()));
        let loader = DataLoader::new(
            vec![Box::new(FixedProvider { name: "alpha", prices: vec![-5.0, 200.0] })],
            storage.clone(),
        );

        let summary = loader.ingest_all_sources().await.unwrap();
        assert_eq!(summary.total_ingested, 2);

        let rows = storage.lock().await.recent_observations(10).unwrap();
        let invalid: Vec<_> = rows.iter().filter(|o| !o.is_valid).collect();
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].price, -5.0);
        assert!(invalid[0].validation_errors.is_some());
    }

    #[test]
    fn validation_catches_bad_fields() {
        let now = Utc::now();
        let mut obs = Observation {
            id: generate_id(),
            fuel_type: "  ".to_string(),
            price: f64::NAN,
            currency: "KES".to_string(),
            region: None,
            station_name: None,
            latitude: None,
            longitude: None,
            source: "test".to_string(),
            source_id: "test_1".to_string(),
            recorded_at: now,
            created_at: now,
            updated_at: None,
            is_valid: true,
            validation_errors: None,
        };

        validate_observation(&mut obs);
        assert!(!obs.is_valid);
        let payload = obs.validation_errors.unwrap();
        assert_eq!(payload["errors"].as_array().unwrap().len(), 2);
    }
}
