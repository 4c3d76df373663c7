// EIA v2 open-data API client.
use crate::config::ProviderConfig;
use crate::model::{FetchError, Observation};
use crate::utils::{generate_id, parse_recorded_at};
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct EiaEnvelope {
    response: EiaResponse,
}

#[derive(Debug, Deserialize)]
struct EiaResponse {
    #[serde(default)]
    data: Vec<EiaRecord>,
}

#[derive(Debug, Deserialize)]
struct EiaRecord {
    period: String,
    product: Option<String>,
    #[serde(rename = "area-name")]
    area_name: Option<String>,
    value: Option<f64>,
}

pub struct EiaClient {
    client: Client,
    base_url: String,
    api_key: String,
    window_days: i64,
}

impl EiaClient {
    pub fn new(cfg: &ProviderConfig) -> Self {
        let client = Client::builder()
            .user_agent("FuelPriceMonitor/1.0")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: cfg.eia_base_url.clone(),
            api_key: cfg.eia_api_key.clone(),
            window_days: cfg.fetch_window_days,
        }
    }

    fn transform(&self, records: Vec<EiaRecord>) -> Vec<Observation> {
        let now = Utc::now();
        let mut observations = Vec::with_capacity(records.len());

        for record in records {
            let product = record.product.unwrap_or_default();
            let Some(recorded_at) = parse_recorded_at(&record.period) else {
                continue;
            };

            observations.push(Observation {
                id: generate_id(),
                fuel_type: product.to_lowercase().replace(' ', "_"),
                price: record.value.unwrap_or(0.0),
                currency: "USD".to_string(),
                region: Some(record.area_name.unwrap_or_else(|| "Unknown".to_string())),
                station_name: Some("EIA Reported".to_string()),
                latitude: None,
                longitude: None,
                source: "eia".to_string(),
                source_id: format!("eia_{}_{}", record.period, product),
                recorded_at,
                created_at: now,
                updated_at: None,
                is_valid: true,
                validation_errors: None,
            });
        }

        observations
    }
}

#[async_trait::async_trait]
impl crate::ingest::PriceProvider for EiaClient {
    fn name(&self) -> &str {
        "eia"
    }

    async fn fetch_prices(&self) -> Result<Vec<Observation>, FetchError> {
        let url = format!("{}/petroleum/pri/gnd/data/", self.base_url);
        let start = (Utc::now() - Duration::days(self.window_days))
            .format("%Y-%m-%d")
            .to_string();
        let end = Utc::now().format("%Y-%m-%d").to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("frequency", "daily"),
                ("data[]", "value"),
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("length", "5000"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::InvalidResponse(format!(
                "status {}",
                response.status()
            )));
        }

        let envelope: EiaEnvelope = response.json().await?;
        Ok(self.transform(envelope.response.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn client() -> EiaClient {
        EiaClient::new(&ProviderConfig {
            eia_base_url: "https://api.eia.gov/v2".to_string(),
            eia_api_key: "test-key".to_string(),
            fetch_window_days: 1,
        })
    }

    #[test]
    fn transforms_eia_records_to_observations() {
        let raw = r#"{
            "response": {
                "data": [
                    {
                        "period": "2024-03-15",
                        "product": "Regular Gasoline",
                        "area-name": "PADD 1",
                        "value": 3.45
                    },
                    {
                        "period": "garbage",
                        "product": "Diesel",
                        "area-name": "PADD 2",
                        "value": 4.1
                    }
                ]
            }
        }"#;

        let envelope: EiaEnvelope = serde_json::from_str(raw).unwrap();
        let observations = client().transform(envelope.response.data);

        // The unparseable period is dropped.
        assert_eq!(observations.len(), 1);
        let obs = &observations[0];
        assert_eq!(obs.fuel_type, "regular_gasoline");
        assert_eq!(obs.price, 3.45);
        assert_eq!(obs.currency, "USD");
        assert_eq!(obs.region.as_deref(), Some("PADD 1"));
        assert_eq!(obs.source, "eia");
        assert_eq!(obs.source_id, "eia_2024-03-15_Regular Gasoline");
        assert_eq!(
            obs.recorded_at,
            Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
        );
        assert!(obs.is_valid);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let raw = r#"{
            "response": {
                "data": [
                    { "period": "2024-03-15" }
                ]
            }
        }"#;

        let envelope: EiaEnvelope = serde_json::from_str(raw).unwrap();
        let observations = client().transform(envelope.response.data);

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].fuel_type, "");
        assert_eq!(observations[0].price, 0.0);
        assert_eq!(observations[0].region.as_deref(), Some("Unknown"));
    }

    #[test]
    fn empty_payload_is_not_an_error() {
        let envelope: EiaEnvelope = serde_json::from_str(r#"{ "response": {} }"#).unwrap();
        assert!(client().transform(envelope.response.data).is_empty());
    }
}
