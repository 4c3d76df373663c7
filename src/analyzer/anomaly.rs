use crate::model::{AnalysisError, Anomaly, AnomalyKind, Observation, Severity};
use crate::storage::SqliteStorage;
use crate::utils::round4;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Minimum valid price points a series needs before it carries any signal.
const MIN_SERIES_LEN: usize = 5;

/// Minimum points in the baseline window for a meaningful dispersion.
const MIN_BASELINE_LEN: usize = 2;

/// Flags prices that deviate from their recent per-series baseline by a
/// z-score at or beyond the configured threshold.
///
/// A pure reader over one bounded fetch of recent observations; data-access
/// failures propagate unmodified.
pub struct AnomalyDetector {
    storage: Arc<Mutex<SqliteStorage>>,
    fetch_limit: usize,
}

impl AnomalyDetector {
    pub fn new(storage: Arc<Mutex<SqliteStorage>>, fetch_limit: usize) -> Self {
        Self { storage, fetch_limit }
    }

    pub async fn detect_price_anomalies(
        &self,
        z_threshold: f64,
        history_size: usize,
    ) -> Result<Vec<Anomaly>, AnalysisError> {
        if !z_threshold.is_finite() || z_threshold <= 0.0 {
            return Err(AnalysisError::InvalidThreshold(z_threshold));
        }

        let rows = self
            .storage
            .lock()
            .await
            .recent_observations(self.fetch_limit)?;

        Ok(Self::detect_in(rows, z_threshold, history_size, Utc::now()))
    }

    /// Detection over an already-fetched set of observations.
    pub(crate) fn detect_in(
        rows: Vec<Observation>,
        z_threshold: f64,
        history_size: usize,
        now: DateTime<Utc>,
    ) -> Vec<Anomaly> {
        // Ordered map keeps output deterministic across runs.
        let mut grouped: BTreeMap<(String, String), Vec<Observation>> = BTreeMap::new();
        for obs in rows {
            let fuel_type = if obs.fuel_type.is_empty() {
                "unknown".to_string()
            } else {
                obs.fuel_type.clone()
            };
            let region = obs.region.clone().unwrap_or_else(|| "unknown".to_string());
            grouped.entry((fuel_type, region)).or_default().push(obs);
        }

        let mut anomalies = Vec::new();
        for ((fuel_type, region), mut series) in grouped {
            series.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
            let points: Vec<&Observation> = series.iter().filter(|o| o.price.is_finite()).collect();
            if points.len() < MIN_SERIES_LEN {
                continue;
            }

            let prices: Vec<f64> = points.iter().map(|o| o.price).collect();
            let baseline = &prices[prices.len().saturating_sub(history_size)..];
            if baseline.len() < MIN_BASELINE_LEN {
                continue;
            }

            // Population statistics: dispersion of this exact window, not an
            // estimate of a larger population.
            let count = baseline.len() as f64;
            let mean = baseline.iter().sum::<f64>() / count;
            let sigma = (baseline.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / count).sqrt();
            if sigma == 0.0 {
                continue;
            }

            // The latest point is part of its own baseline window.
            let Some(latest_obs) = points.last() else {
                continue;
            };
            let latest = latest_obs.price;
            let z_score = (latest - mean) / sigma;
            if z_score.abs() < z_threshold {
                continue;
            }

            let kind = if z_score > 0.0 {
                AnomalyKind::Spike
            } else {
                AnomalyKind::Drop
            };

            anomalies.push(Anomaly {
                fuel_type,
                region,
                latest_price: round4(latest),
                baseline_mean: round4(mean),
                z_score: round4(z_score),
                kind,
                severity: severity_for(z_score.abs(), z_threshold),
                detected_at: now,
                resolved: false,
                observation_id: Some(latest_obs.id.clone()),
            });
        }

        anomalies
    }
}

fn severity_for(z_magnitude: f64, z_threshold: f64) -> Severity {
    if z_magnitude >= z_threshold * 3.0 {
        Severity::High
    } else if z_magnitude >= z_threshold * 2.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_id;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap()
    }

    fn series(fuel_type: &str, region: Option<&str>, prices: &[f64]) -> Vec<Observation> {
        let start = now() - Duration::hours(prices.len() as i64);
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| Observation {
                id: generate_id(),
                fuel_type: fuel_type.to_string(),
                price,
                currency: "KES".to_string(),
                region: region.map(|r| r.to_string()),
                station_name: None,
                latitude: None,
                longitude: None,
                source: "test".to_string(),
                source_id: generate_id(),
                recorded_at: start + Duration::hours(i as i64),
                created_at: now(),
                updated_at: None,
                is_valid: true,
                validation_errors: None,
            })
            .collect()
    }

    #[test]
    fn flat_series_with_late_spike_is_flagged() {
        let mut prices = vec![100.0; 29];
        prices.push(130.0);
        let rows = series("petrol", Some("Nairobi"), &prices);

        let anomalies = AnomalyDetector::detect_in(rows, 3.0, 30, now());
        assert_eq!(anomalies.len(), 1);

        let anomaly = &anomalies[0];
        assert_eq!(anomaly.kind, AnomalyKind::Spike);
        assert_eq!(anomaly.fuel_type, "petrol");
        assert_eq!(anomaly.region, "Nairobi");
        assert_eq!(anomaly.latest_price, 130.0);
        assert_eq!(anomaly.baseline_mean, 101.0);
        // z = 29 / sqrt(29) = sqrt(29)
        assert_eq!(anomaly.z_score, 5.3852);
        assert_eq!(anomaly.severity, Severity::Low);
        assert!(!anomaly.resolved);
        assert!(anomaly.observation_id.is_some());
    }

    #[test]
    fn sharp_fall_is_classified_as_drop() {
        let mut prices = vec![200.0; 29];
        prices.push(140.0);
        let rows = series("diesel", Some("Mombasa"), &prices);

        let anomalies = AnomalyDetector::detect_in(rows, 3.0, 30, now());
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::Drop);
        assert!(anomalies[0].z_score < 0.0);
    }

    #[test]
    fn fewer_than_five_points_is_skipped() {
        let rows = series("petrol", Some("Nairobi"), &[100.0, 100.0, 100.0, 180.0]);
        let anomalies = AnomalyDetector::detect_in(rows, 3.0, 30, now());
        assert!(anomalies.is_empty());
    }

    #[test]
    fn zero_variance_baseline_is_skipped() {
        let rows = series("petrol", Some("Nairobi"), &[150.0; 12]);
        let anomalies = AnomalyDetector::detect_in(rows, 3.0, 30, now());
        assert!(anomalies.is_empty());
    }

    #[test]
    fn baseline_is_bounded_by_history_size() {
        // Ten wild early samples, then a flat tail of thirty. With the window
        // bounded at 30 the baseline has zero variance and nothing fires; if
        // the old samples leaked in, the last point would look anomalous.
        let mut prices = vec![1000.0; 10];
        prices.extend(vec![100.0; 30]);
        let rows = series("petrol", Some("Nairobi"), &prices);

        let anomalies = AnomalyDetector::detect_in(rows, 3.0, 30, now());
        assert!(anomalies.is_empty());
    }

    #[test]
    fn missing_keys_normalize_to_unknown() {
        let mut prices = vec![100.0; 29];
        prices.push(130.0);
        let rows = series("", None, &prices);

        let anomalies = AnomalyDetector::detect_in(rows, 3.0, 30, now());
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].fuel_type, "unknown");
        assert_eq!(anomalies[0].region, "unknown");
    }

    #[test]
    fn series_are_partitioned_by_fuel_type_and_region() {
        let mut rows = Vec::new();
        let mut spiky = vec![100.0; 29];
        spiky.push(130.0);
        rows.extend(series("petrol", Some("Nairobi"), &spiky));
        rows.extend(series("petrol", Some("Mombasa"), &[100.0; 30]));
        rows.extend(series("diesel", Some("Nairobi"), &[200.0; 30]));

        let anomalies = AnomalyDetector::detect_in(rows, 3.0, 30, now());
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].region, "Nairobi");
        assert_eq!(anomalies[0].fuel_type, "petrol");
    }

    #[test]
    fn severity_scales_with_z_magnitude() {
        assert_eq!(severity_for(3.5, 3.0), Severity::Low);
        assert_eq!(severity_for(6.0, 3.0), Severity::Medium);
        assert_eq!(severity_for(9.5, 3.0), Severity::High);
    }

    #[tokio::test]
    async fn non_positive_threshold_is_rejected() {
        let storage = Arc::new(Mutex::new(SqliteStorage::open_in_memory().unwrap()));
        let detector = AnomalyDetector::new(storage, 5000);

        let err = detector.detect_price_anomalies(0.0, 30).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidThreshold(_)));

        let err = detector.detect_price_anomalies(-2.5, 30).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidThreshold(_)));
    }

    #[tokio::test]
    async fn detects_from_stored_observations() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut prices = vec![100.0; 29];
        prices.push(130.0);
        for obs in series("petrol", Some("Nairobi"), &prices) {
            storage.upsert_observation(&obs).unwrap();
        }

        let detector = AnomalyDetector::new(Arc::new(Mutex::new(storage)), 5000);
        let anomalies = detector.detect_price_anomalies(3.0, 30).await.unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::Spike);
    }
}
