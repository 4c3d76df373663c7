use crate::model::{StorageError, Trend};
use crate::storage::SqliteStorage;
use crate::utils::{round4, start_of_day};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Computes day-over-day average price movement per (fuel type, region).
///
/// A pure reader: two grouped-average queries against the store, no side
/// effects. Data-access failures propagate to the caller unmodified.
pub struct TrendCalculator {
    storage: Arc<Mutex<SqliteStorage>>,
}

impl TrendCalculator {
    pub fn new(storage: Arc<Mutex<SqliteStorage>>) -> Self {
        Self { storage }
    }

    pub async fn compute_daily_trends(&self) -> Result<Vec<Trend>, StorageError> {
        self.compute_trends_at(Utc::now()).await
    }

    /// The computation itself, a function of the store contents and `now`.
    pub(crate) async fn compute_trends_at(&self, now: DateTime<Utc>) -> Result<Vec<Trend>, StorageError> {
        let today_start = start_of_day(now);
        let yesterday_start = today_start - Duration::days(1);

        // Each query takes and releases its own storage handle.
        let today_rows = self
            .storage
            .lock()
            .await
            .average_price_by_group(today_start, now)?;
        let yesterday_rows = self
            .storage
            .lock()
            .await
            .average_price_by_group(yesterday_start, today_start)?;

        let yesterday_map: HashMap<(String, Option<String>), f64> = yesterday_rows
            .into_iter()
            .map(|g| ((g.fuel_type, g.region), g.avg_price))
            .collect();

        // One trend per key seen today; keys with only a yesterday bucket are
        // omitted. A key with no yesterday bucket falls back to the current
        // price so its change reads as 0 rather than undefined.
        let mut trends = Vec::new();
        for group in today_rows {
            let current_price = group.avg_price;
            let key = (group.fuel_type, group.region);
            let yesterday_price = yesterday_map.get(&key).copied().unwrap_or(current_price);

            let day_change = current_price - yesterday_price;
            let day_change_percent = if yesterday_price != 0.0 {
                day_change / yesterday_price * 100.0
            } else {
                0.0
            };

            trends.push(Trend {
                fuel_type: key.0,
                region: key.1,
                current_price: round4(current_price),
                yesterday_price: round4(yesterday_price),
                week_ago_price: None,
                month_ago_price: None,
                day_change: round4(day_change),
                day_change_percent: round4(day_change_percent),
                week_change_percent: None,
                month_change_percent: None,
                rolling_7d_avg: None,
                rolling_30d_avg: None,
                volatility_7d: None,
                calculated_at: now,
                period_start: yesterday_start,
                period_end: now,
            });
        }

        Ok(trends)
    }
}
