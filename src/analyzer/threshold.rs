use crate::model::{PriceAlert, Trend};

/// Flags trends whose day-over-day move exceeds the alert percentage.
///
/// This is the simple fixed-percentage rule, independent of the statistical
/// anomaly threshold: a 6% move alerts here even when it is statistically
/// unremarkable.
pub fn check_thresholds(trends: &[Trend], alert_percent: f64) -> Vec<PriceAlert> {
    trends
        .iter()
        .filter(|t| t.day_change_percent.abs() > alert_percent)
        .map(|t| PriceAlert {
            fuel_type: t.fuel_type.clone(),
            region: t.region.clone(),
            change_percent: t.day_change_percent,
            current_price: t.current_price,
        })
        .collect()
}
