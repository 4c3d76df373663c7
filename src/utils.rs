// Utility functions
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;

/// Rounds a value to four decimal places, the precision persisted for
/// trend and anomaly metrics.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Midnight of the calendar day containing `ts` (server clock, UTC).
pub fn start_of_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}

/// Parses an RFC 3339 timestamp, falling back to a bare `YYYY-MM-DD` date
/// interpreted as midnight UTC. Providers report both.
pub fn parse_recorded_at(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Random 32-character hex identifier for new rows.
pub fn generate_id() -> String {
    let mut rng = rand::rng();
    (0..32)
        .map(|_| char::from_digit(rng.random_range(0..16), 16).expect("digit in radix"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round4_truncates_to_four_places() {
        assert_eq!(round4(6.18000001), 6.18);
        assert_eq!(round4(5.38516480), 5.3852);
        assert_eq!(round4(-0.00005), -0.0001);
    }

    #[test]
    fn start_of_day_is_midnight() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 15, 13, 45, 12).unwrap();
        let midnight = start_of_day(ts);
        assert_eq!(midnight, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn parse_recorded_at_accepts_rfc3339_and_dates() {
        let full = parse_recorded_at("2024-03-15T06:30:00+00:00").unwrap();
        assert_eq!(full, Utc.with_ymd_and_hms(2024, 3, 15, 6, 30, 0).unwrap());

        let date_only = parse_recorded_at("2024-03-15").unwrap();
        assert_eq!(date_only, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());

        assert!(parse_recorded_at("not a date").is_none());
    }

    #[test]
    fn generated_ids_are_hex_and_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
