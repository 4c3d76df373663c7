use crate::model::{Anomaly, Observation, StorageError, Trend};
use crate::utils::generate_id;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

/// One row of a grouped-average query: mean price per (fuel type, region)
/// over a time window.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupAverage {
    pub fuel_type: String,
    pub region: Option<String>,
    pub avg_price: f64,
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens the database at `db_path` and runs migrations.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS fuel_prices (
                id TEXT PRIMARY KEY,
                fuel_type TEXT NOT NULL,
                price REAL NOT NULL,
                currency TEXT NOT NULL DEFAULT 'KES',
                region TEXT,
                station_name TEXT,
                latitude REAL,
                longitude REAL,
                source TEXT NOT NULL,
                source_id TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT,
                is_valid INTEGER NOT NULL DEFAULT 1,
                validation_errors TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_source_id
                ON fuel_prices(source, source_id);
            CREATE INDEX IF NOT EXISTS idx_fuel_type_region
                ON fuel_prices(fuel_type, region);
            CREATE INDEX IF NOT EXISTS idx_recorded_at
                ON fuel_prices(recorded_at);

            CREATE TABLE IF NOT EXISTS price_trends (
                id TEXT PRIMARY KEY,
                fuel_type TEXT NOT NULL,
                region TEXT,
                current_price REAL,
                yesterday_price REAL,
                week_ago_price REAL,
                month_ago_price REAL,
                day_change REAL,
                day_change_percent REAL,
                week_change_percent REAL,
                month_change_percent REAL,
                rolling_7d_avg REAL,
                rolling_30d_avg REAL,
                volatility_7d REAL,
                calculated_at TEXT NOT NULL,
                period_start TEXT,
                period_end TEXT
            );

            CREATE TABLE IF NOT EXISTS anomaly_logs (
                id TEXT PRIMARY KEY,
                fuel_price_id TEXT,
                fuel_type TEXT NOT NULL,
                region TEXT NOT NULL,
                latest_price REAL NOT NULL,
                baseline_mean REAL NOT NULL,
                z_score REAL NOT NULL,
                anomaly_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                detected_at TEXT NOT NULL,
                resolved INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS api_logs (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                endpoint TEXT,
                status_code INTEGER,
                response_time_ms REAL,
                records_fetched INTEGER,
                error_message TEXT,
                executed_at TEXT NOT NULL
            );
            ",
        )?;

        // Quality columns arrived after the first deployments; older databases
        // need them added in place.
        Self::migrate_add_column_if_missing(&conn, "fuel_prices", "is_valid", "INTEGER NOT NULL DEFAULT 1")?;
        Self::migrate_add_column_if_missing(&conn, "fuel_prices", "validation_errors", "TEXT")?;

        Ok(Self { conn })
    }

    /// Adds a column to a table unless it already exists.
    fn migrate_add_column_if_missing(
        conn: &Connection,
        table: &str,
        column: &str,
        column_def: &str,
    ) -> Result<(), StorageError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let existing_columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;

        if !existing_columns.iter().any(|c| c == column) {
            let alter_sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, column_def);
            conn.execute(&alter_sql, [])?;
        }

        Ok(())
    }

    /// Inserts an observation, or updates the prior row's price when the same
    /// (source, source_id) has been seen before. Never duplicates a reading.
    pub fn upsert_observation(&self, obs: &Observation) -> Result<(), StorageError> {
        let validation_errors = obs
            .validation_errors
            .as_ref()
            .map(|v| v.to_string());

        self.conn.execute(
            "INSERT INTO fuel_prices (
                id, fuel_type, price, currency, region, station_name,
                latitude, longitude, source, source_id, recorded_at,
                created_at, updated_at, is_valid, validation_errors
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(source, source_id) DO UPDATE SET
                price = excluded.price,
                updated_at = excluded.created_at",
            params![
                &obs.id,
                &obs.fuel_type,
                &obs.price,
                &obs.currency,
                &obs.region,
                &obs.station_name,
                &obs.latitude,
                &obs.longitude,
                &obs.source,
                &obs.source_id,
                &obs.recorded_at.to_rfc3339(),
                &obs.created_at.to_rfc3339(),
                &obs.updated_at.map(|ts| ts.to_rfc3339()),
                &obs.is_valid,
                &validation_errors,
            ],
        )?;
        Ok(())
    }

    /// Mean price per (fuel_type, region) for observations recorded in
    /// `[start, end)`. One query, rows ordered by key.
    pub fn average_price_by_group(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GroupAverage>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT fuel_type, region, AVG(price)
             FROM fuel_prices
             WHERE recorded_at >= ?1 AND recorded_at < ?2
             GROUP BY fuel_type, region
             ORDER BY fuel_type, region",
        )?;

        let rows = stmt.query_map(params![start.to_rfc3339(), end.to_rfc3339()], |row| {
            Ok(GroupAverage {
                fuel_type: row.get(0)?,
                region: row.get(1)?,
                avg_price: row.get(2)?,
            })
        })?;

        let mut averages = Vec::new();
        for row in rows {
            averages.push(row?);
        }

        Ok(averages)
    }

    /// The most recent observations system-wide, descending by `recorded_at`,
    /// capped at `limit`.
    pub fn recent_observations(&self, limit: usize) -> Result<Vec<Observation>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, fuel_type, price, currency, region, station_name,
                    latitude, longitude, source, source_id, recorded_at,
                    created_at, updated_at, is_valid, validation_errors
             FROM fuel_prices
             ORDER BY recorded_at DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], Self::map_observation)?;
        let mut observations = Vec::new();
        for row in rows {
            observations.push(row?);
        }

        Ok(observations)
    }

    /// Appends a trend row. Trends are recomputed each run and never updated
    /// in place.
    pub fn insert_trend(&self, trend: &Trend) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO price_trends (
                id, fuel_type, region, current_price, yesterday_price,
                week_ago_price, month_ago_price, day_change, day_change_percent,
                week_change_percent, month_change_percent, rolling_7d_avg,
                rolling_30d_avg, volatility_7d, calculated_at, period_start, period_end
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                generate_id(),
                &trend.fuel_type,
                &trend.region,
                &trend.current_price,
                &trend.yesterday_price,
                &trend.week_ago_price,
                &trend.month_ago_price,
                &trend.day_change,
                &trend.day_change_percent,
                &trend.week_change_percent,
                &trend.month_change_percent,
                &trend.rolling_7d_avg,
                &trend.rolling_30d_avg,
                &trend.volatility_7d,
                &trend.calculated_at.to_rfc3339(),
                &trend.period_start.to_rfc3339(),
                &trend.period_end.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Appends an anomaly row. Resolution state is mutated externally by an
    /// operator, never recomputed here.
    pub fn insert_anomaly(&self, anomaly: &Anomaly) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO anomaly_logs (
                id, fuel_price_id, fuel_type, region, latest_price,
                baseline_mean, z_score, anomaly_type, severity, detected_at, resolved
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                generate_id(),
                &anomaly.observation_id,
                &anomaly.fuel_type,
                &anomaly.region,
                &anomaly.latest_price,
                &anomaly.baseline_mean,
                &anomaly.z_score,
                anomaly.kind.as_str(),
                anomaly.severity.as_str(),
                &anomaly.detected_at.to_rfc3339(),
                &anomaly.resolved,
            ],
        )?;
        Ok(())
    }

    /// Records one provider/pipeline API interaction.
    pub fn log_api_call(
        &self,
        source: &str,
        endpoint: &str,
        status_code: i64,
        records_fetched: i64,
        error_message: Option<&str>,
        response_time_ms: f64,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO api_logs (
                id, source, endpoint, status_code, response_time_ms,
                records_fetched, error_message, executed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                generate_id(),
                source,
                endpoint,
                status_code,
                response_time_ms,
                records_fetched,
                error_message,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Number of invalid-flagged observations created at or after `since`.
    pub fn count_invalid_since(&self, since: DateTime<Utc>) -> Result<i64, StorageError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM fuel_prices WHERE is_valid = 0 AND created_at >= ?1",
            params![since.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_observation(row: &Row) -> Result<Observation, rusqlite::Error> {
        let recorded_at_str: String = row.get(10)?;
        let created_at_str: String = row.get(11)?;
        let updated_at_str: Option<String> = row.get(12)?;

        let recorded_at = recorded_at_str.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let created_at = created_at_str.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let updated_at = match updated_at_str {
            Some(s) => Some(s.parse().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e))
            })?),
            None => None,
        };

        let validation_errors_str: Option<String> = row.get(14)?;
        let validation_errors = match validation_errors_str {
            Some(s) => Some(serde_json::from_str(&s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(14, rusqlite::types::Type::Text, Box::new(e))
            })?),
            None => None,
        };

        Ok(Observation {
            id: row.get(0)?,
            fuel_type: row.get(1)?,
            price: row.get(2)?,
            currency: row.get(3)?,
            region: row.get(4)?,
            station_name: row.get(5)?,
            latitude: row.get(6)?,
            longitude: row.get(7)?,
            source: row.get(8)?,
            source_id: row.get(9)?,
            recorded_at,
            created_at,
            updated_at,
            is_valid: row.get(13)?,
            validation_errors,
        })
    }
}
