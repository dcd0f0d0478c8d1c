//! `SQLite` implementation of [`PersistenceGateway`].

use chrono::SecondsFormat;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use brewlink_app::ports::PersistenceGateway;
use brewlink_domain::alert::{AlertEvent, AlertKind, AlertRecord};
use brewlink_domain::brew::BrewType;
use brewlink_domain::device::DeviceStatus;
use brewlink_domain::error::BrewLinkError;
use brewlink_domain::id::{AlertId, DeviceId};
use brewlink_domain::reading::TelemetryReading;
use brewlink_domain::time::Timestamp;

use crate::error::StorageError;

/// Fixed-width RFC 3339 so stored timestamps compare lexicographically.
fn encode_time(at: Timestamp) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_error(err: StorageError) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

/// Row of the `alerts` table.
struct AlertRow(AlertRecord);

impl<'r> FromRow<'r, SqliteRow> for AlertRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: uuid::Uuid = row.try_get("id")?;
        let device_id: i64 = row.try_get("device_id")?;
        let kind: String = row.try_get("kind")?;
        let message: String = row.try_get("message")?;
        let created_at: String = row.try_get("created_at")?;
        let resolved: bool = row.try_get("resolved")?;

        let device_id = u32::try_from(device_id).map_err(|_| {
            decode_error(StorageError::Corrupt {
                column: "device_id",
                value: device_id.to_string(),
            })
        })?;
        let kind: AlertKind = kind.parse().map_err(|_| {
            decode_error(StorageError::Corrupt {
                column: "kind",
                value: kind.clone(),
            })
        })?;
        let timestamp = chrono::DateTime::parse_from_rfc3339(&created_at)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?
            .to_utc();

        Ok(Self(AlertRecord {
            id: AlertId::from_uuid(id),
            alert: AlertEvent::new(DeviceId::new(device_id), kind, message, timestamp),
            resolved,
        }))
    }
}

const INSERT_READING: &str = r"
    INSERT INTO readings (
        device_id, facility_id, status, temperature,
        water_level, milk_level, beans_level, sugar_level,
        brew_type, recorded_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
";

const INSERT_USAGE: &str = "INSERT INTO usage (device_id, brew_type, brewed_at) VALUES (?, ?, ?)";

const INSERT_ALERT: &str = r"
    INSERT INTO alerts (id, device_id, kind, severity, message, created_at, resolved)
    VALUES (?, ?, ?, ?, ?, ?, 0)
";

const SELECT_RECENT_ALERT: &str = r"
    SELECT id FROM alerts
    WHERE device_id = ? AND kind = ? AND resolved = 0 AND created_at >= ?
    ORDER BY created_at DESC
    LIMIT 1
";

const SELECT_ALERTS_BY_DEVICE: &str =
    "SELECT * FROM alerts WHERE device_id = ? ORDER BY created_at DESC LIMIT ?";

const RESOLVE_ALERT: &str =
    "UPDATE alerts SET resolved = 1 WHERE id = ? AND resolved = 0 RETURNING *";

/// `SQLite`-backed persistence gateway.
#[derive(Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    /// Create a new gateway using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl PersistenceGateway for SqliteGateway {
    async fn save_reading(&self, reading: TelemetryReading) -> Result<(), BrewLinkError> {
        sqlx::query(INSERT_READING)
            .bind(i64::from(reading.device_id.get()))
            .bind(reading.facility_id.map(|id| i64::from(id.get())))
            .bind(reading.status.map(DeviceStatus::as_str))
            .bind(reading.temperature)
            .bind(reading.levels.water)
            .bind(reading.levels.milk)
            .bind(reading.levels.beans)
            .bind(reading.levels.sugar)
            .bind(reading.brew_type.map(BrewType::as_str))
            .bind(encode_time(reading.timestamp))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn append_usage(
        &self,
        device_id: DeviceId,
        brew_type: BrewType,
        at: Timestamp,
    ) -> Result<(), BrewLinkError> {
        sqlx::query(INSERT_USAGE)
            .bind(i64::from(device_id.get()))
            .bind(brew_type.as_str())
            .bind(encode_time(at))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn append_alert(&self, alert: AlertEvent) -> Result<AlertId, BrewLinkError> {
        let id = AlertId::new();
        sqlx::query(INSERT_ALERT)
            .bind(id.as_uuid())
            .bind(i64::from(alert.device_id.get()))
            .bind(alert.kind.as_str())
            .bind(alert.severity.as_str())
            .bind(&alert.message)
            .bind(encode_time(alert.timestamp))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(id)
    }

    async fn find_recent_alert(
        &self,
        device_id: DeviceId,
        kind: AlertKind,
        since: Timestamp,
    ) -> Result<Option<AlertId>, BrewLinkError> {
        let row: Option<(uuid::Uuid,)> = sqlx::query_as(SELECT_RECENT_ALERT)
            .bind(i64::from(device_id.get()))
            .bind(kind.as_str())
            .bind(encode_time(since))
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(row.map(|(id,)| AlertId::from_uuid(id)))
    }

    async fn alerts_for_device(
        &self,
        device_id: DeviceId,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, BrewLinkError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<AlertRow> = sqlx::query_as(SELECT_ALERTS_BY_DEVICE)
            .bind(i64::from(device_id.get()))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|AlertRow(record)| record).collect())
    }

    async fn resolve_alert(&self, id: AlertId) -> Result<Option<AlertRecord>, BrewLinkError> {
        let row: Option<AlertRow> = sqlx::query_as(RESOLVE_ALERT)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(row.map(|AlertRow(record)| record))
    }
}
