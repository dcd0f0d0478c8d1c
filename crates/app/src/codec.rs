//! Wire codec for device telemetry.
//!
//! Topics follow `<namespace>/<deviceId>/data`; payloads are JSON objects in
//! camelCase. Every payload field is optional: a missing field means "no
//! change". The simulator encodes with the same [`TelemetryPayload`] type so
//! both ends agree on the schema.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use brewlink_domain::brew::BrewType;
use brewlink_domain::device::{DeviceStatus, Levels};
use brewlink_domain::id::{DeviceId, FacilityId};
use brewlink_domain::reading::TelemetryReading;
use brewlink_domain::time::Timestamp;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "coffeemachine";

const DATA_SUFFIX: &str = "data";

/// Errors raised while decoding an inbound message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("topic {0:?} does not match <namespace>/<deviceId>/data")]
    Topic(String),

    #[error("payload is not valid telemetry json")]
    Json(#[from] serde_json::Error),

    #[error("topic device {topic} disagrees with payload machineId {payload}")]
    DeviceMismatch { topic: DeviceId, payload: DeviceId },

    #[error("unknown status {0:?}")]
    Status(String),

    #[error("unparseable timestamp {0:?}")]
    Timestamp(String),
}

/// JSON shape of one telemetry message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milk_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beans_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sugar_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brew_type: Option<String>,
    #[serde(default, alias = "timeStamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Wildcard filter covering every device in `namespace`.
#[must_use]
pub fn subscription_filter(namespace: &str) -> String {
    format!("{namespace}/+/{DATA_SUFFIX}")
}

/// Topic on which `device_id` publishes its telemetry.
#[must_use]
pub fn telemetry_topic(namespace: &str, device_id: DeviceId) -> String {
    format!("{namespace}/{device_id}/{DATA_SUFFIX}")
}

/// Extract the device id from a telemetry topic.
///
/// # Errors
///
/// Returns [`DecodeError::Topic`] when the topic does not have the
/// `<namespace>/<deviceId>/data` shape.
pub fn device_from_topic(topic: &str) -> Result<DeviceId, DecodeError> {
    let mut parts = topic.rsplit('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(DATA_SUFFIX), Some(id), Some(namespace)) if !namespace.is_empty() => id
            .parse()
            .map_err(|_| DecodeError::Topic(topic.to_string())),
        _ => Err(DecodeError::Topic(topic.to_string())),
    }
}

/// Decode one inbound message into a reading.
///
/// `received_at` stands in for a missing timestamp.
///
/// # Errors
///
/// Returns a [`DecodeError`] for malformed topics, invalid JSON, a device
/// id mismatch, an unknown status or an unparseable timestamp.
pub fn decode(
    topic: &str,
    payload: &[u8],
    received_at: Timestamp,
) -> Result<TelemetryReading, DecodeError> {
    let topic_device = device_from_topic(topic)?;
    let body: TelemetryPayload = serde_json::from_slice(payload)?;

    if let Some(machine_id) = body.machine_id.map(DeviceId::new)
        && machine_id != topic_device
    {
        return Err(DecodeError::DeviceMismatch {
            topic: topic_device,
            payload: machine_id,
        });
    }

    let status = body
        .status
        .as_deref()
        .map(|raw| {
            raw.parse::<DeviceStatus>()
                .map_err(|_| DecodeError::Status(raw.to_string()))
        })
        .transpose()?;

    let timestamp = match body.timestamp.as_deref() {
        Some(raw) => parse_timestamp(raw)?,
        None => received_at,
    };

    Ok(TelemetryReading {
        device_id: topic_device,
        facility_id: body.facility_id.map(FacilityId::new),
        status,
        temperature: body.temperature,
        levels: Levels {
            water: body.water_level,
            milk: body.milk_level,
            beans: body.beans_level,
            sugar: body.sugar_level,
        },
        brew_type: body.brew_type.as_deref().and_then(BrewType::from_telemetry),
        timestamp,
    })
}

/// Encode a payload for publishing.
///
/// # Errors
///
/// Returns the serializer error; in practice this cannot fail for
/// [`TelemetryPayload`].
pub fn encode(payload: &TelemetryPayload) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(payload)
}

/// Accept RFC 3339 or a zone-less ISO-8601 date-time (read as UTC).
fn parse_timestamp(raw: &str) -> Result<Timestamp, DecodeError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| DecodeError::Timestamp(raw.to_string()))
}
