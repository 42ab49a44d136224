use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// The struct used for storing measurements on disk and serving them over the
/// api. Field names follow the wire format: camelCase keys with `createdAt`
/// as an RFC 3339 string.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementEntity {
    /// Unique, assigned in strictly increasing order starting from 1.
    pub id: u64,
    /// Time between the two clicks in milliseconds. Always finite and positive.
    pub elapsed_ms: f64,
    pub created_at: DateTime<Utc>,
}
