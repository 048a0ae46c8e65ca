//! Telemetry document model
//!
//! The parsed shape of one uploaded session capture. Only the fields the
//! store derives metadata from are modelled; everything else the exporter
//! wrote is preserved in `extra` so the document handed back to callers
//! stays faithful.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::session_type::SessionType;

/// One uploaded telemetry capture, parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryDocument {
    /// Track name as written by the exporter.
    pub track: String,

    /// Car model as written by the exporter.
    pub car: String,

    /// Wall-clock start of the session, if the exporter recorded it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_start: Option<DateTime<Utc>>,

    /// Numeric session-type code; see [`SessionType::from_code`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_type: Option<i64>,

    /// Completed laps, in order.
    #[serde(default)]
    pub laps: Vec<Lap>,

    /// Everything else the exporter wrote (sample channels, setup data).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One completed lap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lap {
    pub lap_time_ms: u64,

    #[serde(default)]
    pub sectors: Vec<u64>,

    /// Laps cut or otherwise invalidated don't count for the best lap.
    #[serde(default = "default_valid")]
    pub valid: bool,
}

fn default_valid() -> bool {
    true
}

/// Descriptive metadata derived from a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub track: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_start: Option<DateTime<Utc>>,
    pub car: String,
    pub session_type: SessionType,
}

/// Aggregate lap figures derived from a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub lap_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_lap_ms: Option<u64>,
    pub total_time_ms: u64,
}

impl TelemetryDocument {
    /// Parse a capture from its serialized text.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Derive the descriptive metadata stored on the session record.
    pub fn meta(&self) -> SessionMeta {
        SessionMeta {
            track: self.track.clone(),
            date_start: self.date_start,
            car: self.car.clone(),
            session_type: SessionType::from_code(self.session_type.unwrap_or(0)),
        }
    }

    /// Derive the lap summary stored on the session record.
    ///
    /// The best lap considers valid laps only; total time sums every lap.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            lap_count: self.laps.len() as u32,
            best_lap_ms: self
                .laps
                .iter()
                .filter(|lap| lap.valid)
                .map(|lap| lap.lap_time_ms)
                .min(),
            total_time_ms: self.laps.iter().map(|lap| lap.lap_time_ms).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> String {
        r#"{
            "track": "Silverstone GP",
            "car": "Dallara F317",
            "dateStart": "2026-05-03T14:20:00Z",
            "sessionType": 2,
            "laps": [
                {"lapTimeMs": 92450, "sectors": [30100, 31200, 31150]},
                {"lapTimeMs": 91800, "sectors": [29900, 30950, 30950]},
                {"lapTimeMs": 90950, "sectors": [29700, 30700, 30550], "valid": false}
            ],
            "channels": {"speed": [0, 42, 187]}
        }"#
        .to_string()
    }

    #[test]
    fn test_parse_and_meta() {
        let doc = TelemetryDocument::parse(&sample_json()).unwrap();
        let meta = doc.meta();
        assert_eq!(meta.track, "Silverstone GP");
        assert_eq!(meta.car, "Dallara F317");
        assert_eq!(meta.session_type, SessionType::Race);
        assert!(meta.date_start.is_some());
    }

    #[test]
    fn test_summary_ignores_invalid_laps_for_best() {
        let doc = TelemetryDocument::parse(&sample_json()).unwrap();
        let summary = doc.summary();
        assert_eq!(summary.lap_count, 3);
        // The 90950 lap is invalid; best must be the fastest valid lap.
        assert_eq!(summary.best_lap_ms, Some(91800));
        assert_eq!(summary.total_time_ms, 92450 + 91800 + 90950);
    }

    #[test]
    fn test_summary_of_empty_lap_list() {
        let doc = TelemetryDocument::parse(r#"{"track": "t", "car": "c"}"#).unwrap();
        let summary = doc.summary();
        assert_eq!(summary.lap_count, 0);
        assert_eq!(summary.best_lap_ms, None);
        assert_eq!(summary.total_time_ms, 0);
    }

    #[test]
    fn test_missing_track_fails_parse() {
        assert!(TelemetryDocument::parse(r#"{"car": "c"}"#).is_err());
    }

    #[test]
    fn test_extra_fields_preserved() {
        let doc = TelemetryDocument::parse(&sample_json()).unwrap();
        assert!(doc.extra.contains_key("channels"));
    }
}
