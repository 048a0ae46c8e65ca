//! Canonical session-type classification
//!
//! Telemetry exporters encode the session kind as a small integer. This
//! is the single mapping used everywhere a session type is classified or
//! rendered; unknown codes fold to practice.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of on-track session a capture was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Practice,
    Qualifying,
    Race,
    Hotlap,
    Hotstint,
    Superpole,
    Drift,
}

impl SessionType {
    /// Map a numeric exporter code to the canonical session type.
    ///
    /// Codes outside the known table classify as practice.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Practice,
            1 => Self::Qualifying,
            2 => Self::Race,
            3 => Self::Hotlap,
            4 => Self::Hotstint,
            5 => Self::Superpole,
            6 => Self::Drift,
            _ => Self::Practice,
        }
    }

    /// Stable lowercase name, used for storage and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Practice => "practice",
            Self::Qualifying => "qualifying",
            Self::Race => "race",
            Self::Hotlap => "hotlap",
            Self::Hotstint => "hotstint",
            Self::Superpole => "superpole",
            Self::Drift => "drift",
        }
    }

    /// Parse a stored name back into the enum.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "practice" => Some(Self::Practice),
            "qualifying" => Some(Self::Qualifying),
            "race" => Some(Self::Race),
            "hotlap" => Some(Self::Hotlap),
            "hotstint" => Some(Self::Hotstint),
            "superpole" => Some(Self::Superpole),
            "drift" => Some(Self::Drift),
            _ => None,
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
