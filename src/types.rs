use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EcgError;

/// Heart-rate estimate in beats per minute.
///
/// Values produced by [`crate::heart_rate::HeartRateEstimator`] always lie in
/// `[50, 180]`.
pub type Bpm = u16;

/// One decoded ECG reading in millivolts, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f64,
}

impl Sample {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

/// Connection state machine of [`crate::ecg_client::EcgClient`].
///
/// ```text
/// Disconnected → Scanning → Connecting → Connected → Disconnected
///                    │           │           │
///                    └───────────┴───────────┴──→ Error ──disconnect()──→ Disconnected
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Scanning,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Scanning => "scanning",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Identity of the peripheral currently owned by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralHandle {
    /// Platform BLE identifier.
    /// • macOS / Windows: a UUID string
    /// • Linux: a Bluetooth MAC address (`AA:BB:CC:DD:EE:FF`)
    pub id: String,
    /// Advertised local name.
    pub name: String,
}

/// Summary classification derived from a session's average heart rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Low,
    Normal,
    Elevated,
}

impl SessionStatus {
    /// Above this average the session is `Elevated`.
    pub const ELEVATED_ABOVE: Bpm = 85;
    /// Below this average the session is `Low`.
    pub const LOW_BELOW: Bpm = 65;

    pub fn from_avg_heart_rate(avg: Bpm) -> Self {
        if avg > Self::ELEVATED_ABOVE {
            SessionStatus::Elevated
        } else if avg < Self::LOW_BELOW {
            SessionStatus::Low
        } else {
            SessionStatus::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Low => "low",
            SessionStatus::Normal => "normal",
            SessionStatus::Elevated => "elevated",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finished recording: aggregate statistics plus the raw buffers.
///
/// Produced by [`crate::session::SessionAggregator::stop`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    /// Elapsed whole seconds between start and stop.
    pub duration_secs: u64,
    /// `duration_secs` rendered as `"Xm Ys"` or `"Ys"`.
    pub duration: String,
    /// Mean mV, rounded to 2 decimals.
    #[serde(rename = "avgECG")]
    pub avg_ecg: f64,
    #[serde(rename = "minECG")]
    pub min_ecg: f64,
    #[serde(rename = "maxECG")]
    pub max_ecg: f64,
    pub avg_heart_rate: Bpm,
    pub status: SessionStatus,
    pub sample_count: usize,
    pub raw_samples: Vec<f64>,
    pub raw_heart_rates: Vec<Bpm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// When a [`crate::store::SessionStore`] first persisted the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

/// Everything that travels the single delivery path from producers (the BLE
/// sample pump, the synthetic source, the client's status reporting) to the
/// consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum EcgEvent {
    /// A decoded sample.
    Sample(Sample),
    /// The connection state changed.  Sent once per actual transition.
    Status(ConnectionState),
    /// A connection-layer failure; always preceded by `Status(Error)`.
    Failure(EcgError),
    /// The BLE link is up and the ECG attribute was found.
    Connected(PeripheralHandle),
    /// The link was torn down by [`crate::ecg_client::EcgClient::disconnect`].
    Disconnected,
}
