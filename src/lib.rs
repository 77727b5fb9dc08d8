//! # ecg-rs
//!
//! Async Rust library and CLI for streaming single-lead ECG data from a
//! Bluetooth Low Energy peripheral, estimating heart rate, and summarizing
//! recording sessions.
//!
//! ## Pipeline
//!
//! ```text
//! BLE peripheral ──notify / poll──▶ parse::decode ─┐
//!                                                 ├─▶ mpsc<EcgEvent> ─▶ Monitor ─▶ HeartRateEstimator
//! WaveformGenerator (no peripheral) ──10 ms tick──┘                        └──▶ SessionAggregator ─▶ SessionStore
//! ```
//!
//! Every producer writes to the same channel; [`monitor::Monitor`] is its
//! only consumer.
//!
//! ## Quick start
//!
//! ```no_run
//! use ecg_rs::prelude::*;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
//!     let mut client = EcgClient::new(EcgClientConfig::default());
//!     if !client.connect(tx).await {
//!         anyhow::bail!("no ECG peripheral");
//!     }
//!
//!     let mut monitor = Monitor::new(MemoryStore::new(), Preferences::default());
//!     monitor.start_monitoring();
//!     while let Some(event) = rx.recv().await {
//!         if let Some(bpm) = monitor.handle_event(event) {
//!             println!("{bpm} bpm");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`ecg_client`] | Scan, connect, stream, and tear down the BLE link |
//! | [`transport`] | Radio abstraction the client is written against |
//! | [`btle`] | btleplug implementation of [`transport`] |
//! | [`source`] | Notification vs. polling sample sources |
//! | [`parse`] | Characteristic payload → millivolts |
//! | [`waveform`] | Synthetic PQRST generator and its timer-driven source |
//! | [`heart_rate`] | Sliding-window R-peak heart-rate estimate |
//! | [`session`] | Session statistics and classification |
//! | [`monitor`] | The event consumer tying estimator, aggregator, and store together |
//! | [`store`] | Session persistence and preference contracts |
//! | [`export`] | CSV / JSON / HTML session export |
//! | [`types`] | Events and data types shared by all of the above |
//! | [`protocol`] | GATT UUIDs, timing, and sampling constants |
//! | [`error`] | [`error::EcgError`] |

pub mod btle;
pub mod ecg_client;
pub mod error;
pub mod export;
pub mod heart_rate;
pub mod monitor;
pub mod parse;
pub mod protocol;
pub mod session;
pub mod source;
pub mod store;
pub mod transport;
pub mod types;
pub mod waveform;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    // ── Client ────────────────────────────────────────────────────────────────
    pub use crate::ecg_client::{EcgClient, EcgClientConfig};
    pub use crate::error::{EcgError, Result};

    // ── Processing ────────────────────────────────────────────────────────────
    pub use crate::heart_rate::HeartRateEstimator;
    pub use crate::monitor::{Monitor, StopOutcome};
    pub use crate::session::SessionAggregator;
    pub use crate::waveform::{spawn_synthetic_source, WaveformGenerator};

    // ── Persistence and export ────────────────────────────────────────────────
    pub use crate::export::{ExportFormat, ExportStatistics};
    pub use crate::store::{MemoryStore, Preferences, SessionStore, SettingsProvider};

    // ── Events and data types ─────────────────────────────────────────────────
    pub use crate::types::{
        Bpm, ConnectionState, EcgEvent, PeripheralHandle, Sample, Session, SessionStatus,
    };

    // ── Protocol constants ────────────────────────────────────────────────────
    pub use crate::protocol::{
        ECG_CHARACTERISTIC_UUID, ECG_SERVICE_UUID, EVENT_CHANNEL_CAPACITY, SAMPLE_RATE_HZ,
    };
}
