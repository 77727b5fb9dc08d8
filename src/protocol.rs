//! GATT UUIDs, sampling constants, and timing parameters for ECG peripherals.
//!
//! The peripheral exposes exactly one service with one characteristic that is
//! readable and (usually) notifiable.  Every notification or read carries a
//! single sample in one of the three formats understood by
//! [`crate::parse::decode`].

use std::time::Duration;

use uuid::Uuid;

// ── Service ──────────────────────────────────────────────────────────────────

/// Primary GATT service UUID advertised by the ECG front-end firmware.
pub const ECG_SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

// ── Characteristics ───────────────────────────────────────────────────────────

/// The single ECG sample characteristic (READ | NOTIFY).
///
/// Firmware that cannot notify is still supported: the client falls back to
/// reading this characteristic every [`POLL_INTERVAL`].
pub const ECG_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Name substring used to pick the peripheral during discovery.
///
/// Baked in at build time from the `ECG_DEVICE_NAME` environment variable;
/// falls back to `"ECG"`.  Matching is case-insensitive.
pub const DEFAULT_NAME_FILTER: &str = match option_env!("ECG_DEVICE_NAME") {
    Some(name) => name,
    None => "ECG",
};

/// How long discovery runs before giving up with
/// [`crate::error::EcgError::DiscoveryTimeout`].
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the discovered-peripheral list is re-checked while scanning.
pub const SCAN_POLL_PERIOD: Duration = Duration::from_millis(250);

/// Read interval used when the characteristic does not support notifications.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Hard limit on the connection handshake.
///
/// BlueZ's `org.bluez.Device1.Connect` can block forever when the device is
/// out of range; a BLE connection normally completes in under 2 s.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Hard limit on GATT service discovery.
pub const DISCOVER_TIMEOUT: Duration = Duration::from_secs(15);

// ── Sampling constants ────────────────────────────────────────────────────────

/// Nominal sample rate of both the peripheral and the synthetic generator.
pub const SAMPLE_RATE_HZ: f64 = 100.0;

/// Samples in one synthetic cardiac cycle (≈ 1 s at [`SAMPLE_RATE_HZ`]).
pub const SAMPLES_PER_CYCLE: u64 = 100;

/// Tick period of the synthetic sample source.
pub const SYNTHETIC_PERIOD: Duration = Duration::from_millis(10);

// ── Delivery ──────────────────────────────────────────────────────────────────

/// Capacity of the single event channel between producers and the monitor.
///
/// Two seconds of samples at 100 Hz plus headroom for status events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
