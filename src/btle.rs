//! [`Transport`] backed by btleplug.
//!
//! The first adapter reported by the platform [`Manager`] is used.  It is
//! acquired lazily by [`BtleTransport::ensure_permissions`], which is where the
//! platform surfaces a permission refusal.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, CharPropFlags, Characteristic, Manager as _,
    Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::error::{EcgError, Result};
use crate::protocol::{CONNECT_TIMEOUT, DISCOVER_TIMEOUT};
use crate::transport::{Attribute, Link, PayloadStream, Transport};

/// How long to wait for the adapter to leave the "unknown" state.
///
/// CoreBluetooth starts in an unknown state right after launch (or after
/// Bluetooth was toggled) and silently ignores scans until it is PoweredOn.
const RADIO_SETTLE: Duration = Duration::from_secs(3);

fn io_err(e: btleplug::Error) -> EcgError {
    match e {
        btleplug::Error::PermissionDenied => EcgError::PermissionDenied,
        other => EcgError::Io(other.to_string()),
    }
}

// ── BtleTransport ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct BtleTransport {
    adapter: OnceCell<Adapter>,
}

impl BtleTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn adapter(&self) -> Result<&Adapter> {
        self.adapter.get().ok_or(EcgError::RadioUnavailable)
    }
}

#[async_trait]
impl Transport for BtleTransport {
    type Link = BtleLink;

    async fn ensure_permissions(&self) -> Result<()> {
        self.adapter
            .get_or_try_init(|| async {
                let manager = Manager::new().await.map_err(io_err)?;
                let adapters = manager.adapters().await.map_err(io_err)?;
                let adapter = adapters.into_iter().next().ok_or(EcgError::RadioUnavailable)?;
                match adapter.adapter_info().await {
                    Ok(info) => info!("Using Bluetooth adapter {info}"),
                    Err(e) => debug!("adapter_info() failed: {e}"),
                }
                Ok::<_, EcgError>(adapter)
            })
            .await?;
        Ok(())
    }

    async fn radio_powered_on(&self) -> Result<bool> {
        let adapter = self.adapter()?;
        let deadline = tokio::time::Instant::now() + RADIO_SETTLE;
        loop {
            match adapter.adapter_state().await {
                Ok(CentralState::PoweredOn) => return Ok(true),
                Ok(CentralState::PoweredOff) => return Ok(false),
                Ok(state) => {
                    if tokio::time::Instant::now() >= deadline {
                        warn!("Adapter still in state {state:?} after {RADIO_SETTLE:?}; proceeding");
                        return Ok(true);
                    }
                    debug!("Adapter state = {state:?}, waiting…");
                }
                Err(e) => {
                    warn!("adapter_state() error: {e}; proceeding");
                    return Ok(true);
                }
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    async fn start_scan(&self) -> Result<()> {
        self.adapter()?.start_scan(ScanFilter::default()).await.map_err(io_err)
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter()?.stop_scan().await.map_err(io_err)
    }

    async fn discovered(&self) -> Result<Vec<BtleLink>> {
        let adapter = self.adapter()?;
        let peripherals = adapter.peripherals().await.map_err(io_err)?;
        Ok(peripherals
            .into_iter()
            .map(|peripheral| BtleLink { adapter: adapter.clone(), peripheral })
            .collect())
    }
}

// ── BtleLink ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct BtleLink {
    /// Source of `DeviceDisconnected` events for [`Link::link_lost`].
    adapter: Adapter,
    peripheral: Peripheral,
}

impl BtleLink {
    fn find_char(&self, uuid: Uuid) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| EcgError::AttributeNotFound(uuid.to_string()))
    }
}

#[async_trait]
impl Link for BtleLink {
    fn id(&self) -> String {
        self.peripheral.id().to_string()
    }

    async fn name(&self) -> Option<String> {
        match self.peripheral.properties().await {
            Ok(Some(props)) => props.local_name,
            _ => None,
        }
    }

    async fn connect(&self) -> Result<()> {
        if self.peripheral.is_connected().await.unwrap_or(false) {
            return Ok(());
        }
        tokio::time::timeout(CONNECT_TIMEOUT, self.peripheral.connect())
            .await
            .map_err(|_| {
                EcgError::ConnectionFailed(format!("connect() timed out after {CONNECT_TIMEOUT:?}"))
            })?
            .map_err(|e| EcgError::ConnectionFailed(e.to_string()))
    }

    async fn discover_attribute(&self, service: Uuid, characteristic: Uuid) -> Result<Attribute> {
        // BlueZ reports the connection before its GATT cache is populated;
        // discovering immediately can return an empty set.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        tokio::time::timeout(DISCOVER_TIMEOUT, self.peripheral.discover_services())
            .await
            .map_err(|_| EcgError::Io(format!("discover_services() timed out after {DISCOVER_TIMEOUT:?}")))?
            .map_err(io_err)?;

        let has_service = self.peripheral.services().iter().any(|s| s.uuid == service);
        if !has_service {
            return Err(EcgError::AttributeNotFound(format!("service {service}")));
        }

        let c = self.find_char(characteristic)?;
        if c.service_uuid != service {
            warn!("Characteristic {characteristic} found under service {}", c.service_uuid);
        }
        Ok(Attribute {
            uuid: c.uuid,
            notify: c.properties.contains(CharPropFlags::NOTIFY),
            read: c.properties.contains(CharPropFlags::READ),
        })
    }

    async fn subscribe(&self, attribute: Uuid) -> Result<PayloadStream> {
        let c = self.find_char(attribute)?;
        self.peripheral.subscribe(&c).await.map_err(io_err)?;
        let notifications = self.peripheral.notifications().await.map_err(io_err)?;
        let payloads = notifications
            .filter(move |n| futures::future::ready(n.uuid == attribute))
            .map(|n| Ok::<_, EcgError>(n.value));
        Ok(Box::pin(payloads))
    }

    async fn unsubscribe(&self, attribute: Uuid) -> Result<()> {
        let c = self.find_char(attribute)?;
        self.peripheral.unsubscribe(&c).await.map_err(io_err)
    }

    async fn read(&self, attribute: Uuid) -> Result<Vec<u8>> {
        let c = self.find_char(attribute)?;
        self.peripheral.read(&c).await.map_err(io_err)
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await.map_err(io_err)
    }

    async fn link_lost(&self) {
        // DeviceDisconnected usually arrives well before the notification
        // stream closes, and a polled link has no stream to close at all.
        let peripheral_id = self.peripheral.id();
        match self.adapter.events().await {
            Ok(mut events) => {
                while let Some(event) = events.next().await {
                    if let CentralEvent::DeviceDisconnected(id) = event {
                        if id == peripheral_id {
                            info!("Disconnect watcher: device {id:?} disconnected.");
                            return;
                        }
                    }
                }
                debug!("Disconnect watcher: adapter event stream ended");
            }
            Err(e) => {
                warn!("Disconnect watcher: could not subscribe to adapter events: {e}");
            }
        }
        futures::future::pending::<()>().await
    }
}
