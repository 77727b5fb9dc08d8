//! The radio seam under [`crate::ecg_client::EcgClient`].
//!
//! [`Transport`] is the adapter (permissions, radio, discovery) and
//! [`Link`] is one discovered peripheral.  [`crate::btle::BtleTransport`] is the
//! btleplug implementation; tests drive the client through an in-memory mock.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::error::Result;

/// Raw characteristic payloads, one item per notification or read.
pub type PayloadStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// What the located ECG characteristic supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    pub uuid: Uuid,
    pub notify: bool,
    pub read: bool,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Link: Link;

    /// Acquire whatever platform permission BLE needs.
    ///
    /// Fails with [`crate::error::EcgError::PermissionDenied`].
    async fn ensure_permissions(&self) -> Result<()>;

    /// `Ok(false)` when the adapter exists but is powered off.
    async fn radio_powered_on(&self) -> Result<bool>;

    async fn start_scan(&self) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;

    /// Everything discovered since the scan started.  May include stale
    /// entries that are no longer advertising.
    async fn discovered(&self) -> Result<Vec<Self::Link>>;
}

#[async_trait]
pub trait Link: Clone + Send + Sync + 'static {
    fn id(&self) -> String;

    /// Advertised local name, if any.
    async fn name(&self) -> Option<String>;

    /// Connection handshake.
    async fn connect(&self) -> Result<()>;

    /// Discover services and locate `characteristic` inside `service`.
    async fn discover_attribute(&self, service: Uuid, characteristic: Uuid) -> Result<Attribute>;

    /// Subscribe to notifications of `attribute`.
    async fn subscribe(&self, attribute: Uuid) -> Result<PayloadStream>;

    /// Drop the notification subscription, if any.
    async fn unsubscribe(&self, attribute: Uuid) -> Result<()>;

    async fn read(&self, attribute: Uuid) -> Result<Vec<u8>>;

    async fn disconnect(&self) -> Result<()>;

    /// Resolves once the platform reports that this peripheral dropped off
    /// (powered down, out of range).  Pending forever when it cannot tell.
    async fn link_lost(&self);
}
