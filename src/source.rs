//! Sample-source strategies for a connected peripheral.
//!
//! Push (notifications) and pull (fixed-interval reads) both end up as a
//! [`PayloadStream`], so the sample pump in [`crate::ecg_client`] never
//! branches per sample.  The strategy is picked once, by [`select_source`],
//! from the characteristic's capability flags.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use log::info;
use tokio::time::MissedTickBehavior;

use crate::error::{EcgError, Result};
use crate::transport::{Attribute, Link, PayloadStream};

#[async_trait]
pub trait SampleSource: Send {
    /// Short label for logs.
    fn kind(&self) -> &'static str;

    /// Start producing payloads.
    async fn open(self: Box<Self>) -> Result<PayloadStream>;
}

/// Subscribe to characteristic notifications.
pub struct NotifySource<L> {
    link: L,
    attribute: Attribute,
}

#[async_trait]
impl<L: Link> SampleSource for NotifySource<L> {
    fn kind(&self) -> &'static str {
        "notify"
    }

    async fn open(self: Box<Self>) -> Result<PayloadStream> {
        self.link.subscribe(self.attribute.uuid).await
    }
}

/// Read the characteristic every `interval`.
///
/// The timer lives inside the stream; dropping the stream cancels it.
pub struct PollSource<L> {
    link: L,
    attribute: Attribute,
    interval: Duration,
}

#[async_trait]
impl<L: Link> SampleSource for PollSource<L> {
    fn kind(&self) -> &'static str {
        "poll"
    }

    async fn open(self: Box<Self>) -> Result<PayloadStream> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let uuid = self.attribute.uuid;

        let payloads = stream::unfold((self.link, ticker), move |(link, mut ticker)| async move {
            ticker.tick().await;
            let payload = link.read(uuid).await;
            Some((payload, (link, ticker)))
        });
        Ok(Box::pin(payloads))
    }
}

/// Pick notifications when supported, otherwise polling.
pub fn select_source<L: Link>(
    link: L,
    attribute: Attribute,
    poll_interval: Duration,
) -> Result<Box<dyn SampleSource>> {
    let source: Box<dyn SampleSource> = if attribute.notify {
        Box::new(NotifySource { link, attribute })
    } else if attribute.read {
        Box::new(PollSource { link, attribute, interval: poll_interval })
    } else {
        return Err(EcgError::AttributeNotFound(format!(
            "{} (neither readable nor notifiable)",
            attribute.uuid
        )));
    };
    info!("Monitoring {} via {}", attribute.uuid, source.kind());
    Ok(source)
}
