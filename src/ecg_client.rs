use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::btle::BtleTransport;
use crate::error::{EcgError, Result};
use crate::parse::decode;
use crate::protocol::{
    DEFAULT_NAME_FILTER, ECG_CHARACTERISTIC_UUID, ECG_SERVICE_UUID, POLL_INTERVAL,
    SCAN_POLL_PERIOD, SCAN_TIMEOUT,
};
use crate::source::select_source;
use crate::transport::{Attribute, Link, PayloadStream, Transport};
use crate::types::{ConnectionState, EcgEvent, PeripheralHandle, Sample};

// ── EcgClientConfig ───────────────────────────────────────────────────────────

/// Configuration for [`EcgClient`].
#[derive(Debug, Clone)]
pub struct EcgClientConfig {
    /// Connect to the first peripheral whose advertised name contains this
    /// string, compared case-insensitively.
    ///
    /// Default: [`DEFAULT_NAME_FILTER`] (`ECG_DEVICE_NAME` at build time, else `"ECG"`).
    pub name_filter: String,
    /// Give up discovery after this long.  Default: 30 s.
    pub scan_timeout: Duration,
    /// Re-check the discovered list this often while scanning.  Default: 250 ms.
    pub scan_poll_period: Duration,
    /// Read interval when the characteristic cannot notify.  Default: 100 ms.
    pub poll_interval: Duration,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
}

impl Default for EcgClientConfig {
    fn default() -> Self {
        Self {
            name_filter: DEFAULT_NAME_FILTER.into(),
            scan_timeout: SCAN_TIMEOUT,
            scan_poll_period: SCAN_POLL_PERIOD,
            poll_interval: POLL_INTERVAL,
            service_uuid: ECG_SERVICE_UUID,
            characteristic_uuid: ECG_CHARACTERISTIC_UUID,
        }
    }
}

impl EcgClientConfig {
    fn matches(&self, name: &str) -> bool {
        name.to_lowercase().contains(&self.name_filter.to_lowercase())
    }
}

// ── Reporter ──────────────────────────────────────────────────────────────────

/// Publishes state transitions and failures.  Shared between the client and
/// its sample pump task.
///
/// Only samples wait for channel capacity.  Status, failure, and lifecycle
/// events are dropped with a warning when the channel is full; the watch
/// channel always holds the current state.
#[derive(Clone)]
struct Reporter {
    state: Arc<watch::Sender<ConnectionState>>,
    events: mpsc::Sender<EcgEvent>,
}

impl Reporter {
    fn publish(&self, event: EcgEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => warn!("Event channel full; dropped {event:?}"),
            Err(TrySendError::Closed(_)) => debug!("Event channel closed"),
        }
    }

    fn transition(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            info!("Connection state: {prev} → {next}");
            self.publish(EcgEvent::Status(next));
        }
    }

    fn fail(&self, err: EcgError) {
        error!("Connection failed: {err}");
        self.transition(ConnectionState::Error);
        self.publish(EcgEvent::Failure(err));
    }

    async fn send_sample(&self, sample: Sample) -> bool {
        self.events.send(EcgEvent::Sample(sample)).await.is_ok()
    }
}

// ── Active link ───────────────────────────────────────────────────────────────

struct ActiveLink<L> {
    link: L,
    handle: PeripheralHandle,
    attribute: Attribute,
    cancel: CancellationToken,
    pump: JoinHandle<()>,
}

/// Decode payloads into samples until cancelled, the stream fails, or the
/// link is reported lost.
async fn pump(
    mut payloads: PayloadStream,
    mut link_lost: BoxFuture<'static, ()>,
    reporter: Reporter,
    cancel: CancellationToken,
) {
    let mut delivered: u64 = 0;
    let mut dropped: u64 = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = &mut link_lost => {
                reporter.fail(EcgError::Io("link lost".into()));
                break;
            }
            next = payloads.next() => match next {
                Some(Ok(bytes)) => match decode(&bytes) {
                    Ok(mv) => {
                        delivered += 1;
                        if !reporter.send_sample(Sample::new(mv)).await {
                            debug!("Sample pump: receiver dropped");
                            break;
                        }
                    }
                    Err(e) => {
                        dropped += 1;
                        debug!("Dropping sample: {e}");
                    }
                },
                Some(Err(e)) => {
                    reporter.fail(e);
                    break;
                }
                None => {
                    reporter.fail(EcgError::Io("sample stream ended".into()));
                    break;
                }
            }
        }
    }
    info!("Sample pump stopped ({delivered} delivered, {dropped} dropped)");
}

// ── EcgClient ─────────────────────────────────────────────────────────────────

/// Owns the scan → connect → monitor → disconnect lifecycle for one ECG
/// peripheral at a time.
///
/// Calls take `&mut self`, so `connect` and `disconnect` on one instance are
/// serialised by the borrow checker.  Samples and status changes are
/// delivered on the `mpsc` channel handed to [`EcgClient::connect`]; nothing
/// here panics on radio failures.
pub struct EcgClient<T: Transport = BtleTransport> {
    transport: T,
    config: EcgClientConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    reporter: Option<Reporter>,
    /// Peripheral picked by discovery but not yet monitoring.
    pending: Option<T::Link>,
    active: Option<ActiveLink<T::Link>>,
}

impl EcgClient<BtleTransport> {
    /// Client over the platform's first Bluetooth adapter.
    pub fn new(config: EcgClientConfig) -> Self {
        Self::with_transport(BtleTransport::new(), config)
    }
}

impl<T: Transport> EcgClient<T> {
    pub fn with_transport(transport: T, config: EcgClientConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            config,
            state: Arc::new(state),
            reporter: None,
            pending: None,
            active: None,
        }
    }

    pub fn config(&self) -> &EcgClientConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions, including those made by the sample pump.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The peripheral currently owned, if any.
    pub fn peripheral(&self) -> Option<&PeripheralHandle> {
        self.active.as_ref().map(|a| &a.handle)
    }

    // ── Public: connect ──────────────────────────────────────────────────────

    /// Find, connect, and start monitoring the ECG peripheral.
    ///
    /// Returns `true` once samples are flowing into `events`, or immediately
    /// when already connected (no new scan is started).  On failure the client
    /// is left in [`ConnectionState::Error`], the error is sent as
    /// [`EcgEvent::Failure`], and `false` is returned; call
    /// [`disconnect`](Self::disconnect) before retrying.
    pub async fn connect(&mut self, events: mpsc::Sender<EcgEvent>) -> bool {
        match self.state() {
            ConnectionState::Connected => {
                debug!("connect(): already connected; ignoring");
                return true;
            }
            ConnectionState::Error => {
                warn!("connect(): client is in the error state; disconnect() first");
                return false;
            }
            ConnectionState::Scanning | ConnectionState::Connecting => {
                // A previous attempt was dropped mid-flight.
                self.disconnect().await;
            }
            ConnectionState::Disconnected => {}
        }

        let reporter = Reporter { state: Arc::clone(&self.state), events };
        self.reporter = Some(reporter.clone());

        match self.establish(&reporter).await {
            Ok(()) => true,
            Err(e) => {
                reporter.fail(e);
                false
            }
        }
    }

    async fn establish(&mut self, reporter: &Reporter) -> Result<()> {
        self.transport.ensure_permissions().await?;
        if !self.transport.radio_powered_on().await? {
            return Err(EcgError::RadioUnavailable);
        }

        reporter.transition(ConnectionState::Scanning);
        let (link, name) = self.discover().await?;

        reporter.transition(ConnectionState::Connecting);
        self.pending = Some(link.clone());
        link.connect().await?;
        let attribute = link
            .discover_attribute(self.config.service_uuid, self.config.characteristic_uuid)
            .await?;
        let source = select_source(link.clone(), attribute, self.config.poll_interval)?;
        let payloads = source.open().await?;
        self.pending = None;

        let handle = PeripheralHandle { id: link.id(), name };
        info!("Connected to {} ({})", handle.name, handle.id);
        reporter.publish(EcgEvent::Connected(handle.clone()));
        reporter.transition(ConnectionState::Connected);

        let watched = link.clone();
        let link_lost = async move { watched.link_lost().await }.boxed();
        let cancel = CancellationToken::new();
        let pump = tokio::spawn(pump(payloads, link_lost, reporter.clone(), cancel.clone()));
        self.active = Some(ActiveLink { link, handle, attribute, cancel, pump });
        Ok(())
    }

    /// Scan until a peripheral name matches or the scan timeout expires.
    async fn discover(&self) -> Result<(T::Link, String)> {
        let timeout = self.config.scan_timeout;
        info!(
            "Scanning for \"{}\" (timeout: {} s) …",
            self.config.name_filter,
            timeout.as_secs()
        );
        self.transport.start_scan().await?;

        let mut seen = BTreeSet::new();
        let found = tokio::time::timeout(timeout, async {
            loop {
                for link in self.transport.discovered().await? {
                    let Some(name) = link.name().await else { continue };
                    if seen.insert(name.clone()) {
                        debug!("Discovered {name} ({})", link.id());
                    }
                    if self.config.matches(&name) {
                        return Ok::<_, EcgError>((link, name));
                    }
                }
                tokio::time::sleep(self.config.scan_poll_period).await;
            }
        })
        .await;

        if let Err(e) = self.transport.stop_scan().await {
            warn!("stop_scan() failed: {e}");
        }

        match found {
            Ok(result) => {
                if let Ok((_, name)) = &result {
                    info!("Found matching peripheral {name}");
                }
                result
            }
            Err(_) => {
                let seen: Vec<String> = seen.into_iter().collect();
                warn!(
                    "No peripheral matching \"{}\" after {} s; saw {} named peripheral(s): [{}]",
                    self.config.name_filter,
                    timeout.as_secs(),
                    seen.len(),
                    seen.join(", ")
                );
                Err(EcgError::DiscoveryTimeout { timeout_secs: timeout.as_secs(), seen })
            }
        }
    }

    // ── Public: disconnect ───────────────────────────────────────────────────

    /// Stop monitoring, tear the link down, and return to
    /// [`ConnectionState::Disconnected`].
    ///
    /// Idempotent; safe in any state, including [`ConnectionState::Error`].
    /// Never waits on the event channel.
    pub async fn disconnect(&mut self) {
        if self.state() == ConnectionState::Scanning {
            if let Err(e) = self.transport.stop_scan().await {
                warn!("stop_scan() failed: {e}");
            }
        }

        let mut active = self.active.take();
        if let Some(active) = active.as_mut() {
            active.cancel.cancel();
            // The pump may be parked on a full channel; abort covers that.
            active.pump.abort();
            match (&mut active.pump).await {
                Err(e) if !e.is_cancelled() => warn!("Sample pump ended abnormally: {e}"),
                _ => {}
            }
        }

        // The pump is gone, so nothing can move the state after this.
        let prev = self.state.send_replace(ConnectionState::Disconnected);

        if let Some(active) = active {
            if active.attribute.notify {
                if let Err(e) = active.link.unsubscribe(active.attribute.uuid).await {
                    debug!("unsubscribe() failed: {e}");
                }
            }
            if let Err(e) = active.link.disconnect().await {
                warn!("Disconnecting {} failed: {e}", active.handle.name);
            }
            info!("Released {} ({})", active.handle.name, active.handle.id);
        }

        if let Some(link) = self.pending.take() {
            if let Err(e) = link.disconnect().await {
                debug!("Tearing down half-open link failed: {e}");
            }
        }

        if prev != ConnectionState::Disconnected {
            info!("Connection state: {prev} → {}", ConnectionState::Disconnected);
            if let Some(reporter) = &self.reporter {
                reporter.publish(EcgEvent::Disconnected);
                reporter.publish(EcgEvent::Status(ConnectionState::Disconnected));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::transport::mock::{Counters, MockLink, MockTransport};

    const ONE_MV: [u8; 4] = [0x00, 0x00, 0x80, 0x3F];

    fn client(links: Vec<MockLink>, counters: &Arc<Counters>) -> EcgClient<MockTransport> {
        let config = EcgClientConfig { name_filter: "ecg".into(), ..Default::default() };
        EcgClient::with_transport(MockTransport::new(links, Arc::clone(counters)), config)
    }

    async fn next_sample(rx: &mut mpsc::Receiver<EcgEvent>) -> f64 {
        loop {
            match rx.recv().await.expect("channel closed") {
                EcgEvent::Sample(s) => return s.value,
                _ => continue,
            }
        }
    }

    fn drain(rx: &mut mpsc::Receiver<EcgEvent>) -> Vec<EcgEvent> {
        let mut out = vec![];
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn connect_reaches_connected_and_streams() {
        let counters = Arc::new(Counters::default());
        let mut link = MockLink::notifying("Chest-ECG-01", &counters);
        link.notifications = vec![ONE_MV.to_vec(), vec![15]];
        let mut c = client(vec![MockLink::notifying("Watch", &counters), link], &counters);
        let (tx, mut rx) = mpsc::channel(64);

        assert!(c.connect(tx).await);
        assert_eq!(c.state(), ConnectionState::Connected);
        assert_eq!(c.peripheral().unwrap().name, "Chest-ECG-01");

        let events = drain(&mut rx);
        assert_eq!(
            &events[..4],
            &[
                EcgEvent::Status(ConnectionState::Scanning),
                EcgEvent::Status(ConnectionState::Connecting),
                EcgEvent::Connected(PeripheralHandle {
                    id: "mock-Chest-ECG-01".into(),
                    name: "Chest-ECG-01".into()
                }),
                EcgEvent::Status(ConnectionState::Connected),
            ]
        );

        let mut samples: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                EcgEvent::Sample(s) => Some(s.value),
                _ => None,
            })
            .collect();
        while samples.len() < 2 {
            samples.push(next_sample(&mut rx).await);
        }
        assert_eq!(samples, vec![1.0, 1.5]);
        assert_eq!(Counters::get(&counters.stop_scans), 1);
    }

    #[tokio::test]
    async fn second_connect_is_a_no_op() {
        let counters = Arc::new(Counters::default());
        let mut c = client(vec![MockLink::notifying("ECG", &counters)], &counters);
        let (tx, _rx) = mpsc::channel(64);

        assert!(c.connect(tx.clone()).await);
        assert!(c.connect(tx).await);
        assert_eq!(Counters::get(&counters.scans), 1);
        assert_eq!(Counters::get(&counters.connects), 1);
        assert_eq!(c.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn disconnect_twice_is_safe() {
        let counters = Arc::new(Counters::default());
        let mut c = client(vec![MockLink::notifying("ECG", &counters)], &counters);
        let (tx, mut rx) = mpsc::channel(64);
        assert!(c.connect(tx).await);

        c.disconnect().await;
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert!(c.peripheral().is_none());
        c.disconnect().await;
        assert_eq!(c.state(), ConnectionState::Disconnected);

        assert_eq!(Counters::get(&counters.disconnects), 1);
        assert_eq!(Counters::get(&counters.unsubscribes), 1);
        let events = drain(&mut rx);
        let disconnected = events.iter().filter(|e| **e == EcgEvent::Disconnected).count();
        assert_eq!(disconnected, 1);
        assert_eq!(events.last(), Some(&EcgEvent::Status(ConnectionState::Disconnected)));
    }

    #[tokio::test]
    async fn disconnect_before_connect_is_safe() {
        let counters = Arc::new(Counters::default());
        let mut c = client(vec![], &counters);
        c.disconnect().await;
        c.disconnect().await;
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert_eq!(Counters::get(&counters.stop_scans), 0);
    }

    #[tokio::test]
    async fn permission_denied_fails_before_scanning() {
        let counters = Arc::new(Counters::default());
        let mut c = client(vec![MockLink::notifying("ECG", &counters)], &counters);
        c.transport.permitted.store(false, Ordering::SeqCst);
        let (tx, mut rx) = mpsc::channel(64);

        assert!(!c.connect(tx).await);
        assert_eq!(c.state(), ConnectionState::Error);
        assert_eq!(Counters::get(&counters.scans), 0);
        assert_eq!(
            drain(&mut rx),
            vec![
                EcgEvent::Status(ConnectionState::Error),
                EcgEvent::Failure(EcgError::PermissionDenied)
            ]
        );
    }

    #[tokio::test]
    async fn radio_off_fails() {
        let counters = Arc::new(Counters::default());
        let mut c = client(vec![MockLink::notifying("ECG", &counters)], &counters);
        c.transport.powered.store(false, Ordering::SeqCst);
        let (tx, mut rx) = mpsc::channel(64);

        assert!(!c.connect(tx).await);
        assert_eq!(c.state(), ConnectionState::Error);
        assert!(drain(&mut rx).contains(&EcgEvent::Failure(EcgError::RadioUnavailable)));
    }

    #[tokio::test]
    async fn error_state_requires_disconnect() {
        let counters = Arc::new(Counters::default());
        let mut c = client(vec![MockLink::notifying("ECG", &counters)], &counters);
        c.transport.permitted.store(false, Ordering::SeqCst);
        let (tx, _rx) = mpsc::channel(64);
        assert!(!c.connect(tx.clone()).await);

        c.transport.permitted.store(true, Ordering::SeqCst);
        assert!(!c.connect(tx.clone()).await);
        assert_eq!(c.state(), ConnectionState::Error);

        c.disconnect().await;
        assert!(c.connect(tx).await);
        assert_eq!(c.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_timeout_reports_seen_names() {
        let counters = Arc::new(Counters::default());
        let mut nameless = MockLink::notifying("x", &counters);
        nameless.name = None;
        let links = vec![
            MockLink::notifying("Watch", &counters),
            MockLink::notifying("Polar H10", &counters),
            MockLink::notifying("Watch", &counters),
            nameless,
        ];
        let mut c = client(links, &counters);
        let (tx, mut rx) = mpsc::channel(64);

        let start = tokio::time::Instant::now();
        assert!(!c.connect(tx).await);
        assert!(start.elapsed() >= SCAN_TIMEOUT);
        assert_eq!(c.state(), ConnectionState::Error);
        assert_eq!(Counters::get(&counters.stop_scans), 1);

        let failure = drain(&mut rx).into_iter().find_map(|e| match e {
            EcgEvent::Failure(err) => Some(err),
            _ => None,
        });
        assert_eq!(
            failure,
            Some(EcgError::DiscoveryTimeout {
                timeout_secs: 30,
                seen: vec!["Polar H10".into(), "Watch".into()],
            })
        );
    }

    #[tokio::test]
    async fn name_match_is_case_insensitive() {
        let counters = Arc::new(Counters::default());
        let mut c = client(vec![MockLink::notifying("myEcG-7", &counters)], &counters);
        let (tx, _rx) = mpsc::channel(64);
        assert!(c.connect(tx).await);
        assert_eq!(c.peripheral().unwrap().name, "myEcG-7");
    }

    #[tokio::test]
    async fn missing_attribute_is_an_error() {
        let counters = Arc::new(Counters::default());
        let mut link = MockLink::notifying("ECG", &counters);
        link.has_attribute = false;
        let mut c = client(vec![link], &counters);
        let (tx, mut rx) = mpsc::channel(64);

        assert!(!c.connect(tx).await);
        assert_eq!(c.state(), ConnectionState::Error);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, EcgEvent::Failure(EcgError::AttributeNotFound(_)))));

        // The half-open link is torn down by disconnect().
        c.disconnect().await;
        assert_eq!(Counters::get(&counters.disconnects), 1);
    }

    #[tokio::test]
    async fn refused_handshake_is_an_error() {
        let counters = Arc::new(Counters::default());
        let mut link = MockLink::notifying("ECG", &counters);
        link.fail_connect = true;
        let mut c = client(vec![link], &counters);
        let (tx, _rx) = mpsc::channel(64);

        assert!(!c.connect(tx).await);
        assert_eq!(c.state(), ConnectionState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_fallback_feeds_the_same_channel() {
        let counters = Arc::new(Counters::default());
        let link = MockLink::polled("ECG", &counters, vec![vec![5], vec![0xE8, 0x03], ONE_MV.to_vec()]);
        let mut c = client(vec![link], &counters);
        let (tx, mut rx) = mpsc::channel(64);

        assert!(c.connect(tx).await);
        assert_eq!(next_sample(&mut rx).await, 0.5);
        assert_eq!(next_sample(&mut rx).await, 1.0);
        assert_eq!(next_sample(&mut rx).await, 1.0);

        c.disconnect().await;
        // No stale timer keeps reading after teardown.
        let reads = Counters::get(&counters.reads);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(Counters::get(&counters.reads), reads);
        assert_eq!(Counters::get(&counters.unsubscribes), 0);
    }

    #[tokio::test]
    async fn invalid_payloads_are_dropped() {
        let counters = Arc::new(Counters::default());
        let mut link = MockLink::notifying("ECG", &counters);
        link.notifications = vec![
            vec![],
            f32::NAN.to_le_bytes().to_vec(),
            f32::NEG_INFINITY.to_le_bytes().to_vec(),
            ONE_MV.to_vec(),
        ];
        let mut c = client(vec![link], &counters);
        let (tx, mut rx) = mpsc::channel(64);

        assert!(c.connect(tx).await);
        assert_eq!(next_sample(&mut rx).await, 1.0);
        assert_eq!(c.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn stream_end_moves_to_error() {
        let counters = Arc::new(Counters::default());
        let mut link = MockLink::notifying("ECG", &counters);
        link.notifications = vec![ONE_MV.to_vec()];
        link.hang_up = true;
        let mut c = client(vec![link], &counters);
        let mut state = c.subscribe_state();
        let (tx, mut rx) = mpsc::channel(64);

        assert!(c.connect(tx).await);
        assert_eq!(next_sample(&mut rx).await, 1.0);
        loop {
            match rx.recv().await.expect("channel closed") {
                EcgEvent::Failure(EcgError::Io(_)) => break,
                EcgEvent::Sample(_) => panic!("sample after stream end"),
                _ => {}
            }
        }
        assert_eq!(c.state(), ConnectionState::Error);
        assert_eq!(*state.borrow_and_update(), ConnectionState::Error);

        c.disconnect().await;
        assert_eq!(c.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_does_not_wait_on_a_full_channel() {
        let counters = Arc::new(Counters::default());
        let mut link = MockLink::notifying("ECG", &counters);
        link.notifications = vec![ONE_MV.to_vec(); 32];
        let mut c = client(vec![link], &counters);
        let (tx, _rx) = mpsc::channel(8);

        assert!(c.connect(tx).await);
        // Let the pump fill the channel and park on it.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let done = tokio::time::timeout(Duration::from_secs(2), c.disconnect()).await;
        assert!(done.is_ok());
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert_eq!(Counters::get(&counters.disconnects), 1);
        assert!(c.peripheral().is_none());
    }

    #[tokio::test]
    async fn link_loss_moves_to_error() {
        let counters = Arc::new(Counters::default());
        let mut link = MockLink::notifying("ECG", &counters);
        link.notifications = vec![ONE_MV.to_vec()];
        let lost = Arc::clone(&link.lost);
        let mut c = client(vec![link], &counters);
        let (tx, mut rx) = mpsc::channel(64);

        assert!(c.connect(tx).await);
        assert_eq!(next_sample(&mut rx).await, 1.0);

        lost.notify_one();
        loop {
            match rx.recv().await.expect("channel closed") {
                EcgEvent::Failure(EcgError::Io(msg)) => {
                    assert_eq!(msg, "link lost");
                    break;
                }
                EcgEvent::Sample(_) => panic!("sample after link loss"),
                _ => {}
            }
        }
        assert_eq!(c.state(), ConnectionState::Error);

        c.disconnect().await;
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert_eq!(Counters::get(&counters.disconnects), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_mid_scan_stops_the_scan() {
        let counters = Arc::new(Counters::default());
        let mut c = client(vec![MockLink::notifying("Watch", &counters)], &counters);
        let (tx, mut rx) = mpsc::channel(16);

        // Abandon the attempt while discovery is still polling.
        let attempt = tokio::time::timeout(Duration::from_secs(1), c.connect(tx)).await;
        assert!(attempt.is_err());
        assert_eq!(c.state(), ConnectionState::Scanning);
        assert_eq!(Counters::get(&counters.stop_scans), 0);

        c.disconnect().await;
        assert_eq!(Counters::get(&counters.stop_scans), 1);
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert_eq!(
            drain(&mut rx),
            vec![
                EcgEvent::Status(ConnectionState::Scanning),
                EcgEvent::Disconnected,
                EcgEvent::Status(ConnectionState::Disconnected),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_mid_handshake_releases_the_link() {
        let counters = Arc::new(Counters::default());
        let mut link = MockLink::notifying("ECG", &counters);
        link.stall_connect = true;
        let mut c = client(vec![link], &counters);
        let (tx, mut rx) = mpsc::channel(16);

        let attempt = tokio::time::timeout(Duration::from_secs(1), c.connect(tx)).await;
        assert!(attempt.is_err());
        assert_eq!(c.state(), ConnectionState::Connecting);
        assert_eq!(Counters::get(&counters.stop_scans), 1);

        c.disconnect().await;
        assert_eq!(Counters::get(&counters.disconnects), 1);
        assert_eq!(Counters::get(&counters.stop_scans), 1);
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert!(c.peripheral().is_none());
        assert_eq!(
            drain(&mut rx),
            vec![
                EcgEvent::Status(ConnectionState::Scanning),
                EcgEvent::Status(ConnectionState::Connecting),
                EcgEvent::Disconnected,
                EcgEvent::Status(ConnectionState::Disconnected),
            ]
        );
    }
}
