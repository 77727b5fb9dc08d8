//! The single consumer of the event channel.
//!
//! [`Monitor`] owns one [`HeartRateEstimator`] and the [`SessionAggregator`]
//! while monitoring is active and feeds every sample to both.  It is not
//! `Sync` by intent of use: drive it from exactly one task.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::EcgError;
use crate::heart_rate::HeartRateEstimator;
use crate::session::SessionAggregator;
use crate::store::{SessionStore, SettingsProvider};
use crate::types::{Bpm, ConnectionState, EcgEvent, Session};

/// What happened to a session when monitoring stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    /// Nothing was recorded; no session was produced.
    Discarded,
    /// Auto-saved (or confirmed) and persisted.
    Saved(Session),
    /// Auto-save is off; pass the session to [`Monitor::save`] to keep it.
    AwaitingConfirmation(Session),
    /// The store rejected the session.  It is handed back so the save can be
    /// retried without re-recording.
    SaveFailed { session: Session, error: EcgError },
}

pub struct Monitor<S, P> {
    store: S,
    settings: P,
    estimator: Option<HeartRateEstimator>,
    aggregator: SessionAggregator,
    connection: ConnectionState,
    last_heart_rate: Option<Bpm>,
}

impl<S: SessionStore, P: SettingsProvider> Monitor<S, P> {
    pub fn new(store: S, settings: P) -> Self {
        Self {
            store,
            settings,
            estimator: None,
            aggregator: SessionAggregator::new(),
            connection: ConnectionState::Disconnected,
            last_heart_rate: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn is_monitoring(&self) -> bool {
        self.aggregator.is_active()
    }

    /// Last connection state seen on the channel.
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Most recent estimate of the current session.
    pub fn last_heart_rate(&self) -> Option<Bpm> {
        self.last_heart_rate
    }

    pub fn start_monitoring(&mut self) {
        self.start_monitoring_at(Utc::now());
    }

    /// Start a fresh session with a fresh estimator.
    pub fn start_monitoring_at(&mut self, at: DateTime<Utc>) {
        self.estimator = Some(HeartRateEstimator::new());
        self.last_heart_rate = None;
        self.aggregator.start_at(at);
    }

    /// Apply one event.  Returns the heart-rate estimate for samples that
    /// arrived while monitoring.
    pub fn handle_event(&mut self, event: EcgEvent) -> Option<Bpm> {
        match event {
            EcgEvent::Sample(sample) => {
                let estimator = self.estimator.as_mut()?;
                let bpm = estimator.push(sample.value);
                self.aggregator.on_sample(sample.value, bpm);
                self.last_heart_rate = Some(bpm);
                Some(bpm)
            }
            EcgEvent::Status(state) => {
                debug!("Monitor: connection {state}");
                self.connection = state;
                None
            }
            EcgEvent::Failure(err) => {
                warn!("Monitor: source failed: {err}");
                None
            }
            EcgEvent::Connected(handle) => {
                info!("Monitor: receiving from {} ({})", handle.name, handle.id);
                None
            }
            EcgEvent::Disconnected => {
                info!("Monitor: source disconnected");
                None
            }
        }
    }

    /// Drain `events` until `cancel` fires or every sender is gone.
    pub async fn run(&mut self, events: &mut mpsc::Receiver<EcgEvent>, cancel: &CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_event(event);
                    }
                    None => break,
                }
            }
        }
    }

    pub fn stop_monitoring(&mut self) -> StopOutcome {
        self.stop_monitoring_at(Utc::now())
    }

    /// Close the session and persist or surface it per the preferences.
    pub fn stop_monitoring_at(&mut self, at: DateTime<Utc>) -> StopOutcome {
        self.estimator = None;
        let Some(session) = self.aggregator.stop_at(at) else {
            return StopOutcome::Discarded;
        };
        if self.settings.preferences().auto_save {
            self.save(session)
        } else {
            info!("Session {} awaiting confirmation", session.id);
            StopOutcome::AwaitingConfirmation(session)
        }
    }

    /// Persist a session surfaced by [`StopOutcome::AwaitingConfirmation`] or
    /// retry one from [`StopOutcome::SaveFailed`].
    pub fn save(&mut self, session: Session) -> StopOutcome {
        match self.store.save_session(session.clone()) {
            Ok(saved) => StopOutcome::Saved(saved),
            Err(error) => {
                warn!("Saving session {} failed: {error}", session.id);
                StopOutcome::SaveFailed { session, error }
            }
        }
    }
}
