//! Persistence and settings collaborators.
//!
//! The pipeline only depends on the [`SessionStore`] and [`SettingsProvider`]
//! contracts.  [`MemoryStore`] is the in-process implementation used by the
//! CLI and the tests.

use chrono::Utc;
use log::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::types::Session;

/// Where finished sessions go.
pub trait SessionStore {
    /// Persist `session` and return the stored record.  A nil id is replaced
    /// with a fresh one and a missing `saved_at` is stamped with the current
    /// time; saving an existing id overwrites it.
    fn save_session(&mut self, session: Session) -> Result<Session>;

    /// All sessions, newest first.
    fn get_all_sessions(&self) -> Vec<Session>;

    /// `true` if a session was removed.
    fn delete_session(&mut self, id: Uuid) -> bool;

    /// Sessions whose date, time, heart rate, status, or notes contain `query`
    /// (case-insensitive), newest first.  An empty query matches everything.
    fn search(&self, query: &str) -> Vec<Session> {
        self.get_all_sessions()
            .into_iter()
            .filter(|s| session_matches(s, query))
            .collect()
    }
}

/// Free-text match used by [`SessionStore::search`].
///
/// Dates are compared as `YYYY-MM-DD` and times as `HH:MM:SS` (UTC).
pub fn session_matches(session: &Session, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    let haystacks = [
        session.start_time.format("%Y-%m-%d").to_string(),
        session.start_time.format("%H:%M:%S").to_string(),
        session.avg_heart_rate.to_string(),
        session.status.as_str().to_owned(),
        session.notes.clone().unwrap_or_default().to_lowercase(),
    ];
    haystacks.iter().any(|h| h.contains(&query))
}

/// Sessions kept in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Vec<Session>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn save_session(&mut self, mut session: Session) -> Result<Session> {
        if session.id.is_nil() {
            session.id = Uuid::new_v4();
        }
        if session.saved_at.is_none() {
            session.saved_at = Some(Utc::now());
        }
        match self.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => {
                debug!("Overwriting session {}", session.id);
                *existing = session.clone();
            }
            None => self.sessions.push(session.clone()),
        }
        info!("Saved session {} ({} stored)", session.id, self.sessions.len());
        Ok(session)
    }

    fn get_all_sessions(&self) -> Vec<Session> {
        let mut all = self.sessions.clone();
        all.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        all
    }

    fn delete_session(&mut self, id: Uuid) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        before != self.sessions.len()
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

/// User preferences relevant to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preferences {
    /// Persist a stopped session without asking.  Default: `true`.
    pub auto_save: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self { auto_save: true }
    }
}

pub trait SettingsProvider {
    fn preferences(&self) -> Preferences;
}

impl SettingsProvider for Preferences {
    fn preferences(&self) -> Preferences {
        *self
    }
}
