//! Session lifecycle: creation with invalidation of predecessors, liveness
//! pings and manifest history.
//!
//! A session is active until its `invalidated` timestamp is set, after which
//! it never changes state again.

use std::sync::Arc;
use chrono::Utc;
use shared::types::{ManifestSnapshot, Session, SessionView};
use uuid::Uuid;
use crate::error::RegistryError;
use crate::store::{SessionFilter, SessionRepository};

pub struct SessionManager<R> {
    sessions: Arc<R>,
}

impl<R: SessionRepository> SessionManager<R> {
    pub fn new(sessions: Arc<R>) -> Self {
        Self { sessions }
    }

    /// Start a new session for a service and invalidate its active ones.
    ///
    /// The new session is inserted before the old ones are invalidated; if the
    /// invalidation batch only partly succeeds more than one session stays active.
    pub fn create_session(&self, service_id: &str) -> Result<SessionView, RegistryError> {
        tracing::info!("Creating a new session for service {}", service_id);

        let mut previous = self
            .sessions
            .get_all(&SessionFilter::for_service(service_id, false))?;

        let session = Session::new(service_id, Utc::now());
        self.sessions.insert(&session)?;

        if !previous.is_empty() {
            let now = Utc::now();
            for old in &mut previous {
                old.invalidated = Some(now);
            }

            let invalidated = self.sessions.update_many(&previous)?;
            if invalidated < previous.len() {
                tracing::warn!(
                    "Invalidated {} of {} previous sessions of service {}",
                    invalidated,
                    previous.len(),
                    service_id
                );
            } else {
                tracing::debug!(
                    "Invalidated {} previous sessions of service {}",
                    invalidated,
                    service_id
                );
            }
        }

        Ok(session_view(&session))
    }

    /// Record a liveness ping.
    pub fn ping_session(&self, session_id: Uuid) -> Result<(), RegistryError> {
        let mut session = self.fetch(session_id, "ping")?;

        let now = Utc::now();
        tracing::info!("Setting last ping of session {} to {}", session.id, now);
        session.last_ping = Some(now);

        if !self.sessions.update(&session)? {
            return Err(RegistryError::session_update_failed(session));
        }
        Ok(())
    }

    /// Append a manifest to the session's history. Counts as a ping.
    pub fn add_manifest_snapshot(
        &self,
        session_id: Uuid,
        manifest: String,
    ) -> Result<ManifestSnapshot, RegistryError> {
        let mut session = self.fetch(session_id, "manifest snapshot")?;

        tracing::info!("Adding a manifest snapshot to session {}", session.id);

        let now = Utc::now();
        let snapshot = ManifestSnapshot {
            manifest,
            created: now,
        };
        session.last_ping = Some(now);
        session.manifest_snapshots.push(snapshot.clone());

        if !self.sessions.update(&session)? {
            return Err(RegistryError::session_update_failed(session));
        }
        Ok(snapshot)
    }

    pub fn get_by_id(&self, session_id: Uuid) -> Result<Option<SessionView>, RegistryError> {
        tracing::debug!("Fetching session {}", session_id);
        Ok(self.sessions.get_by_id(session_id)?.as_ref().map(session_view))
    }

    pub fn get_all(&self, include_invalidated: bool) -> Result<Vec<SessionView>, RegistryError> {
        let sessions = self
            .sessions
            .get_all(&SessionFilter::all(include_invalidated))?;
        Ok(sessions.iter().map(session_view).collect())
    }

    pub fn get_all_for_service(
        &self,
        service_id: &str,
        include_invalidated: bool,
    ) -> Result<Vec<SessionView>, RegistryError> {
        let sessions = self
            .sessions
            .get_all(&SessionFilter::for_service(service_id, include_invalidated))?;
        Ok(sessions.iter().map(session_view).collect())
    }

    /// Full manifest history in append order.
    pub fn get_all_snapshots(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ManifestSnapshot>, RegistryError> {
        Ok(self.fetch(session_id, "snapshot listing")?.manifest_snapshots)
    }

    fn fetch(&self, session_id: Uuid, operation: &str) -> Result<Session, RegistryError> {
        match self.sessions.get_by_id(session_id)? {
            Some(session) => Ok(session),
            None => {
                tracing::warn!(
                    "Received a {} request for nonexistent session {}",
                    operation,
                    session_id
                );
                Err(RegistryError::session_not_found(session_id))
            }
        }
    }
}

/// Most recent snapshot by timestamp. Among equal timestamps the one appended
/// last wins.
fn last_manifest_snapshot(session: &Session) -> Option<&ManifestSnapshot> {
    session.manifest_snapshots.iter().max_by_key(|s| s.created)
}

fn session_view(session: &Session) -> SessionView {
    SessionView {
        id: session.id,
        service_id: session.service_id.clone(),
        last_manifest_snapshot: last_manifest_snapshot(session).cloned(),
        manifest_snapshot_count: session.manifest_snapshots.len(),
        last_ping: session.last_ping,
        bootstrapped: session.bootstrapped,
        invalidated: session.invalidated,
    }
}
