use parking_lot::RwLock;
use shared::types::{ServiceRecord, Session};
use uuid::Uuid;
use crate::error::StoreError;
use crate::store::{ServiceFilter, ServiceRepository, SessionFilter, SessionRepository};

/// Volatile store keeping records in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    services: RwLock<Vec<ServiceRecord>>,
    sessions: RwLock<Vec<Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServiceRepository for MemoryStore {
    fn insert(&self, service: &ServiceRecord) -> Result<(), StoreError> {
        let mut services = self.services.write();
        if services.iter().any(|s| s.id == service.id) {
            return Err(StoreError::Duplicate(service.id.clone()));
        }
        services.push(service.clone());
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<Option<ServiceRecord>, StoreError> {
        Ok(self.services.read().iter().find(|s| s.id == id).cloned())
    }

    fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.services.read().iter().any(|s| s.id == id))
    }

    fn update(&self, service: &ServiceRecord) -> Result<bool, StoreError> {
        let mut services = self.services.write();
        match services.iter_mut().find(|s| s.id == service.id) {
            Some(existing) => {
                *existing = service.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get_all(&self, filter: &ServiceFilter) -> Result<Vec<ServiceRecord>, StoreError> {
        Ok(self
            .services
            .read()
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut services = self.services.write();
        let before = services.len();
        services.retain(|s| s.id != id);
        Ok(services.len() != before)
    }
}

impl SessionRepository for MemoryStore {
    fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write();
        if sessions.iter().any(|s| s.id == session.id) {
            return Err(StoreError::Duplicate(session.id.to_string()));
        }
        sessions.push(session.clone());
        Ok(())
    }

    fn get_by_id(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().iter().find(|s| s.id == id).cloned())
    }

    fn exists(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.sessions.read().iter().any(|s| s.id == id))
    }

    fn update(&self, session: &Session) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write();
        match sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get_all(&self, filter: &SessionFilter) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .sessions
            .read()
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    fn update_many(&self, sessions: &[Session]) -> Result<usize, StoreError> {
        let mut updated = 0;
        for session in sessions {
            if SessionRepository::update(self, session)? {
                updated += 1;
            }
        }
        Ok(updated)
    }
}
