use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use shared::types::{ServiceIdentity, ServiceRecord, ServiceView, ServiceWithSessions, SessionView};
use crate::error::RegistryError;
use crate::identity::compute_service_id;
use crate::sessions::SessionManager;
use crate::store::{ServiceFilter, ServiceRepository, SessionRepository};

/// Filters accepted by [`RegistrationCoordinator::list_services`].
#[derive(Debug, Clone, Default)]
pub struct ServiceQuery {
    pub hostname: Option<String>,
    pub app_name: Option<String>,
    pub app_version: Option<String>,
    /// Drop services whose current session last pinged before this instant
    pub min_last_ping: Option<DateTime<Utc>>,
}

/// Registers services and answers queries about them.
///
/// Registration is idempotent on the identity tuple: the same attributes
/// always land on the same record, and every call opens a fresh session.
pub struct RegistrationCoordinator<S, R> {
    services: Arc<S>,
    sessions: SessionManager<R>,
}

impl<S: ServiceRepository, R: SessionRepository> RegistrationCoordinator<S, R> {
    pub fn new(services: Arc<S>, sessions: SessionManager<R>) -> Self {
        Self { services, sessions }
    }

    pub fn sessions(&self) -> &SessionManager<R> {
        &self.sessions
    }

    /// Register a service and open a new session for it.
    ///
    /// The session is created before the service record is written. A failure
    /// in between leaves a session no service record points at.
    pub fn register_service(
        &self,
        identity: &ServiceIdentity,
    ) -> Result<ServiceView, RegistryError> {
        tracing::info!(
            "Registering {} {} on {}",
            identity.app_name,
            identity.app_version,
            identity.hostname
        );

        let id = compute_service_id(identity);

        match self.services.get_by_id(&id)? {
            Some(mut service) => {
                tracing::info!("Service {} already registered, creating a new session", id);
                let session = self.sessions.create_session(&id)?;

                tracing::debug!(
                    "Moving service {} from session {} to {}",
                    id,
                    service.current_session_id,
                    session.id
                );
                service.current_session_id = session.id;
                service.updated = Utc::now();

                if !self.services.update(&service)? {
                    return Err(RegistryError::service_update_failed(service));
                }

                Ok(ServiceView::new(service, Some(session)))
            }
            None => {
                tracing::info!("Registering new service {}", id);
                let session = self.sessions.create_session(&id)?;

                let now = Utc::now();
                let service = ServiceRecord {
                    id,
                    hostname: identity.hostname.clone(),
                    endpoint: identity.endpoint.clone(),
                    port: identity.port,
                    app_name: identity.app_name.clone(),
                    app_version: identity.app_version.clone(),
                    protocol_version: identity.protocol_version.clone(),
                    current_session_id: session.id,
                    created: now,
                    updated: now,
                };

                tracing::debug!("Inserting service {} with session {}", service.id, session.id);
                self.services.insert(&service)?;

                Ok(ServiceView::new(service, Some(session)))
            }
        }
    }

    /// Services matching the query, each joined with its current session.
    pub fn list_services(&self, query: &ServiceQuery) -> Result<Vec<ServiceView>, RegistryError> {
        let filter = ServiceFilter {
            hostname: query.hostname.clone(),
            app_name: query.app_name.clone(),
            app_version: query.app_version.clone(),
        };

        let mut views = Vec::new();
        for service in self.services.get_all(&filter)? {
            let current = self.sessions.get_by_id(service.current_session_id)?;

            if let Some(threshold) = query.min_last_ping {
                let pinged_since = current
                    .as_ref()
                    .and_then(|s| s.last_ping)
                    .is_some_and(|last_ping| last_ping >= threshold);
                if !pinged_since {
                    continue;
                }
            }

            views.push(ServiceView::new(service, current));
        }

        Ok(views)
    }

    pub fn get_service_by_id(&self, id: &str) -> Result<Option<ServiceView>, RegistryError> {
        match self.services.get_by_id(id)? {
            Some(service) => {
                let current = self.sessions.get_by_id(service.current_session_id)?;
                Ok(Some(ServiceView::new(service, current)))
            }
            None => Ok(None),
        }
    }

    /// Every service with its whole session history.
    pub fn list_services_with_sessions(&self) -> Result<Vec<ServiceWithSessions>, RegistryError> {
        let services = self.services.get_all(&ServiceFilter::default())?;
        if services.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_service: HashMap<String, Vec<SessionView>> = HashMap::new();
        for session in self.sessions.get_all(true)? {
            by_service
                .entry(session.service_id.clone())
                .or_default()
                .push(session);
        }

        Ok(services
            .into_iter()
            .map(|service| {
                let sessions = by_service.remove(&service.id).unwrap_or_default();
                let current = sessions.iter().find(|s| s.invalidated.is_none()).cloned();
                ServiceWithSessions {
                    service: ServiceView::new(service, current),
                    sessions,
                }
            })
            .collect())
    }

    /// Remove a service record. Its sessions stay in storage.
    pub fn delete_service(&self, id: &str) -> Result<(), RegistryError> {
        if !self.services.remove(id)? {
            tracing::warn!("Received a delete request for nonexistent service {}", id);
            return Err(RegistryError::service_not_found(id));
        }
        tracing::info!("Deleted service {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use shared::types::Session;
    use uuid::Uuid;
    use crate::error::{FailedRecord, StoreError};
    use crate::store::memory::MemoryStore;

    fn test_identity(hostname: &str, app_name: &str) -> ServiceIdentity {
        ServiceIdentity {
            hostname: hostname.to_string(),
            endpoint: format!("http://{hostname}/manifest"),
            port: Some(8080),
            app_name: app_name.to_string(),
            app_version: "1.2.0".to_string(),
            protocol_version: "1.0.0".to_string(),
        }
    }

    fn coordinator() -> (Arc<MemoryStore>, RegistrationCoordinator<MemoryStore, MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let sessions = SessionManager::new(store.clone());
        (store.clone(), RegistrationCoordinator::new(store, sessions))
    }

    /// Rewrites the last ping of a stored session.
    fn set_last_ping(store: &MemoryStore, session_id: Uuid, last_ping: Option<DateTime<Utc>>) {
        let mut session: Session = SessionRepository::get_by_id(store, session_id)
            .unwrap()
            .unwrap();
        session.last_ping = last_ping;
        assert!(SessionRepository::update(store, &session).unwrap());
    }

    #[test]
    fn test_register_new_service() {
        let (store, coordinator) = coordinator();
        let identity = test_identity("web-01", "Shop");

        let view = coordinator.register_service(&identity).unwrap();

        assert_eq!(view.id, compute_service_id(&identity));
        assert_eq!(view.created, view.updated);
        let session = view.current_session.unwrap();
        assert!(session.invalidated.is_none());

        let stored = ServiceRepository::get_by_id(store.as_ref(), &view.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.current_session_id, session.id);
        assert_eq!(stored.identity(), identity);
    }

    #[test]
    fn test_register_twice_reuses_service() {
        let (store, coordinator) = coordinator();
        let identity = test_identity("web-01", "Shop");

        let first = coordinator.register_service(&identity).unwrap();
        let second = coordinator.register_service(&identity).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created, second.created);
        assert!(second.updated >= first.updated);

        let first_session = first.current_session.unwrap();
        let second_session = second.current_session.unwrap();
        assert_ne!(first_session.id, second_session.id);

        let old = coordinator.sessions().get_by_id(first_session.id).unwrap().unwrap();
        assert!(old.invalidated.is_some());
        let new = coordinator.sessions().get_by_id(second_session.id).unwrap().unwrap();
        assert!(new.invalidated.is_none());

        let services =
            ServiceRepository::get_all(store.as_ref(), &ServiceFilter::default()).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].current_session_id, second_session.id);
    }

    #[test]
    fn test_register_fails_when_update_rejected() {
        struct RejectingServiceUpdates(MemoryStore);

        impl ServiceRepository for RejectingServiceUpdates {
            fn insert(&self, service: &ServiceRecord) -> Result<(), StoreError> {
                ServiceRepository::insert(&self.0, service)
            }
            fn get_by_id(&self, id: &str) -> Result<Option<ServiceRecord>, StoreError> {
                ServiceRepository::get_by_id(&self.0, id)
            }
            fn exists(&self, id: &str) -> Result<bool, StoreError> {
                ServiceRepository::exists(&self.0, id)
            }
            fn update(&self, _service: &ServiceRecord) -> Result<bool, StoreError> {
                Ok(false)
            }
            fn get_all(&self, filter: &ServiceFilter) -> Result<Vec<ServiceRecord>, StoreError> {
                ServiceRepository::get_all(&self.0, filter)
            }
            fn remove(&self, id: &str) -> Result<bool, StoreError> {
                self.0.remove(id)
            }
        }

        let services = Arc::new(RejectingServiceUpdates(MemoryStore::new()));
        let sessions = SessionManager::new(Arc::new(MemoryStore::new()));
        let coordinator = RegistrationCoordinator::new(services, sessions);
        let identity = test_identity("web-01", "Shop");

        let first = coordinator.register_service(&identity).unwrap();
        let err = coordinator.register_service(&identity).unwrap_err();

        match err {
            RegistryError::RepositoryOperationFailed {
                record: FailedRecord::Service(service),
                ..
            } => {
                assert_eq!(service.id, first.id);
            }
            other => panic!("unexpected error: {other}"),
        }

        // The session was created before the failed write and stays behind
        let sessions = coordinator.sessions().get_all_for_service(&first.id, true).unwrap();
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn test_list_services_filters() {
        let (_store, coordinator) = coordinator();
        coordinator.register_service(&test_identity("Web-01", "ShopFront")).unwrap();
        coordinator.register_service(&test_identity("web-02", "Billing")).unwrap();
        coordinator.register_service(&test_identity("db-01", "shop-admin")).unwrap();

        let query = ServiceQuery {
            hostname: Some("WEB".to_string()),
            ..Default::default()
        };
        assert_eq!(coordinator.list_services(&query).unwrap().len(), 2);

        let query = ServiceQuery {
            app_name: Some("shop".to_string()),
            ..Default::default()
        };
        let names: Vec<String> = coordinator
            .list_services(&query)
            .unwrap()
            .into_iter()
            .map(|s| s.app_name)
            .collect();
        assert_eq!(names, vec!["ShopFront".to_string(), "shop-admin".to_string()]);

        let query = ServiceQuery {
            hostname: Some("web".to_string()),
            app_name: Some("billing".to_string()),
            ..Default::default()
        };
        assert_eq!(coordinator.list_services(&query).unwrap().len(), 1);

        let all = coordinator.list_services(&ServiceQuery::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|s| s.current_session.is_some()));
    }

    #[test]
    fn test_list_services_min_last_ping() {
        let (store, coordinator) = coordinator();
        let threshold = Utc::now();

        let never = coordinator.register_service(&test_identity("never", "App")).unwrap();
        let stale = coordinator.register_service(&test_identity("stale", "App")).unwrap();
        let exact = coordinator.register_service(&test_identity("exact", "App")).unwrap();
        let fresh = coordinator.register_service(&test_identity("fresh", "App")).unwrap();

        let second = Duration::seconds(1);
        set_last_ping(&store, stale.current_session.unwrap().id, Some(threshold - second));
        set_last_ping(&store, exact.current_session.unwrap().id, Some(threshold));
        set_last_ping(&store, fresh.current_session.unwrap().id, Some(threshold + second));

        let query = ServiceQuery {
            min_last_ping: Some(threshold),
            ..Default::default()
        };
        let ids: Vec<String> = coordinator
            .list_services(&query)
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();

        assert_eq!(ids, vec![exact.id, fresh.id]);
        assert!(!ids.contains(&never.id));
    }

    #[test]
    fn test_get_service_by_id() {
        let (_store, coordinator) = coordinator();
        let registered = coordinator.register_service(&test_identity("web-01", "Shop")).unwrap();

        let view = coordinator.get_service_by_id(&registered.id).unwrap().unwrap();
        assert_eq!(view, registered);

        assert!(coordinator.get_service_by_id("MISSING").unwrap().is_none());
    }

    #[test]
    fn test_list_services_with_sessions() {
        let (_store, coordinator) = coordinator();
        let identity = test_identity("web-01", "Shop");
        coordinator.register_service(&identity).unwrap();
        let latest = coordinator.register_service(&identity).unwrap();
        coordinator.register_service(&test_identity("web-02", "Shop")).unwrap();

        let overview = coordinator.list_services_with_sessions().unwrap();
        assert_eq!(overview.len(), 2);

        let web01 = overview.iter().find(|s| s.service.id == latest.id).unwrap();
        assert_eq!(web01.sessions.len(), 2);
        assert_eq!(
            web01.service.current_session.as_ref().map(|s| s.id),
            latest.current_session.map(|s| s.id)
        );
    }

    #[test]
    fn test_delete_service() {
        let (_store, coordinator) = coordinator();
        let registered = coordinator.register_service(&test_identity("web-01", "Shop")).unwrap();

        coordinator.delete_service(&registered.id).unwrap();
        assert!(coordinator.get_service_by_id(&registered.id).unwrap().is_none());
        assert_eq!(
            coordinator.sessions().get_all_for_service(&registered.id, true).unwrap().len(),
            1
        );

        assert!(matches!(
            coordinator.delete_service(&registered.id),
            Err(RegistryError::EntityNotFound { .. })
        ));
    }
}
