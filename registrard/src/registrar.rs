use std::sync::Arc;
use shared::types::{BootstrapResponse, ServiceIdentity};
use crate::error::RegistryError;
use crate::negotiator::ProtocolNegotiator;
use crate::services::RegistrationCoordinator;
use crate::sessions::SessionManager;
use crate::store::{ServiceRepository, SessionRepository};

/// Outcome of a bootstrap attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Accepted(BootstrapResponse),
    /// The client offered no protocol this registrar speaks
    NoCommonProtocol,
}

/// Everything the request surface talks to.
pub struct Registrar<S, R> {
    negotiator: ProtocolNegotiator,
    coordinator: RegistrationCoordinator<S, R>,
}

impl<S: ServiceRepository, R: SessionRepository> Registrar<S, R> {
    pub fn new(negotiator: ProtocolNegotiator, services: Arc<S>, sessions: Arc<R>) -> Self {
        Self {
            negotiator,
            coordinator: RegistrationCoordinator::new(services, SessionManager::new(sessions)),
        }
    }

    pub fn coordinator(&self) -> &RegistrationCoordinator<S, R> {
        &self.coordinator
    }

    pub fn sessions(&self) -> &SessionManager<R> {
        self.coordinator.sessions()
    }

    /// Negotiate a protocol, then register. Nothing is stored when
    /// negotiation fails.
    pub fn bootstrap(
        &self,
        identity: &ServiceIdentity,
        client_protocols: &[u32],
    ) -> Result<BootstrapOutcome, RegistryError> {
        let Some(protocol) = self.negotiator.choose_protocol(client_protocols) else {
            tracing::info!(
                "Rejecting bootstrap of {} on {}: no common protocol",
                identity.app_name,
                identity.hostname
            );
            return Ok(BootstrapOutcome::NoCommonProtocol);
        };

        let service = self.coordinator.register_service(identity)?;
        let session = service
            .current_session
            .ok_or_else(|| RegistryError::session_not_found(&service.id))?;

        Ok(BootstrapOutcome::Accepted(BootstrapResponse {
            protocol,
            session_id: session.id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceQuery;
    use crate::store::memory::MemoryStore;

    fn registrar() -> Registrar<MemoryStore, MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        Registrar::new(ProtocolNegotiator::new([1, 2, 3, 40]), store.clone(), store)
    }

    fn test_identity() -> ServiceIdentity {
        ServiceIdentity {
            hostname: "web-01".to_string(),
            endpoint: "http://web-01/manifest".to_string(),
            port: None,
            app_name: "Shop".to_string(),
            app_version: "1.2.0".to_string(),
            protocol_version: "1.0.0".to_string(),
        }
    }

    #[test]
    fn test_bootstrap_accepted() {
        let registrar = registrar();

        let outcome = registrar.bootstrap(&test_identity(), &[1, 2, 3, 10, 50]).unwrap();
        let BootstrapOutcome::Accepted(response) = outcome else {
            panic!("expected bootstrap to be accepted");
        };
        assert_eq!(response.protocol, 3);

        let session = registrar.sessions().get_by_id(response.session_id).unwrap();
        assert!(session.is_some());
    }

    #[test]
    fn test_bootstrap_without_common_protocol_stores_nothing() {
        let registrar = registrar();

        let outcome = registrar.bootstrap(&test_identity(), &[10, 50]).unwrap();
        assert_eq!(outcome, BootstrapOutcome::NoCommonProtocol);

        let services = registrar.coordinator().list_services(&ServiceQuery::default()).unwrap();
        assert!(services.is_empty());
        assert!(registrar.sessions().get_all(true).unwrap().is_empty());
    }
}
