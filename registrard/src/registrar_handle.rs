use std::thread;
use tokio::sync::{mpsc, oneshot};
use shared::types::{
    ManifestSnapshot, ServiceIdentity, ServiceView, ServiceWithSessions, SessionView,
};
use uuid::Uuid;
use crate::error::RegistryError;
use crate::registrar::{BootstrapOutcome, Registrar};
use crate::services::ServiceQuery;
use crate::store::{ServiceRepository, SessionRepository};

type Reply<T> = oneshot::Sender<Result<T, RegistryError>>;

/// Commands sent to the registrar thread
pub enum RegistrarCommand {
    Bootstrap {
        identity: ServiceIdentity,
        protocols: Vec<u32>,
        reply: Reply<BootstrapOutcome>,
    },
    Ping(Uuid, Reply<()>),
    AddManifest(Uuid, String, Reply<ManifestSnapshot>),
    ListServices(ServiceQuery, Reply<Vec<ServiceView>>),
    GetService(String, Reply<Option<ServiceView>>),
    ListServicesWithSessions(Reply<Vec<ServiceWithSessions>>),
    DeleteService(String, Reply<()>),
    ListSessionsForService(String, Reply<Vec<SessionView>>),
    GetSession(Uuid, Reply<Option<SessionView>>),
    ListSnapshots(Uuid, Reply<Vec<ManifestSnapshot>>),
    Shutdown,
}

/// Handle to the thread that owns the registrar and its stores.
///
/// Commands run one at a time in arrival order, so registrations for the
/// same identity never interleave while the daemon is the only writer.
#[derive(Clone)]
pub struct RegistrarHandle {
    tx: mpsc::Sender<RegistrarCommand>,
}

impl RegistrarHandle {
    /// Spawn a new registrar thread
    pub fn spawn<S, R>(registrar: Registrar<S, R>) -> Self
    where
        S: ServiceRepository + 'static,
        R: SessionRepository + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<RegistrarCommand>(256);

        thread::spawn(move || {
            // Process commands until shutdown or every handle is dropped
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    RegistrarCommand::Bootstrap { identity, protocols, reply } => {
                        let _ = reply.send(registrar.bootstrap(&identity, &protocols));
                    }
                    RegistrarCommand::Ping(session_id, reply) => {
                        let _ = reply.send(registrar.sessions().ping_session(session_id));
                    }
                    RegistrarCommand::AddManifest(session_id, manifest, reply) => {
                        let result = registrar
                            .sessions()
                            .add_manifest_snapshot(session_id, manifest);
                        let _ = reply.send(result);
                    }
                    RegistrarCommand::ListServices(query, reply) => {
                        let _ = reply.send(registrar.coordinator().list_services(&query));
                    }
                    RegistrarCommand::GetService(id, reply) => {
                        let _ = reply.send(registrar.coordinator().get_service_by_id(&id));
                    }
                    RegistrarCommand::ListServicesWithSessions(reply) => {
                        let _ = reply.send(registrar.coordinator().list_services_with_sessions());
                    }
                    RegistrarCommand::DeleteService(id, reply) => {
                        let _ = reply.send(registrar.coordinator().delete_service(&id));
                    }
                    RegistrarCommand::ListSessionsForService(service_id, reply) => {
                        // Invalidated sessions are part of a service's history
                        let result = registrar.sessions().get_all_for_service(&service_id, true);
                        let _ = reply.send(result);
                    }
                    RegistrarCommand::GetSession(session_id, reply) => {
                        let _ = reply.send(registrar.sessions().get_by_id(session_id));
                    }
                    RegistrarCommand::ListSnapshots(session_id, reply) => {
                        let _ = reply.send(registrar.sessions().get_all_snapshots(session_id));
                    }
                    RegistrarCommand::Shutdown => {
                        tracing::info!("Registrar thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> RegistrarCommand,
    ) -> Result<T, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| RegistryError::Unavailable)?;
        // A dropped reply means the thread exited mid-command
        rx.await.map_err(|_| RegistryError::Unavailable)?
    }

    /// Negotiate a protocol and register the service
    pub async fn bootstrap(
        &self,
        identity: ServiceIdentity,
        protocols: Vec<u32>,
    ) -> Result<BootstrapOutcome, RegistryError> {
        self.request(|reply| RegistrarCommand::Bootstrap { identity, protocols, reply })
            .await
    }

    pub async fn ping(&self, session_id: Uuid) -> Result<(), RegistryError> {
        self.request(|reply| RegistrarCommand::Ping(session_id, reply)).await
    }

    pub async fn add_manifest(
        &self,
        session_id: Uuid,
        manifest: String,
    ) -> Result<ManifestSnapshot, RegistryError> {
        self.request(|reply| RegistrarCommand::AddManifest(session_id, manifest, reply))
            .await
    }

    pub async fn list_services(
        &self,
        query: ServiceQuery,
    ) -> Result<Vec<ServiceView>, RegistryError> {
        self.request(|reply| RegistrarCommand::ListServices(query, reply)).await
    }

    pub async fn get_service(&self, id: String) -> Result<Option<ServiceView>, RegistryError> {
        self.request(|reply| RegistrarCommand::GetService(id, reply)).await
    }

    pub async fn list_services_with_sessions(
        &self,
    ) -> Result<Vec<ServiceWithSessions>, RegistryError> {
        self.request(RegistrarCommand::ListServicesWithSessions).await
    }

    pub async fn delete_service(&self, id: String) -> Result<(), RegistryError> {
        self.request(|reply| RegistrarCommand::DeleteService(id, reply)).await
    }

    /// All sessions of a service, invalidated ones included
    pub async fn list_sessions(
        &self,
        service_id: String,
    ) -> Result<Vec<SessionView>, RegistryError> {
        self.request(|reply| RegistrarCommand::ListSessionsForService(service_id, reply))
            .await
    }

    pub async fn get_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<SessionView>, RegistryError> {
        self.request(|reply| RegistrarCommand::GetSession(session_id, reply)).await
    }

    pub async fn list_snapshots(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ManifestSnapshot>, RegistryError> {
        self.request(|reply| RegistrarCommand::ListSnapshots(session_id, reply)).await
    }

    /// Shutdown the registrar thread
    pub async fn shutdown(&self) -> Result<(), RegistryError> {
        self.tx
            .send(RegistrarCommand::Shutdown)
            .await
            .map_err(|_| RegistryError::Unavailable)
    }
}
