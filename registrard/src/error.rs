use shared::types::{ServiceRecord, Session};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Duplicate key: {0}")]
    Duplicate(String),
}

/// The record a failed write was carrying, as it was in memory.
#[derive(Debug, Clone)]
pub enum FailedRecord {
    Service(Box<ServiceRecord>),
    Session(Box<Session>),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{entity} not found: {id}")]
    EntityNotFound { entity: &'static str, id: String },

    #[error("{message}")]
    RepositoryOperationFailed {
        message: String,
        record: FailedRecord,
    },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Registrar is not running")]
    Unavailable,
}

impl RegistryError {
    pub fn service_not_found(id: impl Into<String>) -> Self {
        RegistryError::EntityNotFound {
            entity: "Service",
            id: id.into(),
        }
    }

    pub fn session_not_found(id: impl ToString) -> Self {
        RegistryError::EntityNotFound {
            entity: "Session",
            id: id.to_string(),
        }
    }

    pub fn service_update_failed(service: ServiceRecord) -> Self {
        RegistryError::RepositoryOperationFailed {
            message: format!("Failed to update service {}", service.id),
            record: FailedRecord::Service(Box::new(service)),
        }
    }

    pub fn session_update_failed(session: Session) -> Self {
        RegistryError::RepositoryOperationFailed {
            message: format!("Failed to update session {}", session.id),
            record: FailedRecord::Session(Box::new(session)),
        }
    }
}
