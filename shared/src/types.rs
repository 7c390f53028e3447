use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The attributes a service instance declares about itself.
/// The registrar derives the service id from exactly these fields, in this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceIdentity {
    pub hostname: String,

    /// Address the registrar can reach the instance's endpoint at
    pub endpoint: String,

    pub port: Option<u32>,

    pub app_name: String,

    pub app_version: String,

    /// Version of the protocol family the instance speaks
    pub protocol_version: String,
}

/// A registered service as persisted by the registrar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub id: String,
    pub hostname: String,
    pub endpoint: String,
    pub port: Option<u32>,
    pub app_name: String,
    pub app_version: String,
    pub protocol_version: String,

    /// Session handed out by the most recent registration
    pub current_session_id: Uuid,

    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl ServiceRecord {
    pub fn identity(&self) -> ServiceIdentity {
        ServiceIdentity {
            hostname: self.hostname.clone(),
            endpoint: self.endpoint.clone(),
            port: self.port,
            app_name: self.app_name.clone(),
            app_version: self.app_version.clone(),
            protocol_version: self.protocol_version.clone(),
        }
    }
}

/// One registration lifetime of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub service_id: String,
    pub bootstrapped: DateTime<Utc>,
    pub last_ping: Option<DateTime<Utc>>,

    /// Set once when a newer session replaces this one
    pub invalidated: Option<DateTime<Utc>>,

    /// Append-only manifest history
    pub manifest_snapshots: Vec<ManifestSnapshot>,
}

impl Session {
    pub fn new(service_id: impl Into<String>, bootstrapped: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_id: service_id.into(),
            bootstrapped,
            last_ping: None,
            invalidated: None,
            manifest_snapshots: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.invalidated.is_none()
    }
}

/// A manifest reported by a service instance at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSnapshot {
    pub manifest: String,
    pub created: DateTime<Utc>,
}

/// Session as returned to API consumers: the history is summarized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub service_id: String,
    pub last_manifest_snapshot: Option<ManifestSnapshot>,
    pub manifest_snapshot_count: usize,
    pub last_ping: Option<DateTime<Utc>>,
    pub bootstrapped: DateTime<Utc>,
    pub invalidated: Option<DateTime<Utc>>,
}

/// Service record joined with its current session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceView {
    pub id: String,
    pub hostname: String,
    pub endpoint: String,
    pub port: Option<u32>,
    pub app_name: String,
    pub app_version: String,
    pub protocol_version: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,

    /// None when the referenced session no longer exists
    pub current_session: Option<SessionView>,
}

impl ServiceView {
    pub fn new(record: ServiceRecord, current_session: Option<SessionView>) -> Self {
        Self {
            id: record.id,
            hostname: record.hostname,
            endpoint: record.endpoint,
            port: record.port,
            app_name: record.app_name,
            app_version: record.app_version,
            protocol_version: record.protocol_version,
            created: record.created,
            updated: record.updated,
            current_session,
        }
    }
}

/// Service view carrying every session the service ever had.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceWithSessions {
    #[serde(flatten)]
    pub service: ServiceView,
    pub sessions: Vec<SessionView>,
}

/// Body of a bootstrap (registration) request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapRequest {
    #[serde(flatten)]
    pub identity: ServiceIdentity,

    /// Wire-protocol versions the instance can speak
    pub supported_protocols: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapResponse {
    pub protocol: u32,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSubmission {
    pub manifest: String,
}

/// Public facts about the registrar itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrarInfo {
    pub supported_protocols: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_active() {
        let session = Session::new("ABC", Utc::now());
        assert!(session.is_active());
        assert!(session.last_ping.is_none());
        assert!(session.manifest_snapshots.is_empty());
    }

    #[test]
    fn test_bootstrap_request_flattens_identity() {
        let json = r#"{
            "hostname": "web-01",
            "endpoint": "http://web-01/manifest",
            "port": 8080,
            "appName": "Shop",
            "appVersion": "1.2.0",
            "protocolVersion": "1.0.0",
            "supportedProtocols": [1, 2]
        }"#;

        let request: BootstrapRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.identity.hostname, "web-01");
        assert_eq!(request.identity.port, Some(8080));
        assert_eq!(request.supported_protocols, Some(vec![1, 2]));
    }

    #[test]
    fn test_missing_port_deserializes_as_none() {
        let json = r#"{
            "hostname": "web-01",
            "endpoint": "http://web-01/manifest",
            "appName": "Shop",
            "appVersion": "1.2.0",
            "protocolVersion": "1.0.0"
        }"#;

        let request: BootstrapRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.identity.port, None);
        assert_eq!(request.supported_protocols, None);
    }
}
