//! Persistence contract for service records and sessions.
//!
//! Writes replace whole records. There is no compare-and-swap: callers that
//! read, mutate and write back race with each other and the last write wins.

pub mod db;
pub mod memory;

use shared::types::{ServiceRecord, Session};
use uuid::Uuid;
use crate::error::StoreError;

pub trait ServiceRepository: Send + Sync {
    fn insert(&self, service: &ServiceRecord) -> Result<(), StoreError>;

    fn get_by_id(&self, id: &str) -> Result<Option<ServiceRecord>, StoreError>;

    fn exists(&self, id: &str) -> Result<bool, StoreError>;

    /// Replace the stored record. Returns false if nothing was replaced.
    fn update(&self, service: &ServiceRecord) -> Result<bool, StoreError>;

    fn get_all(&self, filter: &ServiceFilter) -> Result<Vec<ServiceRecord>, StoreError>;

    /// Returns false if the record did not exist.
    fn remove(&self, id: &str) -> Result<bool, StoreError>;
}

pub trait SessionRepository: Send + Sync {
    fn insert(&self, session: &Session) -> Result<(), StoreError>;

    fn get_by_id(&self, id: Uuid) -> Result<Option<Session>, StoreError>;

    fn exists(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Replace the stored session. Returns false if nothing was replaced.
    fn update(&self, session: &Session) -> Result<bool, StoreError>;

    fn get_all(&self, filter: &SessionFilter) -> Result<Vec<Session>, StoreError>;

    /// Replace each session independently; returns how many were replaced.
    fn update_many(&self, sessions: &[Session]) -> Result<usize, StoreError>;
}

/// Predicates for listing services. Empty strings match everything.
#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
    /// Case-insensitive substring
    pub hostname: Option<String>,
    /// Case-insensitive substring
    pub app_name: Option<String>,
    /// Case-sensitive substring
    pub app_version: Option<String>,
}

impl ServiceFilter {
    pub fn matches(&self, service: &ServiceRecord) -> bool {
        contains_ignore_case(&service.hostname, self.hostname.as_deref())
            && contains_ignore_case(&service.app_name, self.app_name.as_deref())
            && match non_empty(self.app_version.as_deref()) {
                Some(needle) => service.app_version.contains(needle),
                None => true,
            }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub service_id: Option<String>,
    pub include_invalidated: bool,
}

impl SessionFilter {
    pub fn all(include_invalidated: bool) -> Self {
        Self {
            service_id: None,
            include_invalidated,
        }
    }

    pub fn for_service(service_id: &str, include_invalidated: bool) -> Self {
        Self {
            service_id: Some(service_id.to_string()),
            include_invalidated,
        }
    }

    pub fn matches(&self, session: &Session) -> bool {
        let service_matches = match &self.service_id {
            Some(id) => session.service_id == *id,
            None => true,
        };
        service_matches && (self.include_invalidated || session.is_active())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

fn contains_ignore_case(haystack: &str, needle: Option<&str>) -> bool {
    match non_empty(needle) {
        Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
        None => true,
    }
}
