use std::path::Path;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use shared::types::{ServiceRecord, Session};
use uuid::Uuid;
use crate::error::StoreError;
use crate::store::{ServiceFilter, ServiceRepository, SessionFilter, SessionRepository};

const SERVICE_COLUMNS: &str = "id, hostname, endpoint, port, app_name, app_version,
    protocol_version, current_session_id, created, updated";

const SESSION_COLUMNS: &str = "id, service_id, bootstrapped, last_ping, invalidated,
    manifest_snapshots";

/// SQLite-backed store for services and sessions.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // Enable WAL mode for better concurrency and crash recovery
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;

        // Create tables if they don't exist. Snapshots are stored as a JSON array.
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS services (
                id                 TEXT PRIMARY KEY,
                hostname           TEXT NOT NULL,
                endpoint           TEXT NOT NULL,
                port               INTEGER,
                app_name           TEXT NOT NULL,
                app_version        TEXT NOT NULL,
                protocol_version   TEXT NOT NULL,
                current_session_id TEXT NOT NULL,
                created            TEXT NOT NULL,
                updated            TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id                 TEXT PRIMARY KEY,
                service_id         TEXT NOT NULL,
                bootstrapped       TEXT NOT NULL,
                last_ping          TEXT,
                invalidated        TEXT,
                manifest_snapshots TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_service ON sessions(service_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_invalidated ON sessions(invalidated);
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Helper to convert a database row to ServiceRecord
    fn row_to_service(row: &rusqlite::Row) -> Result<ServiceRecord, rusqlite::Error> {
        let current_session_id: String = row.get(7)?;
        let created: String = row.get(8)?;
        let updated: String = row.get(9)?;

        Ok(ServiceRecord {
            id: row.get(0)?,
            hostname: row.get(1)?,
            endpoint: row.get(2)?,
            port: row.get::<_, Option<u32>>(3)?,
            app_name: row.get(4)?,
            app_version: row.get(5)?,
            protocol_version: row.get(6)?,
            current_session_id: parse_uuid(7, &current_session_id)?,
            created: parse_timestamp(8, &created)?,
            updated: parse_timestamp(9, &updated)?,
        })
    }

    fn row_to_session(row: &rusqlite::Row) -> Result<Session, rusqlite::Error> {
        let id: String = row.get(0)?;
        let bootstrapped: String = row.get(2)?;
        let last_ping: Option<String> = row.get(3)?;
        let invalidated: Option<String> = row.get(4)?;
        let snapshots_json: String = row.get(5)?;

        let manifest_snapshots = serde_json::from_str(&snapshots_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))?;

        Ok(Session {
            id: parse_uuid(0, &id)?,
            service_id: row.get(1)?,
            bootstrapped: parse_timestamp(2, &bootstrapped)?,
            last_ping: last_ping.map(|s| parse_timestamp(3, &s)).transpose()?,
            invalidated: invalidated.map(|s| parse_timestamp(4, &s)).transpose()?,
            manifest_snapshots,
        })
    }

    fn write_session(conn: &Connection, session: &Session) -> Result<bool, StoreError> {
        let snapshots_json = serde_json::to_string(&session.manifest_snapshots)?;

        let count = conn.execute(
            "UPDATE sessions SET
                service_id = ?2,
                bootstrapped = ?3,
                last_ping = ?4,
                invalidated = ?5,
                manifest_snapshots = ?6
             WHERE id = ?1",
            params![
                session.id.to_string(),
                &session.service_id,
                session.bootstrapped.to_rfc3339(),
                session.last_ping.map(|t| t.to_rfc3339()),
                session.invalidated.map(|t| t.to_rfc3339()),
                &snapshots_json,
            ],
        )?;

        Ok(count > 0)
    }
}

impl ServiceRepository for SqliteStore {
    fn insert(&self, service: &ServiceRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO services (
                id, hostname, endpoint, port, app_name, app_version,
                protocol_version, current_session_id, created, updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                &service.id,
                &service.hostname,
                &service.endpoint,
                service.port,
                &service.app_name,
                &service.app_version,
                &service.protocol_version,
                service.current_session_id.to_string(),
                service.created.to_rfc3339(),
                service.updated.to_rfc3339(),
            ],
        )
        .map_err(|e| duplicate_or(e, &service.id))?;
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<Option<ServiceRecord>, StoreError> {
        let conn = self.conn.lock();
        let service = conn
            .query_row(
                &format!("SELECT {} FROM services WHERE id = ?1", SERVICE_COLUMNS),
                params![id],
                Self::row_to_service,
            )
            .optional()?;
        Ok(service)
    }

    fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let found = conn
            .query_row("SELECT 1 FROM services WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn update(&self, service: &ServiceRecord) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let count = conn.execute(
            "UPDATE services SET
                hostname = ?2,
                endpoint = ?3,
                port = ?4,
                app_name = ?5,
                app_version = ?6,
                protocol_version = ?7,
                current_session_id = ?8,
                created = ?9,
                updated = ?10
             WHERE id = ?1",
            params![
                &service.id,
                &service.hostname,
                &service.endpoint,
                service.port,
                &service.app_name,
                &service.app_version,
                &service.protocol_version,
                service.current_session_id.to_string(),
                service.created.to_rfc3339(),
                service.updated.to_rfc3339(),
            ],
        )?;
        Ok(count > 0)
    }

    fn get_all(&self, filter: &ServiceFilter) -> Result<Vec<ServiceRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM services ORDER BY rowid",
            SERVICE_COLUMNS
        ))?;

        // Substring matching is done in Rust so case folding agrees with the
        // in-memory backend for non-ASCII text.
        let services: Vec<ServiceRecord> = stmt
            .query_map([], Self::row_to_service)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|s| filter.matches(s))
            .collect();

        Ok(services)
    }

    fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let count = conn.execute("DELETE FROM services WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }
}

impl SessionRepository for SqliteStore {
    fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let snapshots_json = serde_json::to_string(&session.manifest_snapshots)?;

        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO sessions (
                id, service_id, bootstrapped, last_ping, invalidated, manifest_snapshots
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                session.id.to_string(),
                &session.service_id,
                session.bootstrapped.to_rfc3339(),
                session.last_ping.map(|t| t.to_rfc3339()),
                session.invalidated.map(|t| t.to_rfc3339()),
                &snapshots_json,
            ],
        )
        .map_err(|e| duplicate_or(e, &session.id.to_string()))?;
        Ok(())
    }

    fn get_by_id(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let conn = self.conn.lock();
        let session = conn
            .query_row(
                &format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS),
                params![id.to_string()],
                Self::row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    fn exists(&self, id: Uuid) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM sessions WHERE id = ?1",
                params![id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn update(&self, session: &Session) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        Self::write_session(&conn, session)
    }

    fn get_all(&self, filter: &SessionFilter) -> Result<Vec<Session>, StoreError> {
        let conn = self.conn.lock();
        // NULL service id means every service; ?2 admits invalidated rows
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions
             WHERE (?1 IS NULL OR service_id = ?1)
               AND (?2 OR invalidated IS NULL)
             ORDER BY rowid",
            SESSION_COLUMNS
        ))?;

        let sessions = stmt
            .query_map(
                params![filter.service_id.as_deref(), filter.include_invalidated],
                Self::row_to_session,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sessions)
    }

    fn update_many(&self, sessions: &[Session]) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let mut updated = 0;
        // Rows that vanished in the meantime are not counted
        for session in sessions {
            if Self::write_session(&conn, session)? {
                updated += 1;
            }
        }
        Ok(updated)
    }
}

fn parse_timestamp(idx: usize, value: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(e),
        ))
}

fn parse_uuid(idx: usize, value: &str) -> Result<Uuid, rusqlite::Error> {
    Uuid::parse_str(value).map_err(|e| rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(e),
    ))
}

fn duplicate_or(err: rusqlite::Error, id: &str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::Duplicate(id.to_string())
        }
        _ => StoreError::Sqlite(err),
    }
}
