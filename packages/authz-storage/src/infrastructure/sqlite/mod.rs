//! SQLite authorization store
//!
//! Holds the relational side of authorization: projects/applications,
//! portfolios, groups, the `user` grants of users and groups, and the
//! `es_queue` outbox.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::{AuthorizationRow, EsQueueItem, Qualifier, RowGrant};
use crate::domain::ports::{AuthorizationReader, RecoveryQueue};
use crate::{Result, StorageError};

/// Statements kept well below SQLite's bound-parameter ceiling
const MAX_IN_CLAUSE: usize = 500;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS projects (
        uuid TEXT PRIMARY KEY,
        kee TEXT NOT NULL UNIQUE,
        qualifier TEXT NOT NULL,
        private BOOLEAN NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS portfolios (
        uuid TEXT PRIMARY KEY,
        kee TEXT NOT NULL UNIQUE,
        parent_uuid TEXT,
        private BOOLEAN NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS groups (
        uuid TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS user_roles (
        uuid TEXT PRIMARY KEY,
        role TEXT NOT NULL,
        user_uuid TEXT NOT NULL,
        entity_uuid TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_user_roles_entity ON user_roles(entity_uuid)",
    // group_uuid NULL is the "Anyone" pseudo-group
    "CREATE TABLE IF NOT EXISTS group_roles (
        uuid TEXT PRIMARY KEY,
        role TEXT NOT NULL,
        group_uuid TEXT,
        entity_uuid TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_group_roles_entity ON group_roles(entity_uuid)",
    "CREATE TABLE IF NOT EXISTS es_queue (
        uuid TEXT PRIMARY KEY,
        doc_type TEXT NOT NULL,
        doc_id TEXT NOT NULL,
        doc_routing TEXT,
        entity_uuid TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_es_queue_updated_at ON es_queue(updated_at)",
];

/// Four row classes folded by the loader: explicit user grants, explicit
/// group grants, public entities, private entities. `{filter}` is replaced by
/// the optional entity restriction, once per branch.
const AUTHORIZATION_QUERY: &str = "
    WITH entity AS (
        SELECT prj.uuid AS uuid, prj.private AS is_private, prj.qualifier AS qualifier
        FROM projects prj
        UNION
        SELECT p.uuid AS uuid, p.private AS is_private, 'VW' AS qualifier
        FROM portfolios p
        WHERE p.parent_uuid IS NULL
    )
    SELECT kind, entity_uuid, qualifier, user_uuid, group_uuid FROM (
        SELECT 'user' AS kind, e.uuid AS entity_uuid, e.qualifier AS qualifier,
               ur.user_uuid AS user_uuid, NULL AS group_uuid
        FROM entity e
        INNER JOIN user_roles ur ON ur.entity_uuid = e.uuid AND ur.role = 'user'
        WHERE e.is_private = 1 {filter}
        UNION
        SELECT 'group', e.uuid, e.qualifier, NULL, g.uuid
        FROM entity e
        INNER JOIN group_roles gr ON gr.entity_uuid = e.uuid AND gr.role = 'user'
        INNER JOIN groups g ON g.uuid = gr.group_uuid
        WHERE e.is_private = 1 {filter}
        UNION
        SELECT 'anyone', e.uuid, e.qualifier, NULL, NULL
        FROM entity e
        WHERE e.is_private = 0 {filter}
        UNION
        SELECT 'nobody', e.uuid, e.qualifier, NULL, NULL
        FROM entity e
        WHERE e.is_private = 1 {filter}
    ) entity_authorization";

/// Number of times the entity list is bound by `AUTHORIZATION_QUERY`
pub const AUTHORIZATION_QUERY_LIST_REFERENCES: usize = 4;

/// `SQLITE_MAX_VARIABLE_NUMBER` of the bundled SQLite
pub const SQLITE_MAX_VARIABLES: usize = 32_766;

/// Largest entity list `AUTHORIZATION_QUERY` can bind
pub const MAX_AUTHORIZATION_QUERY_UUIDS: usize =
    SQLITE_MAX_VARIABLES / AUTHORIZATION_QUERY_LIST_REFERENCES;

/// SQLite-based authorization store
#[derive(Clone)]
pub struct SqliteAuthorizationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAuthorizationStore {
    /// Open (or create) a store at the given path
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock()?;
        for statement in SCHEMA {
            conn.execute(statement, [])?;
        }
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Entities
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Insert a project or an application
    pub fn insert_project(
        &self,
        uuid: &str,
        key: &str,
        qualifier: Qualifier,
        private: bool,
    ) -> Result<()> {
        if qualifier == Qualifier::Portfolio {
            return Err(StorageError::config(format!(
                "Portfolio {} must be inserted with insert_portfolio",
                uuid
            )));
        }
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT INTO projects (uuid, kee, qualifier, private, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![uuid, key, qualifier.code(), private, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    /// Insert a portfolio. Only portfolios without parent are access-controlled entities.
    pub fn insert_portfolio(
        &self,
        uuid: &str,
        key: &str,
        parent_uuid: Option<&str>,
        private: bool,
    ) -> Result<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT INTO portfolios (uuid, kee, parent_uuid, private, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![uuid, key, parent_uuid, private, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    /// Change the visibility of a project, application or portfolio
    pub fn set_private(&self, entity_uuid: &str, private: bool) -> Result<()> {
        let conn = self.conn.lock()?;
        let updated = conn.execute(
            "UPDATE projects SET private = ?1 WHERE uuid = ?2",
            params![private, entity_uuid],
        )? + conn.execute(
            "UPDATE portfolios SET private = ?1 WHERE uuid = ?2",
            params![private, entity_uuid],
        )?;
        if updated == 0 {
            return Err(StorageError::entity_not_found(entity_uuid));
        }
        Ok(())
    }

    /// Delete an entity and all the grants on it
    pub fn delete_entity(&self, entity_uuid: &str) -> Result<()> {
        let conn = self.conn.lock()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM projects WHERE uuid = ?1", params![entity_uuid])?;
        tx.execute("DELETE FROM portfolios WHERE uuid = ?1", params![entity_uuid])?;
        tx.execute(
            "DELETE FROM user_roles WHERE entity_uuid = ?1",
            params![entity_uuid],
        )?;
        tx.execute(
            "DELETE FROM group_roles WHERE entity_uuid = ?1",
            params![entity_uuid],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Groups & grants
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn insert_group(&self, uuid: &str, name: &str) -> Result<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT INTO groups (uuid, name, created_at) VALUES (?1, ?2, ?3)",
            params![uuid, name, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    /// Delete a group and every permission granted to it
    pub fn delete_group(&self, uuid: &str) -> Result<()> {
        let conn = self.conn.lock()?;
        let tx = conn.unchecked_transaction()?;
        let deleted = tx.execute("DELETE FROM groups WHERE uuid = ?1", params![uuid])?;
        if deleted == 0 {
            return Err(StorageError::group_not_found(uuid));
        }
        tx.execute("DELETE FROM group_roles WHERE group_uuid = ?1", params![uuid])?;
        tx.commit()?;
        Ok(())
    }

    pub fn grant_user(&self, entity_uuid: &str, user_uuid: &str, role: &str) -> Result<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT INTO user_roles (uuid, role, user_uuid, entity_uuid) VALUES (?1, ?2, ?3, ?4)",
            params![Uuid::new_v4().to_string(), role, user_uuid, entity_uuid],
        )?;
        Ok(())
    }

    pub fn revoke_user(&self, entity_uuid: &str, user_uuid: &str, role: &str) -> Result<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            "DELETE FROM user_roles WHERE entity_uuid = ?1 AND user_uuid = ?2 AND role = ?3",
            params![entity_uuid, user_uuid, role],
        )?;
        Ok(())
    }

    /// Grant a permission to a group, or to "Anyone" when `group_uuid` is `None`
    pub fn grant_group(
        &self,
        entity_uuid: &str,
        group_uuid: Option<&str>,
        role: &str,
    ) -> Result<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT INTO group_roles (uuid, role, group_uuid, entity_uuid) VALUES (?1, ?2, ?3, ?4)",
            params![Uuid::new_v4().to_string(), role, group_uuid, entity_uuid],
        )?;
        Ok(())
    }

    pub fn revoke_group(&self, entity_uuid: &str, group_uuid: &str, role: &str) -> Result<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            "DELETE FROM group_roles WHERE entity_uuid = ?1 AND group_uuid = ?2 AND role = ?3",
            params![entity_uuid, group_uuid, role],
        )?;
        Ok(())
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

#[async_trait]
impl AuthorizationReader for SqliteAuthorizationStore {
    async fn select_authorizations(&self, entity_uuids: &[String]) -> Result<Vec<AuthorizationRow>> {
        if entity_uuids.len() > MAX_AUTHORIZATION_QUERY_UUIDS {
            return Err(StorageError::config(format!(
                "{} entity uuids exceed the limit of {} per authorization query",
                entity_uuids.len(),
                MAX_AUTHORIZATION_QUERY_UUIDS
            )));
        }
        let filter = if entity_uuids.is_empty() {
            String::new()
        } else {
            format!("AND e.uuid IN ({})", placeholders(entity_uuids.len()))
        };
        let sql = AUTHORIZATION_QUERY.replace("{filter}", &filter);

        // the list is bound once per branch
        let bound: Vec<&String> = if entity_uuids.is_empty() {
            Vec::new()
        } else {
            (0..AUTHORIZATION_QUERY_LIST_REFERENCES)
                .flat_map(|_| entity_uuids.iter())
                .collect()
        };

        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params_from_iter(bound), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let rows = raw
            .into_iter()
            .map(|(kind, entity_uuid, qualifier, user_uuid, group_uuid)| {
                Ok(AuthorizationRow {
                    entity_uuid,
                    qualifier: qualifier.parse()?,
                    grant: RowGrant::from_columns(&kind, user_uuid, group_uuid)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Selected {} authorization rows for {} entities",
            rows.len(),
            if entity_uuids.is_empty() {
                "all".to_string()
            } else {
                entity_uuids.len().to_string()
            }
        );
        Ok(rows)
    }

    fn max_entity_uuids(&self) -> usize {
        MAX_AUTHORIZATION_QUERY_UUIDS
    }
}

#[async_trait]
impl RecoveryQueue for SqliteAuthorizationStore {
    async fn insert(&self, items: &[EsQueueItem]) -> Result<()> {
        let conn = self.conn.lock()?;
        let tx = conn.unchecked_transaction()?;

        for item in items {
            tx.execute(
                "INSERT INTO es_queue
                 (uuid, doc_type, doc_id, doc_routing, entity_uuid, created_at, updated_at, attempts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    &item.uuid,
                    &item.doc_type,
                    &item.doc_id,
                    &item.doc_routing,
                    &item.entity_uuid,
                    item.created_at.timestamp_millis(),
                    item.updated_at.timestamp_millis(),
                    item.attempts,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    async fn select_for_recovery(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EsQueueItem>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, doc_type, doc_id, doc_routing, entity_uuid, created_at, updated_at, attempts
             FROM es_queue WHERE updated_at <= ?1 ORDER BY updated_at ASC, created_at ASC LIMIT ?2",
        )?;
        let items = stmt
            .query_map(params![before.timestamp_millis(), limit as i64], |row| {
                Ok(EsQueueItem {
                    uuid: row.get(0)?,
                    doc_type: row.get(1)?,
                    doc_id: row.get(2)?,
                    doc_routing: row.get(3)?,
                    entity_uuid: row.get(4)?,
                    created_at: millis_to_datetime(row.get(5)?),
                    updated_at: millis_to_datetime(row.get(6)?),
                    attempts: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    async fn delete(&self, item_uuids: &[String]) -> Result<()> {
        let conn = self.conn.lock()?;
        let tx = conn.unchecked_transaction()?;
        for chunk in item_uuids.chunks(MAX_IN_CLAUSE) {
            tx.execute(
                &format!(
                    "DELETE FROM es_queue WHERE uuid IN ({})",
                    placeholders(chunk.len())
                ),
                params_from_iter(chunk),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn record_failure(&self, item_uuids: &[String], at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock()?;
        let tx = conn.unchecked_transaction()?;
        for chunk in item_uuids.chunks(MAX_IN_CLAUSE) {
            let sql = format!(
                "UPDATE es_queue SET attempts = attempts + 1, updated_at = ? WHERE uuid IN ({})",
                placeholders(chunk.len())
            );
            let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(chunk.len() + 1);
            values.push(at.timestamp_millis().into());
            values.extend(chunk.iter().map(|uuid| uuid.clone().into()));
            tx.execute(&sql, params_from_iter(values))?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM es_queue", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
