//! SQLite-backed descriptor store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::debug;

use super::{DescriptorError, DescriptorStore, RunDescriptor};

/// SQLite-backed descriptor store.
///
/// Each mutation runs in its own transaction; the commit is the flush, and
/// `synchronous = FULL` makes it durable before the call returns.
pub struct SqliteDescriptorStore {
    conn: Mutex<Connection>,
    scope: String,
}

impl SqliteDescriptorStore {
    /// Open (or create) the database file and tables for `scope`.
    pub fn new(path: &Path, scope: impl Into<String>) -> Result<Self, DescriptorError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            scope: scope.into(),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory(scope: impl Into<String>) -> Result<Self, DescriptorError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            scope: scope.into(),
        })
    }

    /// The orchestration context this store is bound to.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn initialize_schema(conn: &Connection) -> Result<(), DescriptorError> {
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS run_descriptors (
                scope TEXT NOT NULL,
                run_id TEXT NOT NULL,
                status TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (scope, run_id)
            );

            CREATE INDEX IF NOT EXISTS idx_run_descriptors_updated_at
                ON run_descriptors(scope, updated_at);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DescriptorError> {
        self.conn
            .lock()
            .map_err(|_| DescriptorError::Database("connection lock poisoned".to_string()))
    }

    fn select(
        tx: &Transaction<'_>,
        scope: &str,
        run_id: &str,
    ) -> Result<Option<RunDescriptor>, DescriptorError> {
        let body: Option<String> = tx
            .query_row(
                "SELECT body FROM run_descriptors WHERE scope = ? AND run_id = ?",
                params![scope, run_id],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|b| serde_json::from_str(&b).map_err(DescriptorError::from))
            .transpose()
    }

    fn upsert(
        tx: &Transaction<'_>,
        scope: &str,
        run_id: &str,
        descriptor: &RunDescriptor,
    ) -> Result<(), DescriptorError> {
        let body = serde_json::to_string(descriptor)?;
        tx.execute(
            "INSERT INTO run_descriptors (scope, run_id, status, body, updated_at) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(scope, run_id) DO UPDATE SET status = excluded.status, body = excluded.body, updated_at = excluded.updated_at",
            params![
                scope,
                run_id,
                descriptor.status.as_str(),
                body,
                descriptor.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn flush(tx: Transaction<'_>) -> Result<(), DescriptorError> {
        tx.commit()?;
        Ok(())
    }
}

impl DescriptorStore for SqliteDescriptorStore {
    fn get(&self, run_id: &str) -> Result<Option<RunDescriptor>, DescriptorError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let descriptor = Self::select(&tx, &self.scope, run_id)?;
        tx.finish()?;
        Ok(descriptor)
    }

    fn get_or_create(
        &self,
        run_id: &str,
        factory: &mut dyn FnMut() -> RunDescriptor,
    ) -> Result<RunDescriptor, DescriptorError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) = Self::select(&tx, &self.scope, run_id)? {
            tx.finish()?;
            return Ok(existing);
        }

        let descriptor = factory();
        Self::upsert(&tx, &self.scope, run_id, &descriptor)?;
        Self::flush(tx)?;
        debug!("Created descriptor for run {} in scope {}", run_id, self.scope);
        Ok(descriptor)
    }

    fn update(&self, run_id: &str, descriptor: &RunDescriptor) -> Result<(), DescriptorError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Self::upsert(&tx, &self.scope, run_id, descriptor)?;
        Self::flush(tx)
    }

    fn remove(&self, run_id: &str) -> Result<bool, DescriptorError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute(
            "DELETE FROM run_descriptors WHERE scope = ? AND run_id = ?",
            params![self.scope, run_id],
        )?;
        Self::flush(tx)?;
        Ok(removed > 0)
    }

    fn list(&self) -> Result<Vec<RunDescriptor>, DescriptorError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT body FROM run_descriptors WHERE scope = ? ORDER BY updated_at DESC",
        )?;
        let bodies = stmt
            .query_map(params![self.scope], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(DescriptorError::from))
            .collect()
    }
}
