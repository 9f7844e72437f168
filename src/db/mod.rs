use crate::errors::{AppError, AppResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, InterruptHandle};
use std::fs;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[cfg(test)]
pub(crate) mod testing;

const SCHEMA_SQL: &str = include_str!("schema.sql");
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Executes parameterized read queries against the relational store.
///
/// Placeholders are SQLite numbered parameters (`?1`, `?2`, ...) bound in
/// the order of `params`.
pub trait StorageGateway: Send + Sync {
    fn execute(&self, sql: &str, params: &[SqlValue]) -> impl Future<Output = AppResult<Vec<Row>>> + Send;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Text(storage_timestamp(value))
    }
}

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Self::Integer(number) => ToSqlOutput::Borrowed(ValueRef::Integer(*number)),
            Self::Real(number) => ToSqlOutput::Borrowed(ValueRef::Real(*number)),
            Self::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
        })
    }
}

/// One result row, addressed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, column: &str) -> AppResult<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
            .ok_or_else(|| AppError::Query(format!("column `{column}` missing from result")))
    }

    pub fn get_i64(&self, column: &str) -> AppResult<i64> {
        match self.get(column)? {
            SqlValue::Integer(number) => Ok(*number),
            SqlValue::Real(number) if number.fract() == 0.0 => Ok(*number as i64),
            other => Err(unexpected(column, "integer", other)),
        }
    }

    pub fn get_f64(&self, column: &str) -> AppResult<f64> {
        match self.get(column)? {
            SqlValue::Integer(number) => Ok(*number as f64),
            SqlValue::Real(number) => Ok(*number),
            other => Err(unexpected(column, "number", other)),
        }
    }

    pub fn get_string(&self, column: &str) -> AppResult<String> {
        match self.get(column)? {
            SqlValue::Text(text) => Ok(text.clone()),
            other => Err(unexpected(column, "text", other)),
        }
    }

    pub fn get_opt_string(&self, column: &str) -> AppResult<Option<String>> {
        match self.get(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(text) => Ok(Some(text.clone())),
            other => Err(unexpected(column, "text or null", other)),
        }
    }
}

fn unexpected(column: &str, expected: &str, found: &SqlValue) -> AppError {
    AppError::Query(format!("column `{column}` expected {expected}, found {found:?}"))
}

/// Timestamps are stored as UTC ISO-8601 text with millisecond precision so
/// that lexical and chronological order agree.
pub fn storage_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug)]
struct ConnectionPool {
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
}

struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<ConnectionPool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn conn(&self) -> AppResult<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| AppError::Internal("pooled connection already released".to_string()))
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            match self.pool.idle.lock() {
                Ok(mut idle) => idle.push(conn),
                Err(_) => tracing::error!("connection pool mutex poisoned; dropping connection"),
            }
        }
    }
}

/// Interrupt handle for a statement that is still running on a blocking
/// thread. `complete` is called before the connection goes back to the pool,
/// so a late `interrupt` can never reach a statement issued by another caller.
#[derive(Clone)]
struct QueryCancel(Arc<Mutex<Option<InterruptHandle>>>);

impl QueryCancel {
    fn new(handle: InterruptHandle) -> Self {
        Self(Arc::new(Mutex::new(Some(handle))))
    }

    fn complete(&self) {
        if let Ok(mut slot) = self.0.lock() {
            slot.take();
        }
    }

    fn interrupt(&self) {
        if let Ok(slot) = self.0.lock() {
            if let Some(handle) = slot.as_ref() {
                tracing::debug!("interrupting abandoned query");
                handle.interrupt();
            }
        }
    }
}

struct CancelOnDrop(QueryCancel);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.interrupt();
    }
}

/// SQLite storage gateway backed by a small bounded connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Arc<ConnectionPool>,
}

impl Database {
    pub fn new(path: &Path, pool_size: usize) -> AppResult<Self> {
        if pool_size == 0 {
            return Err(AppError::Config("database pool size must be at least 1".to_string()));
        }
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }

        let mut connections = Vec::with_capacity(pool_size);
        for index in 0..pool_size {
            let conn = Connection::open(path).map_err(|err| AppError::Io(err.to_string()))?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            if index == 0 {
                conn.execute_batch(SCHEMA_SQL)?;
            }
            connections.push(conn);
        }

        tracing::info!(path = %path.to_string_lossy(), pool_size, "opened dashboard database");

        Ok(Self {
            pool: Arc::new(ConnectionPool {
                idle: Mutex::new(connections),
                permits: Arc::new(Semaphore::new(pool_size)),
            }),
        })
    }

    /// Waits for a free connection. Callers beyond the pool size queue here.
    async fn checkout(&self) -> AppResult<PooledConnection> {
        let permit = self
            .pool
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::Internal("connection pool closed".to_string()))?;
        let conn = self
            .pool
            .idle
            .lock()
            .map_err(|_| AppError::Internal("connection pool mutex poisoned".to_string()))?
            .pop()
            .ok_or_else(|| AppError::Internal("connection pool has no idle connection".to_string()))?;

        Ok(PooledConnection {
            conn: Some(conn),
            pool: self.pool.clone(),
            _permit: permit,
        })
    }
}

impl StorageGateway for Database {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<Row>> {
        let pooled = self.checkout().await?;
        let cancel = QueryCancel::new(pooled.conn()?.get_interrupt_handle());
        let _guard = CancelOnDrop(cancel.clone());

        let sql = sql.to_string();
        let params = params.to_vec();
        tokio::task::spawn_blocking(move || {
            let result = pooled.conn().and_then(|conn| run_query(conn, &sql, &params));
            cancel.complete();
            drop(pooled);
            result
        })
        .await?
    }
}

fn run_query(conn: &Connection, sql: &str, params: &[SqlValue]) -> AppResult<Vec<Row>> {
    let mut statement = conn.prepare_cached(sql)?;
    let columns: Vec<String> = statement.column_names().into_iter().map(ToString::to_string).collect();

    let mut rows = statement.query(rusqlite::params_from_iter(params.iter()))?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for (index, name) in columns.iter().enumerate() {
            values.push((name.clone(), column_value(name, row.get_ref(index)?)?));
        }
        result.push(Row::new(values));
    }
    Ok(result)
}

/// Result columns are never BLOBs, and text must be valid UTF-8.
fn column_value(column: &str, value: ValueRef<'_>) -> AppResult<SqlValue> {
    match value {
        ValueRef::Null => Ok(SqlValue::Null),
        ValueRef::Integer(number) => Ok(SqlValue::Integer(number)),
        ValueRef::Real(number) => Ok(SqlValue::Real(number)),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|text| SqlValue::Text(text.to_string()))
            .map_err(|err| AppError::Query(format!("column `{column}` is not valid UTF-8: {err}"))),
        ValueRef::Blob(bytes) => Err(AppError::Query(format!(
            "column `{column}` holds an unexpected BLOB ({} bytes)",
            bytes.len()
        ))),
    }
}
