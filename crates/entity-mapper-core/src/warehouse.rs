//! Remote tabular datasets and the warehouse connection that serves them.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{Connection, PgConnection};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{is_sql_identifier, ConnectionSettings, DatasetDescriptor};

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("failed to connect: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("{operation} on {table} failed: {source}")]
    Query {
        operation: &'static str,
        table: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("could not decode row from {table}: {message}")]
    Decode { table: String, message: String },
    #[error("'{0}' is not a valid SQL identifier")]
    InvalidIdentifier(String),
    #[error("warehouse connection already closed")]
    Closed,
}

/// One fetched row; cells line up with the owning table's columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteRecord {
    cells: Vec<Option<String>>,
}

impl RemoteRecord {
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).and_then(|cell| cell.as_deref())
    }
}

/// Rows fetched from one dataset, with columns in the order the warehouse
/// reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteTable {
    pub dataset: String,
    columns: Vec<String>,
    records: Vec<RemoteRecord>,
}

impl RemoteTable {
    pub fn empty(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            columns: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Declares columns up front; rows pushed later may still add more.
    pub fn with_columns<I, S>(dataset: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::empty(dataset);
        for column in columns {
            let name: String = column.into();
            table.ensure_column(&name);
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[RemoteRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Exact name first, then ASCII case-insensitive: unquoted SQL
    /// identifiers come back case-folded by the warehouse.
    pub fn key_column_index(&self, name: &str) -> Option<usize> {
        self.column_index(name).or_else(|| {
            self.columns
                .iter()
                .position(|column| column.eq_ignore_ascii_case(name))
        })
    }

    fn ensure_column(&mut self, name: &str) -> usize {
        match self.column_index(name) {
            Some(index) => index,
            None => {
                self.columns.push(name.to_string());
                self.columns.len() - 1
            }
        }
    }

    /// Appends a row given as (column, value) pairs. Unknown columns are
    /// appended to the column list; earlier rows read them as null.
    pub fn push_row<I, K>(&mut self, cells: I)
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: AsRef<str>,
    {
        let mut row = vec![None; self.columns.len()];
        for (column, value) in cells {
            let index = self.ensure_column(column.as_ref());
            if index >= row.len() {
                row.resize(index + 1, None);
            }
            row[index] = value;
        }
        self.records.push(RemoteRecord { cells: row });
    }

    /// Removes `prefix` from every column name. When two names collide after
    /// stripping, the first column keeps the name and the later one is dropped.
    pub fn strip_column_prefix(&mut self, prefix: &str) {
        let mut kept: Vec<usize> = Vec::with_capacity(self.columns.len());
        let mut renamed: Vec<String> = Vec::with_capacity(self.columns.len());

        for (index, column) in self.columns.iter().enumerate() {
            let stripped = column.strip_prefix(prefix).unwrap_or(column);
            if renamed.iter().any(|existing| existing == stripped) {
                warn!(
                    dataset = %self.dataset,
                    column = %column,
                    stripped = %stripped,
                    "column collides with an existing name after prefix removal; dropping it"
                );
                continue;
            }
            kept.push(index);
            renamed.push(stripped.to_string());
        }

        if kept.len() != self.columns.len() {
            for record in &mut self.records {
                record.cells = kept
                    .iter()
                    .map(|&index| record.cells.get(index).cloned().flatten())
                    .collect();
            }
        }
        self.columns = renamed;
    }
}

/// Bulk-readable store holding the datasets named in the catalog.
#[async_trait]
pub trait Warehouse: Send {
    /// Every row of `dataset.table` whose key column, rendered as text, is
    /// one of `ids`. All columns are returned.
    async fn fetch_matching(
        &mut self,
        dataset: &DatasetDescriptor,
        ids: &[String],
    ) -> Result<RemoteTable, WarehouseError>;

    async fn count_rows(&mut self, table: &str) -> Result<i64, WarehouseError>;

    /// Releases the connection. Later lookups fail with
    /// [`WarehouseError::Closed`].
    async fn close(&mut self) {}
}

/// A single Postgres-protocol connection, opened once per run.
pub struct PgWarehouse {
    conn: Option<PgConnection>,
}

impl PgWarehouse {
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self, WarehouseError> {
        let role = settings.checked_role().map_err(|_| {
            WarehouseError::InvalidIdentifier(settings.role.clone().unwrap_or_default())
        })?;

        info!(
            host = %settings.host,
            port = settings.port,
            user = %settings.user,
            database = %settings.database,
            "connecting to warehouse"
        );

        let mut conn = PgConnection::connect_with(&settings.connect_options())
            .await
            .map_err(WarehouseError::Connect)?;

        match prepare_session(&mut conn, role).await {
            Ok(version) => {
                info!(%version, "connected to warehouse");
                Ok(Self { conn: Some(conn) })
            }
            Err(err) => {
                close_connection(conn).await;
                Err(err)
            }
        }
    }

    fn connection(&mut self) -> Result<&mut PgConnection, WarehouseError> {
        self.conn.as_mut().ok_or(WarehouseError::Closed)
    }
}

/// Reads the server version and switches role. Leaves the connection open
/// on failure; the caller closes it.
async fn prepare_session(
    conn: &mut PgConnection,
    role: Option<&str>,
) -> Result<String, WarehouseError> {
    let version: String = sqlx::query_scalar("SELECT version()")
        .fetch_one(&mut *conn)
        .await
        .map_err(WarehouseError::Connect)?;

    if let Some(role) = role {
        sqlx::query(&format!("SET ROLE {role}"))
            .execute(&mut *conn)
            .await
            .map_err(WarehouseError::Connect)?;
        debug!(%role, "switched warehouse role");
    }

    Ok(version)
}

async fn close_connection(conn: PgConnection) {
    match conn.close().await {
        Ok(()) => info!("closed warehouse connection"),
        Err(err) => warn!(error = %err, "warehouse connection did not close cleanly"),
    }
}

fn checked_identifier(value: &str) -> Result<&str, WarehouseError> {
    if is_sql_identifier(value) {
        Ok(value)
    } else {
        Err(WarehouseError::InvalidIdentifier(value.to_string()))
    }
}

fn json_cell(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn fetch_matching(
        &mut self,
        dataset: &DatasetDescriptor,
        ids: &[String],
    ) -> Result<RemoteTable, WarehouseError> {
        let table = checked_identifier(&dataset.table)?;
        let key = checked_identifier(&dataset.key_column)?;

        // row_to_json keeps the table's column order, which becomes the output order.
        let sql = format!(
            r#"
                SELECT row_to_json(matched)::text
                FROM (
                    SELECT *
                    FROM {table}
                    WHERE CAST({key} AS TEXT) = ANY($1)
                ) AS matched
            "#
        );
        debug!(dataset = %dataset.name, query = %sql.trim(), "bulk lookup");

        let rows: Vec<String> = sqlx::query_scalar(&sql)
            .bind(ids.to_vec())
            .fetch_all(self.connection()?)
            .await
            .map_err(|source| WarehouseError::Query {
                operation: "bulk lookup",
                table: dataset.table.clone(),
                source,
            })?;

        let mut result = RemoteTable::empty(dataset.name.clone());
        for row in rows {
            let object: Map<String, Value> =
                serde_json::from_str(&row).map_err(|err| WarehouseError::Decode {
                    table: dataset.table.clone(),
                    message: err.to_string(),
                })?;
            result.push_row(
                object
                    .into_iter()
                    .map(|(column, value)| (column, json_cell(value))),
            );
        }

        Ok(result)
    }

    async fn count_rows(&mut self, table: &str) -> Result<i64, WarehouseError> {
        let checked = checked_identifier(table)?;
        let sql = format!("SELECT COUNT(*) FROM {checked}");
        sqlx::query_scalar(&sql)
            .fetch_one(self.connection()?)
            .await
            .map_err(|source| WarehouseError::Query {
                operation: "row count",
                table: table.to_string(),
                source,
            })
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            close_connection(conn).await;
        }
    }
}
