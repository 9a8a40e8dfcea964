//! PostgreSQL schema introspection.
//!
//! Reads table, column, and primary-key metadata from `information_schema`
//! once per run. The resulting [`TableSchema`] values are a consistent
//! snapshot for the whole run; the pipeline never re-reads the catalog while
//! tasks are in flight.

use std::fmt;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

/// One column as declared in the source schema. Immutable once read.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub max_length: Option<i32>,
    pub comment: Option<String>,
}

/// Snapshot of one table: name plus its columns in ordinal order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
}

impl TableSchema {
    /// The detected primary-key column, if any.
    ///
    /// Composite keys are reported as "no detected primary key"; single-column
    /// keys are the only supported shape.
    pub fn primary_key(&self) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.is_primary_key)
    }
}

/// Which tables a run generates code for.
#[derive(Debug, Clone, PartialEq)]
pub enum TableSelection {
    /// Exact-match allow-list.
    AllowList(Vec<String>),
    /// Literal name-prefix filters (plain prefix test, not glob or regex).
    Prefixes(Vec<String>),
}

impl TableSelection {
    pub fn matches(&self, table: &str) -> bool {
        match self {
            TableSelection::AllowList(tables) => tables.iter().any(|t| t == table),
            TableSelection::Prefixes(prefixes) => {
                prefixes.iter().any(|p| table.starts_with(p.as_str()))
            }
        }
    }
}

/// Error reading the source schema.
#[derive(Debug, Clone)]
pub enum SchemaError {
    /// Could not connect to the schema source. Fatal to the whole run.
    Connection(String),
    /// A catalog query failed after connecting.
    Query(String),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::Connection(msg) => write!(f, "schema connection failed: {}", msg),
            SchemaError::Query(msg) => write!(f, "schema query failed: {}", msg),
        }
    }
}

impl std::error::Error for SchemaError {}

/// Reads table metadata from a PostgreSQL schema source.
pub struct SchemaIntrospector {
    pool: PgPool,
    schema: String,
}

impl SchemaIntrospector {
    /// Connect to the schema source. Connection failure here aborts the run
    /// before any file is touched.
    pub async fn connect(database_url: &str) -> Result<Self, SchemaError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await
            .map_err(|e| SchemaError::Connection(e.to_string()))?;
        tracing::info!("connected to schema source");
        Ok(Self {
            pool,
            schema: "public".to_string(),
        })
    }

    /// Use a schema other than `public`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// All base tables in the source schema, lexicographically ordered.
    pub async fn list_tables(&self) -> Result<Vec<String>, SchemaError> {
        let rows = sqlx::query(
            "SELECT table_name::text AS table_name FROM information_schema.tables \
             WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SchemaError::Query(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("table_name"))
            .collect())
    }

    /// Column and primary-key metadata for one table.
    pub async fn table_schema(&self, table: &str) -> Result<TableSchema, SchemaError> {
        let pk_rows = sqlx::query(
            "SELECT kcu.column_name::text AS column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
             WHERE tc.table_schema = $1 AND tc.table_name = $2 \
               AND tc.constraint_type = 'PRIMARY KEY' \
             ORDER BY kcu.ordinal_position",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SchemaError::Query(e.to_string()))?;

        let pk_columns: Vec<String> = pk_rows
            .iter()
            .map(|row| row.get::<String, _>("column_name"))
            .collect();
        // Composite keys are out of scope; report them as no detected key.
        let primary_key = if pk_columns.len() == 1 {
            Some(pk_columns[0].clone())
        } else {
            if pk_columns.len() > 1 {
                tracing::warn!(
                    table = %table,
                    "composite primary key not supported, treating as no primary key"
                );
            }
            None
        };

        let rows = sqlx::query(
            "SELECT c.column_name::text AS column_name, c.data_type::text AS data_type, \
                    c.is_nullable::text AS is_nullable, \
                    c.character_maximum_length::int4 AS character_maximum_length, \
                    pg_catalog.col_description(pc.oid, c.ordinal_position) AS column_comment \
             FROM information_schema.columns c \
             LEFT JOIN pg_catalog.pg_class pc \
               ON pc.relname = c.table_name \
              AND pc.relnamespace = ( \
                    SELECT oid FROM pg_catalog.pg_namespace WHERE nspname = c.table_schema) \
             WHERE c.table_schema = $1 AND c.table_name = $2 \
             ORDER BY c.ordinal_position",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SchemaError::Query(e.to_string()))?;

        let columns = rows
            .iter()
            .map(|row| {
                let name: String = row.get("column_name");
                let is_primary_key = primary_key.as_deref() == Some(name.as_str());
                ColumnDefinition {
                    is_primary_key,
                    data_type: row.get("data_type"),
                    nullable: row.get::<String, _>("is_nullable") == "YES",
                    max_length: row.try_get("character_maximum_length").unwrap_or(None),
                    comment: row.try_get("column_comment").unwrap_or(None),
                    name,
                }
            })
            .collect();

        Ok(TableSchema {
            name: table.to_string(),
            columns,
        })
    }

    /// Read the full snapshot for every selected table, in deterministic
    /// lexicographic order.
    pub async fn snapshot(
        &self,
        selection: &TableSelection,
    ) -> Result<Vec<TableSchema>, SchemaError> {
        let mut tables: Vec<String> = self
            .list_tables()
            .await?
            .into_iter()
            .filter(|t| selection.matches(t))
            .collect();
        tables.sort();

        let mut schemas = Vec::with_capacity(tables.len());
        for table in &tables {
            schemas.push(self.table_schema(table).await?);
        }
        tracing::info!("schema snapshot covers {} table(s)", schemas.len());
        Ok(schemas)
    }
}
