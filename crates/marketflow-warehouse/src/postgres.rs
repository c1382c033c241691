//! PostgreSQL warehouse backend
//!
//! Works with PostgreSQL 9.5+ (the loader relies on `ON CONFLICT`) and
//! compatible servers. Connections may be plain or TLS via native-tls.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let params = ConnectionParams {
//!     host: "localhost".into(),
//!     port: 5432,
//!     database: "markets".into(),
//!     user: "etl".into(),
//!     password: std::env::var("DB_PASSWORD")?,
//! };
//! let warehouse = PostgresWarehouse::connect(&params, false).await?;
//! ```

use marketflow_core::{
    ColumnType, ConnectionParams, LoadMethod, Record, RecordBatch, ScalarValue, TableDescriptor,
};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls, Row};
use crate::adapter::{Warehouse, WarehouseError, WarehouseProvider};
use crate::loader::PreparedLoad;
use crate::sql::{self, Dialect};

type Param = Box<dyn ToSql + Sync + Send>;

/// PostgreSQL-backed warehouse
pub struct PostgresWarehouse {
    client: Mutex<Client>,
    host: String,
    port: u16,
    database: String,
}

impl PostgresWarehouse {
    /// Connect with the given parameters, optionally over TLS
    pub async fn connect(params: &ConnectionParams, tls: bool) -> Result<Self, WarehouseError> {
        let config = params.to_connection_string();
        let target = format!("{}:{}/{}", params.host, params.port, params.database);

        let client = if tls {
            let connector = TlsConnector::builder()
                .build()
                .map_err(|e| WarehouseError::Config(format!("Failed to create TLS connector: {}", e)))?;
            let (client, connection) = tokio_postgres::connect(&config, MakeTlsConnector::new(connector))
                .await
                .map_err(|e| connect_error(&target, e))?;
            spawn_connection(target.clone(), connection);
            client
        } else {
            let (client, connection) = tokio_postgres::connect(&config, NoTls)
                .await
                .map_err(|e| connect_error(&target, e))?;
            spawn_connection(target.clone(), connection);
            client
        };

        tracing::debug!(server = %target, tls, "Connected to PostgreSQL");

        Ok(Self {
            client: Mutex::new(client),
            host: params.host.clone(),
            port: params.port,
            database: params.database.clone(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

fn spawn_connection<F>(target: String, connection: F)
where
    F: std::future::Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(server = %target, error = %e, "PostgreSQL connection error");
        }
    });
}

fn connect_error(target: &str, err: tokio_postgres::Error) -> WarehouseError {
    WarehouseError::Connection(format!("Failed to connect to PostgreSQL at {}: {}", target, err))
}

fn db_error(table: &str, err: tokio_postgres::Error) -> WarehouseError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        WarehouseError::Conflict {
            table: table.to_string(),
            detail: err.to_string(),
        }
    } else if err.is_closed() {
        WarehouseError::Connection(err.to_string())
    } else {
        WarehouseError::Query(err.to_string())
    }
}

fn to_param(value: &ScalarValue, column_type: ColumnType) -> Param {
    match value {
        ScalarValue::Null => match column_type {
            ColumnType::Text => Box::new(None::<String>),
            ColumnType::Integer => Box::new(None::<i64>),
            ColumnType::Float => Box::new(None::<f64>),
            ColumnType::Boolean => Box::new(None::<bool>),
        },
        ScalarValue::Bool(b) => Box::new(*b),
        ScalarValue::Int(i) => Box::new(*i),
        ScalarValue::Float(f) => Box::new(*f),
        ScalarValue::Text(s) => Box::new(s.clone()),
    }
}

fn decode_row(row: &Row) -> Result<Record, tokio_postgres::Error> {
    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME {
            row.try_get::<_, Option<String>>(i)?.into()
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(i)?.into()
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(i)?.map(i64::from).into()
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(i)?.map(i64::from).into()
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(i)?.into()
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(i)?.map(f64::from).into()
        } else if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(i)?.into()
        } else {
            tracing::warn!(column = column.name(), column_type = %ty, "Unsupported column type returned as NULL");
            ScalarValue::Null
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

#[async_trait::async_trait]
impl Warehouse for PostgresWarehouse {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn test_connection(&self) -> Result<(), WarehouseError> {
        let client = self.client.lock().await;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| WarehouseError::Connection(format!("Connection test failed: {}", e)))?;
        Ok(())
    }

    async fn load(
        &self,
        batch: &RecordBatch,
        table: &TableDescriptor,
        method: LoadMethod,
    ) -> Result<u64, WarehouseError> {
        let prepared = PreparedLoad::prepare(batch, table, method)?;
        let name = prepared.table.as_str();

        let mut client = self.client.lock().await;
        let tx = client.transaction().await.map_err(|e| db_error(name, e))?;

        tx.execute(sql::create_table(table, Dialect::Postgres).as_str(), &[])
            .await
            .map_err(|e| db_error(name, e))?;

        if prepared.replaces_contents() {
            tx.execute(sql::delete_all(name).as_str(), &[])
                .await
                .map_err(|e| db_error(name, e))?;
        }

        let mut written = 0u64;
        for (statement, rows) in prepared.statements(Dialect::Postgres) {
            let params: Vec<Param> = rows
                .iter()
                .flat_map(|row| {
                    row.iter()
                        .zip(&prepared.column_types)
                        .map(|(value, column_type)| to_param(value, *column_type))
                })
                .collect();
            let refs: Vec<&(dyn ToSql + Sync)> = params
                .iter()
                .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                .collect();
            written += tx
                .execute(statement.as_str(), &refs)
                .await
                .map_err(|e| db_error(name, e))?;
        }

        tx.commit().await.map_err(|e| db_error(name, e))?;

        tracing::info!(table = %name, method = %method, rows = prepared.rows.len(), written, "Loaded batch");
        Ok(written)
    }

    async fn materialize(&self, table: &str, query: &str) -> Result<u64, WarehouseError> {
        let mut client = self.client.lock().await;
        let tx = client.transaction().await.map_err(|e| db_error(table, e))?;

        tx.execute(sql::drop_table(table).as_str(), &[])
            .await
            .map_err(|e| db_error(table, e))?;
        tx.execute(sql::create_table_as(table, query).as_str(), &[])
            .await
            .map_err(|e| db_error(table, e))?;
        let count: i64 = tx
            .query_one(sql::count_rows(table).as_str(), &[])
            .await
            .map_err(|e| db_error(table, e))?
            .get(0);

        tx.commit().await.map_err(|e| db_error(table, e))?;
        Ok(count.max(0) as u64)
    }

    async fn query(&self, sql: &str) -> Result<Vec<Record>, WarehouseError> {
        let client = self.client.lock().await;
        let rows = client
            .query(sql, &[])
            .await
            .map_err(|e| WarehouseError::Query(e.to_string()))?;
        rows.iter()
            .map(|row| decode_row(row).map_err(|e| WarehouseError::Query(e.to_string())))
            .collect()
    }

    async fn execute(&self, sql: &str) -> Result<u64, WarehouseError> {
        let client = self.client.lock().await;
        client
            .execute(sql, &[])
            .await
            .map_err(|e| WarehouseError::Query(e.to_string()))
    }
}

/// Opens a new PostgreSQL session per run
#[derive(Debug, Clone)]
pub struct PostgresProvider {
    params: ConnectionParams,
    tls: bool,
}

impl PostgresProvider {
    pub fn new(params: ConnectionParams, tls: bool) -> Self {
        Self { params, tls }
    }
}

#[async_trait::async_trait]
impl WarehouseProvider for PostgresProvider {
    async fn connect(&self) -> Result<Box<dyn Warehouse>, WarehouseError> {
        let warehouse = PostgresWarehouse::connect(&self.params, self.tls).await?;
        Ok(Box::new(warehouse))
    }
}
