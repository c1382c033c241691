//! Warehouse connections and the record loader
//!
//! This crate provides the connection trait the pipeline runs against and
//! the backends implementing it:
//! - `sqlite` - embedded SQLite database (always available)
//! - `postgres` - PostgreSQL server (enable the `postgres` feature)
//! - `mock` - in-memory call recorder for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use marketflow_warehouse::{SqliteWarehouse, Warehouse};
//! use marketflow_core::LoadMethod;
//!
//! let warehouse = SqliteWarehouse::in_memory()?;
//! warehouse.load(&batch, &descriptor, LoadMethod::Upsert).await?;
//! let rows = warehouse.select_all("currency_exchange_rate").await?;
//! ```

pub mod adapter;
pub mod sql;
pub mod loader;
pub mod sqlite;
pub mod mock;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use adapter::{Warehouse, WarehouseProvider, StaticProvider, WarehouseError};
pub use sql::Dialect;
pub use loader::PreparedLoad;
pub use sqlite::{SqliteWarehouse, SqliteProvider};
pub use mock::{MockWarehouse, WarehouseCall};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresWarehouse, PostgresProvider};
