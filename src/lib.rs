//! # clickhouse-orm
//!
//! Typed models, composable querysets and sync/async HTTP execution for
//! ClickHouse.
//!
//! ## Features
//!
//! - **Expression algebra**: build conditions with operators and server
//!   functions, rendered with minimal parentheses
//! - **Lazy querysets**: immutable, chainable, validated against the model
//!   while building
//! - **Two transports**: blocking (`reqwest::blocking`) and async (tokio),
//!   producing identical statements and results
//! - **Streaming results**: rows are decoded as the response arrives
//! - **DDL**: tables, databases and the MergeTree engine family
//!
//! ## Modules
//!
//! - [`expr`]: expressions and the function catalogue
//! - [`fields`]: field types, values and the wire codec
//! - [`model`]: model descriptors and instances
//! - [`query`]: querysets, statement rendering and DDL
//! - [`engines`]: table and database engines
//! - [`transport`]: HTTP transports, pools and row cursors
//! - [`database`]: blocking and async database handles
//! - [`materialize`]: turning rows into instances or tuples
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clickhouse_orm::{col, ConnectionConfig, Database, Field, FieldType, MergeTree, ModelDescriptor};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let person = ModelDescriptor::builder("person")
//!         .field(Field::new("name", FieldType::String))
//!         .field(Field::new("age", FieldType::UInt8))
//!         .field(Field::new("created", FieldType::DateTime { timezone: None }))
//!         .engine(MergeTree::new(&["created"]).date_col("created"))
//!         .build()?;
//!
//!     let db = Database::new(ConnectionConfig::new("default"))?;
//!     db.create_table(&person)?;
//!
//!     let adults = db
//!         .objects(&person)
//!         .filter(col("age").gte(18))?
//!         .order_by(&["-created"])?
//!         .limit(10);
//!
//!     for p in adults.iter()? {
//!         println!("{}", p?.get_as::<String>("name")?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod engines;
pub mod error;
pub mod expr;
pub mod fields;
pub mod logging;
pub mod materialize;
pub mod model;
pub mod query;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::{generate_default_config, Config, ConfigError, ConnectionConfig, LoggingConfig};
pub use database::{AsyncDatabase, Database, DEFAULT_BATCH_SIZE};
pub use engines::{Buffer, DatabaseEngine, MergeTree, TableEngine};
pub use error::{OrmError, OrmResult};
pub use expr::{col, lit, raw, BinaryOp, Expr, UnaryOp, F};
pub use fields::{Field, FieldType, FromValue, Value};
pub use logging::{init_logging, LogFormat};
pub use materialize::{AsyncModelRows, AsyncTupleRows, ModelRows, Row, TupleRows};
pub use model::{Instance, ModelDescriptor};
pub use query::{JoinKind, Page, QuerySet, Statement};
pub use transport::{AsyncTransport, QueryRequest, Transport};
