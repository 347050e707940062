//! Querysets and statement rendering
//!
//! - **QuerySet**: immutable, lazily evaluated query over one model
//! - **Render**: `SELECT`, `count`, `exists` and `DELETE` statements
//! - **DDL**: `CREATE`/`DROP` and `INSERT` statements
//! - **Exec**: terminal operations against a database handle
//!
//! # Example
//!
//! ```rust,ignore
//! use clickhouse_orm::expr::col;
//!
//! let adults = db
//!     .objects(&person)
//!     .filter(col("age").gte(18))?
//!     .order_by(&["-created"])?
//!     .limit(10);
//!
//! // SELECT `name`, `age`, `created` FROM `person` WHERE `age` >= 18
//! //   ORDER BY `created` DESC LIMIT 10
//! for p in adults.iter()? {
//!     println!("{}", p?.get_as::<String>("name")?);
//! }
//! ```

mod ddl;
mod exec;
mod queryset;
mod render;

pub use ddl::{
    create_database_sql, create_table_sql, drop_database_sql, drop_table_sql, exists_table_sql,
    insert_sql,
};
pub use queryset::{Join, JoinKind, Page, QuerySet, Window};
pub use render::{render_count, render_delete, render_exists, render_select, Statement, WireFormat};
