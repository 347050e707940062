//! Table and database engines
//!
//! Engines render the `ENGINE = ...` part of `CREATE TABLE` and
//! `CREATE DATABASE` statements. Only the current (partition key) syntax
//! for the MergeTree family is emitted.
//!
//! ```rust,ignore
//! use clickhouse_orm::engines::{MergeTree, TableEngine};
//!
//! let engine: TableEngine = MergeTree::new(&["date", "id"])
//!     .date_col("date")
//!     .index_granularity(4096)
//!     .into();
//! ```

use std::collections::BTreeMap;

use crate::error::{OrmError, OrmResult};
use crate::expr::{col, Expr, F};
use crate::fields::{quote, quote_ident};

/// Default `index_granularity` for MergeTree tables
pub const DEFAULT_INDEX_GRANULARITY: u64 = 8192;

/// Storage engine of a table
#[derive(Debug, Clone, PartialEq)]
pub enum TableEngine {
    TinyLog,
    Log,
    Memory,
    MergeTree(MergeTree),
    /// Reads from every table in the database whose name matches the regex
    Merge { table_regex: String },
    Buffer(Buffer),
    /// Spreads reads and writes over a cluster
    Distributed {
        cluster: String,
        table: String,
        sharding_key: Option<Expr>,
    },
}

impl TableEngine {
    /// Engine clause without the `ENGINE = ` prefix
    pub fn create_table_sql(&self, db_name: &str) -> OrmResult<String> {
        Ok(match self {
            Self::TinyLog => "TinyLog".to_string(),
            Self::Log => "Log".to_string(),
            Self::Memory => "Memory".to_string(),
            Self::MergeTree(engine) => engine.create_table_sql()?,
            Self::Merge { table_regex } => {
                format!("Merge({}, {})", quote_ident(db_name), quote(table_regex))
            }
            Self::Buffer(buffer) => buffer.create_table_sql(db_name),
            Self::Distributed {
                cluster,
                table,
                sharding_key,
            } => {
                if table.is_empty() {
                    return Err(OrmError::build(
                        "Distributed engine needs an underlying table",
                    ));
                }
                let mut params = vec![quote_ident(cluster), quote_ident(db_name), quote_ident(table)];
                if let Some(key) = sharding_key {
                    params.push(key.render());
                }
                format!("Distributed({})", params.join(", "))
            }
        })
    }

    /// Whether tables with this engine accept inserts
    pub fn is_writable(&self) -> bool {
        !matches!(self, Self::Merge { .. })
    }

    /// Whether `SELECT ... FINAL` is meaningful
    pub fn supports_final(&self) -> bool {
        match self {
            Self::MergeTree(engine) => engine.variant != MergeTreeVariant::Plain,
            _ => false,
        }
    }
}

impl From<MergeTree> for TableEngine {
    fn from(engine: MergeTree) -> Self {
        Self::MergeTree(engine)
    }
}

impl From<Buffer> for TableEngine {
    fn from(engine: Buffer) -> Self {
        Self::Buffer(engine)
    }
}

/// Which member of the MergeTree family
#[derive(Debug, Clone, PartialEq)]
pub enum MergeTreeVariant {
    Plain,
    /// Rows with opposite `sign` values cancel out on merge
    Collapsing { sign_col: String },
    /// Numeric columns are summed on merge
    Summing { summing_cols: Vec<String> },
    /// Duplicate keys are replaced on merge, keeping the highest `ver_col`
    Replacing { ver_col: Option<String> },
}

/// MergeTree family engine
#[derive(Debug, Clone, PartialEq)]
pub struct MergeTree {
    pub variant: MergeTreeVariant,
    pub partition_key: Vec<Expr>,
    pub order_by: Vec<Expr>,
    pub primary_key: Vec<Expr>,
    pub sample_by: Option<Expr>,
    pub settings: BTreeMap<String, String>,
    /// `(zookeeper path, replica name)`; emits the `Replicated*` engine
    pub replica: Option<(String, String)>,
}

impl MergeTree {
    /// Plain MergeTree sorted by the given columns
    pub fn new(order_by: &[&str]) -> Self {
        let mut settings = BTreeMap::new();
        settings.insert(
            "index_granularity".to_string(),
            DEFAULT_INDEX_GRANULARITY.to_string(),
        );
        Self {
            variant: MergeTreeVariant::Plain,
            partition_key: Vec::new(),
            order_by: order_by.iter().map(|c| col(*c)).collect(),
            primary_key: Vec::new(),
            sample_by: None,
            settings,
            replica: None,
        }
    }

    /// Sort key given as expressions
    pub fn order_by_exprs(mut self, exprs: Vec<Expr>) -> Self {
        self.order_by = exprs;
        self
    }

    /// Partition by month of a date column
    pub fn date_col(mut self, column: &str) -> Self {
        self.partition_key = vec![F::to_yyyymm(col(column))];
        self
    }

    pub fn partition_by(mut self, exprs: Vec<Expr>) -> Self {
        self.partition_key = exprs;
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| col(*c)).collect();
        self
    }

    pub fn sample_by(mut self, expr: Expr) -> Self {
        self.sample_by = Some(expr);
        self
    }

    pub fn index_granularity(self, granularity: u64) -> Self {
        self.setting("index_granularity", granularity)
    }

    /// Add a table setting (`SETTINGS name=value`)
    pub fn setting(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.settings.insert(name.into(), value.to_string());
        self
    }

    /// Use the replicated variant of the engine
    pub fn replicated(mut self, table_path: impl Into<String>, replica_name: impl Into<String>) -> Self {
        self.replica = Some((table_path.into(), replica_name.into()));
        self
    }

    /// Turn into a CollapsingMergeTree
    pub fn collapsing(mut self, sign_col: impl Into<String>) -> Self {
        self.variant = MergeTreeVariant::Collapsing {
            sign_col: sign_col.into(),
        };
        self
    }

    /// Turn into a SummingMergeTree
    pub fn summing(mut self, summing_cols: &[&str]) -> Self {
        self.variant = MergeTreeVariant::Summing {
            summing_cols: summing_cols.iter().map(|c| c.to_string()).collect(),
        };
        self
    }

    /// Turn into a ReplacingMergeTree
    pub fn replacing(mut self, ver_col: Option<&str>) -> Self {
        self.variant = MergeTreeVariant::Replacing {
            ver_col: ver_col.map(str::to_string),
        };
        self
    }

    fn engine_name(&self) -> String {
        let base = match self.variant {
            MergeTreeVariant::Plain => "MergeTree",
            MergeTreeVariant::Collapsing { .. } => "CollapsingMergeTree",
            MergeTreeVariant::Summing { .. } => "SummingMergeTree",
            MergeTreeVariant::Replacing { .. } => "ReplacingMergeTree",
        };
        if self.replica.is_some() {
            format!("Replicated{}", base)
        } else {
            base.to_string()
        }
    }

    fn params(&self) -> Vec<String> {
        let mut params = Vec::new();
        if let Some((path, name)) = &self.replica {
            params.push(quote(path));
            params.push(quote(name));
        }
        match &self.variant {
            MergeTreeVariant::Plain => {}
            MergeTreeVariant::Collapsing { sign_col } => params.push(quote_ident(sign_col)),
            MergeTreeVariant::Summing { summing_cols } => {
                if !summing_cols.is_empty() {
                    let cols: Vec<String> = summing_cols.iter().map(|c| quote_ident(c)).collect();
                    params.push(format!("({})", cols.join(", ")));
                }
            }
            MergeTreeVariant::Replacing { ver_col } => {
                if let Some(ver) = ver_col {
                    params.push(quote_ident(ver));
                }
            }
        }
        params
    }

    fn create_table_sql(&self) -> OrmResult<String> {
        if self.order_by.is_empty() && self.primary_key.is_empty() {
            return Err(OrmError::build("MergeTree engines need an ORDER BY key"));
        }
        if let Some((path, name)) = &self.replica {
            if path.is_empty() || name.is_empty() {
                return Err(OrmError::build(
                    "both replica table path and replica name must be given",
                ));
            }
        }

        let mut sql = format!("{}({})", self.engine_name(), self.params().join(", "));
        if !self.partition_key.is_empty() {
            sql.push_str(&format!(" PARTITION BY ({})", join_exprs(&self.partition_key)));
        }
        sql.push_str(&format!(" ORDER BY ({})", join_exprs(&self.order_by)));
        if !self.primary_key.is_empty() {
            sql.push_str(&format!(" PRIMARY KEY ({})", join_exprs(&self.primary_key)));
        }
        if let Some(sample) = &self.sample_by {
            sql.push_str(&format!(" SAMPLE BY {}", sample.render()));
        }
        if !self.settings.is_empty() {
            let settings: Vec<String> = self
                .settings
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            sql.push_str(&format!(" SETTINGS {}", settings.join(", ")));
        }
        Ok(sql)
    }
}

fn join_exprs(exprs: &[Expr]) -> String {
    exprs.iter().map(Expr::render).collect::<Vec<_>>().join(", ")
}

/// In-memory buffer in front of another table
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    pub main_table: String,
    pub num_layers: u32,
    pub min_time: u64,
    pub max_time: u64,
    pub min_rows: u64,
    pub max_rows: u64,
    pub min_bytes: u64,
    pub max_bytes: u64,
}

impl Buffer {
    /// Buffer with the server's recommended thresholds
    pub fn new(main_table: impl Into<String>) -> Self {
        Self {
            main_table: main_table.into(),
            num_layers: 16,
            min_time: 10,
            max_time: 100,
            min_rows: 10_000,
            max_rows: 1_000_000,
            min_bytes: 10_000_000,
            max_bytes: 100_000_000,
        }
    }

    fn create_table_sql(&self, db_name: &str) -> String {
        format!(
            "Buffer({}, {}, {}, {}, {}, {}, {}, {}, {})",
            quote_ident(db_name),
            quote_ident(&self.main_table),
            self.num_layers,
            self.min_time,
            self.max_time,
            self.min_rows,
            self.max_rows,
            self.min_bytes,
            self.max_bytes
        )
    }
}

/// Database engine for `CREATE DATABASE`
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseEngine {
    Atomic,
    /// Keeps tables in memory for this many seconds after last access
    Lazy { expiration_secs: u64 },
    MySql {
        host: String,
        port: u16,
        database: String,
        user: String,
        password: String,
    },
    PostgreSql {
        host: String,
        port: u16,
        database: String,
        user: String,
        password: String,
        schema: Option<String>,
        use_table_cache: Option<bool>,
    },
    Sqlite { path: String },
}

impl DatabaseEngine {
    /// Engine clause without the `ENGINE = ` prefix
    pub fn create_database_sql(&self) -> String {
        match self {
            Self::Atomic => "Atomic".to_string(),
            Self::Lazy { expiration_secs } => format!("Lazy({})", expiration_secs),
            Self::MySql {
                host,
                port,
                database,
                user,
                password,
            } => format!(
                "MySQL({}, {}, {}, {})",
                quote(&format!("{}:{}", host, port)),
                quote(database),
                quote(user),
                quote(password)
            ),
            Self::PostgreSql {
                host,
                port,
                database,
                user,
                password,
                schema,
                use_table_cache,
            } => {
                let mut params = vec![
                    quote(&format!("{}:{}", host, port)),
                    quote(database),
                    quote(user),
                    quote(password),
                ];
                if let Some(schema) = schema {
                    params.push(quote(schema));
                }
                if let Some(cache) = use_table_cache {
                    params.push(if *cache { "1" } else { "0" }.to_string());
                }
                format!("PostgreSQL({})", params.join(", "))
            }
            Self::Sqlite { path } => format!("SQLite({})", quote(path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_engines() {
        assert_eq!(TableEngine::TinyLog.create_table_sql("db").unwrap(), "TinyLog");
        assert_eq!(TableEngine::Memory.create_table_sql("db").unwrap(), "Memory");
        assert_eq!(
            TableEngine::Merge { table_regex: "^events_".into() }
                .create_table_sql("db")
                .unwrap(),
            "Merge(`db`, '^events_')"
        );
    }

    #[test]
    fn test_merge_tree() {
        let engine: TableEngine = MergeTree::new(&["date", "id"]).date_col("date").into();
        assert_eq!(
            engine.create_table_sql("db").unwrap(),
            "MergeTree() PARTITION BY (toYYYYMM(`date`)) ORDER BY (`date`, `id`) \
             SETTINGS index_granularity=8192"
        );
    }

    #[test]
    fn test_merge_tree_options() {
        let engine = MergeTree::new(&["date", "id"])
            .partition_by(vec![col("date"), col("region")])
            .primary_key(&["date"])
            .sample_by(F::func("intHash32", [col("id")]))
            .index_granularity(4096)
            .setting("merge_with_ttl_timeout", 3600);
        assert_eq!(
            TableEngine::from(engine).create_table_sql("db").unwrap(),
            "MergeTree() PARTITION BY (`date`, `region`) ORDER BY (`date`, `id`) \
             PRIMARY KEY (`date`) SAMPLE BY intHash32(`id`) \
             SETTINGS index_granularity=4096, merge_with_ttl_timeout=3600"
        );
    }

    #[test]
    fn test_merge_tree_variants() {
        let collapsing = MergeTree::new(&["id"]).collapsing("sign");
        assert!(TableEngine::from(collapsing.clone())
            .create_table_sql("db")
            .unwrap()
            .starts_with("CollapsingMergeTree(`sign`) ORDER BY (`id`)"));

        let summing = MergeTree::new(&["id"]).summing(&["a", "b"]);
        assert!(TableEngine::from(summing)
            .create_table_sql("db")
            .unwrap()
            .starts_with("SummingMergeTree((`a`, `b`))"));

        let replacing = MergeTree::new(&["id"]).replacing(Some("version"));
        assert!(TableEngine::from(replacing)
            .create_table_sql("db")
            .unwrap()
            .starts_with("ReplacingMergeTree(`version`)"));

        let replicated = collapsing.replicated("/clickhouse/tables/{shard}/t", "{replica}");
        assert!(TableEngine::from(replicated)
            .create_table_sql("db")
            .unwrap()
            .starts_with(
                "ReplicatedCollapsingMergeTree('/clickhouse/tables/{shard}/t', '{replica}', `sign`)"
            ));
    }

    #[test]
    fn test_merge_tree_needs_key() {
        let engine = TableEngine::from(MergeTree::new(&[]));
        assert!(matches!(engine.create_table_sql("db"), Err(OrmError::Build(_))));
    }

    #[test]
    fn test_buffer_and_distributed() {
        assert_eq!(
            TableEngine::from(Buffer::new("events")).create_table_sql("db").unwrap(),
            "Buffer(`db`, `events`, 16, 10, 100, 10000, 1000000, 10000000, 100000000)"
        );
        let distributed = TableEngine::Distributed {
            cluster: "main".into(),
            table: "events_local".into(),
            sharding_key: Some(F::func("rand", Vec::<Expr>::new())),
        };
        assert_eq!(
            distributed.create_table_sql("db").unwrap(),
            "Distributed(`main`, `db`, `events_local`, rand())"
        );
    }

    #[test]
    fn test_database_engines() {
        assert_eq!(DatabaseEngine::Atomic.create_database_sql(), "Atomic");
        assert_eq!(
            DatabaseEngine::Lazy { expiration_secs: 60 }.create_database_sql(),
            "Lazy(60)"
        );
        let mysql = DatabaseEngine::MySql {
            host: "mysql".into(),
            port: 3306,
            database: "shop".into(),
            user: "root".into(),
            password: "it's".into(),
        };
        assert_eq!(
            mysql.create_database_sql(),
            "MySQL('mysql:3306', 'shop', 'root', 'it\\'s')"
        );
    }

    #[test]
    fn test_final_support() {
        assert!(!TableEngine::from(MergeTree::new(&["id"])).supports_final());
        assert!(TableEngine::from(MergeTree::new(&["id"]).replacing(None)).supports_final());
        assert!(!TableEngine::Memory.supports_final());
    }
}
