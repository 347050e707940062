//! Database handles
//!
//! [`Database`] runs statements on the blocking transport and
//! [`AsyncDatabase`] on the async one. Both are cheap to clone; clones share
//! the HTTP client and connection pool. Every statement goes through
//! `execute`, which assigns the query id and does the logging.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::engines::DatabaseEngine;
use crate::error::{OrmError, OrmResult};
use crate::fields::FromValue;
use crate::materialize::{AsyncTupleRows, Row, TupleRows};
use crate::model::{Instance, ModelDescriptor};
use crate::query::{
    create_database_sql, create_table_sql, drop_database_sql, drop_table_sql, exists_table_sql,
    insert_sql, QuerySet, Statement,
};
use crate::transport::{
    AsyncHttpTransport, AsyncRowCursor, AsyncTransport, HttpTransport, QueryRequest, RowCursor,
    Transport,
};

/// Rows per `INSERT` statement
pub const DEFAULT_BATCH_SIZE: usize = 1000;

fn log_request(config: &ConnectionConfig, request: &QueryRequest) {
    debug!(
        query_id = %request.query_id,
        database = %config.database,
        statement = %request.statement.text,
        "executing statement"
    );
    if config.log_statements {
        info!(query_id = %request.query_id, "{}", request.statement.text);
    }
}

fn log_failure(request: &QueryRequest, err: &OrmError) {
    match err {
        OrmError::Server { code, message, .. } => {
            warn!(query_id = %request.query_id, code = *code, "server rejected statement: {}", message)
        }
        other => warn!(query_id = %request.query_id, "statement failed: {}", other),
    }
}

/// First column of the first row as an unsigned integer
pub(crate) fn scalar_u64(row: Option<OrmResult<Row>>, statement: &str) -> OrmResult<u64> {
    let row = row
        .ok_or_else(|| {
            OrmError::decode("<result>", None, "expected one row, got none").with_statement(statement)
        })??;
    row.values()
        .first()
        .and_then(u64::from_value)
        .ok_or_else(|| {
            OrmError::decode(
                row.columns().first().map(String::as_str).unwrap_or("<result>"),
                None,
                "expected an unsigned integer",
            )
            .with_statement(statement)
        })
}

/// Parse `23.8.1.1` into `[23, 8, 1, 1]`
pub(crate) fn parse_version(text: &str) -> OrmResult<Vec<u32>> {
    let text = text.trim();
    text.split('.')
        .map(|part| part.parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| OrmError::decode("version()", Some(text), "not a dotted version number"))
}

/// Fails on read-only connections
pub(crate) fn ensure_writable(config: &ConnectionConfig, operation: &str) -> OrmResult<()> {
    if config.readonly {
        return Err(OrmError::build(format!(
            "database `{}` is read-only; {} refused",
            config.database, operation
        )));
    }
    Ok(())
}

fn check_batch_size(batch_size: usize) -> OrmResult<()> {
    if batch_size == 0 {
        return Err(OrmError::build("batch size must be positive"));
    }
    Ok(())
}

/// Model shared by every instance in an insert
fn insert_model(instances: &[Instance]) -> Option<&Arc<ModelDescriptor>> {
    instances.first().map(Instance::model)
}

/// Blocking database handle
#[derive(Clone)]
pub struct Database {
    config: Arc<ConnectionConfig>,
    transport: Arc<dyn Transport>,
}

impl Database {
    /// Connect over HTTP with the given settings
    ///
    /// No request is made until the first statement runs.
    pub fn new(config: ConnectionConfig) -> OrmResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let transport = HttpTransport::new(Arc::clone(&config))?;
        info!(url = %config.base_url(), database = %config.database, "database handle created");
        Ok(Self {
            config,
            transport: Arc::new(transport),
        })
    }

    /// Use a custom transport
    pub fn with_transport(config: ConnectionConfig, transport: Arc<dyn Transport>) -> OrmResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            transport,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.database
    }

    /// All rows of a model
    pub fn objects(&self, model: &Arc<ModelDescriptor>) -> QuerySet<Database> {
        QuerySet::new(model, self.clone())
    }

    /// Run a statement in this database
    pub fn execute(&self, statement: Statement) -> OrmResult<RowCursor> {
        self.run(QueryRequest::new(statement))
    }

    fn run(&self, request: QueryRequest) -> OrmResult<RowCursor> {
        log_request(&self.config, &request);
        self.transport.execute(&request).map_err(|e| {
            log_failure(&request, &e);
            e
        })
    }

    fn run_command(&self, request: QueryRequest) -> OrmResult<()> {
        self.run(request)?.into_text().map(|_| ())
    }

    /// `CREATE DATABASE IF NOT EXISTS` for the configured database
    pub fn create_database(&self) -> OrmResult<()> {
        ensure_writable(&self.config, "CREATE DATABASE")?;
        let statement = create_database_sql(self.name(), None);
        self.run_command(QueryRequest::new(statement).without_database())
    }

    pub fn create_database_with_engine(&self, engine: &DatabaseEngine) -> OrmResult<()> {
        ensure_writable(&self.config, "CREATE DATABASE")?;
        let statement = create_database_sql(self.name(), Some(engine));
        self.run_command(QueryRequest::new(statement).without_database())
    }

    pub fn drop_database(&self) -> OrmResult<()> {
        ensure_writable(&self.config, "DROP DATABASE")?;
        let statement = drop_database_sql(self.name());
        self.run_command(QueryRequest::new(statement).without_database())
    }

    pub fn create_table(&self, model: &ModelDescriptor) -> OrmResult<()> {
        ensure_writable(&self.config, "CREATE TABLE")?;
        let statement = create_table_sql(model, self.name())?;
        self.run_command(QueryRequest::new(statement))
    }

    pub fn drop_table(&self, model: &ModelDescriptor) -> OrmResult<()> {
        ensure_writable(&self.config, "DROP TABLE")?;
        self.run_command(QueryRequest::new(drop_table_sql(model)))
    }

    pub fn does_table_exist(&self, model: &ModelDescriptor) -> OrmResult<bool> {
        let statement = exists_table_sql(model);
        let text = statement.text.clone();
        let mut rows = TupleRows::tuples(self.execute(statement)?);
        Ok(scalar_u64(rows.next(), &text)? != 0)
    }

    /// Insert instances in batches of [`DEFAULT_BATCH_SIZE`]
    ///
    /// Returns the number of rows sent.
    pub fn insert(&self, instances: &[Instance]) -> OrmResult<usize> {
        self.insert_batched(instances, DEFAULT_BATCH_SIZE)
    }

    pub fn insert_batched(&self, instances: &[Instance], batch_size: usize) -> OrmResult<usize> {
        ensure_writable(&self.config, "INSERT")?;
        check_batch_size(batch_size)?;
        let model = match insert_model(instances) {
            Some(model) => Arc::clone(model),
            None => return Ok(0),
        };
        for batch in instances.chunks(batch_size) {
            let statement = insert_sql(&model, batch)?;
            self.run_command(QueryRequest::new(statement))?;
        }
        debug!(table = %model.table_name(), rows = instances.len(), "inserted rows");
        Ok(instances.len())
    }

    /// Run arbitrary SQL and return the response body as text
    pub fn raw(&self, sql: &str) -> OrmResult<String> {
        self.execute(Statement::command(sql))?.into_text()
    }

    /// Run an arbitrary `SELECT` and return untyped rows
    pub fn select(&self, sql: &str) -> OrmResult<TupleRows> {
        Ok(TupleRows::tuples(self.execute(Statement::query(sql))?))
    }

    /// Server version, e.g. `[23, 8, 1, 1]`
    pub fn server_version(&self) -> OrmResult<Vec<u32>> {
        parse_version(&self.raw("SELECT version()")?)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("url", &self.config.base_url())
            .field("database", &self.config.database)
            .finish()
    }
}

/// Async database handle
#[derive(Clone)]
pub struct AsyncDatabase {
    config: Arc<ConnectionConfig>,
    transport: Arc<dyn AsyncTransport>,
}

impl AsyncDatabase {
    /// Connect over HTTP with the given settings
    ///
    /// No request is made until the first statement runs.
    pub fn new(config: ConnectionConfig) -> OrmResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let transport = AsyncHttpTransport::new(Arc::clone(&config))?;
        info!(url = %config.base_url(), database = %config.database, "async database handle created");
        Ok(Self {
            config,
            transport: Arc::new(transport),
        })
    }

    /// Use a custom transport
    pub fn with_transport(
        config: ConnectionConfig,
        transport: Arc<dyn AsyncTransport>,
    ) -> OrmResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            transport,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.database
    }

    /// All rows of a model
    pub fn objects(&self, model: &Arc<ModelDescriptor>) -> QuerySet<AsyncDatabase> {
        QuerySet::new(model, self.clone())
    }

    /// Run a statement in this database
    pub async fn execute(&self, statement: Statement) -> OrmResult<AsyncRowCursor> {
        self.run(QueryRequest::new(statement)).await
    }

    async fn run(&self, request: QueryRequest) -> OrmResult<AsyncRowCursor> {
        log_request(&self.config, &request);
        self.transport.execute(&request).await.map_err(|e| {
            log_failure(&request, &e);
            e
        })
    }

    async fn run_command(&self, request: QueryRequest) -> OrmResult<()> {
        self.run(request).await?.into_text().await.map(|_| ())
    }

    pub async fn create_database(&self) -> OrmResult<()> {
        ensure_writable(&self.config, "CREATE DATABASE")?;
        let statement = create_database_sql(self.name(), None);
        self.run_command(QueryRequest::new(statement).without_database())
            .await
    }

    pub async fn create_database_with_engine(&self, engine: &DatabaseEngine) -> OrmResult<()> {
        ensure_writable(&self.config, "CREATE DATABASE")?;
        let statement = create_database_sql(self.name(), Some(engine));
        self.run_command(QueryRequest::new(statement).without_database())
            .await
    }

    pub async fn drop_database(&self) -> OrmResult<()> {
        ensure_writable(&self.config, "DROP DATABASE")?;
        let statement = drop_database_sql(self.name());
        self.run_command(QueryRequest::new(statement).without_database())
            .await
    }

    pub async fn create_table(&self, model: &ModelDescriptor) -> OrmResult<()> {
        ensure_writable(&self.config, "CREATE TABLE")?;
        let statement = create_table_sql(model, self.name())?;
        self.run_command(QueryRequest::new(statement)).await
    }

    pub async fn drop_table(&self, model: &ModelDescriptor) -> OrmResult<()> {
        ensure_writable(&self.config, "DROP TABLE")?;
        self.run_command(QueryRequest::new(drop_table_sql(model)))
            .await
    }

    pub async fn does_table_exist(&self, model: &ModelDescriptor) -> OrmResult<bool> {
        let statement = exists_table_sql(model);
        let text = statement.text.clone();
        let mut rows = AsyncTupleRows::tuples(self.execute(statement).await?);
        Ok(scalar_u64(rows.next().await, &text)? != 0)
    }

    /// Insert instances in batches of [`DEFAULT_BATCH_SIZE`]
    pub async fn insert(&self, instances: &[Instance]) -> OrmResult<usize> {
        self.insert_batched(instances, DEFAULT_BATCH_SIZE).await
    }

    pub async fn insert_batched(&self, instances: &[Instance], batch_size: usize) -> OrmResult<usize> {
        ensure_writable(&self.config, "INSERT")?;
        check_batch_size(batch_size)?;
        let model = match insert_model(instances) {
            Some(model) => Arc::clone(model),
            None => return Ok(0),
        };
        for batch in instances.chunks(batch_size) {
            let statement = insert_sql(&model, batch)?;
            self.run_command(QueryRequest::new(statement)).await?;
        }
        debug!(table = %model.table_name(), rows = instances.len(), "inserted rows");
        Ok(instances.len())
    }

    pub async fn raw(&self, sql: &str) -> OrmResult<String> {
        self.execute(Statement::command(sql)).await?.into_text().await
    }

    pub async fn select(&self, sql: &str) -> OrmResult<AsyncTupleRows> {
        Ok(AsyncTupleRows::tuples(
            self.execute(Statement::query(sql)).await?,
        ))
    }

    pub async fn server_version(&self) -> OrmResult<Vec<u32>> {
        parse_version(&self.raw("SELECT version()").await?)
    }
}

impl std::fmt::Debug for AsyncDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncDatabase")
            .field("url", &self.config.base_url())
            .field("database", &self.config.database)
            .finish()
    }
}
