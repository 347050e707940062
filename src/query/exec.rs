//! Terminal queryset operations
//!
//! Each call renders and runs a fresh statement; results are never cached.
//! The blocking and async handles render identical statements.

use crate::database::{ensure_writable, scalar_u64, AsyncDatabase, Database};
use crate::error::{OrmError, OrmResult};
use crate::materialize::{AsyncModelRows, AsyncTupleRows, ModelRows, TupleRows};
use crate::model::Instance;

use super::queryset::{page_window, Page, QuerySet};
use super::render::{render_count, render_delete, render_exists, render_select, Statement};

impl<C> QuerySet<C> {
    fn check_model_results(&self) -> OrmResult<()> {
        if !self.aggregates.is_empty() {
            return Err(OrmError::build(
                "aggregated querysets return rows, not model instances; use rows()",
            ));
        }
        Ok(())
    }
}

impl QuerySet<Database> {
    /// Lazily iterate matching model instances
    pub fn iter(&self) -> OrmResult<ModelRows> {
        self.check_model_results()?;
        let cursor = self.conn.execute(render_select(self))?;
        ModelRows::for_model(cursor, &self.model)
    }

    /// All matching model instances
    pub fn fetch(&self) -> OrmResult<Vec<Instance>> {
        self.iter()?.collect()
    }

    /// Lazily iterate untyped rows (the only way to read aggregates)
    pub fn rows(&self) -> OrmResult<TupleRows> {
        Ok(TupleRows::tuples(self.conn.execute(render_select(self))?))
    }

    pub fn count(&self) -> OrmResult<u64> {
        let statement = render_count(self);
        let text = statement.text.clone();
        let mut rows = TupleRows::tuples(self.conn.execute(statement)?);
        scalar_u64(rows.next(), &text)
    }

    pub fn exists(&self) -> OrmResult<bool> {
        let mut rows = TupleRows::tuples(self.conn.execute(render_exists(self))?);
        rows.next().transpose().map(|row| row.is_some())
    }

    /// First matching instance, if any
    pub fn first(&self) -> OrmResult<Option<Instance>> {
        self.slice(..1)?.iter()?.next().transpose()
    }

    /// One page of results; pages are numbered from 1
    pub fn paginate(&self, page: u64, page_size: u64) -> OrmResult<Page<Instance>> {
        let total = self.count()?;
        let (window, pages_total) = page_window(total, page, page_size)?;
        let objects = self
            .slice(window.offset..window.offset + page_size)?
            .fetch()?;
        Ok(Page {
            objects,
            number_of_objects: total,
            pages_total,
            number: page,
            page_size,
        })
    }

    /// Delete matching rows (`ALTER TABLE ... DELETE`)
    pub fn delete(&self) -> OrmResult<()> {
        ensure_writable(self.conn.config(), "DELETE")?;
        let statement: Statement = render_delete(self)?;
        self.conn.execute(statement)?.into_text().map(|_| ())
    }
}

impl QuerySet<AsyncDatabase> {
    /// Lazily stream matching model instances
    pub async fn iter(&self) -> OrmResult<AsyncModelRows> {
        self.check_model_results()?;
        let cursor = self.conn.execute(render_select(self)).await?;
        AsyncModelRows::for_model(cursor, &self.model)
    }

    pub async fn fetch(&self) -> OrmResult<Vec<Instance>> {
        self.iter().await?.try_collect().await
    }

    pub async fn rows(&self) -> OrmResult<AsyncTupleRows> {
        Ok(AsyncTupleRows::tuples(
            self.conn.execute(render_select(self)).await?,
        ))
    }

    pub async fn count(&self) -> OrmResult<u64> {
        let statement = render_count(self);
        let text = statement.text.clone();
        let mut rows = AsyncTupleRows::tuples(self.conn.execute(statement).await?);
        scalar_u64(rows.next().await, &text)
    }

    pub async fn exists(&self) -> OrmResult<bool> {
        let mut rows = AsyncTupleRows::tuples(self.conn.execute(render_exists(self)).await?);
        rows.next().await.transpose().map(|row| row.is_some())
    }

    pub async fn first(&self) -> OrmResult<Option<Instance>> {
        let mut rows = self.slice(..1)?.iter().await?;
        rows.next().await.transpose()
    }

    pub async fn paginate(&self, page: u64, page_size: u64) -> OrmResult<Page<Instance>> {
        let total = self.count().await?;
        let (window, pages_total) = page_window(total, page, page_size)?;
        let objects = self
            .slice(window.offset..window.offset + page_size)?
            .fetch()
            .await?;
        Ok(Page {
            objects,
            number_of_objects: total,
            pages_total,
            number: page,
            page_size,
        })
    }

    pub async fn delete(&self) -> OrmResult<()> {
        ensure_writable(self.conn.config(), "DELETE")?;
        let statement = render_delete(self)?;
        self.conn
            .execute(statement)
            .await?
            .into_text()
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;

    use crate::config::ConnectionConfig;
    use crate::database::{AsyncDatabase, Database};
    use crate::error::OrmError;
    use crate::expr::{col, F};
    use crate::fields::{Field, FieldType};
    use crate::model::ModelDescriptor;
    use crate::test_support::MockServer;

    const PEOPLE: &str = "name\tage\tcreated\nString\tUInt8\tDateTime\n\
                          Ann\t30\t2024-03-01T10:00:00Z\n\
                          Bob\t19\t2024-02-01T10:00:00Z\n";

    fn person() -> Arc<ModelDescriptor> {
        ModelDescriptor::builder("person")
            .field(Field::new("name", FieldType::String))
            .field(Field::new("age", FieldType::UInt8))
            .field(Field::new("created", FieldType::DateTime { timezone: None }))
            .build()
            .unwrap()
    }

    /// Answers counts with 2, `exists` on `empty` with nothing, everything
    /// else with two people
    fn server() -> MockServer {
        MockServer::start(|statement| {
            let body = if statement.starts_with("SELECT count(*)") {
                "count()\nUInt64\n2\n".to_string()
            } else if statement.starts_with("SELECT 1") {
                if statement.contains("'empty'") {
                    "1\nUInt8\n".to_string()
                } else {
                    "1\nUInt8\n1\n".to_string()
                }
            } else if statement.starts_with("ALTER") {
                String::new()
            } else if statement.contains("`nope`") {
                return (
                    StatusCode::BAD_REQUEST,
                    "Code: 47. DB::Exception: Missing columns: 'nope'".to_string(),
                );
            } else if statement.contains("LIMIT 0") {
                "name\tage\tcreated\nString\tUInt8\tDateTime\n".to_string()
            } else {
                PEOPLE.to_string()
            };
            (StatusCode::OK, body)
        })
    }

    fn config(server: &MockServer) -> ConnectionConfig {
        let mut config = ConnectionConfig::new("default");
        config.port = server.port();
        config.timeout_secs = 5;
        config
    }

    #[test]
    fn test_blocking_terminal_operations() {
        let server = server();
        let db = Database::new(config(&server)).unwrap();
        let people = db.objects(&person());

        let adults = people
            .filter(col("age").gte(18))
            .unwrap()
            .order_by(&["-created"])
            .unwrap()
            .limit(10);
        let fetched = adults.fetch().unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].get_as::<String>("name").unwrap(), "Ann");

        assert_eq!(people.count().unwrap(), 2);
        assert!(people.exists().unwrap());
        assert!(!people
            .filter(col("name").eq("empty"))
            .unwrap()
            .exists()
            .unwrap());
        assert_eq!(
            people.first().unwrap().unwrap().get_as::<u8>("age").unwrap(),
            30
        );
        assert!(people.limit(0).fetch().unwrap().is_empty());

        let page = people.paginate(1, 5).unwrap();
        assert_eq!(page.number_of_objects, 2);
        assert_eq!(page.pages_total, 1);
        assert_eq!(page.objects.len(), 2);
        assert!(people.paginate(2, 5).is_err());

        people.filter(col("age").lt(18)).unwrap().delete().unwrap();

        let statements = server.statements();
        assert_eq!(
            statements[0],
            "SELECT `name`, `age`, `created` FROM `person` WHERE `age` >= 18 \
             ORDER BY `created` DESC LIMIT 10"
        );
        assert!(statements.contains(
            &"SELECT 1 FROM `person` WHERE `name` = 'empty' LIMIT 1".to_string()
        ));
        assert_eq!(
            statements.last().unwrap(),
            "ALTER TABLE `person` DELETE WHERE `age` < 18"
        );
    }

    #[test]
    fn test_aggregates_need_rows() {
        let server = server();
        let db = Database::new(config(&server)).unwrap();
        let grouped = db
            .objects(&person())
            .aggregate(&[("n", F::count())])
            .unwrap();
        assert!(matches!(grouped.fetch(), Err(OrmError::Build(_))));
        // Nothing was sent
        assert!(server.statements().is_empty());
    }

    #[test]
    fn test_server_error_carries_statement() {
        let server = server();
        let db = Database::new(config(&server)).unwrap();
        let nope = ModelDescriptor::builder("person")
            .field(Field::new("nope", FieldType::String))
            .build()
            .unwrap();
        let err = db.objects(&nope).fetch().unwrap_err();
        match err {
            OrmError::Server {
                code, statement, ..
            } => {
                assert_eq!(code, 47);
                assert_eq!(statement, "SELECT `nope` FROM `person`");
            }
            other => panic!("expected server error, got {:?}", other),
        }
    }

    #[test]
    fn test_sync_async_parity() {
        let sync_server = server();
        let async_server = server();

        let build = |qs: &crate::query::QuerySet<()>| {
            qs.filter(col("age").gte(18))
                .unwrap()
                .exclude(col("name").like("B%"))
                .unwrap()
                .order_by(&["name"])
                .unwrap()
                .slice(0..10)
                .unwrap()
        };
        let template = build(&crate::query::QuerySet::new(&person(), ()));

        let db = Database::new(config(&sync_server)).unwrap();
        let sync_qs = template.with_connection(db);
        let sync_people: Vec<String> = sync_qs
            .fetch()
            .unwrap()
            .iter()
            .map(|p| p.get_as::<String>("name").unwrap())
            .collect();
        let sync_count = sync_qs.count().unwrap();

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (async_people, async_count) = runtime.block_on(async {
            let db = AsyncDatabase::new(config(&async_server)).unwrap();
            let async_qs = template.with_connection(db);
            let people: Vec<String> = async_qs
                .fetch()
                .await
                .unwrap()
                .iter()
                .map(|p| p.get_as::<String>("name").unwrap())
                .collect();
            (people, async_qs.count().await.unwrap())
        });

        assert_eq!(sync_people, async_people);
        assert_eq!(sync_count, async_count);
        assert_eq!(sync_server.statements(), async_server.statements());
    }

    #[tokio::test]
    async fn test_async_terminal_operations() {
        let server = server();
        let db = AsyncDatabase::new(config(&server)).unwrap();
        let people = db.objects(&person());

        assert_eq!(people.fetch().await.unwrap().len(), 2);
        assert_eq!(people.count().await.unwrap(), 2);
        assert!(!people
            .filter(col("name").eq("empty"))
            .unwrap()
            .exists()
            .await
            .unwrap());
        assert!(people.first().await.unwrap().is_some());

        let mut rows = people
            .aggregate(&[("name", F::any(col("name")))])
            .unwrap()
            .rows()
            .await
            .unwrap();
        assert!(rows.next().await.is_some());
        rows.cancel();
        assert!(rows.next().await.is_none());

        let page = people.paginate(1, 1).await.unwrap();
        assert_eq!(page.pages_total, 2);
        people.delete().await.unwrap();
        assert_eq!(
            server.statements().last().unwrap(),
            "ALTER TABLE `person` DELETE WHERE 1"
        );
    }
}
