//! DDL and INSERT statements

use std::sync::Arc;

use crate::engines::DatabaseEngine;
use crate::error::{OrmError, OrmResult};
use crate::fields::quote_ident;
use crate::model::{Instance, ModelDescriptor};

use super::render::Statement;

/// `CREATE TABLE IF NOT EXISTS` for a model
///
/// `db_name` is only used by engines that reference other tables
/// (`Buffer`).
pub fn create_table_sql(model: &ModelDescriptor, db_name: &str) -> OrmResult<Statement> {
    let engine = model.engine().ok_or_else(|| {
        OrmError::build(format!(
            "model `{}` has no engine; cannot create its table",
            model.table_name()
        ))
    })?;

    let columns = model
        .fields()
        .iter()
        .map(|f| Ok(format!("{} {}", quote_ident(f.column()), f.get_sql(true)?)))
        .collect::<OrmResult<Vec<_>>>()?;

    Ok(Statement::command(format!(
        "CREATE TABLE IF NOT EXISTS {} ({}) ENGINE = {}",
        quote_ident(model.table_name()),
        columns.join(", "),
        engine.create_table_sql(db_name)?
    )))
}

pub fn drop_table_sql(model: &ModelDescriptor) -> Statement {
    Statement::command(format!(
        "DROP TABLE IF EXISTS {}",
        quote_ident(model.table_name())
    ))
}

/// `EXISTS TABLE`, answered with a single `0`/`1` row
pub fn exists_table_sql(model: &ModelDescriptor) -> Statement {
    Statement::query(format!("EXISTS TABLE {}", quote_ident(model.table_name())))
}

pub fn create_database_sql(db_name: &str, engine: Option<&DatabaseEngine>) -> Statement {
    let mut sql = format!("CREATE DATABASE IF NOT EXISTS {}", quote_ident(db_name));
    if let Some(engine) = engine {
        sql.push_str(&format!(" ENGINE = {}", engine.create_database_sql()));
    }
    Statement::command(sql)
}

pub fn drop_database_sql(db_name: &str) -> Statement {
    Statement::command(format!("DROP DATABASE IF EXISTS {}", quote_ident(db_name)))
}

/// `INSERT INTO ... VALUES` for instances of one model
///
/// Readonly fields (alias, materialized) are left out of the column list.
pub fn insert_sql(model: &Arc<ModelDescriptor>, instances: &[Instance]) -> OrmResult<Statement> {
    if model.is_readonly() {
        return Err(OrmError::build(format!(
            "cannot insert into read-only model `{}`",
            model.table_name()
        )));
    }
    if instances.is_empty() {
        return Err(OrmError::build("insert needs at least one instance"));
    }

    let columns: Vec<String> = model
        .insertable_fields()
        .map(|f| quote_ident(f.column()))
        .collect();

    let mut rows = Vec::with_capacity(instances.len());
    for instance in instances {
        if !Arc::ptr_eq(instance.model(), model) && instance.model().as_ref() != model.as_ref() {
            return Err(OrmError::build(format!(
                "cannot insert a `{}` instance into `{}`",
                instance.model().table_name(),
                model.table_name()
            )));
        }
        rows.push(format!("({})", instance.insert_literals()?.join(", ")));
    }

    Ok(Statement::command(format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(model.table_name()),
        columns.join(", "),
        rows.join(", ")
    )))
}
