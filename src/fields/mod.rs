//! Field codecs
//!
//! - **Value**: native cell values and SQL literal rendering
//! - **Types**: column types, validation and wire decoding
//! - **Literal**: parser for composite wire values (arrays, tuples, maps)
//! - **Escape**: string, identifier and TSV escaping
//!
//! A [`Field`] ties a column name to a [`FieldType`] plus the DDL
//! attributes a column can carry (`DEFAULT`, `ALIAS`, `MATERIALIZED`,
//! `CODEC`).

mod escape;
mod literal;
mod types;
mod value;

pub use escape::{escape, quote, quote_ident, split_tsv_line, unescape_tsv};
pub use literal::{parse_literal, Literal};
pub use types::{max_date, min_date, parse_type_name, parse_type_name_lenient, FieldType};
pub use value::{FromValue, Value};

use crate::error::{OrmError, OrmResult};
use crate::expr::Expr;

/// Default value of a column
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    /// A constant, also used for unset attributes of new instances
    Value(Value),
    /// A server-side expression (`DEFAULT now()`)
    Expr(Expr),
}

/// A column in a model
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Attribute name, used in expressions and instance access
    pub name: String,
    /// Column type
    pub field_type: FieldType,
    /// Explicit default
    pub default: Option<FieldDefault>,
    /// `ALIAS` expression; the column is computed on read
    pub alias: Option<Expr>,
    /// `MATERIALIZED` expression; the column is computed on insert
    pub materialized: Option<Expr>,
    /// Compression codec list, e.g. `Delta, ZSTD(1)`
    pub codec: Option<String>,
    /// Column name in the table when it differs from `name`
    pub db_column: Option<String>,
    readonly: bool,
}

impl Field {
    /// Create a field with no DDL attributes
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: None,
            alias: None,
            materialized: None,
            codec: None,
            db_column: None,
            readonly: false,
        }
    }

    /// Set a constant default
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    /// Set a server-side default expression
    pub fn default_expr(mut self, expr: Expr) -> Self {
        self.default = Some(FieldDefault::Expr(expr));
        self
    }

    /// Make this an `ALIAS` column
    pub fn alias(mut self, expr: Expr) -> Self {
        self.alias = Some(expr);
        self
    }

    /// Make this a `MATERIALIZED` column
    pub fn materialized(mut self, expr: Expr) -> Self {
        self.materialized = Some(expr);
        self
    }

    /// Set the compression codec
    pub fn codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    /// Store the field under a different column name
    pub fn db_column(mut self, column: impl Into<String>) -> Self {
        self.db_column = Some(column.into());
        self
    }

    /// Never write this field on insert
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Column name in the table
    pub fn column(&self) -> &str {
        self.db_column.as_deref().unwrap_or(&self.name)
    }

    /// Whether inserts skip this field
    pub fn is_readonly(&self) -> bool {
        self.readonly || self.alias.is_some() || self.materialized.is_some()
    }

    /// DDL type name
    pub fn db_type(&self) -> String {
        self.field_type.db_type()
    }

    /// Check the field definition is consistent
    pub fn check(&self) -> OrmResult<()> {
        if self.name.is_empty() {
            return Err(OrmError::build("field names must not be empty"));
        }
        if self.db_column.as_deref() == Some("") {
            return Err(OrmError::build(format!(
                "field `{}` has an empty db_column",
                self.name
            )));
        }
        if self.codec.as_deref() == Some("") {
            return Err(OrmError::build(format!(
                "field `{}` has an empty codec",
                self.name
            )));
        }
        let given = [
            self.default.is_some(),
            self.alias.is_some(),
            self.materialized.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if given > 1 {
            return Err(OrmError::build(format!(
                "field `{}`: only one of default, alias and materialized can be given",
                self.name
            )));
        }
        self.field_type
            .check()
            .map_err(|e| OrmError::build(format!("field `{}`: {}", self.name, e)))?;
        if let Some(FieldDefault::Value(v)) = &self.default {
            self.to_db(v)?;
        }
        Ok(())
    }

    /// Value an instance starts with for this field
    pub fn default_value(&self) -> Value {
        match &self.default {
            Some(FieldDefault::Value(v)) => v.clone(),
            _ => self.field_type.default_value(),
        }
    }

    /// Render a value as a SQL literal of this field's type
    pub fn to_db(&self, value: &Value) -> OrmResult<String> {
        self.field_type
            .to_db(value)
            .map_err(|e| OrmError::build(format!("field `{}`: {}", self.name, e)))
    }

    /// Validate and convert a value to this field's type
    pub fn coerce(&self, value: &Value) -> OrmResult<Value> {
        self.field_type
            .coerce(value)
            .map_err(|e| OrmError::build(format!("field `{}`: {}", self.name, e)))
    }

    /// Decode a wire cell; `None` is SQL NULL
    pub fn to_value(&self, cell: Option<&str>) -> OrmResult<Value> {
        self.field_type
            .decode_cell(cell)
            .map_err(|e| OrmError::decode(self.column(), cell, e))
    }

    /// Column definition for `CREATE TABLE` (without the column name)
    ///
    /// With `with_default_expression` false only the type is emitted.
    pub fn get_sql(&self, with_default_expression: bool) -> OrmResult<String> {
        let mut sql = self.db_type();
        if !with_default_expression {
            return Ok(sql);
        }
        if let Some(alias) = &self.alias {
            sql.push_str(&format!(" ALIAS {}", alias.render()));
        } else if let Some(materialized) = &self.materialized {
            sql.push_str(&format!(" MATERIALIZED {}", materialized.render()));
        } else if let Some(default) = &self.default {
            let rendered = match default {
                FieldDefault::Value(v) => self.to_db(v)?,
                FieldDefault::Expr(e) => e.render(),
            };
            sql.push_str(&format!(" DEFAULT {}", rendered));
        }
        if let Some(codec) = &self.codec {
            if self.alias.is_none() {
                sql.push_str(&format!(" CODEC({})", codec));
            }
        }
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, F};

    #[test]
    fn test_plain_column_sql() {
        let field = Field::new("name", FieldType::String);
        assert_eq!(field.get_sql(true).unwrap(), "String");
        assert_eq!(field.column(), "name");
        assert!(!field.is_readonly());
    }

    #[test]
    fn test_column_attributes_sql() {
        let field = Field::new("score", FieldType::Int32).default(5).codec("Delta, ZSTD");
        assert_eq!(field.get_sql(true).unwrap(), "Int32 DEFAULT 5 CODEC(Delta, ZSTD)");
        assert_eq!(field.get_sql(false).unwrap(), "Int32");

        let field = Field::new("created", FieldType::DateTime { timezone: None })
            .default_expr(F::now());
        assert_eq!(field.get_sql(true).unwrap(), "DateTime DEFAULT now()");

        let field = Field::new("month", FieldType::UInt32)
            .materialized(F::to_yyyymm(col("created")));
        assert_eq!(
            field.get_sql(true).unwrap(),
            "UInt32 MATERIALIZED toYYYYMM(`created`)"
        );
        assert!(field.is_readonly());
    }

    #[test]
    fn test_alias_skips_codec() {
        let field = Field::new("upper_name", FieldType::String)
            .alias(F::upper(col("name")))
            .codec("ZSTD");
        assert_eq!(field.get_sql(true).unwrap(), "String ALIAS upper(`name`)");
        assert!(field.is_readonly());
    }

    #[test]
    fn test_check_rejects_conflicting_attributes() {
        let field = Field::new("x", FieldType::Int32)
            .default(1)
            .materialized(col("y"));
        assert!(matches!(field.check(), Err(OrmError::Build(_))));

        let field = Field::new("x", FieldType::UInt8).default(1000);
        assert!(field.check().is_err());

        assert!(Field::new("", FieldType::String).check().is_err());
    }

    #[test]
    fn test_db_column() {
        let field = Field::new("user_name", FieldType::String).db_column("userName");
        assert_eq!(field.column(), "userName");
    }

    #[test]
    fn test_to_value_reports_column() {
        let field = Field::new("age", FieldType::UInt8).db_column("age_years");
        let err = field.to_value(Some("old")).unwrap_err();
        match err {
            OrmError::Decode { column, value, .. } => {
                assert_eq!(column, "age_years");
                assert_eq!(value.as_deref(), Some("old"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_default_value() {
        assert_eq!(
            Field::new("n", FieldType::Int32).default_value(),
            Value::Int(0)
        );
        assert_eq!(
            Field::new("n", FieldType::Int32).default(7).default_value(),
            Value::Int(7)
        );
    }
}
