//! Model descriptors and instances
//!
//! A [`ModelDescriptor`] is the static schema of a table: its name, its
//! ordered fields and its engine. Descriptors are built once and shared
//! behind an `Arc` by every queryset and instance of the model.
//!
//! ```rust,ignore
//! let person = ModelDescriptor::builder("person")
//!     .field(Field::new("name", FieldType::String))
//!     .field(Field::new("age", FieldType::UInt8))
//!     .field(Field::new("created", FieldType::DateTime { timezone: None }))
//!     .engine(MergeTree::new(&["created"]).date_col("created"))
//!     .build()?;
//!
//! let mut alice = Instance::new(&person);
//! alice.set("name", "Alice")?;
//! let age: u8 = alice.get_as("age")?;
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use crate::engines::TableEngine;
use crate::error::{OrmError, OrmResult};
use crate::fields::{Field, FromValue, Value};

/// Static schema of a table
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    table: String,
    fields: Vec<Field>,
    engine: Option<TableEngine>,
    readonly: bool,
}

impl ModelDescriptor {
    /// Start describing the model stored in `table`
    pub fn builder(table: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            table: table.into(),
            fields: Vec::new(),
            engine: None,
            readonly: false,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field by attribute name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position of a field by attribute name
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Position of a field by column name
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.column() == column)
    }

    pub fn engine(&self) -> Option<&TableEngine> {
        self.engine.as_ref()
    }

    /// Readonly models reject inserts and deletes
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Fields written by `INSERT`
    pub fn insertable_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.is_readonly())
    }
}

/// Builder for [`ModelDescriptor`]
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    table: String,
    fields: Vec<Field>,
    engine: Option<TableEngine>,
    readonly: bool,
}

impl ModelBuilder {
    /// Append a field
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Set the table engine
    pub fn engine(mut self, engine: impl Into<TableEngine>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    /// Mark the model as read-only (views, system tables, Merge tables)
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Validate and freeze the descriptor
    pub fn build(self) -> OrmResult<Arc<ModelDescriptor>> {
        if self.table.is_empty() {
            return Err(OrmError::build("model table name must not be empty"));
        }
        if self.fields.is_empty() {
            return Err(OrmError::build(format!(
                "model `{}` has no fields",
                self.table
            )));
        }

        let mut names = HashSet::new();
        let mut columns = HashSet::new();
        for field in &self.fields {
            field.check()?;
            if !names.insert(field.name.as_str()) {
                return Err(OrmError::build(format!(
                    "model `{}` declares field `{}` twice",
                    self.table, field.name
                )));
            }
            if !columns.insert(field.column()) {
                return Err(OrmError::build(format!(
                    "model `{}` maps two fields to column `{}`",
                    self.table,
                    field.column()
                )));
            }
        }

        let readonly = self.readonly
            || self
                .engine
                .as_ref()
                .map(|e| !e.is_writable())
                .unwrap_or(false);

        Ok(Arc::new(ModelDescriptor {
            table: self.table,
            fields: self.fields,
            engine: self.engine,
            readonly,
        }))
    }
}

/// One row of a model
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    model: Arc<ModelDescriptor>,
    values: Vec<Value>,
}

impl Instance {
    /// New instance with every field at its default
    pub fn new(model: &Arc<ModelDescriptor>) -> Self {
        Self {
            model: Arc::clone(model),
            values: model.fields().iter().map(Field::default_value).collect(),
        }
    }

    /// Build from already-decoded values in field order
    pub(crate) fn from_values(model: Arc<ModelDescriptor>, values: Vec<Value>) -> Self {
        debug_assert_eq!(model.fields().len(), values.len());
        Self { model, values }
    }

    pub fn model(&self) -> &Arc<ModelDescriptor> {
        &self.model
    }

    /// Set a field, validating the value against the field type
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> OrmResult<()> {
        let index = self.index_of(name)?;
        let coerced = self.model.fields()[index].coerce(&value.into())?;
        self.values[index] = coerced;
        Ok(())
    }

    /// Builder-style [`Instance::set`]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> OrmResult<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Raw value of a field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.model.field_index(name).map(|i| &self.values[i])
    }

    /// Value of a field converted to a Rust type
    pub fn get_as<T: FromValue>(&self, name: &str) -> OrmResult<T> {
        let index = self.index_of(name)?;
        let value = &self.values[index];
        T::from_value(value).ok_or_else(|| {
            OrmError::decode(
                self.model.fields()[index].column(),
                None,
                format!(
                    "cannot convert {} value to {}",
                    value.kind(),
                    std::any::type_name::<T>()
                ),
            )
        })
    }

    /// Values in field order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// `(field, value)` pairs in field order
    pub fn iter(&self) -> impl Iterator<Item = (&Field, &Value)> {
        self.model.fields().iter().zip(self.values.iter())
    }

    /// SQL literals for the insertable fields, in field order
    pub fn insert_literals(&self) -> OrmResult<Vec<String>> {
        self.iter()
            .filter(|(field, _)| !field.is_readonly())
            .map(|(field, value)| field.to_db(value))
            .collect()
    }

    fn index_of(&self, name: &str) -> OrmResult<usize> {
        self.model.field_index(name).ok_or_else(|| {
            OrmError::build(format!(
                "model `{}` has no field `{}`",
                self.model.table_name(),
                name
            ))
        })
    }
}
