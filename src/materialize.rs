//! Result materializer
//!
//! Turns raw cells from a row cursor into model [`Instance`]s or untyped
//! [`Row`]s. Model results map each response column to a field once per
//! statement, before any row is read; tuple results take their codecs from
//! the response's type header.

use std::sync::Arc;

use futures_util::stream::{self, Stream};

use crate::error::{OrmError, OrmResult};
use crate::fields::{FieldType, FromValue, Value};
use crate::model::{Instance, ModelDescriptor};
use crate::transport::{AsyncRowCursor, ResultHeader, RowCursor};

/// An untyped result row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Row {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Value of a column by name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// Value of a column converted to a Rust type
    pub fn get_as<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| OrmError::decode(column, None, "no such column in result"))?;
        T::from_value(value).ok_or_else(|| {
            OrmError::decode(
                column,
                None,
                format!(
                    "cannot convert {} value to {}",
                    value.kind(),
                    std::any::type_name::<T>()
                ),
            )
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Converts one row of raw cells into a typed result
pub trait RowDecoder {
    type Output;

    fn decode(&self, cells: Vec<Option<String>>) -> OrmResult<Self::Output>;
}

/// Decodes rows into instances of one model
#[derive(Debug, Clone)]
pub struct ModelDecoder {
    model: Arc<ModelDescriptor>,
    /// Field index for each response column
    mapping: Vec<usize>,
}

impl ModelDecoder {
    /// Map response columns to fields; any unknown column fails here
    pub fn new(model: &Arc<ModelDescriptor>, header: &ResultHeader) -> OrmResult<Self> {
        let mapping = header
            .names
            .iter()
            .map(|name| {
                model.column_index(name).ok_or_else(|| {
                    OrmError::decode(
                        name.as_str(),
                        None,
                        format!("model `{}` has no such column", model.table_name()),
                    )
                })
            })
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(Self {
            model: Arc::clone(model),
            mapping,
        })
    }
}

impl RowDecoder for ModelDecoder {
    type Output = Instance;

    fn decode(&self, cells: Vec<Option<String>>) -> OrmResult<Instance> {
        let fields = self.model.fields();
        let mut values: Vec<Value> = fields.iter().map(|f| f.default_value()).collect();
        for (cell, &index) in cells.iter().zip(&self.mapping) {
            values[index] = fields[index].to_value(cell.as_deref())?;
        }
        Ok(Instance::from_values(Arc::clone(&self.model), values))
    }
}

/// Decodes rows using the types announced by the server
#[derive(Debug, Clone)]
pub struct TupleDecoder {
    columns: Arc<Vec<String>>,
    types: Vec<FieldType>,
}

impl TupleDecoder {
    pub fn new(header: &ResultHeader) -> Self {
        Self {
            columns: Arc::new(header.names.clone()),
            types: header.types.clone(),
        }
    }
}

impl RowDecoder for TupleDecoder {
    type Output = Row;

    fn decode(&self, cells: Vec<Option<String>>) -> OrmResult<Row> {
        let values = cells
            .iter()
            .zip(&self.types)
            .zip(self.columns.iter())
            .map(|((cell, ty), column)| {
                ty.decode_cell(cell.as_deref())
                    .map_err(|message| OrmError::decode(column.as_str(), cell.as_deref(), message))
            })
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(Row {
            columns: Arc::clone(&self.columns),
            values,
        })
    }
}

/// Lazy blocking result sequence
///
/// Single-use and forward-only. The first error ends the sequence.
#[derive(Debug)]
pub struct Rows<D> {
    cursor: Option<RowCursor>,
    decoder: D,
}

/// Model instances from a blocking query
pub type ModelRows = Rows<ModelDecoder>;
/// Untyped rows from a blocking query
pub type TupleRows = Rows<TupleDecoder>;

impl Rows<ModelDecoder> {
    pub fn for_model(cursor: RowCursor, model: &Arc<ModelDescriptor>) -> OrmResult<Self> {
        let header = cursor.header().cloned().unwrap_or_default();
        let decoder =
            ModelDecoder::new(model, &header).map_err(|e| e.with_statement(cursor.statement()))?;
        Ok(Self {
            cursor: Some(cursor),
            decoder,
        })
    }
}

impl Rows<TupleDecoder> {
    pub fn tuples(cursor: RowCursor) -> Self {
        let header = cursor.header().cloned().unwrap_or_default();
        Self {
            decoder: TupleDecoder::new(&header),
            cursor: Some(cursor),
        }
    }
}

impl<D: RowDecoder> Iterator for Rows<D> {
    type Item = OrmResult<D::Output>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;
        let result = match cursor.next() {
            Some(Ok(cells)) => self
                .decoder
                .decode(cells)
                .map_err(|e| e.with_statement(cursor.statement())),
            Some(Err(e)) => Err(e),
            None => {
                self.cursor = None;
                return None;
            }
        };
        if result.is_err() {
            self.cursor = None;
        }
        Some(result)
    }
}

/// Lazy async result sequence
///
/// Dropping it, or calling [`AsyncRows::cancel`], closes the response and
/// releases the connection.
#[derive(Debug)]
pub struct AsyncRows<D> {
    cursor: Option<AsyncRowCursor>,
    decoder: D,
}

/// Model instances from an async query
pub type AsyncModelRows = AsyncRows<ModelDecoder>;
/// Untyped rows from an async query
pub type AsyncTupleRows = AsyncRows<TupleDecoder>;

impl AsyncRows<ModelDecoder> {
    pub fn for_model(cursor: AsyncRowCursor, model: &Arc<ModelDescriptor>) -> OrmResult<Self> {
        let header = cursor.header().cloned().unwrap_or_default();
        let decoder =
            ModelDecoder::new(model, &header).map_err(|e| e.with_statement(cursor.statement()))?;
        Ok(Self {
            cursor: Some(cursor),
            decoder,
        })
    }
}

impl AsyncRows<TupleDecoder> {
    pub fn tuples(cursor: AsyncRowCursor) -> Self {
        let header = cursor.header().cloned().unwrap_or_default();
        Self {
            decoder: TupleDecoder::new(&header),
            cursor: Some(cursor),
        }
    }
}

impl<D: RowDecoder> AsyncRows<D> {
    /// Next result, `None` once exhausted or after an error
    pub async fn next(&mut self) -> Option<OrmResult<D::Output>> {
        let cursor = self.cursor.as_mut()?;
        let result = match cursor.next_row().await {
            Some(Ok(cells)) => self
                .decoder
                .decode(cells)
                .map_err(|e| e.with_statement(cursor.statement())),
            Some(Err(e)) => Err(e),
            None => {
                self.cursor = None;
                return None;
            }
        };
        if result.is_err() {
            self.cancel();
        }
        Some(result)
    }

    /// Read every remaining result
    pub async fn try_collect(mut self) -> OrmResult<Vec<D::Output>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await {
            out.push(item?);
        }
        Ok(out)
    }

    /// Stop reading and release the connection
    pub fn cancel(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.cancel();
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = OrmResult<D::Output>> + Send
    where
        D: Send + 'static,
        D::Output: Send,
    {
        stream::unfold(self, |mut rows| async move {
            rows.next().await.map(|item| (item, rows))
        })
    }
}
