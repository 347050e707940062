//! Immutable, lazy querysets
//!
//! Every transformation returns a new [`QuerySet`]; the receiver is never
//! modified, so a queryset can be shared and extended in several directions.
//! Nothing touches the database until a terminal operation runs.

use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use crate::error::{OrmError, OrmResult};
use crate::expr::{col, Expr};
use crate::model::ModelDescriptor;

/// `LIMIT` / `OFFSET` window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    pub limit: Option<u64>,
    pub offset: u64,
}

impl Window {
    /// Narrow this window by a range relative to its start
    ///
    /// The result never extends past the current window.
    fn narrow(self, start: u64, end: Option<u64>) -> Self {
        let offset = self.offset.saturating_add(start);
        let limit = match (self.limit, end) {
            (None, None) => None,
            (None, Some(end)) => Some(end - start),
            (Some(limit), None) => Some(limit.saturating_sub(start)),
            (Some(limit), Some(end)) => Some(end.min(limit).saturating_sub(start)),
        };
        Self { limit, offset }
    }
}

/// Kind of `JOIN`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    AnyInner,
    AnyLeft,
}

impl JoinKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
            Self::AnyInner => "ANY INNER JOIN",
            Self::AnyLeft => "ANY LEFT JOIN",
        }
    }
}

/// A `JOIN ... USING (...)` clause
#[derive(Debug, Clone)]
pub struct Join {
    pub kind: JoinKind,
    pub model: Arc<ModelDescriptor>,
    pub using: Vec<String>,
}

/// A lazily evaluated query over one model
///
/// `C` is the connection handle terminal operations run against. Pure
/// building and rendering works with any `C`, including `()`.
#[derive(Debug, Clone)]
pub struct QuerySet<C> {
    pub(super) model: Arc<ModelDescriptor>,
    pub(super) conn: C,
    /// Column-resolved conditions, ANDed in order
    pub(super) filters: Vec<Expr>,
    /// `(expression, descending)`
    pub(super) order_by: Vec<(Expr, bool)>,
    pub(super) group_by: Vec<Expr>,
    pub(super) window: Window,
    pub(super) distinct: bool,
    pub(super) final_: bool,
    /// Attribute names to select; `None` selects every field
    pub(super) only: Option<Vec<String>>,
    /// `(alias, expression)` selections; non-empty switches to tuple results
    pub(super) aggregates: Vec<(String, Expr)>,
    pub(super) joins: Vec<Join>,
}

impl<C> QuerySet<C> {
    pub fn model(&self) -> &Arc<ModelDescriptor> {
        &self.model
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn window(&self) -> Window {
        self.window
    }

    /// Whether results are tuples rather than model instances
    pub fn is_aggregate(&self) -> bool {
        !self.aggregates.is_empty()
    }
}

impl<C: Clone> QuerySet<C> {
    /// Queryset selecting every row of `model`
    pub fn new(model: &Arc<ModelDescriptor>, conn: C) -> Self {
        Self {
            model: Arc::clone(model),
            conn,
            filters: Vec::new(),
            order_by: Vec::new(),
            group_by: Vec::new(),
            window: Window::default(),
            distinct: false,
            final_: false,
            only: None,
            aggregates: Vec::new(),
            joins: Vec::new(),
        }
    }

    /// Keep rows matching `condition`, ANDed with existing filters
    pub fn filter(&self, condition: impl Into<Expr>) -> OrmResult<Self> {
        let condition = self.resolve_expr(condition.into(), false)?;
        let mut next = self.clone();
        next.filters.push(condition);
        Ok(next)
    }

    /// Drop rows matching `condition`
    pub fn exclude(&self, condition: impl Into<Expr>) -> OrmResult<Self> {
        self.filter(!condition.into())
    }

    /// Append ordering terms; a leading `-` sorts descending
    pub fn order_by(&self, fields: &[&str]) -> OrmResult<Self> {
        let mut order_by = self.order_by.clone();
        for term in fields {
            let (name, desc) = match term.strip_prefix('-') {
                Some(name) => (name, true),
                None => (*term, false),
            };
            order_by.push((self.resolve_expr(col(name), true)?, desc));
        }
        let mut next = self.clone();
        next.order_by = order_by;
        Ok(next)
    }

    /// Append grouping terms
    pub fn group_by(&self, fields: &[&str]) -> OrmResult<Self> {
        let mut group_by = self.group_by.clone();
        for name in fields {
            group_by.push(self.resolve_expr(col(*name), true)?);
        }
        let mut next = self.clone();
        next.group_by = group_by;
        Ok(next)
    }

    /// Select only these fields; the rest take their defaults
    pub fn only(&self, fields: &[&str]) -> OrmResult<Self> {
        if fields.is_empty() {
            return Err(OrmError::build("only() needs at least one field"));
        }
        for name in fields {
            if self.model.field(name).is_none() {
                return Err(self.unknown_field(name));
            }
        }
        let mut next = self.clone();
        next.only = Some(fields.iter().map(|s| s.to_string()).collect());
        Ok(next)
    }

    /// Select named expressions instead of model fields
    ///
    /// Results become tuples. Aliases can be used by later `order_by` and
    /// `group_by` calls.
    pub fn aggregate(&self, selections: &[(&str, Expr)]) -> OrmResult<Self> {
        if selections.is_empty() {
            return Err(OrmError::build("aggregate() needs at least one expression"));
        }
        let mut aggregates: Vec<(String, Expr)> = Vec::with_capacity(selections.len());
        for (alias, expr) in selections {
            if alias.is_empty() {
                return Err(OrmError::build("aggregate alias must not be empty"));
            }
            if aggregates.iter().any(|(a, _)| a == alias) {
                return Err(OrmError::build(format!(
                    "aggregate alias `{}` used twice",
                    alias
                )));
            }
            aggregates.push((alias.to_string(), self.resolve_expr(expr.clone(), false)?));
        }
        let mut next = self.clone();
        next.aggregates = aggregates;
        Ok(next)
    }

    /// Join another model on shared columns
    pub fn join(
        &self,
        kind: JoinKind,
        model: &Arc<ModelDescriptor>,
        using: &[&str],
    ) -> OrmResult<Self> {
        if using.is_empty() {
            return Err(OrmError::build("join needs at least one USING column"));
        }
        for column in using {
            if self.model.column_index(column).is_none() || model.column_index(column).is_none() {
                return Err(OrmError::build(format!(
                    "join column `{}` must exist in both `{}` and `{}`",
                    column,
                    self.model.table_name(),
                    model.table_name()
                )));
            }
        }
        let mut next = self.clone();
        next.joins.push(Join {
            kind,
            model: Arc::clone(model),
            using: using.iter().map(|s| s.to_string()).collect(),
        });
        Ok(next)
    }

    /// Return at most `n` rows, replacing any window
    pub fn limit(&self, n: u64) -> Self {
        let mut next = self.clone();
        next.window = Window {
            limit: Some(n),
            offset: 0,
        };
        next
    }

    /// Return at most `n` rows after skipping `offset`, replacing any window
    pub fn limit_with_offset(&self, n: u64, offset: u64) -> Self {
        let mut next = self.clone();
        next.window = Window {
            limit: Some(n),
            offset,
        };
        next
    }

    /// Narrow the current window by a range relative to it
    ///
    /// `qs.slice(10..20)` is rows 10 to 19 of `qs`; slicing again narrows
    /// within that, so `qs.slice(10..20)?.slice(0..5)` is rows 10 to 14.
    pub fn slice(&self, range: impl RangeBounds<u64>) -> OrmResult<Self> {
        let start = match range.start_bound() {
            Bound::Included(s) => *s,
            Bound::Excluded(s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(e) => Some(e.saturating_add(1)),
            Bound::Excluded(e) => Some(*e),
            Bound::Unbounded => None,
        };
        if let Some(end) = end {
            if end < start {
                return Err(OrmError::build(format!(
                    "slice end {} is before start {}",
                    end, start
                )));
            }
        }
        let mut next = self.clone();
        next.window = self.window.narrow(start, end);
        Ok(next)
    }

    /// Remove duplicate rows
    pub fn distinct(&self) -> Self {
        let mut next = self.clone();
        next.distinct = true;
        next
    }

    /// Read fully merged data (`FINAL`)
    ///
    /// Only the collapsing, summing and replacing MergeTree variants support it.
    pub fn final_(&self) -> OrmResult<Self> {
        let supported = self
            .model
            .engine()
            .map(|engine| engine.supports_final())
            .unwrap_or(false);
        if !supported {
            return Err(OrmError::build(format!(
                "FINAL needs a collapsing, summing or replacing MergeTree engine; `{}` has none",
                self.model.table_name()
            )));
        }
        let mut next = self.clone();
        next.final_ = true;
        Ok(next)
    }

    /// Rebind to another connection handle
    pub fn with_connection<D: Clone>(&self, conn: D) -> QuerySet<D> {
        QuerySet {
            model: Arc::clone(&self.model),
            conn,
            filters: self.filters.clone(),
            order_by: self.order_by.clone(),
            group_by: self.group_by.clone(),
            window: self.window,
            distinct: self.distinct,
            final_: self.final_,
            only: self.only.clone(),
            aggregates: self.aggregates.clone(),
            joins: self.joins.clone(),
        }
    }

    /// Map a field name to the column it is stored in
    fn resolve(&self, name: &str, allow_aliases: bool) -> OrmResult<String> {
        if let Some(field) = self.model.field(name) {
            return Ok(field.column().to_string());
        }
        for join in &self.joins {
            if let Some(field) = join.model.field(name) {
                return Ok(field.column().to_string());
            }
        }
        if allow_aliases && self.aggregates.iter().any(|(alias, _)| alias == name) {
            return Ok(name.to_string());
        }
        Err(self.unknown_field(name))
    }

    fn resolve_expr(&self, expr: Expr, allow_aliases: bool) -> OrmResult<Expr> {
        for name in expr.field_refs() {
            self.resolve(name, allow_aliases)?;
        }
        Ok(expr.map_fields(&|name| {
            self.resolve(name, allow_aliases)
                .unwrap_or_else(|_| name.to_string())
        }))
    }

    fn unknown_field(&self, name: &str) -> OrmError {
        OrmError::build(format!(
            "model `{}` has no field `{}`",
            self.model.table_name(),
            name
        ))
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub objects: Vec<T>,
    /// Rows matched by the whole queryset
    pub number_of_objects: u64,
    /// At least 1, even for empty results
    pub pages_total: u64,
    /// 1-based page number
    pub number: u64,
    pub page_size: u64,
}

/// Validate a page request and compute its window and page count
pub(super) fn page_window(total: u64, page: u64, page_size: u64) -> OrmResult<(Window, u64)> {
    if page_size == 0 {
        return Err(OrmError::build("page_size must be positive"));
    }
    if page == 0 {
        return Err(OrmError::build("page numbers start at 1"));
    }
    let pages_total = total.div_ceil(page_size).max(1);
    if page > pages_total {
        return Err(OrmError::build(format!(
            "page {} is out of range (1..={})",
            page, pages_total
        )));
    }
    Ok((
        Window {
            limit: Some(page_size),
            offset: (page - 1) * page_size,
        },
        pages_total,
    ))
}
