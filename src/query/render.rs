//! Statement renderer
//!
//! Turns a [`QuerySet`] into statement text. Rendering reads only the
//! queryset, so equal querysets always produce byte-identical statements.
//!
//! Clause order is fixed:
//!
//! ```text
//! SELECT [DISTINCT] cols FROM `table` [FINAL] [JOIN ...]
//! [WHERE cond] [GROUP BY ...] [ORDER BY ...] [LIMIT n [OFFSET m]]
//! ```

use crate::error::{OrmError, OrmResult};
use crate::expr::Expr;
use crate::fields::quote_ident;

use super::queryset::QuerySet;

/// Result format requested for statements that return rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    TabSeparatedWithNamesAndTypes,
}

impl WireFormat {
    pub fn name(self) -> &'static str {
        match self {
            Self::TabSeparatedWithNamesAndTypes => "TabSeparatedWithNamesAndTypes",
        }
    }
}

/// A rendered statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub text: String,
    /// `None` for statements without a result set (DDL, INSERT, ALTER)
    pub format: Option<WireFormat>,
}

impl Statement {
    /// A statement whose rows are read back
    pub fn query(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: Some(WireFormat::TabSeparatedWithNamesAndTypes),
        }
    }

    /// A statement run for its effect
    pub fn command(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: None,
        }
    }

    /// Request body sent to the server
    pub fn body(&self) -> String {
        match self.format {
            Some(format) => format!("{} FORMAT {}", self.text, format.name()),
            None => self.text.clone(),
        }
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Offset without a limit still needs a LIMIT clause
const UNBOUNDED_LIMIT: u64 = u64::MAX;

/// `SELECT ...` for the queryset
pub fn render_select<C>(qs: &QuerySet<C>) -> Statement {
    Statement::query(select_text(qs))
}

/// `SELECT count(*) ...` for the queryset
///
/// Windows, grouping, distinct and joins change what is counted, so
/// those querysets are counted through a subquery.
pub fn render_count<C>(qs: &QuerySet<C>) -> Statement {
    if needs_subquery(qs) {
        Statement::query(format!("SELECT count(*) FROM ({})", select_text(qs)))
    } else {
        Statement::query(format!(
            "SELECT count(*){}{}",
            from_clause(qs),
            where_clause(qs)
        ))
    }
}

/// `SELECT 1 ... LIMIT 1` for the queryset
pub fn render_exists<C>(qs: &QuerySet<C>) -> Statement {
    if needs_subquery(qs) {
        Statement::query(format!("SELECT 1 FROM ({}) LIMIT 1", select_text(qs)))
    } else {
        Statement::query(format!(
            "SELECT 1{}{} LIMIT 1",
            from_clause(qs),
            where_clause(qs)
        ))
    }
}

/// `ALTER TABLE ... DELETE WHERE ...` for the queryset's filters
pub fn render_delete<C>(qs: &QuerySet<C>) -> OrmResult<Statement> {
    let model = qs.model();
    if model.is_readonly() {
        return Err(OrmError::build(format!(
            "cannot delete from read-only model `{}`",
            model.table_name()
        )));
    }
    if qs.window.limit.is_some()
        || qs.window.offset > 0
        || qs.distinct
        || !qs.group_by.is_empty()
        || !qs.aggregates.is_empty()
        || !qs.joins.is_empty()
    {
        return Err(OrmError::build(
            "delete() only supports filtered querysets (no limits, grouping, aggregation or joins)",
        ));
    }
    let condition = conjunction(&qs.filters)
        .map(|c| c.render())
        .unwrap_or_else(|| "1".to_string());
    Ok(Statement::command(format!(
        "ALTER TABLE {} DELETE WHERE {}",
        quote_ident(model.table_name()),
        condition
    )))
}

fn needs_subquery<C>(qs: &QuerySet<C>) -> bool {
    qs.distinct
        || !qs.group_by.is_empty()
        || !qs.aggregates.is_empty()
        || !qs.joins.is_empty()
        || qs.window.limit.is_some()
        || qs.window.offset > 0
}

fn select_text<C>(qs: &QuerySet<C>) -> String {
    let mut sql = String::from("SELECT ");
    if qs.distinct {
        sql.push_str("DISTINCT ");
    }
    sql.push_str(&select_list(qs));
    sql.push_str(&from_clause(qs));
    sql.push_str(&where_clause(qs));

    if !qs.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&join_exprs(&qs.group_by));
    }

    if !qs.order_by.is_empty() {
        let terms: Vec<String> = qs
            .order_by
            .iter()
            .map(|(expr, desc)| {
                if *desc {
                    format!("{} DESC", expr.render())
                } else {
                    expr.render()
                }
            })
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms.join(", "));
    }

    match (qs.window.limit, qs.window.offset) {
        (None, 0) => {}
        (Some(limit), 0) => sql.push_str(&format!(" LIMIT {}", limit)),
        (limit, offset) => sql.push_str(&format!(
            " LIMIT {} OFFSET {}",
            limit.unwrap_or(UNBOUNDED_LIMIT),
            offset
        )),
    }
    sql
}

fn select_list<C>(qs: &QuerySet<C>) -> String {
    if !qs.aggregates.is_empty() {
        return qs
            .aggregates
            .iter()
            .map(|(alias, expr)| format!("{} AS {}", expr.render(), quote_ident(alias)))
            .collect::<Vec<_>>()
            .join(", ");
    }

    let model = qs.model();
    let qualify = !qs.joins.is_empty();
    model
        .fields()
        .iter()
        .filter(|f| match &qs.only {
            Some(only) => only.iter().any(|name| name == &f.name),
            None => true,
        })
        .map(|f| {
            let column = quote_ident(f.column());
            if qualify {
                format!("{}.{} AS {}", quote_ident(model.table_name()), column, column)
            } else {
                column
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn from_clause<C>(qs: &QuerySet<C>) -> String {
    let mut sql = format!(" FROM {}", quote_ident(qs.model().table_name()));
    if qs.final_ {
        sql.push_str(" FINAL");
    }
    for join in &qs.joins {
        let using: Vec<String> = join.using.iter().map(|c| quote_ident(c)).collect();
        sql.push_str(&format!(
            " {} {} USING ({})",
            join.kind.keyword(),
            quote_ident(join.model.table_name()),
            using.join(", ")
        ));
    }
    sql
}

fn where_clause<C>(qs: &QuerySet<C>) -> String {
    match conjunction(&qs.filters) {
        Some(cond) => format!(" WHERE {}", cond.render()),
        None => String::new(),
    }
}

/// AND of all filters, left-associated
fn conjunction(filters: &[Expr]) -> Option<Expr> {
    let mut iter = filters.iter().cloned();
    let first = iter.next()?;
    Some(iter.fold(first, |acc, f| acc & f))
}

fn join_exprs(exprs: &[Expr]) -> String {
    exprs.iter().map(Expr::render).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::MergeTree;
    use crate::expr::{col, raw, F};
    use crate::fields::{Field, FieldType};
    use crate::model::ModelDescriptor;
    use crate::query::JoinKind;
    use std::sync::Arc;

    fn person() -> Arc<ModelDescriptor> {
        ModelDescriptor::builder("person")
            .field(Field::new("name", FieldType::String))
            .field(Field::new("age", FieldType::UInt8))
            .field(Field::new("created", FieldType::DateTime { timezone: None }))
            .engine(MergeTree::new(&["created"]).replacing(None))
            .build()
            .unwrap()
    }

    fn people() -> QuerySet<()> {
        QuerySet::new(&person(), ())
    }

    #[test]
    fn test_plain_select() {
        assert_eq!(
            render_select(&people()).text,
            "SELECT `name`, `age`, `created` FROM `person`"
        );
    }

    #[test]
    fn test_filter_order_limit_scenario() {
        let qs = people()
            .filter(col("age").gte(18))
            .unwrap()
            .order_by(&["-created"])
            .unwrap()
            .limit(10);
        let statement = render_select(&qs);
        assert_eq!(
            statement.text,
            "SELECT `name`, `age`, `created` FROM `person` WHERE `age` >= 18 \
             ORDER BY `created` DESC LIMIT 10"
        );
        assert_eq!(
            statement.body(),
            format!("{} FORMAT TabSeparatedWithNamesAndTypes", statement.text)
        );
    }

    #[test]
    fn test_clause_order() {
        let qs = people()
            .distinct()
            .final_()
            .unwrap()
            .filter(col("name").like("A%"))
            .unwrap()
            .group_by(&["name", "age"])
            .unwrap()
            .order_by(&["name", "-age"])
            .unwrap()
            .limit_with_offset(5, 10);
        assert_eq!(
            render_select(&qs).text,
            "SELECT DISTINCT `name`, `age`, `created` FROM `person` FINAL \
             WHERE `name` LIKE 'A%' GROUP BY `name`, `age` ORDER BY `name`, `age` DESC \
             LIMIT 5 OFFSET 10"
        );
    }

    #[test]
    fn test_order_and_group_accumulate() {
        let qs = people()
            .order_by(&["name"])
            .unwrap()
            .order_by(&["-age"])
            .unwrap()
            .group_by(&["name"])
            .unwrap()
            .group_by(&["age"])
            .unwrap();
        assert_eq!(
            render_select(&qs).text,
            "SELECT `name`, `age`, `created` FROM `person` GROUP BY `name`, `age` \
             ORDER BY `name`, `age` DESC"
        );
    }

    #[test]
    fn test_offset_without_limit() {
        let qs = people().slice(20..).unwrap();
        assert_eq!(
            render_select(&qs).text,
            "SELECT `name`, `age`, `created` FROM `person` LIMIT 18446744073709551615 OFFSET 20"
        );
    }

    #[test]
    fn test_only_selects_subset_in_model_order() {
        let qs = people().only(&["created", "name"]).unwrap();
        assert_eq!(
            render_select(&qs).text,
            "SELECT `name`, `created` FROM `person`"
        );
    }

    #[test]
    fn test_aggregate_select() {
        let qs = people()
            .aggregate(&[
                ("month", F::to_start_of_month(col("created"))),
                ("n", F::count()),
                ("avg_age", F::avg(col("age"))),
            ])
            .unwrap()
            .group_by(&["month"])
            .unwrap()
            .order_by(&["-n"])
            .unwrap();
        assert_eq!(
            render_select(&qs).text,
            "SELECT toStartOfMonth(`created`) AS `month`, count() AS `n`, avg(`age`) AS `avg_age` \
             FROM `person` GROUP BY `month` ORDER BY `n` DESC"
        );
    }

    #[test]
    fn test_count_statements() {
        let qs = people().filter(col("age").gt(30)).unwrap();
        assert_eq!(
            render_count(&qs).text,
            "SELECT count(*) FROM `person` WHERE `age` > 30"
        );

        let limited = qs.limit(5);
        assert_eq!(
            render_count(&limited).text,
            "SELECT count(*) FROM (SELECT `name`, `age`, `created` FROM `person` WHERE `age` > 30 LIMIT 5)"
        );
    }

    #[test]
    fn test_exists_statements() {
        assert_eq!(
            render_exists(&people()).text,
            "SELECT 1 FROM `person` LIMIT 1"
        );
        let qs = people().filter(col("name").eq("x")).unwrap().slice(3..).unwrap();
        assert_eq!(
            render_exists(&qs).text,
            "SELECT 1 FROM (SELECT `name`, `age`, `created` FROM `person` WHERE `name` = 'x' \
             LIMIT 18446744073709551615 OFFSET 3) LIMIT 1"
        );
    }

    #[test]
    fn test_delete_statement() {
        let qs = people().filter(col("age").lt(18)).unwrap();
        let statement = render_delete(&qs).unwrap();
        assert_eq!(statement.text, "ALTER TABLE `person` DELETE WHERE `age` < 18");
        assert_eq!(statement.format, None);
        assert_eq!(statement.body(), statement.text);

        assert_eq!(
            render_delete(&people()).unwrap().text,
            "ALTER TABLE `person` DELETE WHERE 1"
        );
        assert!(render_delete(&people().limit(1)).is_err());
    }

    #[test]
    fn test_join() {
        let address = ModelDescriptor::builder("address")
            .field(Field::new("name", FieldType::String))
            .field(Field::new("city", FieldType::String))
            .build()
            .unwrap();
        let qs = people()
            .join(JoinKind::Left, &address, &["name"])
            .unwrap()
            .filter(col("city").eq("Paris"))
            .unwrap();
        assert_eq!(
            render_select(&qs).text,
            "SELECT `person`.`name` AS `name`, `person`.`age` AS `age`, `person`.`created` AS `created` \
             FROM `person` LEFT JOIN `address` USING (`name`) WHERE `city` = 'Paris'"
        );
    }

    #[test]
    fn test_raw_filter() {
        let qs = people().filter(raw("age % 2 = 0 OR age = 1")).unwrap();
        assert_eq!(
            render_select(&qs).text,
            "SELECT `name`, `age`, `created` FROM `person` WHERE age % 2 = 0 OR age = 1"
        );
        let qs = qs.filter(col("name").eq("x")).unwrap();
        assert_eq!(
            render_count(&qs).text,
            "SELECT count(*) FROM `person` WHERE (age % 2 = 0 OR age = 1) AND `name` = 'x'"
        );
    }
}
