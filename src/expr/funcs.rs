//! Server function catalogue
//!
//! Every helper returns an [`Expr::Function`] node. Argument counts are
//! not checked; the server reports misuse.

use super::Expr;

/// Namespace for function-call builders
pub struct F;

impl F {
    /// Any function by name
    pub fn func<I, T>(name: impl Into<String>, args: I) -> Expr
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        Expr::Function {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::Function {
            name: name.to_string(),
            args,
        }
    }

    // Aggregates

    /// `count()`
    pub fn count() -> Expr {
        Self::call("count", vec![])
    }

    /// `countIf(cond)`
    pub fn count_if(cond: impl Into<Expr>) -> Expr {
        Self::call("countIf", vec![cond.into()])
    }

    pub fn sum(e: impl Into<Expr>) -> Expr {
        Self::call("sum", vec![e.into()])
    }

    /// `sumIf(e, cond)`
    pub fn sum_if(e: impl Into<Expr>, cond: impl Into<Expr>) -> Expr {
        Self::call("sumIf", vec![e.into(), cond.into()])
    }

    pub fn avg(e: impl Into<Expr>) -> Expr {
        Self::call("avg", vec![e.into()])
    }

    pub fn min(e: impl Into<Expr>) -> Expr {
        Self::call("min", vec![e.into()])
    }

    pub fn max(e: impl Into<Expr>) -> Expr {
        Self::call("max", vec![e.into()])
    }

    /// Approximate distinct count
    pub fn uniq(e: impl Into<Expr>) -> Expr {
        Self::call("uniq", vec![e.into()])
    }

    /// Exact distinct count
    pub fn uniq_exact(e: impl Into<Expr>) -> Expr {
        Self::call("uniqExact", vec![e.into()])
    }

    pub fn any(e: impl Into<Expr>) -> Expr {
        Self::call("any", vec![e.into()])
    }

    /// `groupArray(e)`
    pub fn group_array(e: impl Into<Expr>) -> Expr {
        Self::call("groupArray", vec![e.into()])
    }

    // Dates and times

    pub fn now() -> Expr {
        Self::call("now", vec![])
    }

    pub fn today() -> Expr {
        Self::call("today", vec![])
    }

    /// `toDate(e)`
    pub fn to_date(e: impl Into<Expr>) -> Expr {
        Self::call("toDate", vec![e.into()])
    }

    /// `toDateTime(e)`
    pub fn to_date_time(e: impl Into<Expr>) -> Expr {
        Self::call("toDateTime", vec![e.into()])
    }

    /// `toStartOfMonth(e)`
    pub fn to_start_of_month(e: impl Into<Expr>) -> Expr {
        Self::call("toStartOfMonth", vec![e.into()])
    }

    /// `toStartOfDay(e)`
    pub fn to_start_of_day(e: impl Into<Expr>) -> Expr {
        Self::call("toStartOfDay", vec![e.into()])
    }

    /// `toYYYYMM(e)`, the usual monthly partition key
    pub fn to_yyyymm(e: impl Into<Expr>) -> Expr {
        Self::call("toYYYYMM", vec![e.into()])
    }

    /// `toYear(e)`
    pub fn to_year(e: impl Into<Expr>) -> Expr {
        Self::call("toYear", vec![e.into()])
    }

    // Strings

    pub fn lower(e: impl Into<Expr>) -> Expr {
        Self::call("lower", vec![e.into()])
    }

    pub fn upper(e: impl Into<Expr>) -> Expr {
        Self::call("upper", vec![e.into()])
    }

    /// String or array length
    pub fn length(e: impl Into<Expr>) -> Expr {
        Self::call("length", vec![e.into()])
    }

    pub fn concat<I, T>(parts: I) -> Expr
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        Self::func("concat", parts)
    }

    /// `toString(e)`
    pub fn to_string(e: impl Into<Expr>) -> Expr {
        Self::call("toString", vec![e.into()])
    }

    // Conditionals and arrays

    /// `if(cond, then, else)`
    pub fn if_(cond: impl Into<Expr>, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Expr {
        Self::call("if", vec![cond.into(), then.into(), otherwise.into()])
    }

    pub fn coalesce<I, T>(args: I) -> Expr
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        Self::func("coalesce", args)
    }

    /// `has(array, element)`
    pub fn has(array: impl Into<Expr>, element: impl Into<Expr>) -> Expr {
        Self::call("has", vec![array.into(), element.into()])
    }

    /// Empty string or array
    pub fn empty(e: impl Into<Expr>) -> Expr {
        Self::call("empty", vec![e.into()])
    }

    /// `notEmpty(e)`
    pub fn not_empty(e: impl Into<Expr>) -> Expr {
        Self::call("notEmpty", vec![e.into()])
    }

    // Math

    pub fn abs(e: impl Into<Expr>) -> Expr {
        Self::call("abs", vec![e.into()])
    }

    /// `round(e, digits)`
    pub fn round(e: impl Into<Expr>, digits: i32) -> Expr {
        Self::call("round", vec![e.into(), Expr::from(digits)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::col;

    #[test]
    fn test_function_rendering() {
        assert_eq!(F::count().render(), "count()");
        assert_eq!(F::count_if(col("ok").eq(1)).render(), "countIf(`ok` = 1)");
        assert_eq!(
            F::to_start_of_month(col("created")).render(),
            "toStartOfMonth(`created`)"
        );
        assert_eq!(
            F::concat([col("first"), " ".into(), col("last")]).render(),
            "concat(`first`, ' ', `last`)"
        );
        assert_eq!(
            F::if_(col("a").gt(0), "pos", "neg").render(),
            "if(`a` > 0, 'pos', 'neg')"
        );
        assert_eq!(F::round(col("x"), 2).render(), "round(`x`, 2)");
    }

    #[test]
    fn test_function_args_are_not_parenthesised() {
        let e = F::sum(col("a") + col("b") * 2);
        assert_eq!(e.render(), "sum(`a` + `b` * 2)");
    }

    #[test]
    fn test_functions_compose_with_operators() {
        let e = F::length(col("name")).gt(3) & F::not_empty(col("tags"));
        assert_eq!(e.render(), "length(`name`) > 3 AND notEmpty(`tags`)");
    }

    #[test]
    fn test_custom_function() {
        let e = F::func("arrayJoin", [col("tags")]);
        assert_eq!(e.render(), "arrayJoin(`tags`)");
        let e = F::func("version", Vec::<Expr>::new());
        assert_eq!(e.render(), "version()");
    }
}
