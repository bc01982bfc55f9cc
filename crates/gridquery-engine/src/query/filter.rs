use regex::Regex;
use serde::{Deserialize, Serialize};

use gridquery_model::{DataTable, TableRow, Value};

use crate::error::QueryResult;
use crate::exec::lookup::DataTableColumnLookup;
use crate::query::column::{AbstractColumn, AggregationColumn, ScalarFunctionColumn};
use crate::query::scalar::EvalContext;

/// Comparison operators usable in WHERE clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Contains,
    StartsWith,
    EndsWith,
    /// Full-string regex match; a malformed pattern matches nothing.
    Matches,
    /// SQL-like matching: `%` = any run, `_` = any single character. No
    /// escape mechanism.
    Like,
}

impl ComparisonOp {
    /// The ordered operators compare typed values and require both sides to
    /// have the same type; the string-shaped ones compare plain renderings.
    pub const fn requires_equal_types(self) -> bool {
        matches!(
            self,
            ComparisonOp::Eq
                | ComparisonOp::Ne
                | ComparisonOp::Lt
                | ComparisonOp::Gt
                | ComparisonOp::Le
                | ComparisonOp::Ge
        )
    }

    pub const fn as_query_string(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Gt => ">",
            ComparisonOp::Le => "<=",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Contains => "CONTAINS",
            ComparisonOp::StartsWith => "STARTS WITH",
            ComparisonOp::EndsWith => "ENDS WITH",
            ComparisonOp::Matches => "MATCHES",
            ComparisonOp::Like => "LIKE",
        }
    }

    /// Whether `first op second` holds.
    ///
    /// When the operator requires equal types and the types differ, the
    /// result is `false` without comparing.
    pub fn matches(self, first: &Value, second: &Value) -> bool {
        if self.requires_equal_types() {
            if first.value_type() != second.value_type() {
                return false;
            }
            let ord = first.compare(second);
            return match self {
                ComparisonOp::Eq => ord.is_eq(),
                ComparisonOp::Ne => ord.is_ne(),
                ComparisonOp::Lt => ord.is_lt(),
                ComparisonOp::Gt => ord.is_gt(),
                ComparisonOp::Le => ord.is_le(),
                ComparisonOp::Ge => ord.is_ge(),
                _ => unreachable!(),
            };
        }

        let text = first.to_string();
        let pattern = second.to_string();
        match self {
            ComparisonOp::Contains => text.contains(&pattern),
            ComparisonOp::StartsWith => text.starts_with(&pattern),
            ComparisonOp::EndsWith => text.ends_with(&pattern),
            ComparisonOp::Matches => match Regex::new(&format!("^(?:{pattern})$")) {
                Ok(re) => re.is_match(&text),
                Err(_) => false,
            },
            ComparisonOp::Like => match Regex::new(&like_to_regex(&pattern)) {
                Ok(re) => re.is_match(&text),
                Err(_) => false,
            },
            _ => unreachable!(),
        }
    }
}

fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// Boolean connective of a compound filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub const fn as_query_string(self) -> &'static str {
        match self {
            LogicalOp::And => "AND",
            LogicalOp::Or => "OR",
        }
    }
}

/// A row predicate over abstract columns.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "filter", rename_all = "camelCase")]
pub enum QueryFilter {
    /// Matches rows whose value at `column` is null.
    IsNull { column: AbstractColumn },
    /// `column op value`, or `value op column` when `reversed`.
    ColumnValue {
        column: AbstractColumn,
        value: Value,
        op: ComparisonOp,
        reversed: bool,
    },
    /// The same comparison between two columns.
    ColumnColumn {
        first: AbstractColumn,
        second: AbstractColumn,
        op: ComparisonOp,
    },
    Negation { subfilter: Box<QueryFilter> },
    /// AND/OR over one or more subfilters. An empty subfilter list is a
    /// programming error and panics at match time.
    Compound {
        op: LogicalOp,
        subfilters: Vec<QueryFilter>,
    },
}

impl QueryFilter {
    pub fn is_null(column: AbstractColumn) -> Self {
        QueryFilter::IsNull { column }
    }

    pub fn column_value(column: AbstractColumn, op: ComparisonOp, value: Value) -> Self {
        QueryFilter::ColumnValue {
            column,
            value,
            op,
            reversed: false,
        }
    }

    pub fn value_column(value: Value, op: ComparisonOp, column: AbstractColumn) -> Self {
        QueryFilter::ColumnValue {
            column,
            value,
            op,
            reversed: true,
        }
    }

    pub fn column_column(first: AbstractColumn, op: ComparisonOp, second: AbstractColumn) -> Self {
        QueryFilter::ColumnColumn { first, second, op }
    }

    pub fn negation(subfilter: QueryFilter) -> Self {
        QueryFilter::Negation {
            subfilter: Box::new(subfilter),
        }
    }

    pub fn and(subfilters: Vec<QueryFilter>) -> Self {
        QueryFilter::Compound {
            op: LogicalOp::And,
            subfilters,
        }
    }

    pub fn or(subfilters: Vec<QueryFilter>) -> Self {
        QueryFilter::Compound {
            op: LogicalOp::Or,
            subfilters,
        }
    }

    /// Whether the row passes this filter against the given table.
    pub fn is_match(
        &self,
        table: &DataTable,
        row: &TableRow,
        ctx: &EvalContext,
    ) -> QueryResult<bool> {
        let lookup = DataTableColumnLookup::new(table);
        self.matches_with(&lookup, row, ctx)
    }

    fn matches_with(
        &self,
        lookup: &DataTableColumnLookup<'_>,
        row: &TableRow,
        ctx: &EvalContext,
    ) -> QueryResult<bool> {
        match self {
            QueryFilter::IsNull { column } => Ok(column.value(lookup, row, ctx)?.is_null()),
            QueryFilter::ColumnValue {
                column,
                value,
                op,
                reversed,
            } => {
                let column_value = column.value(lookup, row, ctx)?;
                Ok(if *reversed {
                    op.matches(value, &column_value)
                } else {
                    op.matches(&column_value, value)
                })
            }
            QueryFilter::ColumnColumn { first, second, op } => {
                let a = first.value(lookup, row, ctx)?;
                let b = second.value(lookup, row, ctx)?;
                Ok(op.matches(&a, &b))
            }
            QueryFilter::Negation { subfilter } => {
                Ok(!subfilter.matches_with(lookup, row, ctx)?)
            }
            QueryFilter::Compound { op, subfilters } => {
                assert!(
                    !subfilters.is_empty(),
                    "compound filter with no subfilters"
                );
                match op {
                    LogicalOp::And => {
                        for sub in subfilters {
                            if !sub.matches_with(lookup, row, ctx)? {
                                return Ok(false);
                            }
                        }
                        Ok(true)
                    }
                    LogicalOp::Or => {
                        for sub in subfilters {
                            if sub.matches_with(lookup, row, ctx)? {
                                return Ok(true);
                            }
                        }
                        Ok(false)
                    }
                }
            }
        }
    }

    /// Every abstract column mentioned at a comparison leaf.
    pub fn all_columns(&self) -> Vec<AbstractColumn> {
        match self {
            QueryFilter::IsNull { column } => vec![column.clone()],
            QueryFilter::ColumnValue { column, .. } => vec![column.clone()],
            QueryFilter::ColumnColumn { first, second, .. } => {
                vec![first.clone(), second.clone()]
            }
            QueryFilter::Negation { subfilter } => subfilter.all_columns(),
            QueryFilter::Compound { subfilters, .. } => {
                subfilters.iter().flat_map(QueryFilter::all_columns).collect()
            }
        }
    }

    /// Ids of all simple columns referenced anywhere, in discovery order,
    /// deduplicated.
    pub fn all_column_ids(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for column in self.all_columns() {
            for id in column.all_simple_column_ids() {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        out
    }

    pub fn all_scalar_function_columns(&self) -> Vec<ScalarFunctionColumn> {
        self.all_columns()
            .iter()
            .flat_map(AbstractColumn::all_scalar_function_columns)
            .collect()
    }

    pub fn all_aggregation_columns(&self) -> Vec<AggregationColumn> {
        self.all_columns()
            .iter()
            .flat_map(AbstractColumn::all_aggregation_columns)
            .collect()
    }

    pub fn to_query_string(&self) -> String {
        match self {
            QueryFilter::IsNull { column } => format!("{} IS NULL", column.to_query_string()),
            QueryFilter::ColumnValue {
                column,
                value,
                op,
                reversed,
            } => {
                if *reversed {
                    format!(
                        "{} {} {}",
                        value.to_query_string(),
                        op.as_query_string(),
                        column.to_query_string()
                    )
                } else {
                    format!(
                        "{} {} {}",
                        column.to_query_string(),
                        op.as_query_string(),
                        value.to_query_string()
                    )
                }
            }
            QueryFilter::ColumnColumn { first, second, op } => format!(
                "{} {} {}",
                first.to_query_string(),
                op.as_query_string(),
                second.to_query_string()
            ),
            QueryFilter::Negation { subfilter } => {
                format!("NOT ({})", subfilter.to_query_string())
            }
            QueryFilter::Compound { op, subfilters } => {
                let joined = subfilters
                    .iter()
                    .map(QueryFilter::to_query_string)
                    .collect::<Vec<_>>()
                    .join(&format!(" {} ", op.as_query_string()));
                format!("({joined})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridquery_model::{ColumnDescription, TableRow, ValueType};
    use pretty_assertions::assert_eq;

    fn table() -> DataTable {
        let mut table = DataTable::new();
        table
            .add_columns([
                ColumnDescription::new("n", ValueType::Text, "Name"),
                ColumnDescription::new("v", ValueType::Number, "Amount"),
            ])
            .unwrap();
        table
            .add_rows([
                TableRow::from_iter([Value::text("alpha"), Value::number(1.0)]),
                TableRow::from_iter([Value::text("beta"), Value::number(2.0)]),
                TableRow::from_iter([Value::Text(None), Value::number(3.0)]),
            ])
            .unwrap();
        table
    }

    fn matches(filter: &QueryFilter, table: &DataTable) -> Vec<bool> {
        let ctx = EvalContext::new();
        table
            .rows()
            .iter()
            .map(|row| filter.is_match(table, row, &ctx).unwrap())
            .collect()
    }

    #[test]
    fn column_value_comparisons() {
        let table = table();
        let gt = QueryFilter::column_value(
            AbstractColumn::simple("v"),
            ComparisonOp::Gt,
            Value::number(1.5),
        );
        assert_eq!(matches(&gt, &table), vec![false, true, true]);

        let reversed = QueryFilter::value_column(
            Value::number(1.5),
            ComparisonOp::Gt,
            AbstractColumn::simple("v"),
        );
        assert_eq!(matches(&reversed, &table), vec![true, false, false]);
    }

    #[test]
    fn differing_types_never_match_ordered_operators() {
        let table = table();
        let filter = QueryFilter::column_value(
            AbstractColumn::simple("v"),
            ComparisonOp::Eq,
            Value::text("1"),
        );
        assert_eq!(matches(&filter, &table), vec![false, false, false]);
    }

    #[test]
    fn is_null_and_negation() {
        let table = table();
        let null = QueryFilter::is_null(AbstractColumn::simple("n"));
        assert_eq!(matches(&null, &table), vec![false, false, true]);
        let not_null = QueryFilter::negation(null);
        assert_eq!(matches(&not_null, &table), vec![true, true, false]);
    }

    #[test]
    fn like_supports_percent_and_underscore() {
        assert!(ComparisonOp::Like.matches(&Value::text("alpha"), &Value::text("a%")));
        assert!(ComparisonOp::Like.matches(&Value::text("beta"), &Value::text("b_ta")));
        assert!(!ComparisonOp::Like.matches(&Value::text("beta"), &Value::text("a%")));
        // Regex metacharacters are literal in LIKE patterns.
        assert!(ComparisonOp::Like.matches(&Value::text("a.c"), &Value::text("a.c")));
        assert!(!ComparisonOp::Like.matches(&Value::text("abc"), &Value::text("a.c")));
    }

    #[test]
    fn matches_is_full_string_and_swallows_bad_patterns() {
        assert!(ComparisonOp::Matches.matches(&Value::text("abc"), &Value::text("a.c")));
        assert!(!ComparisonOp::Matches.matches(&Value::text("xabc"), &Value::text("a.c")));
        assert!(!ComparisonOp::Matches.matches(&Value::text("abc"), &Value::text("a(")));
    }

    #[test]
    fn compound_filters_short_circuit() {
        let table = table();
        let both = QueryFilter::and(vec![
            QueryFilter::column_value(
                AbstractColumn::simple("v"),
                ComparisonOp::Ge,
                Value::number(2.0),
            ),
            QueryFilter::negation(QueryFilter::is_null(AbstractColumn::simple("n"))),
        ]);
        assert_eq!(matches(&both, &table), vec![false, true, false]);
    }

    #[test]
    #[should_panic(expected = "no subfilters")]
    fn empty_compound_panics() {
        let table = table();
        let empty = QueryFilter::and(Vec::new());
        let _ = empty.is_match(&table, &table.rows()[0], &EvalContext::new());
    }

    #[test]
    fn recursive_accessors_collect_from_every_leaf() {
        use crate::query::column::AggregationOp;
        use crate::query::scalar::{ScalarFunction, TimeComponent};

        let year = AbstractColumn::scalar_function(
            ScalarFunction::TimeComponent(TimeComponent::Year),
            vec![AbstractColumn::simple("d")],
        );
        let filter = QueryFilter::and(vec![
            QueryFilter::column_value(year, ComparisonOp::Eq, Value::number(2021.0)),
            QueryFilter::negation(QueryFilter::column_column(
                AbstractColumn::simple("v"),
                ComparisonOp::Lt,
                AbstractColumn::aggregation("v", AggregationOp::Max),
            )),
        ]);

        assert_eq!(filter.all_column_ids(), vec!["d", "v"]);
        assert_eq!(filter.all_scalar_function_columns().len(), 1);
        assert_eq!(filter.all_aggregation_columns().len(), 1);
    }

    #[test]
    fn query_strings_compose() {
        let filter = QueryFilter::or(vec![
            QueryFilter::column_value(
                AbstractColumn::simple("n"),
                ComparisonOp::Like,
                Value::text("a%"),
            ),
            QueryFilter::is_null(AbstractColumn::simple("v")),
        ]);
        assert_eq!(
            filter.to_query_string(),
            "(`n` LIKE \"a%\" OR `v` IS NULL)"
        );
    }
}
