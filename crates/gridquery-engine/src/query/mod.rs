//! The query AST: clauses, options, and string emission.
//!
//! The surface an external parser produces and [`Query::to_query_string`]
//! emits:
//!
//! ```text
//! SELECT col1, agg(col2), fn(col3)
//! [WHERE <filter>]
//! [GROUP BY col, ...]
//! [PIVOT col, ...]
//! [ORDER BY col [ASC|DESC], ...]
//! [SKIPPING n]
//! [LIMIT n]
//! [OFFSET n]
//! [LABEL col 'text', ...]
//! [FORMAT col 'pattern', ...]
//! [OPTIONS NO_VALUES | NO_FORMAT]
//! ```
//!
//! Column ids are backtick-quoted; aggregation names are `min`, `max`,
//! `avg`, `sum`, `count`; temporal literals are `DATE 'yyyy-M-d'`,
//! `TIMEOFDAY 'H:m:s[.SSS]'`, and `DATETIME 'yyyy-M-d H:m:s[.SSS]'`.

pub mod column;
pub mod filter;
pub mod scalar;
mod validate;

use serde::{Deserialize, Serialize};

use gridquery_model::{DataTable, Value};

use crate::error::QueryResult;
use column::{AbstractColumn, AggregationColumn, ScalarFunctionColumn};
use filter::QueryFilter;

/// Sort direction of one ORDER BY entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSort {
    pub column: AbstractColumn,
    pub order: SortOrder,
}

impl ColumnSort {
    pub fn asc(column: AbstractColumn) -> Self {
        Self {
            column,
            order: SortOrder::Ascending,
        }
    }

    pub fn desc(column: AbstractColumn) -> Self {
        Self {
            column,
            order: SortOrder::Descending,
        }
    }
}

/// Output-shaping options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Strip values from the result, leaving formatted text only.
    pub no_values: bool,
    /// Skip the formatting stage and strip formatted text.
    pub no_format: bool,
}

impl QueryOptions {
    fn is_default(&self) -> bool {
        !self.no_values && !self.no_format
    }
}

/// A parsed (or splitter-produced) query.
///
/// Every clause is optional; an entirely empty query is the identity over a
/// table. Equality and hashing are structural. The lifecycle is: build,
/// [`Query::validate`] against a table exactly once, then execute; the
/// engine does not support mutation after validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Query {
    pub(crate) selection: Option<Vec<AbstractColumn>>,
    pub(crate) filter: Option<QueryFilter>,
    pub(crate) group_by: Option<Vec<AbstractColumn>>,
    pub(crate) pivot: Option<Vec<AbstractColumn>>,
    pub(crate) sort: Option<Vec<ColumnSort>>,
    /// `SKIPPING k`; 0 means no skipping, and 1 is equivalent to it.
    pub(crate) skipping: u64,
    /// `LIMIT n`; `None` means unlimited.
    pub(crate) row_limit: Option<u64>,
    /// `OFFSET n`.
    pub(crate) row_offset: u64,
    pub(crate) labels: Vec<(AbstractColumn, String)>,
    pub(crate) user_formats: Vec<(AbstractColumn, String)>,
    pub(crate) options: QueryOptions,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_selection(&mut self, columns: Vec<AbstractColumn>) -> &mut Self {
        self.selection = Some(columns);
        self
    }

    pub fn set_filter(&mut self, filter: QueryFilter) -> &mut Self {
        self.filter = Some(filter);
        self
    }

    pub fn set_group_by(&mut self, columns: Vec<AbstractColumn>) -> &mut Self {
        self.group_by = Some(columns);
        self
    }

    pub fn set_pivot(&mut self, columns: Vec<AbstractColumn>) -> &mut Self {
        self.pivot = Some(columns);
        self
    }

    pub fn set_sort(&mut self, sort: Vec<ColumnSort>) -> &mut Self {
        self.sort = Some(sort);
        self
    }

    pub fn set_skipping(&mut self, skipping: u64) -> &mut Self {
        self.skipping = skipping;
        self
    }

    pub fn set_row_limit(&mut self, limit: Option<u64>) -> &mut Self {
        self.row_limit = limit;
        self
    }

    pub fn set_row_offset(&mut self, offset: u64) -> &mut Self {
        self.row_offset = offset;
        self
    }

    pub fn add_label(&mut self, column: AbstractColumn, label: impl Into<String>) -> &mut Self {
        self.labels.push((column, label.into()));
        self
    }

    pub fn add_format(&mut self, column: AbstractColumn, pattern: impl Into<String>) -> &mut Self {
        self.user_formats.push((column, pattern.into()));
        self
    }

    pub fn set_options(&mut self, options: QueryOptions) -> &mut Self {
        self.options = options;
        self
    }

    pub fn selection(&self) -> Option<&[AbstractColumn]> {
        self.selection.as_deref()
    }

    pub fn filter(&self) -> Option<&QueryFilter> {
        self.filter.as_ref()
    }

    pub fn group_by(&self) -> Option<&[AbstractColumn]> {
        self.group_by.as_deref()
    }

    pub fn pivot(&self) -> Option<&[AbstractColumn]> {
        self.pivot.as_deref()
    }

    pub fn sort(&self) -> Option<&[ColumnSort]> {
        self.sort.as_deref()
    }

    pub fn skipping(&self) -> u64 {
        self.skipping
    }

    pub fn row_limit(&self) -> Option<u64> {
        self.row_limit
    }

    pub fn row_offset(&self) -> u64 {
        self.row_offset
    }

    pub fn labels(&self) -> &[(AbstractColumn, String)] {
        &self.labels
    }

    pub fn user_formats(&self) -> &[(AbstractColumn, String)] {
        &self.user_formats
    }

    pub fn options(&self) -> QueryOptions {
        self.options
    }

    /// True when no clause is set: executing this query is the identity.
    pub fn is_empty(&self) -> bool {
        *self == Query::default()
    }

    /// Checks the query against a table schema; see the crate docs for the
    /// enforced rules. Stops at the first violation.
    pub fn validate(&self, table: &DataTable) -> QueryResult<()> {
        validate::validate(self, table)
    }

    /// Aggregations in the selection, in SELECT order.
    pub fn selected_aggregations(&self) -> Vec<AggregationColumn> {
        self.selection
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .filter_map(|c| match c {
                AbstractColumn::Aggregation(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    /// Scalar-function selection entries that contain an aggregation, in
    /// SELECT order. These are the columns synthesized per pivot vector.
    pub(crate) fn selected_scalar_aggregation_columns(&self) -> Vec<ScalarFunctionColumn> {
        self.selection
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .filter_map(|c| match c {
                AbstractColumn::ScalarFunction(s)
                    if !c.all_aggregation_columns().is_empty() =>
                {
                    Some(s.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Every abstract column mentioned in any clause, in clause order.
    pub fn all_columns(&self) -> Vec<AbstractColumn> {
        let mut out = Vec::new();
        if let Some(selection) = &self.selection {
            out.extend(selection.iter().cloned());
        }
        if let Some(filter) = &self.filter {
            out.extend(filter.all_columns());
        }
        if let Some(group_by) = &self.group_by {
            out.extend(group_by.iter().cloned());
        }
        if let Some(pivot) = &self.pivot {
            out.extend(pivot.iter().cloned());
        }
        if let Some(sort) = &self.sort {
            out.extend(sort.iter().map(|s| s.column.clone()));
        }
        out.extend(self.labels.iter().map(|(c, _)| c.clone()));
        out.extend(self.user_formats.iter().map(|(c, _)| c.clone()));
        out
    }

    /// Ids of every simple column referenced anywhere, in discovery order,
    /// deduplicated.
    pub fn all_simple_column_ids(&self) -> Vec<String> {
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

    /// Whether any clause mentions a scalar-function column.
    pub fn has_scalar_functions(&self) -> bool {
        self.all_columns()
            .iter()
            .any(|c| !c.all_scalar_function_columns().is_empty())
    }

    /// Canonical query-string rendering; the external parser round-trips it.
    pub fn to_query_string(&self) -> String {
        let mut clauses: Vec<String> = Vec::new();

        if let Some(selection) = &self.selection {
            clauses.push(format!("SELECT {}", join_columns(selection)));
        }
        if let Some(filter) = &self.filter {
            clauses.push(format!("WHERE {}", filter.to_query_string()));
        }
        if let Some(group_by) = &self.group_by {
            clauses.push(format!("GROUP BY {}", join_columns(group_by)));
        }
        if let Some(pivot) = &self.pivot {
            clauses.push(format!("PIVOT {}", join_columns(pivot)));
        }
        if let Some(sort) = &self.sort {
            let entries = sort
                .iter()
                .map(|s| match s.order {
                    SortOrder::Ascending => s.column.to_query_string(),
                    SortOrder::Descending => format!("{} DESC", s.column.to_query_string()),
                })
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("ORDER BY {entries}"));
        }
        if self.skipping > 0 {
            clauses.push(format!("SKIPPING {}", self.skipping));
        }
        if let Some(limit) = self.row_limit {
            clauses.push(format!("LIMIT {limit}"));
        }
        if self.row_offset > 0 {
            clauses.push(format!("OFFSET {}", self.row_offset));
        }
        if !self.labels.is_empty() {
            let entries = self
                .labels
                .iter()
                .map(|(c, label)| {
                    format!(
                        "{} {}",
                        c.to_query_string(),
                        Value::text(label.clone()).to_query_string()
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("LABEL {entries}"));
        }
        if !self.user_formats.is_empty() {
            let entries = self
                .user_formats
                .iter()
                .map(|(c, pattern)| {
                    format!(
                        "{} {}",
                        c.to_query_string(),
                        Value::text(pattern.clone()).to_query_string()
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("FORMAT {entries}"));
        }
        if !self.options.is_default() {
            let mut opts = Vec::new();
            if self.options.no_values {
                opts.push("NO_VALUES");
            }
            if self.options.no_format {
                opts.push("NO_FORMAT");
            }
            clauses.push(format!("OPTIONS {}", opts.join(" ")));
        }

        clauses.join(" ")
    }
}

fn join_columns(columns: &[AbstractColumn]) -> String {
    columns
        .iter()
        .map(AbstractColumn::to_query_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::column::AggregationOp;
    use super::filter::ComparisonOp;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn query_string_emits_clauses_in_canonical_order() {
        let mut query = Query::new();
        query
            .set_selection(vec![
                AbstractColumn::simple("name"),
                AbstractColumn::aggregation("amount", AggregationOp::Sum),
            ])
            .set_filter(QueryFilter::column_value(
                AbstractColumn::simple("amount"),
                ComparisonOp::Gt,
                Value::number(0.0),
            ))
            .set_group_by(vec![AbstractColumn::simple("name")])
            .set_sort(vec![ColumnSort::desc(AbstractColumn::aggregation(
                "amount",
                AggregationOp::Sum,
            ))])
            .set_row_limit(Some(10))
            .set_row_offset(2)
            .add_label(AbstractColumn::simple("name"), "Name");

        assert_eq!(
            query.to_query_string(),
            "SELECT `name`, sum(`amount`) WHERE `amount` > 0 GROUP BY `name` \
             ORDER BY sum(`amount`) DESC LIMIT 10 OFFSET 2 LABEL `name` \"Name\""
        );
    }

    #[test]
    fn query_string_covers_pivot_skipping_and_options() {
        let mut query = Query::new();
        query
            .set_selection(vec![
                AbstractColumn::simple("k"),
                AbstractColumn::aggregation("v", AggregationOp::Min),
            ])
            .set_group_by(vec![AbstractColumn::simple("k")])
            .set_pivot(vec![AbstractColumn::simple("p")])
            .set_skipping(4)
            .add_format(AbstractColumn::aggregation("v", AggregationOp::Min), "0.0")
            .set_options(QueryOptions {
                no_values: true,
                no_format: true,
            });

        assert_eq!(
            query.to_query_string(),
            "SELECT `k`, min(`v`) GROUP BY `k` PIVOT `p` SKIPPING 4 \
             FORMAT min(`v`) \"0.0\" OPTIONS NO_VALUES NO_FORMAT"
        );
    }

    #[test]
    fn structural_equality_and_hashing() {
        use std::collections::HashSet;

        let mut a = Query::new();
        a.set_selection(vec![AbstractColumn::simple("x")]);
        let mut b = Query::new();
        b.set_selection(vec![AbstractColumn::simple("x")]);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn empty_query_is_identity_marker() {
        assert!(Query::new().is_empty());
        let mut q = Query::new();
        q.set_row_offset(1);
        assert!(!q.is_empty());
    }

    #[test]
    fn all_simple_column_ids_deduplicates_in_order() {
        let mut query = Query::new();
        query
            .set_selection(vec![
                AbstractColumn::simple("b"),
                AbstractColumn::aggregation("a", AggregationOp::Max),
            ])
            .set_sort(vec![ColumnSort::asc(AbstractColumn::simple("b"))]);
        assert_eq!(query.all_simple_column_ids(), vec!["b", "a"]);
    }
}
