//! Cross-clause semantic validation of a query against a table schema.
//!
//! Checks run in a fixed order and stop at the first violation, which is
//! reported with a stable reason code and a parameterized message.

use gridquery_model::DataTable;

use crate::error::{InvalidQueryReason, QueryError, QueryResult};
use crate::query::column::AbstractColumn;
use crate::query::Query;

pub(crate) fn validate(query: &Query, table: &DataTable) -> QueryResult<()> {
    // Every referenced column must exist, scalar functions must type-check,
    // and aggregation operators must match their target types.
    let mut strict: Vec<&AbstractColumn> = Vec::new();
    strict.extend(query.selection().unwrap_or(&[]));
    let filter_columns = query
        .filter()
        .map(|f| f.all_columns())
        .unwrap_or_default();
    strict.extend(filter_columns.iter());
    strict.extend(query.group_by().unwrap_or(&[]));
    strict.extend(query.pivot().unwrap_or(&[]));
    for column in strict {
        column.validate(table)?;
    }

    // Sort, label, and format entries may also address a column that an
    // earlier pipeline (a splitter data-source query) already materialized
    // under its generated id.
    let mut by_id: Vec<&AbstractColumn> = Vec::new();
    if let Some(sort) = query.sort() {
        by_id.extend(sort.iter().map(|s| &s.column));
    }
    by_id.extend(query.labels().iter().map(|(c, _)| c));
    by_id.extend(query.user_formats().iter().map(|(c, _)| c));
    for column in by_id {
        if !table.contains_column(&column.id()) {
            column.validate(table)?;
        }
    }

    let group_by = query.group_by().unwrap_or(&[]);
    let pivot = query.pivot().unwrap_or(&[]);

    check_no_duplicates(query.selection().unwrap_or(&[]), "SELECT")?;
    check_no_duplicates(group_by, "GROUP BY")?;
    check_no_duplicates(pivot, "PIVOT")?;
    if let Some(sort) = query.sort() {
        let sort_columns: Vec<AbstractColumn> =
            sort.iter().map(|s| s.column.clone()).collect();
        check_no_duplicates(&sort_columns, "ORDER BY")?;
    }

    check_no_aggregations(group_by, "GROUP BY")?;
    check_no_aggregations(pivot, "PIVOT")?;
    if let Some(filter) = query.filter() {
        if let Some(agg) = filter.all_aggregation_columns().first() {
            return Err(QueryError::invalid(
                InvalidQueryReason::AggregationNotAllowed,
                format!("aggregation {:?} cannot appear in WHERE", agg.id()),
            ));
        }
    }

    let selection = query.selection();
    let selected_aggregations = query.selected_aggregations();

    // With aggregations in SELECT, every other selected column must be
    // grouped (directly, or through a scalar function whose inputs are).
    if !selected_aggregations.is_empty() {
        for column in selection.unwrap_or(&[]) {
            if matches!(column, AbstractColumn::Aggregation(_)) {
                continue;
            }
            if !is_grouped(column, group_by) {
                return Err(QueryError::invalid(
                    InvalidQueryReason::AddColToGroupByOrAgg,
                    format!(
                        "cannot select {:?}: add it to GROUP BY, aggregate it, or remove it",
                        column.id()
                    ),
                ));
            }
        }
    }

    // A simple column may not be selected both raw and aggregated.
    if let Some(selection) = selection {
        for column in selection {
            if let AbstractColumn::Simple(simple) = column {
                if selected_aggregations
                    .iter()
                    .any(|agg| agg.target() == simple)
                {
                    return Err(QueryError::invalid(
                        InvalidQueryReason::SelectBothRawAndAggregated,
                        format!(
                            "column {:?} cannot be selected both raw and aggregated",
                            simple.id()
                        ),
                    ));
                }
            }
        }
    }

    // An aggregated target may not simultaneously be grouped by.
    for agg in &selected_aggregations {
        let as_simple = AbstractColumn::Simple(agg.target().clone());
        if group_by.contains(&as_simple) {
            return Err(QueryError::invalid(
                InvalidQueryReason::GroupByAggregatedColumn,
                format!(
                    "column {:?} is aggregated in SELECT and cannot appear in GROUP BY",
                    agg.target().id()
                ),
            ));
        }
    }

    // Grouping and pivoting only make sense with something to aggregate.
    if !group_by.is_empty() && selected_aggregations.is_empty() {
        return Err(QueryError::invalid(
            InvalidQueryReason::CannotGroupWithoutAgg,
            "GROUP BY requires at least one aggregation in SELECT",
        ));
    }
    if !pivot.is_empty() && selected_aggregations.is_empty() {
        return Err(QueryError::invalid(
            InvalidQueryReason::CannotPivotWithoutAgg,
            "PIVOT requires at least one aggregation in SELECT",
        ));
    }

    for column in group_by {
        if pivot.contains(column) {
            return Err(QueryError::invalid(
                InvalidQueryReason::ColumnInGroupAndPivot,
                format!(
                    "column {:?} cannot appear in both GROUP BY and PIVOT",
                    column.id()
                ),
            ));
        }
    }

    if let Some(sort) = query.sort() {
        for entry in sort {
            let aggregations = entry.column.all_aggregation_columns();
            if !aggregations.is_empty() && !pivot.is_empty() {
                return Err(QueryError::invalid(
                    InvalidQueryReason::NoAggOrderWhenPivot,
                    format!(
                        "cannot order by the aggregation {:?} when PIVOT is in use",
                        entry.column.id()
                    ),
                ));
            }
            if !aggregations.is_empty()
                && !selection_contains(selection, &entry.column)
            {
                return Err(QueryError::invalid(
                    InvalidQueryReason::ColAggNotInSelect,
                    format!(
                        "the aggregation {:?} in ORDER BY must also be selected",
                        entry.column.id()
                    ),
                ));
            }
            if !selected_aggregations.is_empty()
                && !selection_contains(selection, &entry.column)
            {
                return Err(QueryError::invalid(
                    InvalidQueryReason::OrderByColumnNotInSelect,
                    format!(
                        "column {:?} in ORDER BY must be selected when SELECT aggregates",
                        entry.column.id()
                    ),
                ));
            }
        }
    }

    if let Some(selection) = selection {
        for (column, _) in query.labels() {
            if !selection.contains(column) {
                return Err(QueryError::invalid(
                    InvalidQueryReason::LabelColumnNotInSelect,
                    format!("column {:?} in LABEL is not selected", column.id()),
                ));
            }
        }
        for (column, _) in query.user_formats() {
            if !selection.contains(column) {
                return Err(QueryError::invalid(
                    InvalidQueryReason::FormatColumnNotInSelect,
                    format!("column {:?} in FORMAT is not selected", column.id()),
                ));
            }
        }
    }

    Ok(())
}

fn selection_contains(selection: Option<&[AbstractColumn]>, column: &AbstractColumn) -> bool {
    selection.is_some_and(|s| s.contains(column))
}

fn check_no_duplicates(columns: &[AbstractColumn], clause: &str) -> QueryResult<()> {
    for (i, column) in columns.iter().enumerate() {
        if columns[..i].contains(column) {
            return Err(QueryError::invalid(
                InvalidQueryReason::DuplicateColumn,
                format!("column {:?} appears more than once in {clause}", column.id()),
            ));
        }
    }
    Ok(())
}

fn check_no_aggregations(columns: &[AbstractColumn], clause: &str) -> QueryResult<()> {
    for column in columns {
        if let Some(agg) = column.all_aggregation_columns().first() {
            return Err(QueryError::invalid(
                InvalidQueryReason::AggregationNotAllowed,
                format!("aggregation {:?} cannot appear in {clause}", agg.id()),
            ));
        }
    }
    Ok(())
}

/// A selected column may accompany aggregations when its data is grouped:
/// it appears in GROUP BY, is itself an aggregation, or is a scalar function
/// whose arguments all satisfy this rule (so `quotient(sum(v), count(v))`
/// is selectable without being grouped by).
fn is_grouped(column: &AbstractColumn, group_by: &[AbstractColumn]) -> bool {
    if group_by.contains(column) {
        return true;
    }
    match column {
        AbstractColumn::Aggregation(_) => true,
        AbstractColumn::ScalarFunction(s) => {
            s.arguments().iter().all(|arg| is_grouped(arg, group_by))
        }
        AbstractColumn::Simple(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::column::AggregationOp;
    use crate::query::filter::{ComparisonOp, QueryFilter};
    use crate::query::scalar::{ScalarFunction, TimeComponent};
    use crate::query::ColumnSort;
    use gridquery_model::{ColumnDescription, Value, ValueType};

    fn table() -> DataTable {
        let mut table = DataTable::new();
        table
            .add_columns([
                ColumnDescription::new("name", ValueType::Text, "Name"),
                ColumnDescription::new("amount", ValueType::Number, "Amount"),
                ColumnDescription::new("d", ValueType::Date, "Date"),
            ])
            .unwrap();
        table
    }

    fn reason(result: QueryResult<()>) -> InvalidQueryReason {
        match result.unwrap_err() {
            QueryError::Invalid { reason, .. } => reason,
            other => panic!("expected an invalid-query error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_columns_are_reported_first() {
        let mut query = Query::new();
        query.set_selection(vec![AbstractColumn::simple("missing")]);
        assert_eq!(
            reason(query.validate(&table())),
            InvalidQueryReason::NoColumn
        );
    }

    #[test]
    fn group_by_requires_an_aggregation() {
        let mut query = Query::new();
        query
            .set_selection(vec![AbstractColumn::simple("name")])
            .set_group_by(vec![AbstractColumn::simple("name")]);
        assert_eq!(
            reason(query.validate(&table())),
            InvalidQueryReason::CannotGroupWithoutAgg
        );
    }

    #[test]
    fn selected_columns_must_be_grouped_when_aggregating() {
        let mut query = Query::new();
        query.set_selection(vec![
            AbstractColumn::simple("name"),
            AbstractColumn::aggregation("amount", AggregationOp::Sum),
        ]);
        assert_eq!(
            reason(query.validate(&table())),
            InvalidQueryReason::AddColToGroupByOrAgg
        );
    }

    #[test]
    fn scalar_function_over_grouped_column_is_grouped() {
        let year = AbstractColumn::scalar_function(
            ScalarFunction::TimeComponent(TimeComponent::Year),
            vec![AbstractColumn::simple("d")],
        );
        let mut query = Query::new();
        query
            .set_selection(vec![
                year.clone(),
                AbstractColumn::aggregation("amount", AggregationOp::Count),
            ])
            .set_group_by(vec![year]);
        assert!(query.validate(&table()).is_ok());
    }

    #[test]
    fn scalar_function_over_aggregations_is_selectable() {
        let ratio = AbstractColumn::scalar_function(
            ScalarFunction::Arithmetic(crate::query::scalar::ArithmeticOp::Quotient),
            vec![
                AbstractColumn::aggregation("amount", AggregationOp::Sum),
                AbstractColumn::aggregation("amount", AggregationOp::Count),
            ],
        );
        let mut query = Query::new();
        query
            .set_selection(vec![
                AbstractColumn::simple("name"),
                AbstractColumn::aggregation("amount", AggregationOp::Sum),
                ratio,
            ])
            .set_group_by(vec![AbstractColumn::simple("name")]);
        assert!(query.validate(&table()).is_ok());
    }

    #[test]
    fn aggregations_are_banned_from_group_pivot_and_where() {
        let agg = AbstractColumn::aggregation("amount", AggregationOp::Sum);
        let mut in_group = Query::new();
        in_group
            .set_selection(vec![agg.clone()])
            .set_group_by(vec![agg.clone()]);
        assert_eq!(
            reason(in_group.validate(&table())),
            InvalidQueryReason::AggregationNotAllowed
        );

        let mut in_where = Query::new();
        in_where.set_filter(QueryFilter::column_value(
            agg,
            ComparisonOp::Gt,
            Value::number(0.0),
        ));
        assert_eq!(
            reason(in_where.validate(&table())),
            InvalidQueryReason::AggregationNotAllowed
        );
    }

    #[test]
    fn raw_and_aggregated_selection_conflicts() {
        let mut query = Query::new();
        query.set_selection(vec![
            AbstractColumn::simple("amount"),
            AbstractColumn::aggregation("amount", AggregationOp::Sum),
        ]);
        assert_eq!(
            reason(query.validate(&table())),
            InvalidQueryReason::SelectBothRawAndAggregated
        );
    }

    #[test]
    fn aggregated_target_cannot_be_grouped() {
        let mut query = Query::new();
        query
            .set_selection(vec![
                AbstractColumn::simple("name"),
                AbstractColumn::aggregation("amount", AggregationOp::Sum),
            ])
            .set_group_by(vec![
                AbstractColumn::simple("name"),
                AbstractColumn::simple("amount"),
            ]);
        assert_eq!(
            reason(query.validate(&table())),
            InvalidQueryReason::GroupByAggregatedColumn
        );
    }

    #[test]
    fn group_and_pivot_are_disjoint() {
        let mut query = Query::new();
        query
            .set_selection(vec![AbstractColumn::aggregation(
                "amount",
                AggregationOp::Sum,
            )])
            .set_group_by(vec![AbstractColumn::simple("name")])
            .set_pivot(vec![AbstractColumn::simple("name")]);
        assert_eq!(
            reason(query.validate(&table())),
            InvalidQueryReason::ColumnInGroupAndPivot
        );
    }

    #[test]
    fn order_by_rules_with_aggregations() {
        // Aggregation in ORDER BY must be selected.
        let mut query = Query::new();
        query
            .set_selection(vec![
                AbstractColumn::simple("name"),
                AbstractColumn::aggregation("amount", AggregationOp::Sum),
            ])
            .set_group_by(vec![AbstractColumn::simple("name")])
            .set_sort(vec![ColumnSort::asc(AbstractColumn::aggregation(
                "amount",
                AggregationOp::Avg,
            ))]);
        assert_eq!(
            reason(query.validate(&table())),
            InvalidQueryReason::ColAggNotInSelect
        );

        // No aggregation ordering under PIVOT.
        let mut pivoted = Query::new();
        pivoted
            .set_selection(vec![
                AbstractColumn::simple("name"),
                AbstractColumn::aggregation("amount", AggregationOp::Sum),
            ])
            .set_group_by(vec![AbstractColumn::simple("name")])
            .set_pivot(vec![AbstractColumn::simple("d")])
            .set_sort(vec![ColumnSort::asc(AbstractColumn::aggregation(
                "amount",
                AggregationOp::Sum,
            ))]);
        assert_eq!(
            reason(pivoted.validate(&table())),
            InvalidQueryReason::NoAggOrderWhenPivot
        );
    }

    #[test]
    fn labels_and_formats_must_be_selected() {
        let mut query = Query::new();
        query
            .set_selection(vec![AbstractColumn::simple("name")])
            .add_label(AbstractColumn::simple("amount"), "Amount");
        assert_eq!(
            reason(query.validate(&table())),
            InvalidQueryReason::LabelColumnNotInSelect
        );
    }
}
