//! Partitions a query between a data source and the engine according to the
//! capabilities the data source advertises. Applying the data-source query
//! at the source and then the completion query in the engine is observably
//! equivalent to applying the original query in the engine alone.

use serde::{Deserialize, Serialize};

use crate::query::column::{AbstractColumn, AggregationColumn, AggregationOp, SimpleColumn};
use crate::query::Query;

/// What a data source can execute on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    /// The source executes arbitrary queries.
    All,
    /// The source returns its table as-is.
    None,
    /// The source can project columns.
    Select,
    /// The source can sort and paginate.
    SortAndPagination,
    /// The source speaks SQL: everything except scalar functions, pivoting,
    /// and output decoration.
    Sql,
}

/// The two halves produced by [`split`]: the part the data source runs
/// (`None` means "hand over the raw table") and the part the engine
/// completes with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySplit {
    pub data_source_query: Option<Query>,
    pub completion_query: Query,
}

impl QuerySplit {
    fn engine_only(query: &Query) -> Self {
        Self {
            data_source_query: None,
            completion_query: query.clone(),
        }
    }
}

/// Splits `query` according to `capability`.
pub fn split(query: &Query, capability: Capability) -> QuerySplit {
    match capability {
        Capability::All => QuerySplit {
            data_source_query: Some(query.clone()),
            completion_query: Query::default(),
        },
        Capability::None => QuerySplit::engine_only(query),
        Capability::Select => split_select(query),
        Capability::SortAndPagination => split_sort_and_pagination(query),
        Capability::Sql => split_sql(query),
    }
}

/// The source can project: ask it for every simple column the query touches
/// and run the whole original query over the result.
fn split_select(query: &Query) -> QuerySplit {
    let ids = query.all_simple_column_ids();
    let mut data_source = Query::default();
    if !ids.is_empty() {
        data_source.set_selection(ids.into_iter().map(AbstractColumn::simple).collect());
    }
    QuerySplit {
        data_source_query: Some(data_source),
        completion_query: query.clone(),
    }
}

fn split_sort_and_pagination(query: &Query) -> QuerySplit {
    if query.has_scalar_functions() {
        return QuerySplit::engine_only(query);
    }
    if query.filter().is_some()
        || query.group_by().is_some_and(|g| !g.is_empty())
        || query.pivot().is_some_and(|p| !p.is_empty())
    {
        // The source cannot pre-sort what the engine is still going to
        // reshape; it only hands over the raw table.
        return QuerySplit {
            data_source_query: Some(Query::default()),
            completion_query: query.clone(),
        };
    }

    let mut data_source = Query::default();
    if let Some(sort) = query.sort() {
        data_source.set_sort(sort.to_vec());
    }
    let mut completion = query.clone();
    completion.sort = None;

    // Pagination can only move to the source when no skipping runs between
    // sorting and the window.
    if query.skipping() == 0 {
        data_source.set_row_limit(query.row_limit());
        data_source.set_row_offset(query.row_offset());
        completion.row_limit = None;
        completion.row_offset = 0;
    }

    QuerySplit {
        data_source_query: Some(data_source),
        completion_query: completion,
    }
}

fn split_sql(query: &Query) -> QuerySplit {
    if query.has_scalar_functions() {
        return QuerySplit::engine_only(query);
    }

    let has_pivot = query.pivot().is_some_and(|p| !p.is_empty());
    if has_pivot && decorates_aggregations(query) {
        return QuerySplit::engine_only(query);
    }

    if has_pivot {
        split_sql_pivot(query)
    } else {
        split_sql_plain(query)
    }
}

/// Labels or formats on aggregation columns cannot survive the pivoted
/// re-aggregation below, so their presence forces engine-only execution.
fn decorates_aggregations(query: &Query) -> bool {
    query
        .labels()
        .iter()
        .chain(query.user_formats().iter())
        .any(|(column, _)| !column.all_aggregation_columns().is_empty())
}

/// With a pivot, the source groups by `G ++ P` and returns one row per
/// (group, pivot) pair; the engine then groups by `G`, pivots by `P`, and
/// re-aggregates each original aggregate with MIN, which is sound because
/// every `(G, P)` group holds exactly one source row.
fn split_sql_pivot(query: &Query) -> QuerySplit {
    let group = query.group_by().unwrap_or(&[]).to_vec();
    let pivot = query.pivot().unwrap_or(&[]).to_vec();
    let aggregations = query.selected_aggregations();

    let mut data_source = Query::default();
    let mut source_selection = group.clone();
    source_selection.extend(
        aggregations
            .iter()
            .cloned()
            .map(AbstractColumn::Aggregation),
    );
    source_selection.extend(pivot.iter().cloned());
    data_source.set_selection(source_selection);
    if let Some(filter) = query.filter() {
        data_source.set_filter(filter.clone());
    }
    let mut source_group = group.clone();
    source_group.extend(pivot.iter().cloned());
    data_source.set_group_by(source_group);

    let mut completion = query.clone();
    completion.filter = None;
    completion.group_by = Some(group);
    completion.pivot = Some(pivot);
    if let Some(selection) = &query.selection {
        completion.selection = Some(
            selection
                .iter()
                .map(|column| match column {
                    AbstractColumn::Aggregation(agg) => AbstractColumn::Aggregation(
                        AggregationColumn::new(SimpleColumn::new(agg.id()), AggregationOp::Min),
                    ),
                    other => other.clone(),
                })
                .collect(),
        );
    }

    QuerySplit {
        data_source_query: Some(data_source),
        completion_query: completion,
    }
}

/// Without a pivot the source takes everything except output decoration
/// (options, labels, formats) and, when SKIPPING is present, the window
/// that must run after it.
fn split_sql_plain(query: &Query) -> QuerySplit {
    let mut data_source = query.clone();
    data_source.labels = Vec::new();
    data_source.user_formats = Vec::new();
    data_source.options = Default::default();

    let mut completion = Query {
        labels: query.labels.clone(),
        user_formats: query.user_formats.clone(),
        options: query.options,
        ..Query::default()
    };

    if query.skipping() > 0 {
        data_source.skipping = 0;
        data_source.row_limit = None;
        data_source.row_offset = 0;
        completion.skipping = query.skipping();
        completion.row_limit = query.row_limit();
        completion.row_offset = query.row_offset();
    }

    QuerySplit {
        data_source_query: Some(data_source),
        completion_query: completion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::column::AggregationOp;
    use crate::query::filter::{ComparisonOp, QueryFilter};
    use crate::query::ColumnSort;
    use gridquery_model::Value;
    use pretty_assertions::assert_eq;

    fn base_query() -> Query {
        let mut query = Query::new();
        query
            .set_selection(vec![
                AbstractColumn::simple("name"),
                AbstractColumn::aggregation("amount", AggregationOp::Sum),
            ])
            .set_group_by(vec![AbstractColumn::simple("name")]);
        query
    }

    #[test]
    fn all_gives_the_source_everything() {
        let query = base_query();
        let split = split(&query, Capability::All);
        assert_eq!(split.data_source_query, Some(query));
        assert!(split.completion_query.is_empty());
    }

    #[test]
    fn none_gives_the_engine_everything() {
        let query = base_query();
        let split = split(&query, Capability::None);
        assert_eq!(split.data_source_query, None);
        assert_eq!(split.completion_query, query);
    }

    #[test]
    fn select_projects_every_referenced_simple_column() {
        let mut query = base_query();
        query.set_filter(QueryFilter::column_value(
            AbstractColumn::simple("region"),
            ComparisonOp::Eq,
            Value::text("west"),
        ));
        let split = split(&query, Capability::Select);
        let data_source = split.data_source_query.unwrap();
        assert_eq!(
            data_source.selection().unwrap(),
            &[
                AbstractColumn::simple("name"),
                AbstractColumn::simple("amount"),
                AbstractColumn::simple("region"),
            ]
        );
        assert_eq!(split.completion_query, query);
    }

    #[test]
    fn sort_and_pagination_moves_the_window_unless_skipping() {
        let mut query = Query::new();
        query
            .set_sort(vec![ColumnSort::asc(AbstractColumn::simple("name"))])
            .set_row_limit(Some(10))
            .set_row_offset(3);

        let moved = split(&query, Capability::SortAndPagination);
        let data_source = moved.data_source_query.unwrap();
        assert_eq!(data_source.row_limit(), Some(10));
        assert_eq!(data_source.row_offset(), 3);
        assert!(data_source.sort().is_some());
        assert_eq!(moved.completion_query.row_limit(), None);
        assert_eq!(moved.completion_query.row_offset(), 0);

        query.set_skipping(2);
        let kept = split(&query, Capability::SortAndPagination);
        let data_source = kept.data_source_query.unwrap();
        assert_eq!(data_source.row_limit(), None);
        assert_eq!(kept.completion_query.skipping(), 2);
        assert_eq!(kept.completion_query.row_limit(), Some(10));
    }

    #[test]
    fn sort_and_pagination_backs_off_for_reshaping_clauses() {
        let query = base_query();
        let split = split(&query, Capability::SortAndPagination);
        assert_eq!(split.data_source_query, Some(Query::default()));
        assert_eq!(split.completion_query, query);
    }
}
