use gridquery_engine::{AbstractColumn, AggregationOp, ColumnSort, Query, QueryEngine};
use gridquery_model::{ColumnDescription, DataTable, Locale, ReasonCode, TableRow, Value, ValueType};
use proptest::prelude::*;

fn table_from(rows: &[(u8, i64)]) -> DataTable {
    let mut table = DataTable::new();
    table
        .add_columns([
            ColumnDescription::new("k", ValueType::Text, "K"),
            ColumnDescription::new("v", ValueType::Number, "V"),
        ])
        .unwrap();
    for (key, value) in rows {
        table
            .add_row(TableRow::from_iter([
                Value::text(format!("k{key}")),
                Value::number(*value as f64),
            ]))
            .unwrap();
    }
    table
}

fn values_of(table: &DataTable) -> Vec<Vec<Value>> {
    table
        .rows()
        .iter()
        .map(|row| row.cells.iter().map(|c| c.value.clone()).collect())
        .collect()
}

proptest! {
    /// The grouped result depends only on the multiset of rows, not their
    /// order.
    #[test]
    fn grouping_is_invariant_under_row_order(
        rows in prop::collection::vec((0u8..4u8, -50i64..50i64), 0..30),
        rotation in 0usize..30,
    ) {
        let mut query = Query::new();
        query
            .set_selection(vec![
                AbstractColumn::simple("k"),
                AbstractColumn::aggregation("v", AggregationOp::Sum),
                AbstractColumn::aggregation("v", AggregationOp::Count),
            ])
            .set_group_by(vec![AbstractColumn::simple("k")]);

        let engine = QueryEngine::new(Locale::en_us());
        let base = engine.execute(&query, &table_from(&rows)).unwrap();

        let mut permuted = rows.clone();
        permuted.reverse();
        if !permuted.is_empty() {
            let by = rotation % permuted.len();
            permuted.rotate_left(by);
        }
        let reordered = engine.execute(&query, &table_from(&permuted)).unwrap();

        prop_assert_eq!(values_of(&base), values_of(&reordered));
    }

    /// LIMIT/OFFSET return a contiguous slice and warn exactly when a
    /// trailing row is cut off.
    #[test]
    fn pagination_is_a_contiguous_slice(
        n in 0usize..30,
        offset in 0u64..40u64,
        limit in 0u64..40u64,
    ) {
        let rows: Vec<(u8, i64)> = (0..n).map(|i| (0, i as i64)).collect();
        let mut query = Query::new();
        query.set_row_limit(Some(limit)).set_row_offset(offset);

        let engine = QueryEngine::new(Locale::en_us());
        let result = engine.execute(&query, &table_from(&rows)).unwrap();

        let start = (offset as usize).min(n);
        let end = n.min((offset as usize).saturating_add(limit as usize));
        let expected: Vec<Vec<Value>> = (start..end)
            .map(|i| vec![Value::text("k0"), Value::number(i as f64)])
            .collect();
        prop_assert_eq!(values_of(&result), expected);

        let truncated = result
            .warnings()
            .iter()
            .any(|w| w.reason == ReasonCode::DataTruncated);
        prop_assert_eq!(truncated, (offset as usize).saturating_add(limit as usize) < n);
    }

    /// Stable sort: rows with equal keys keep their input order.
    #[test]
    fn sort_is_stable(rows in prop::collection::vec((0u8..3u8, 0i64..1000i64), 0..25)) {
        let mut query = Query::new();
        query.set_sort(vec![ColumnSort::asc(AbstractColumn::simple("k"))]);

        let engine = QueryEngine::new(Locale::en_us());
        let result = engine.execute(&query, &table_from(&rows)).unwrap();

        let mut expected: Vec<(u8, i64)> = rows.clone();
        expected.sort_by_key(|(k, _)| *k);
        let expected: Vec<Vec<Value>> = expected
            .iter()
            .map(|(k, v)| vec![Value::text(format!("k{k}")), Value::number(*v as f64)])
            .collect();
        prop_assert_eq!(values_of(&result), expected);
    }
}
