use std::collections::HashMap;

use gridquery_model::DataTable;

use crate::query::column::AbstractColumn;

/// Maps an abstract column to its positional index at the current pipeline
/// stage. Generated column ids are the stable identities, so all lookups key
/// off [`AbstractColumn::id`].
pub trait ColumnLookup {
    fn column_index(&self, column: &AbstractColumn) -> Option<usize>;

    fn contains(&self, column: &AbstractColumn) -> bool {
        self.column_index(column).is_some()
    }
}

/// Lookup over a raw table: a column is addressable iff a table column with
/// its generated id exists.
#[derive(Debug, Clone, Copy)]
pub struct DataTableColumnLookup<'a> {
    table: &'a DataTable,
}

impl<'a> DataTableColumnLookup<'a> {
    pub fn new(table: &'a DataTable) -> Self {
        Self { table }
    }
}

impl ColumnLookup for DataTableColumnLookup<'_> {
    fn column_index(&self, column: &AbstractColumn) -> Option<usize> {
        self.table.column_index(&column.id())
    }
}

/// An explicit id → index dictionary, populated by the engine as it reshapes
/// the table across stages (and per pivot vector after group+pivot).
#[derive(Debug, Clone, Default)]
pub struct GenericColumnLookup {
    indexes: HashMap<String, usize>,
}

impl GenericColumnLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, column_id: impl Into<String>, index: usize) {
        self.indexes.insert(column_id.into(), index);
    }

    pub fn index_of_id(&self, column_id: &str) -> Option<usize> {
        self.indexes.get(column_id).copied()
    }
}

impl ColumnLookup for GenericColumnLookup {
    fn column_index(&self, column: &AbstractColumn) -> Option<usize> {
        self.indexes.get(&column.id()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::column::AggregationOp;
    use gridquery_model::{ColumnDescription, ValueType};
    use pretty_assertions::assert_eq;

    #[test]
    fn table_lookup_resolves_by_generated_id() {
        let mut table = DataTable::new();
        table
            .add_columns([
                ColumnDescription::new("a", ValueType::Number, "A"),
                // A materialized aggregation output from a previous stage.
                ColumnDescription::new("sum-a", ValueType::Number, "sum-a"),
            ])
            .unwrap();
        let lookup = DataTableColumnLookup::new(&table);
        assert_eq!(lookup.column_index(&AbstractColumn::simple("a")), Some(0));
        assert_eq!(
            lookup.column_index(&AbstractColumn::aggregation("a", AggregationOp::Sum)),
            Some(1)
        );
        assert_eq!(lookup.column_index(&AbstractColumn::simple("b")), None);
    }

    #[test]
    fn generic_lookup_is_an_explicit_dictionary() {
        let mut lookup = GenericColumnLookup::new();
        lookup.put("min-v", 3);
        assert!(lookup.contains(&AbstractColumn::aggregation("v", AggregationOp::Min)));
        assert_eq!(
            lookup.column_index(&AbstractColumn::aggregation("v", AggregationOp::Max)),
            None
        );
    }
}
