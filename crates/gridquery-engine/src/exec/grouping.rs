//! The group+pivot stage: keys rows by the group and pivot columns, folds
//! aggregates through the aggregation tree, and emits the reshaped table.

use std::collections::HashMap;

use gridquery_model::{
    ColumnDescription, DataTable, TableCell, TableRow, Value, ValueComparator, ValueType,
};

use crate::error::{QueryError, QueryResult};
use crate::exec::aggregation::AggregationTree;
use crate::exec::lookup::{DataTableColumnLookup, GenericColumnLookup};
use crate::query::column::AbstractColumn;
use crate::query::scalar::EvalContext;
use crate::query::Query;

/// Where each abstract column landed in the current table: one position per
/// pivot vector (in pivot order), plus the pivot label prefix of every
/// synthesized output column.
#[derive(Debug, Clone, Default)]
pub(crate) struct ColumnIndices {
    positions: HashMap<String, Vec<usize>>,
    label_prefixes: HashMap<String, String>,
}

impl ColumnIndices {
    /// Identity mapping over a table's own columns.
    pub fn identity_of(table: &DataTable) -> Self {
        let mut indices = Self::default();
        for (position, column) in table.columns().iter().enumerate() {
            indices.put(column.id.clone(), position);
        }
        indices
    }

    pub fn put(&mut self, column_id: impl Into<String>, position: usize) {
        self.positions
            .entry(column_id.into())
            .or_default()
            .push(position);
    }

    /// Registers a column with no positions yet (e.g. an aggregation under a
    /// pivot that observed no data).
    pub fn ensure(&mut self, column_id: impl Into<String>) {
        self.positions.entry(column_id.into()).or_default();
    }

    pub fn positions(&self, column_id: &str) -> Option<&[usize]> {
        self.positions.get(column_id).map(Vec::as_slice)
    }

    pub fn set_label_prefix(&mut self, output_column_id: impl Into<String>, prefix: String) {
        self.label_prefixes.insert(output_column_id.into(), prefix);
    }

    pub fn label_prefix(&self, output_column_id: &str) -> Option<&str> {
        self.label_prefixes.get(output_column_id).map(String::as_str)
    }

    /// A lookup resolving each column to its first position; used by the
    /// sort stage, where pivoted aggregations are excluded by validation.
    pub fn first_position_lookup(&self) -> GenericColumnLookup {
        let mut lookup = GenericColumnLookup::new();
        for (id, positions) in &self.positions {
            if let Some(&first) = positions.first() {
                lookup.put(id.clone(), first);
            }
        }
        lookup
    }
}

pub(crate) struct GroupingOutput {
    pub table: DataTable,
    pub indices: ColumnIndices,
}

/// Runs grouping and pivoting. Returns `None` when the selection has no
/// aggregations, in which case the stage is an identity.
pub(crate) fn group_and_pivot(
    table: &DataTable,
    query: &Query,
    ctx: &EvalContext,
) -> QueryResult<Option<GroupingOutput>> {
    let aggregations = query.selected_aggregations();
    if aggregations.is_empty() {
        return Ok(None);
    }

    let locale = table.locale();
    let group_columns = query.group_by().unwrap_or(&[]);
    let pivot_columns = query.pivot().unwrap_or(&[]);
    let scalar_agg_columns = query.selected_scalar_aggregation_columns();

    let mut key_columns: Vec<AbstractColumn> = Vec::with_capacity(
        group_columns.len() + pivot_columns.len(),
    );
    key_columns.extend(group_columns.iter().cloned());
    key_columns.extend(pivot_columns.iter().cloned());

    let staging = build_staging(table, &key_columns, ctx)?;

    // Distinct aggregation targets with their declared types.
    let mut targets: Vec<(String, ValueType)> = Vec::new();
    for agg in &aggregations {
        let id = agg.target().id().to_string();
        if !targets.iter().any(|(existing, _)| *existing == id) {
            let ty = table
                .column_by_id(&id)
                .ok_or_else(|| QueryError::Internal(format!("missing aggregation target {id:?}")))?
                .value_type;
            targets.push((id, ty));
        }
    }

    let key_indexes: Vec<usize> = key_columns
        .iter()
        .map(|c| {
            staging.column_index(&c.id()).ok_or_else(|| {
                QueryError::Internal(format!("key column {:?} not staged", c.id()))
            })
        })
        .collect::<QueryResult<Vec<_>>>()?;
    let target_indexes: Vec<(String, usize)> = targets
        .iter()
        .map(|(id, _)| {
            staging
                .column_index(id)
                .map(|index| (id.clone(), index))
                .ok_or_else(|| QueryError::Internal(format!("missing target column {id:?}")))
        })
        .collect::<QueryResult<Vec<_>>>()?;

    let mut tree = AggregationTree::new(targets.clone());
    for row in staging.rows() {
        let path: Vec<Value> = key_indexes
            .iter()
            .map(|&i| row.value(i).cloned().unwrap_or(Value::Text(None)))
            .collect();
        let values: HashMap<String, Value> = target_indexes
            .iter()
            .map(|(id, i)| {
                (
                    id.clone(),
                    row.value(*i).cloned().unwrap_or(Value::Text(None)),
                )
            })
            .collect();
        tree.aggregate(&path, &values);
    }

    // Row titles and pivot vectors, each sorted by the locale comparator.
    let comparator = ValueComparator::new(locale);
    let group_len = group_columns.len();
    let key_len = key_columns.len();
    let mut row_titles: Vec<Vec<Value>> = Vec::new();
    let mut pivot_vectors: Vec<Vec<Value>> = Vec::new();
    for path in tree.paths_to_leaves() {
        if path.len() != key_len {
            continue;
        }
        let row_title = path[..group_len].to_vec();
        let pivot_vector = path[group_len..].to_vec();
        if !row_titles.contains(&row_title) {
            row_titles.push(row_title);
        }
        if !pivot_vectors.contains(&pivot_vector) {
            pivot_vectors.push(pivot_vector);
        }
    }
    row_titles.sort_by(|a, b| comparator.compare_seq(a, b));
    if pivot_columns.is_empty() {
        pivot_vectors = vec![Vec::new()];
    } else {
        pivot_vectors.sort_by(|a, b| comparator.compare_seq(a, b));
    }

    let mut out = DataTable::with_locale(locale);
    for warning in table.warnings() {
        out.add_warning(warning.clone());
    }
    for (key, value) in table.custom_properties() {
        out.set_custom_property(key.clone(), value.clone());
    }

    let mut indices = ColumnIndices::default();

    for (position, column) in group_columns.iter().enumerate() {
        let description = staging
            .column_by_id(&column.id())
            .ok_or_else(|| {
                QueryError::Internal(format!("group column {:?} not staged", column.id()))
            })?
            .clone();
        out.add_column(description)
            .map_err(|e| QueryError::Internal(e.to_string()))?;
        indices.put(column.id(), position);
    }

    for agg in &aggregations {
        indices.ensure(agg.id());
    }
    for scalar in &scalar_agg_columns {
        indices.ensure(scalar.id());
    }

    // Aggregation output columns: pivot-vector-major, SELECT order within.
    let mut agg_result_types: HashMap<String, ValueType> = HashMap::new();
    for agg in &aggregations {
        agg_result_types.insert(agg.id(), agg.value_type(table)?);
    }
    let mut agg_positions: HashMap<(usize, String), usize> = HashMap::new();
    for (pivot_index, pivot_vector) in pivot_vectors.iter().enumerate() {
        for agg in &aggregations {
            let position = out.num_columns();
            let id = synthesized_id(pivot_vector, &agg.id());
            let label = synthesized_label(pivot_vector, &agg.id());
            let value_type = agg_result_types[&agg.id()];
            out.add_column(ColumnDescription::new(id.clone(), value_type, label))
                .map_err(|e| QueryError::Internal(e.to_string()))?;
            indices.put(agg.id(), position);
            if !pivot_vector.is_empty() {
                indices.set_label_prefix(id, label_prefix(pivot_vector));
            }
            agg_positions.insert((pivot_index, agg.id()), position);
        }
    }

    let mut rows: Vec<TableRow> = Vec::with_capacity(row_titles.len());
    for row_title in &row_titles {
        let mut cells: Vec<TableCell> =
            row_title.iter().cloned().map(TableCell::new).collect();
        for pivot_vector in &pivot_vectors {
            for agg in &aggregations {
                let mut path = row_title.clone();
                path.extend(pivot_vector.iter().cloned());
                let value = tree
                    .value_at(&path, agg.target().id(), agg.op())
                    .unwrap_or_else(|| Value::null_of(agg_result_types[&agg.id()]));
                cells.push(TableCell::new(value));
            }
        }
        rows.push(TableRow::new(cells));
    }

    // Scalar functions over aggregations, computed per pivot vector through
    // a lookup scoped to that vector's aggregation columns.
    for (pivot_index, pivot_vector) in pivot_vectors.iter().enumerate() {
        let mut scoped = GenericColumnLookup::new();
        for (position, column) in group_columns.iter().enumerate() {
            scoped.put(column.id(), position);
        }
        for agg in &aggregations {
            scoped.put(agg.id(), agg_positions[&(pivot_index, agg.id())]);
        }
        for scalar in &scalar_agg_columns {
            let column = AbstractColumn::ScalarFunction(scalar.clone());
            let position = out.num_columns();
            let id = synthesized_id(pivot_vector, &scalar.id());
            let label = synthesized_label(pivot_vector, &scalar.id());
            let value_type = column.value_type(table)?;
            out.add_column(ColumnDescription::new(id.clone(), value_type, label))
                .map_err(|e| QueryError::Internal(e.to_string()))?;
            indices.put(scalar.id(), position);
            if !pivot_vector.is_empty() {
                indices.set_label_prefix(id, label_prefix(pivot_vector));
            }
            for row in &mut rows {
                let value = column.value(&scoped, row, ctx)?;
                row.cells.push(TableCell::new(value));
            }
        }
    }

    out.set_rows(rows);
    Ok(Some(GroupingOutput {
        table: out,
        indices,
    }))
}

/// Materializes scalar-function group/pivot columns as appended columns so
/// their values are available for keying. Rows whose key computation fails
/// are dropped from the staging table.
fn build_staging(
    table: &DataTable,
    key_columns: &[AbstractColumn],
    ctx: &EvalContext,
) -> QueryResult<DataTable> {
    let appended: Vec<&AbstractColumn> = key_columns
        .iter()
        .filter(|c| table.column_index(&c.id()).is_none())
        .collect();
    if appended.is_empty() {
        return Ok(table.clone());
    }

    let mut staging = DataTable::with_locale(table.locale());
    for column in table.columns() {
        staging
            .add_column(column.clone())
            .map_err(|e| QueryError::Internal(e.to_string()))?;
    }
    let mut appended_types = Vec::with_capacity(appended.len());
    for column in &appended {
        let value_type = column.value_type(table)?;
        staging
            .add_column(ColumnDescription::new(column.id(), value_type, column.id()))
            .map_err(|e| QueryError::Internal(e.to_string()))?;
        appended_types.push(value_type);
    }

    let lookup = DataTableColumnLookup::new(table);
    let mut rows = Vec::with_capacity(table.num_rows());
    'rows: for row in table.rows() {
        let mut staged = row.clone();
        for (column, value_type) in appended.iter().zip(appended_types.iter()) {
            match column.value(&lookup, row, ctx) {
                Ok(value) if value.value_type() == *value_type => {
                    staged.cells.push(TableCell::new(value));
                }
                Ok(value) => {
                    log::warn!(
                        "dropping row: key column {:?} produced a {} value, expected {}",
                        column.id(),
                        value.value_type(),
                        value_type
                    );
                    continue 'rows;
                }
                Err(err) => {
                    log::warn!(
                        "dropping row: key column {:?} failed to evaluate: {err}",
                        column.id()
                    );
                    continue 'rows;
                }
            }
        }
        rows.push(staged);
    }
    staging.set_rows(rows);
    Ok(staging)
}

/// Synthesized id of a pivoted output column: `v1,v2,... base`.
fn synthesized_id(pivot_vector: &[Value], base: &str) -> String {
    if pivot_vector.is_empty() {
        return base.to_string();
    }
    let prefix = pivot_vector
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("{prefix} {base}")
}

/// The same pattern with spaces, used for labels: `v1 v2 ... base`.
fn synthesized_label(pivot_vector: &[Value], base: &str) -> String {
    if pivot_vector.is_empty() {
        return base.to_string();
    }
    format!("{} {base}", label_prefix(pivot_vector))
}

fn label_prefix(pivot_vector: &[Value]) -> String {
    pivot_vector
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
