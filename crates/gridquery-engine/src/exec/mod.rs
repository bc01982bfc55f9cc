//! The execution pipeline: filter → group+pivot → sort → skip → paginate →
//! select → label → format → options.

pub(crate) mod aggregation;
pub(crate) mod grouping;
pub mod lookup;

use std::cmp::Ordering;

use chrono::NaiveDateTime;

use gridquery_format::Formatter;
use gridquery_model::{
    ColumnDescription, DataTable, Locale, ReasonCode, TableCell, TableRow, Value, ValueComparator,
    ValueType, Warning,
};

use crate::error::{QueryError, QueryResult};
use crate::query::column::AbstractColumn;
use crate::query::scalar::EvalContext;
use crate::query::Query;
use grouping::{group_and_pivot, ColumnIndices};
use lookup::{ColumnLookup, DataTableColumnLookup};

/// The engine handle: the user-facing locale plus an optional pinned clock.
///
/// One instance serves one query at a time; concurrent queries use separate
/// instances. Tests construct a fresh handle with a pinned clock instead of
/// relying on any process-global state.
#[derive(Debug, Clone, Default)]
pub struct QueryEngine {
    locale: Locale,
    now_override: Option<NaiveDateTime>,
}

impl QueryEngine {
    pub fn new(locale: Locale) -> Self {
        Self {
            locale,
            now_override: None,
        }
    }

    /// Pins the clock seen by `now()` for this engine.
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now_override = Some(now);
        self
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Validates and executes `query` over `table`, returning a new table.
    pub fn execute(&self, query: &Query, table: &DataTable) -> QueryResult<DataTable> {
        query.validate(table)?;

        let ctx = match self.now_override {
            Some(now) => EvalContext::with_now(now),
            None => EvalContext::new(),
        };

        let mut working = apply_filter(table, query, &ctx)?;
        working.set_locale(self.locale);

        let (mut working, indices) = match group_and_pivot(&working, query, &ctx)? {
            Some(output) => (output.table, Some(output.indices)),
            None => (working, None),
        };

        apply_sort(&mut working, query, indices.as_ref(), self.locale, &ctx)?;
        apply_skipping(&mut working, query);
        apply_pagination(&mut working, query);
        let (mut working, indices) = apply_selection(working, indices, query, &ctx)?;
        apply_labels(&mut working, &indices, query);
        apply_formats(&mut working, &indices, query, self.locale)?;
        apply_options(&mut working, query);

        Ok(working)
    }
}

fn apply_filter(table: &DataTable, query: &Query, ctx: &EvalContext) -> QueryResult<DataTable> {
    let mut out = table.clone();
    if let Some(filter) = query.filter() {
        let mut kept = Vec::new();
        for row in table.rows() {
            if filter.is_match(table, row, ctx)? {
                kept.push(row.clone());
            }
        }
        out.set_rows(kept);
    }
    Ok(out)
}

fn apply_sort(
    table: &mut DataTable,
    query: &Query,
    indices: Option<&ColumnIndices>,
    locale: Locale,
    ctx: &EvalContext,
) -> QueryResult<()> {
    let Some(sort) = query.sort() else {
        return Ok(());
    };

    let comparator = ValueComparator::new(locale);
    let rows = table.take_rows();

    let mut keyed = {
        let generic;
        let raw;
        let lookup: &dyn ColumnLookup = match indices {
            Some(indices) => {
                generic = indices.first_position_lookup();
                &generic
            }
            None => {
                raw = DataTableColumnLookup::new(table);
                &raw
            }
        };

        let mut keyed: Vec<(Vec<Value>, TableRow)> = Vec::with_capacity(rows.len());
        for row in rows {
            let mut key = Vec::with_capacity(sort.len());
            for entry in sort {
                key.push(entry.column.value(lookup, &row, ctx)?);
            }
            keyed.push((key, row));
        }
        keyed
    };

    keyed.sort_by(|(a, _), (b, _)| {
        for ((left, right), entry) in a.iter().zip(b.iter()).zip(sort.iter()) {
            let mut ord = comparator.compare(left, right);
            if matches!(entry.order, crate::query::SortOrder::Descending) {
                ord = ord.reverse();
            }
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    table.set_rows(keyed.into_iter().map(|(_, row)| row).collect());
    Ok(())
}

fn apply_skipping(table: &mut DataTable, query: &Query) {
    let k = query.skipping();
    if k < 2 {
        return;
    }
    let rows = table.take_rows();
    table.set_rows(rows.into_iter().step_by(k as usize).collect());
}

fn apply_pagination(table: &mut DataTable, query: &Query) {
    let n = table.num_rows();
    let offset = usize::try_from(query.row_offset()).unwrap_or(usize::MAX);
    let start = offset.min(n);
    let end = match query.row_limit() {
        Some(limit) => {
            let limit = usize::try_from(limit).unwrap_or(usize::MAX);
            n.min(offset.saturating_add(limit))
        }
        None => n,
    };

    if end < n {
        table.add_warning(Warning::new(
            ReasonCode::DataTruncated,
            "output was truncated by LIMIT/OFFSET",
        ));
    }
    if start == 0 && end == n {
        return;
    }
    let rows = table.take_rows();
    table.set_rows(rows.into_iter().skip(start).take(end - start).collect());
}

fn apply_selection(
    table: DataTable,
    indices: Option<ColumnIndices>,
    query: &Query,
    ctx: &EvalContext,
) -> QueryResult<(DataTable, ColumnIndices)> {
    let base_indices = indices.unwrap_or_else(|| ColumnIndices::identity_of(&table));
    let Some(selection) = query.selection() else {
        return Ok((table, base_indices));
    };

    enum Plan {
        Copy(Vec<usize>),
        Compute(ValueType),
    }

    let mut plans: Vec<(&AbstractColumn, Plan)> = Vec::with_capacity(selection.len());
    for column in selection {
        let id = column.id();
        if let Some(positions) = base_indices.positions(&id) {
            plans.push((column, Plan::Copy(positions.to_vec())));
        } else if let Some(position) = table.column_index(&id) {
            plans.push((column, Plan::Copy(vec![position])));
        } else {
            // Not materialized by any earlier stage: computed at select time.
            plans.push((column, Plan::Compute(column.value_type(&table)?)));
        }
    }

    let mut out = DataTable::with_locale(table.locale());
    for warning in table.warnings() {
        out.add_warning(warning.clone());
    }
    for (key, value) in table.custom_properties() {
        out.set_custom_property(key.clone(), value.clone());
    }

    let mut new_indices = ColumnIndices::default();
    for (column, plan) in &plans {
        match plan {
            Plan::Copy(positions) => {
                for &position in positions {
                    let description = table
                        .column(position)
                        .ok_or_else(|| {
                            QueryError::Internal(format!("no column at position {position}"))
                        })?
                        .clone();
                    let output_id = description.id.clone();
                    let output_position = out.num_columns();
                    out.add_column(description)
                        .map_err(|e| QueryError::Internal(e.to_string()))?;
                    new_indices.put(column.id(), output_position);
                    if let Some(prefix) = base_indices.label_prefix(&output_id) {
                        new_indices.set_label_prefix(output_id, prefix.to_string());
                    }
                }
            }
            Plan::Compute(value_type) => {
                let id = column.id();
                let output_position = out.num_columns();
                out.add_column(ColumnDescription::new(id.clone(), *value_type, id.clone()))
                    .map_err(|e| QueryError::Internal(e.to_string()))?;
                new_indices.put(id, output_position);
            }
        }
    }

    let lookup = DataTableColumnLookup::new(&table);
    let mut rows = Vec::with_capacity(table.num_rows());
    for row in table.rows() {
        let mut cells = Vec::with_capacity(out.num_columns());
        for (column, plan) in &plans {
            match plan {
                Plan::Copy(positions) => {
                    for &position in positions {
                        let cell = row.cell(position).ok_or_else(|| {
                            QueryError::Internal(format!("row has no cell at {position}"))
                        })?;
                        cells.push(cell.clone());
                    }
                }
                Plan::Compute(_) => {
                    cells.push(TableCell::new(column.value(&lookup, row, ctx)?));
                }
            }
        }
        rows.push(TableRow {
            cells,
            custom_properties: row.custom_properties.clone(),
        });
    }
    out.set_rows(rows);

    Ok((out, new_indices))
}

fn apply_labels(table: &mut DataTable, indices: &ColumnIndices, query: &Query) {
    for (column, label) in query.labels() {
        let Some(positions) = indices.positions(&column.id()) else {
            continue;
        };
        for &position in positions {
            let Some(output_id) = table.column(position).map(|c| c.id.clone()) else {
                continue;
            };
            let composed = match indices.label_prefix(&output_id) {
                Some(prefix) => format!("{prefix} {label}"),
                None => label.clone(),
            };
            if let Some(description) = table.column_mut(position) {
                description.label = composed;
            }
        }
    }
}

fn apply_formats(
    table: &mut DataTable,
    indices: &ColumnIndices,
    query: &Query,
    locale: Locale,
) -> QueryResult<()> {
    if query.options().no_format {
        for row in table.rows_mut() {
            for cell in &mut row.cells {
                cell.formatted_value = None;
            }
        }
        return Ok(());
    }

    // FORMAT-clause patterns; a pattern that does not compile is reported as
    // a warning and that column is skipped.
    for (column, pattern) in query.user_formats() {
        let Some(positions) = indices.positions(&column.id()) else {
            continue;
        };
        let Some(&first) = positions.first() else {
            continue;
        };
        let value_type = match table.column(first) {
            Some(description) => description.value_type,
            None => continue,
        };
        match Formatter::compile(Some(pattern.as_str()), value_type, locale) {
            Ok(formatter) => {
                for &position in positions {
                    if let Some(description) = table.column_mut(position) {
                        description.pattern = Some(pattern.clone());
                    }
                    for row in table.rows_mut() {
                        if let Some(cell) = row.cells.get_mut(position) {
                            cell.formatted_value = Some(formatter.format(&cell.value));
                        }
                    }
                }
            }
            Err(err) => {
                log::warn!(
                    "format pattern {pattern:?} for column {:?} did not compile: {err}",
                    column.id()
                );
                table.add_warning(Warning::new(
                    ReasonCode::IllegalFormattingPatterns,
                    format!("invalid format pattern {pattern:?} for column {:?}", column.id()),
                ));
            }
        }
    }

    // Every remaining cell gets formatted text from its column's declared
    // pattern, falling back to the type default.
    for position in 0..table.num_columns() {
        let (value_type, declared) = match table.column(position) {
            Some(description) => (description.value_type, description.pattern.clone()),
            None => continue,
        };
        let formatter = match Formatter::compile(declared.as_deref(), value_type, locale) {
            Ok(formatter) => formatter,
            Err(err) => {
                log::warn!(
                    "declared pattern {declared:?} did not compile ({err}); using the {} default",
                    value_type
                );
                Formatter::compile(None, value_type, locale)
                    .map_err(|e| QueryError::Internal(e.to_string()))?
            }
        };
        for row in table.rows_mut() {
            if let Some(cell) = row.cells.get_mut(position) {
                if cell.formatted_value.is_none() {
                    cell.formatted_value = Some(formatter.format(&cell.value));
                }
            }
        }
    }

    Ok(())
}

fn apply_options(table: &mut DataTable, query: &Query) {
    if query.options().no_values {
        let types: Vec<ValueType> = table.columns().iter().map(|c| c.value_type).collect();
        for row in table.rows_mut() {
            for (cell, value_type) in row.cells.iter_mut().zip(types.iter()) {
                cell.value = Value::null_of(*value_type);
            }
        }
    }
}
