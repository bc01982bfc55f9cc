use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Locale, ModelError, Value, ValueType};

/// Reason codes for non-fatal diagnostics attached to a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReasonCode {
    DataTruncated,
    IllegalFormattingPatterns,
    Timeout,
    Other,
}

impl ReasonCode {
    /// Stable wire spelling of the reason.
    pub const fn as_code(self) -> &'static str {
        match self {
            ReasonCode::DataTruncated => "DATA_TRUNCATED",
            ReasonCode::IllegalFormattingPatterns => "ILLEGAL_FORMATTING_PATTERNS",
            ReasonCode::Timeout => "TIMEOUT",
            ReasonCode::Other => "OTHER",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// A non-fatal diagnostic accumulated on an output table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub reason: ReasonCode,
    pub message: String,
}

impl Warning {
    pub fn new(reason: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Per-column schema: id, type, label, optional formatting pattern, and
/// free-form custom properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescription {
    pub id: String,
    pub value_type: ValueType,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_properties: HashMap<String, String>,
}

impl ColumnDescription {
    pub fn new(id: impl Into<String>, value_type: ValueType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value_type,
            label: label.into(),
            pattern: None,
            custom_properties: HashMap::new(),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn set_custom_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom_properties.insert(key.into(), value.into());
    }
}

/// A single cell: a typed value, optional pre-rendered text, and custom
/// properties. A null value with non-empty formatted text is legal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_value: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_properties: HashMap<String, String>,
}

impl TableCell {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            formatted_value: None,
            custom_properties: HashMap::new(),
        }
    }

    pub fn with_formatted_value(mut self, text: impl Into<String>) -> Self {
        self.formatted_value = Some(text.into());
        self
    }

    pub fn null_of(value_type: ValueType) -> Self {
        Self::new(Value::null_of(value_type))
    }
}

impl From<Value> for TableCell {
    fn from(value: Value) -> Self {
        TableCell::new(value)
    }
}

/// An ordered row of cells plus custom properties.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub cells: Vec<TableCell>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_properties: HashMap<String, String>,
}

impl TableRow {
    pub fn new(cells: Vec<TableCell>) -> Self {
        Self {
            cells,
            custom_properties: HashMap::new(),
        }
    }

    pub fn cell(&self, index: usize) -> Option<&TableCell> {
        self.cells.get(index)
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.cells.get(index).map(|c| &c.value)
    }
}

impl<C: Into<TableCell>> FromIterator<C> for TableRow {
    fn from_iter<T: IntoIterator<Item = C>>(iter: T) -> Self {
        TableRow::new(iter.into_iter().map(Into::into).collect())
    }
}

/// An ordered set of typed columns and rows, with warnings, a user-facing
/// locale, and table-level custom properties.
///
/// Column ids are unique; every row has exactly one cell per column whose
/// value is of the column's type (or that type's null).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTable {
    columns: Vec<ColumnDescription>,
    #[serde(skip)]
    column_index: HashMap<String, usize>,
    rows: Vec<TableRow>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<Warning>,
    #[serde(default)]
    locale: Locale,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    custom_properties: HashMap<String, String>,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locale(locale: Locale) -> Self {
        Self {
            locale,
            ..Self::default()
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn set_locale(&mut self, locale: Locale) {
        self.locale = locale;
    }

    /// Appends a column. Fails if the id is already present.
    pub fn add_column(&mut self, column: ColumnDescription) -> Result<(), ModelError> {
        if self.column_index.contains_key(&column.id) {
            return Err(ModelError::DuplicateColumnId(column.id));
        }
        self.column_index
            .insert(column.id.clone(), self.columns.len());
        self.columns.push(column);
        Ok(())
    }

    pub fn add_columns(
        &mut self,
        columns: impl IntoIterator<Item = ColumnDescription>,
    ) -> Result<(), ModelError> {
        for column in columns {
            self.add_column(column)?;
        }
        Ok(())
    }

    /// Appends a row, padding missing trailing cells with typed nulls.
    ///
    /// A row wider than the column list, or a cell whose value type differs
    /// from its column's type, is rejected.
    pub fn add_row(&mut self, mut row: TableRow) -> Result<(), ModelError> {
        if row.cells.len() > self.columns.len() {
            return Err(ModelError::RowTooWide {
                expected: self.columns.len(),
                got: row.cells.len(),
            });
        }
        for (cell, column) in row.cells.iter().zip(self.columns.iter()) {
            if cell.value.value_type() != column.value_type {
                return Err(ModelError::TypeMismatch {
                    column: column.id.clone(),
                    expected: column.value_type,
                    actual: cell.value.value_type(),
                });
            }
        }
        for column in self.columns.iter().skip(row.cells.len()) {
            row.cells.push(TableCell::null_of(column.value_type));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn add_rows(
        &mut self,
        rows: impl IntoIterator<Item = TableRow>,
    ) -> Result<(), ModelError> {
        for row in rows {
            self.add_row(row)?;
        }
        Ok(())
    }

    pub fn columns(&self) -> &[ColumnDescription] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&ColumnDescription> {
        self.columns.get(index)
    }

    pub fn column_mut(&mut self, index: usize) -> Option<&mut ColumnDescription> {
        self.columns.get_mut(index)
    }

    pub fn column_index(&self, id: &str) -> Option<usize> {
        self.column_index.get(id).copied()
    }

    pub fn column_by_id(&self, id: &str) -> Option<&ColumnDescription> {
        self.column_index(id).and_then(|idx| self.columns.get(idx))
    }

    pub fn contains_column(&self, id: &str) -> bool {
        self.column_index.contains_key(id)
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [TableRow] {
        &mut self.rows
    }

    /// Replaces the row list wholesale. The caller guarantees the rows came
    /// from this table (filter/sort/slice stages), so no type re-check runs.
    pub fn set_rows(&mut self, rows: Vec<TableRow>) {
        self.rows = rows;
    }

    /// Moves the rows out, leaving the table empty of rows.
    pub fn take_rows(&mut self) -> Vec<TableRow> {
        std::mem::take(&mut self.rows)
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&TableCell> {
        self.rows.get(row).and_then(|r| r.cells.get(column))
    }

    pub fn add_warning(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn custom_properties(&self) -> &HashMap<String, String> {
        &self.custom_properties
    }

    pub fn set_custom_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom_properties.insert(key.into(), value.into());
    }

    /// Rebuilds the id→index map; used after deserialization, where the
    /// index is not part of the payload.
    pub fn rebuild_index(&mut self) {
        self.column_index = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.id.clone(), idx))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn two_column_table() -> DataTable {
        let mut table = DataTable::new();
        table
            .add_columns([
                ColumnDescription::new("name", ValueType::Text, "Name"),
                ColumnDescription::new("amount", ValueType::Number, "Amount"),
            ])
            .unwrap();
        table
    }

    #[test]
    fn duplicate_column_ids_are_rejected() {
        let mut table = two_column_table();
        let err = table
            .add_column(ColumnDescription::new("name", ValueType::Text, "Name"))
            .unwrap_err();
        assert_eq!(err, ModelError::DuplicateColumnId("name".to_string()));
    }

    #[test]
    fn short_rows_are_padded_with_typed_nulls() {
        let mut table = two_column_table();
        table
            .add_row(TableRow::from_iter([Value::text("a")]))
            .unwrap();
        assert_eq!(
            table.cell(0, 1).unwrap().value,
            Value::null_of(ValueType::Number)
        );
    }

    #[test]
    fn wide_and_mistyped_rows_are_rejected() {
        let mut table = two_column_table();
        assert!(matches!(
            table.add_row(TableRow::from_iter([
                Value::text("a"),
                Value::number(1.0),
                Value::number(2.0),
            ])),
            Err(ModelError::RowTooWide { .. })
        ));
        assert!(matches!(
            table.add_row(TableRow::from_iter([
                Value::number(1.0),
                Value::number(1.0)
            ])),
            Err(ModelError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn null_cell_may_carry_formatted_text() {
        let mut table = two_column_table();
        let row = TableRow::new(vec![
            TableCell::new(Value::text("a")),
            TableCell::null_of(ValueType::Number).with_formatted_value("N/A"),
        ]);
        table.add_row(row).unwrap();
        let cell = table.cell(0, 1).unwrap();
        assert!(cell.value.is_null());
        assert_eq!(cell.formatted_value.as_deref(), Some("N/A"));
    }

    #[test]
    fn custom_properties_live_at_every_level() {
        let mut table = two_column_table();
        table.set_custom_property("source", "unit-test");
        let mut row = TableRow::from_iter([Value::text("a")]);
        row.custom_properties.insert("flag".into(), "1".into());
        table.add_row(row).unwrap();

        assert_eq!(
            table.custom_properties().get("source").map(String::as_str),
            Some("unit-test")
        );
        assert_eq!(
            table.rows()[0].custom_properties.get("flag").map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn take_rows_empties_the_table() {
        let mut table = two_column_table();
        table
            .add_row(TableRow::from_iter([Value::text("a"), Value::number(1.0)]))
            .unwrap();
        let rows = table.take_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(table.num_rows(), 0);
        table.set_rows(rows);
        assert_eq!(table.num_rows(), 1);
    }

    #[test]
    fn serde_roundtrip_rebuilds_the_index() {
        let mut table = two_column_table();
        table
            .add_row(TableRow::from_iter([Value::text("a"), Value::number(1.0)]))
            .unwrap();
        let json = serde_json::to_string(&table).unwrap();
        let mut back: DataTable = serde_json::from_str(&json).unwrap();
        back.rebuild_index();
        assert_eq!(back, table);
        assert_eq!(back.column_index("amount"), Some(1));
    }
}
