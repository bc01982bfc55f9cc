use thiserror::Error;

use crate::ValueType;

/// Errors raised by the data-table model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("column {column:?} expects {expected:?} but got a {actual:?} value")]
    TypeMismatch {
        column: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("duplicate column id: {0}")]
    DuplicateColumnId(String),

    #[error("no such column: {0}")]
    NoSuchColumn(String),

    #[error("row has {got} cells but the table has {expected} columns")]
    RowTooWide { expected: usize, got: usize },

    #[error("invalid date: {year}-{month}-{day}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    #[error("invalid time of day: {hour}:{minute}:{second}.{millisecond}")]
    InvalidTimeOfDay {
        hour: u32,
        minute: u32,
        second: u32,
        millisecond: u32,
    },
}
