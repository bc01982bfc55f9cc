#![forbid(unsafe_code)]

//! `gridquery-model` defines the typed value and data-table model shared by
//! the query engine and its collaborators.
//!
//! The crate is intentionally self-contained so it can be reused by:
//! - the query engine (validation, execution, splitting)
//! - renderers and data-source adapters
//! - IPC boundaries via `serde` (JSON-safe schema)

mod error;
mod locale;
mod table;
mod value;

pub use error::ModelError;
pub use locale::{Locale, ValueComparator};
pub use table::{
    ColumnDescription, DataTable, ReasonCode, TableCell, TableRow, Warning,
};
pub use value::{ParseValueTypeError, Value, ValueType};
