#![forbid(unsafe_code)]

//! An in-memory analytical query engine over typed data tables.
//!
//! A [`Query`], built by an external parser or programmatically, is
//! validated against a [`gridquery_model::DataTable`]'s schema and executed
//! by a [`QueryEngine`] through a fixed pipeline:
//! filter → group+pivot → sort → skip → paginate → select → label → format.
//!
//! [`split`] partitions a query between a capable data source and the
//! engine so only the part the source cannot run is completed here.
//!
//! ```
//! use gridquery_engine::{AbstractColumn, AggregationOp, Query, QueryEngine};
//! use gridquery_model::{ColumnDescription, DataTable, Locale, TableRow, Value, ValueType};
//!
//! let mut table = DataTable::new();
//! table.add_columns([
//!     ColumnDescription::new("name", ValueType::Text, "Name"),
//!     ColumnDescription::new("amount", ValueType::Number, "Amount"),
//! ])?;
//! table.add_row(TableRow::from_iter([Value::text("a"), Value::number(2.0)]))?;
//!
//! let mut query = Query::new();
//! query
//!     .set_selection(vec![
//!         AbstractColumn::simple("name"),
//!         AbstractColumn::aggregation("amount", AggregationOp::Sum),
//!     ])
//!     .set_group_by(vec![AbstractColumn::simple("name")]);
//!
//! let result = QueryEngine::new(Locale::en_us()).execute(&query, &table)?;
//! assert_eq!(result.num_columns(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod datasource;
pub mod error;
pub mod exec;
pub mod query;
pub mod splitter;

pub use datasource::{execute_with_source, DataSource, InMemoryDataSource};
pub use error::{InvalidQueryReason, QueryError, QueryResult};
pub use exec::lookup::{ColumnLookup, DataTableColumnLookup, GenericColumnLookup};
pub use exec::QueryEngine;
pub use query::column::{
    AbstractColumn, AggregationColumn, AggregationOp, ScalarFunctionColumn, SimpleColumn,
};
pub use query::filter::{ComparisonOp, LogicalOp, QueryFilter};
pub use query::scalar::{ArithmeticOp, EvalContext, ScalarFunction, TimeComponent};
pub use query::{ColumnSort, Query, QueryOptions, SortOrder};
pub use splitter::{split, Capability, QuerySplit};
