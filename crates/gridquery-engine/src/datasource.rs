//! Gluing a capability-tagged backend to the engine.
//!
//! A backend advertises what it can execute itself via [`Capability`];
//! [`execute_with_source`] splits an incoming query accordingly, lets the
//! backend run its half, and completes the remainder in the engine.

use gridquery_model::DataTable;

use crate::error::QueryResult;
use crate::exec::QueryEngine;
use crate::query::Query;
use crate::splitter::{split, Capability};

/// A backend that can hand the engine a table, possibly after executing a
/// data-source query of its own.
pub trait DataSource {
    /// The share of the query language this backend executes itself.
    fn capability(&self) -> Capability;

    /// Produces the backend's table. `query` is the data-source half of a
    /// split; `None` means the backend should return its table unchanged.
    fn table(&mut self, query: Option<&Query>) -> QueryResult<DataTable>;
}

/// Runs `query` against `source`, completing in the engine whatever the
/// backend could not execute itself.
pub fn execute_with_source(
    engine: &QueryEngine,
    query: &Query,
    source: &mut dyn DataSource,
) -> QueryResult<DataTable> {
    let split = split(query, source.capability());
    let table = source.table(split.data_source_query.as_ref())?;
    engine.execute(&split.completion_query, &table)
}

/// The simplest backend: a table held in memory, with no execution ability
/// of its own.
#[derive(Debug, Clone)]
pub struct InMemoryDataSource {
    table: DataTable,
}

impl InMemoryDataSource {
    pub fn new(table: DataTable) -> Self {
        Self { table }
    }
}

impl DataSource for InMemoryDataSource {
    fn capability(&self) -> Capability {
        Capability::None
    }

    fn table(&mut self, _query: Option<&Query>) -> QueryResult<DataTable> {
        Ok(self.table.clone())
    }
}
