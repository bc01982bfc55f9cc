use serde::{Deserialize, Serialize};

use gridquery_model::{DataTable, TableRow, Value, ValueType};

use crate::error::{InvalidQueryReason, QueryError, QueryResult};
use crate::exec::lookup::ColumnLookup;
use crate::query::scalar::{EvalContext, ScalarFunction};

/// A reference to a table column by id. Ids are backtick-quoted in query
/// strings and therefore must not contain a backtick themselves.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimpleColumn {
    id: String,
}

impl SimpleColumn {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        assert!(
            !id.contains('`'),
            "column id must not contain a backtick: {id:?}"
        );
        Self { id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn to_query_string(&self) -> String {
        format!("`{}`", self.id)
    }
}

/// Aggregation operators applicable to a simple column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregationOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregationOp {
    pub const fn code(self) -> &'static str {
        match self {
            AggregationOp::Count => "count",
            AggregationOp::Sum => "sum",
            AggregationOp::Avg => "avg",
            AggregationOp::Min => "min",
            AggregationOp::Max => "max",
        }
    }

    /// COUNT/MIN/MAX accept any type; SUM/AVG only numbers.
    pub fn validate_target_type(self, target: ValueType, column_id: &str) -> QueryResult<()> {
        match self {
            AggregationOp::Sum | AggregationOp::Avg if target != ValueType::Number => {
                Err(QueryError::invalid(
                    InvalidQueryReason::AvgSumOnlyNumeric,
                    format!(
                        "cannot apply {} to the non-numeric column {column_id:?}",
                        self.code()
                    ),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Result type of the aggregate over a target of the given type.
    pub const fn result_type(self, target: ValueType) -> ValueType {
        match self {
            AggregationOp::Count | AggregationOp::Sum | AggregationOp::Avg => ValueType::Number,
            AggregationOp::Min | AggregationOp::Max => target,
        }
    }
}

/// An aggregation over a simple column, e.g. `sum(amount)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationColumn {
    column: SimpleColumn,
    op: AggregationOp,
}

impl AggregationColumn {
    pub fn new(column: SimpleColumn, op: AggregationOp) -> Self {
        Self { column, op }
    }

    /// Generated id, e.g. `sum-amount`. Stable across pipeline stages.
    pub fn id(&self) -> String {
        format!("{}-{}", self.op.code(), self.column.id())
    }

    pub fn target(&self) -> &SimpleColumn {
        &self.column
    }

    pub fn op(&self) -> AggregationOp {
        self.op
    }

    pub fn value_type(&self, table: &DataTable) -> QueryResult<ValueType> {
        let target = table
            .column_by_id(self.column.id())
            .ok_or_else(|| no_column(self.column.id()))?;
        Ok(self.op.result_type(target.value_type))
    }

    pub fn validate(&self, table: &DataTable) -> QueryResult<()> {
        let target = table
            .column_by_id(self.column.id())
            .ok_or_else(|| no_column(self.column.id()))?;
        self.op
            .validate_target_type(target.value_type, self.column.id())
    }

    pub fn to_query_string(&self) -> String {
        format!("{}({})", self.op.code(), self.column.to_query_string())
    }
}

/// A scalar function applied to other abstract columns; nesting is
/// unrestricted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalarFunctionColumn {
    function: ScalarFunction,
    arguments: Vec<AbstractColumn>,
}

impl ScalarFunctionColumn {
    pub fn new(function: ScalarFunction, arguments: Vec<AbstractColumn>) -> Self {
        Self {
            function,
            arguments,
        }
    }

    /// Generated id, e.g. `year_d` or `sum_a,b`.
    pub fn id(&self) -> String {
        let args = self
            .arguments
            .iter()
            .map(AbstractColumn::id)
            .collect::<Vec<_>>()
            .join(",");
        format!("{}_{}", self.function.name(), args)
    }

    pub fn function(&self) -> &ScalarFunction {
        &self.function
    }

    pub fn arguments(&self) -> &[AbstractColumn] {
        &self.arguments
    }

    pub fn value_type(&self, table: &DataTable) -> QueryResult<ValueType> {
        let arg_types = self
            .arguments
            .iter()
            .map(|a| a.value_type(table))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(self.function.return_type(&arg_types))
    }

    pub fn validate(&self, table: &DataTable) -> QueryResult<()> {
        let mut arg_types = Vec::with_capacity(self.arguments.len());
        for argument in &self.arguments {
            argument.validate(table)?;
            arg_types.push(argument.value_type(table)?);
        }
        self.function.validate(&arg_types)
    }

    pub fn to_query_string(&self) -> String {
        let args = self
            .arguments
            .iter()
            .map(AbstractColumn::to_query_string)
            .collect::<Vec<_>>();
        self.function.to_query_string(&args)
    }
}

/// A symbolic reference to a value extractable from a row: a plain column, an
/// aggregate over one, or a scalar function over other abstract columns.
///
/// Generated ids are the stable identities used to match columns across
/// pipeline stages, so they are derived purely from structure.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "column", rename_all = "camelCase")]
pub enum AbstractColumn {
    Simple(SimpleColumn),
    Aggregation(AggregationColumn),
    ScalarFunction(ScalarFunctionColumn),
}

impl AbstractColumn {
    pub fn simple(id: impl Into<String>) -> Self {
        AbstractColumn::Simple(SimpleColumn::new(id))
    }

    pub fn aggregation(id: impl Into<String>, op: AggregationOp) -> Self {
        AbstractColumn::Aggregation(AggregationColumn::new(SimpleColumn::new(id), op))
    }

    pub fn scalar_function(function: ScalarFunction, arguments: Vec<AbstractColumn>) -> Self {
        AbstractColumn::ScalarFunction(ScalarFunctionColumn::new(function, arguments))
    }

    pub fn id(&self) -> String {
        match self {
            AbstractColumn::Simple(c) => c.id().to_string(),
            AbstractColumn::Aggregation(c) => c.id(),
            AbstractColumn::ScalarFunction(c) => c.id(),
        }
    }

    /// All simple columns mentioned anywhere inside this column, as a new
    /// owned list.
    pub fn all_simple_columns(&self) -> Vec<SimpleColumn> {
        match self {
            AbstractColumn::Simple(c) => vec![c.clone()],
            AbstractColumn::Aggregation(c) => vec![c.target().clone()],
            AbstractColumn::ScalarFunction(c) => c
                .arguments()
                .iter()
                .flat_map(AbstractColumn::all_simple_columns)
                .collect(),
        }
    }

    pub fn all_simple_column_ids(&self) -> Vec<String> {
        self.all_simple_columns()
            .into_iter()
            .map(|c| c.id().to_string())
            .collect()
    }

    /// All aggregation columns inside this column (itself included when it
    /// is one).
    pub fn all_aggregation_columns(&self) -> Vec<AggregationColumn> {
        match self {
            AbstractColumn::Simple(_) => Vec::new(),
            AbstractColumn::Aggregation(c) => vec![c.clone()],
            AbstractColumn::ScalarFunction(c) => c
                .arguments()
                .iter()
                .flat_map(AbstractColumn::all_aggregation_columns)
                .collect(),
        }
    }

    /// All scalar-function columns inside this column, itself included.
    pub fn all_scalar_function_columns(&self) -> Vec<ScalarFunctionColumn> {
        match self {
            AbstractColumn::Simple(_) | AbstractColumn::Aggregation(_) => Vec::new(),
            AbstractColumn::ScalarFunction(c) => {
                let mut out = vec![c.clone()];
                for argument in c.arguments() {
                    out.extend(argument.all_scalar_function_columns());
                }
                out
            }
        }
    }

    pub fn value_type(&self, table: &DataTable) -> QueryResult<ValueType> {
        match self {
            AbstractColumn::Simple(c) => table
                .column_by_id(c.id())
                .map(|col| col.value_type)
                .ok_or_else(|| no_column(c.id())),
            AbstractColumn::Aggregation(c) => c.value_type(table),
            AbstractColumn::ScalarFunction(c) => c.value_type(table),
        }
    }

    pub fn validate(&self, table: &DataTable) -> QueryResult<()> {
        match self {
            AbstractColumn::Simple(c) => {
                if table.contains_column(c.id()) {
                    Ok(())
                } else {
                    Err(no_column(c.id()))
                }
            }
            AbstractColumn::Aggregation(c) => c.validate(table),
            AbstractColumn::ScalarFunction(c) => c.validate(table),
        }
    }

    /// The value of this column for one row at the current pipeline stage.
    ///
    /// A column already materialized in the lookup is read positionally;
    /// otherwise only scalar functions can be computed on the fly.
    pub fn value(
        &self,
        lookup: &dyn ColumnLookup,
        row: &TableRow,
        ctx: &EvalContext,
    ) -> QueryResult<Value> {
        if let Some(index) = lookup.column_index(self) {
            return row.value(index).cloned().ok_or_else(|| {
                QueryError::Internal(format!("row has no cell at column index {index}"))
            });
        }
        match self {
            AbstractColumn::ScalarFunction(c) => {
                let args = c
                    .arguments()
                    .iter()
                    .map(|a| a.value(lookup, row, ctx))
                    .collect::<QueryResult<Vec<_>>>()?;
                c.function().evaluate(&args, ctx)
            }
            other => Err(QueryError::Internal(format!(
                "column {:?} is not addressable at this pipeline stage",
                other.id()
            ))),
        }
    }

    pub fn to_query_string(&self) -> String {
        match self {
            AbstractColumn::Simple(c) => c.to_query_string(),
            AbstractColumn::Aggregation(c) => c.to_query_string(),
            AbstractColumn::ScalarFunction(c) => c.to_query_string(),
        }
    }
}

fn no_column(id: &str) -> QueryError {
    QueryError::invalid(
        InvalidQueryReason::NoColumn,
        format!("column {id:?} does not exist in the table"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::scalar::TimeComponent;
    use gridquery_model::ColumnDescription;
    use pretty_assertions::assert_eq;

    fn table() -> DataTable {
        let mut table = DataTable::new();
        table
            .add_columns([
                ColumnDescription::new("d", ValueType::Date, "Date"),
                ColumnDescription::new("v", ValueType::Number, "Amount"),
                ColumnDescription::new("name", ValueType::Text, "Name"),
            ])
            .unwrap();
        table
    }

    #[test]
    fn generated_ids_are_structural() {
        assert_eq!(
            AbstractColumn::aggregation("v", AggregationOp::Sum).id(),
            "sum-v"
        );
        let year = AbstractColumn::scalar_function(
            ScalarFunction::TimeComponent(TimeComponent::Year),
            vec![AbstractColumn::simple("d")],
        );
        assert_eq!(year.id(), "year_d");
    }

    #[test]
    #[should_panic(expected = "backtick")]
    fn backticks_are_banned_from_ids() {
        SimpleColumn::new("a`b");
    }

    #[test]
    fn value_types_follow_the_operation() {
        let table = table();
        assert_eq!(
            AbstractColumn::aggregation("name", AggregationOp::Count)
                .value_type(&table)
                .unwrap(),
            ValueType::Number
        );
        assert_eq!(
            AbstractColumn::aggregation("name", AggregationOp::Max)
                .value_type(&table)
                .unwrap(),
            ValueType::Text
        );
        let year = AbstractColumn::scalar_function(
            ScalarFunction::TimeComponent(TimeComponent::Year),
            vec![AbstractColumn::simple("d")],
        );
        assert_eq!(year.value_type(&table).unwrap(), ValueType::Number);
    }

    #[test]
    fn sum_over_text_is_invalid() {
        let table = table();
        let err = AbstractColumn::aggregation("name", AggregationOp::Sum)
            .validate(&table)
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::Invalid {
                reason: InvalidQueryReason::AvgSumOnlyNumeric,
                ..
            }
        ));
    }

    #[test]
    fn recursive_accessors_cover_nested_functions() {
        let nested = AbstractColumn::scalar_function(
            ScalarFunction::Arithmetic(crate::query::scalar::ArithmeticOp::Sum),
            vec![
                AbstractColumn::scalar_function(
                    ScalarFunction::TimeComponent(TimeComponent::Year),
                    vec![AbstractColumn::simple("d")],
                ),
                AbstractColumn::aggregation("v", AggregationOp::Avg),
            ],
        );
        assert_eq!(nested.all_simple_column_ids(), vec!["d", "v"]);
        assert_eq!(nested.all_aggregation_columns().len(), 1);
        assert_eq!(nested.all_scalar_function_columns().len(), 2);
    }

    #[test]
    fn query_strings_quote_ids() {
        assert_eq!(AbstractColumn::simple("a").to_query_string(), "`a`");
        assert_eq!(
            AbstractColumn::aggregation("v", AggregationOp::Min).to_query_string(),
            "min(`v`)"
        );
    }
}
