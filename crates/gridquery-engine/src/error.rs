use std::fmt;

use thiserror::Error;

/// Stable reason codes carried by invalid-query errors.
///
/// The codes are part of the engine's wire surface: callers key localized
/// messages and telemetry off them, so spellings never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidQueryReason {
    NoColumn,
    AvgSumOnlyNumeric,
    DuplicateColumn,
    AggregationNotAllowed,
    AddColToGroupByOrAgg,
    SelectBothRawAndAggregated,
    GroupByAggregatedColumn,
    CannotGroupWithoutAgg,
    CannotPivotWithoutAgg,
    ColumnInGroupAndPivot,
    OrderByColumnNotInSelect,
    NoAggOrderWhenPivot,
    ColAggNotInSelect,
    LabelColumnNotInSelect,
    FormatColumnNotInSelect,
    InvalidFunctionArguments,
}

impl InvalidQueryReason {
    pub const fn as_code(self) -> &'static str {
        match self {
            InvalidQueryReason::NoColumn => "NO_COLUMN",
            InvalidQueryReason::AvgSumOnlyNumeric => "AVG_SUM_ONLY_NUMERIC",
            InvalidQueryReason::DuplicateColumn => "DUPLICATE_COLUMN",
            InvalidQueryReason::AggregationNotAllowed => "AGGREGATION_NOT_ALLOWED",
            InvalidQueryReason::AddColToGroupByOrAgg => "ADD_COL_TO_GROUP_BY_OR_AGG",
            InvalidQueryReason::SelectBothRawAndAggregated => "SELECT_BOTH_RAW_AND_AGGREGATED",
            InvalidQueryReason::GroupByAggregatedColumn => "GROUP_BY_AGGREGATED_COLUMN",
            InvalidQueryReason::CannotGroupWithoutAgg => "CANNOT_GROUP_WITHOUT_AGG",
            InvalidQueryReason::CannotPivotWithoutAgg => "CANNOT_PIVOT_WITHOUT_AGG",
            InvalidQueryReason::ColumnInGroupAndPivot => "COLUMN_IN_GROUP_AND_PIVOT",
            InvalidQueryReason::OrderByColumnNotInSelect => "ORDER_BY_COLUMN_NOT_IN_SELECT",
            InvalidQueryReason::NoAggOrderWhenPivot => "NO_AGG_ORDER_WHEN_PIVOT",
            InvalidQueryReason::ColAggNotInSelect => "COL_AGG_NOT_IN_SELECT",
            InvalidQueryReason::LabelColumnNotInSelect => "LABEL_COLUMN_NOT_IN_SELECT",
            InvalidQueryReason::FormatColumnNotInSelect => "FORMAT_COLUMN_NOT_IN_SELECT",
            InvalidQueryReason::InvalidFunctionArguments => "INVALID_FUNCTION_ARGUMENTS",
        }
    }
}

impl fmt::Display for InvalidQueryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Errors surfaced by validation and execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The query is semantically invalid for the given table.
    #[error("invalid query [{reason}]: {message}")]
    Invalid {
        reason: InvalidQueryReason,
        message: String,
    },

    /// An engine bug: a state the pipeline is never supposed to reach.
    #[error("internal error: {0}")]
    Internal(String),
}

impl QueryError {
    pub fn invalid(reason: InvalidQueryReason, message: impl Into<String>) -> Self {
        QueryError::Invalid {
            reason,
            message: message.into(),
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
