use chrono::{Datelike, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use gridquery_model::{Value, ValueType};

use crate::error::{InvalidQueryReason, QueryError, QueryResult};

/// Per-execution evaluation context.
///
/// The clock is sampled once when the context is created so that every
/// `now()` inside one query sees the same instant; tests pin it explicitly.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    now: NaiveDateTime,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::with_now(Utc::now().naive_utc())
    }

    pub fn with_now(now: NaiveDateTime) -> Self {
        // Truncate to milliseconds, the model's datetime precision.
        let millis = now.and_utc().timestamp_subsec_millis();
        let truncated = now
            .with_nanosecond(millis * 1_000_000)
            .unwrap_or(now);
        Self { now: truncated }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Date/time component extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeComponent {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    Quarter,
    /// 1 for Sunday through 7 for Saturday.
    DayOfWeek,
}

impl TimeComponent {
    pub const fn name(self) -> &'static str {
        match self {
            TimeComponent::Year => "year",
            TimeComponent::Month => "month",
            TimeComponent::Week => "week",
            TimeComponent::Day => "day",
            TimeComponent::Hour => "hour",
            TimeComponent::Minute => "minute",
            TimeComponent::Second => "second",
            TimeComponent::Millisecond => "millisecond",
            TimeComponent::Quarter => "quarter",
            TimeComponent::DayOfWeek => "dayofweek",
        }
    }

    /// Whether this component reads the date part (as opposed to the time
    /// part) of its argument.
    const fn reads_date(self) -> bool {
        matches!(
            self,
            TimeComponent::Year
                | TimeComponent::Month
                | TimeComponent::Week
                | TimeComponent::Day
                | TimeComponent::Quarter
                | TimeComponent::DayOfWeek
        )
    }
}

/// Binary numeric operators exposed as named functions in the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArithmeticOp {
    Sum,
    Difference,
    Product,
    Quotient,
    Modulo,
}

impl ArithmeticOp {
    pub const fn name(self) -> &'static str {
        match self {
            ArithmeticOp::Sum => "sum",
            ArithmeticOp::Difference => "difference",
            ArithmeticOp::Product => "product",
            ArithmeticOp::Quotient => "quotient",
            ArithmeticOp::Modulo => "modulo",
        }
    }

    const fn symbol(self) -> char {
        match self {
            ArithmeticOp::Sum => '+',
            ArithmeticOp::Difference => '-',
            ArithmeticOp::Product => '*',
            ArithmeticOp::Quotient => '/',
            ArithmeticOp::Modulo => '%',
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ArithmeticOp::Sum => a + b,
            ArithmeticOp::Difference => a - b,
            ArithmeticOp::Product => a * b,
            ArithmeticOp::Quotient => a / b,
            ArithmeticOp::Modulo => a % b,
        }
    }
}

/// The closed catalog of deterministic per-row functions.
///
/// There is no global registry; the parser maps names onto these variants
/// and everything else (arity, typing, evaluation, stringification) lives
/// here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "fn", content = "arg", rename_all = "camelCase")]
pub enum ScalarFunction {
    TimeComponent(TimeComponent),
    DateDiff,
    Now,
    ToDate,
    Arithmetic(ArithmeticOp),
    Upper,
    Lower,
    /// A literal embedded in the query; takes no arguments.
    Constant(Value),
}

impl ScalarFunction {
    /// Canonical lowercase name as it appears in query strings. For
    /// constants, the literal itself serves as the name (it is what keeps
    /// generated column ids distinct).
    pub fn name(&self) -> String {
        match self {
            ScalarFunction::TimeComponent(c) => c.name().to_string(),
            ScalarFunction::DateDiff => "datediff".to_string(),
            ScalarFunction::Now => "now".to_string(),
            ScalarFunction::ToDate => "toDate".to_string(),
            ScalarFunction::Arithmetic(op) => op.name().to_string(),
            ScalarFunction::Upper => "upper".to_string(),
            ScalarFunction::Lower => "lower".to_string(),
            ScalarFunction::Constant(v) => {
                if v.is_null() {
                    "null".to_string()
                } else {
                    v.to_query_string()
                }
            }
        }
    }

    /// Checks argument count and types, reporting an invalid-query error
    /// with a readable message on mismatch.
    pub fn validate(&self, arg_types: &[ValueType]) -> QueryResult<()> {
        match self {
            ScalarFunction::TimeComponent(c) => {
                let allowed: &[ValueType] = if c.reads_date() {
                    &[ValueType::Date, ValueType::DateTime]
                } else {
                    &[ValueType::TimeOfDay, ValueType::DateTime]
                };
                expect_types(&self.name(), arg_types, &[allowed])
            }
            ScalarFunction::DateDiff => {
                let temporal: &[ValueType] = &[ValueType::Date, ValueType::DateTime];
                expect_types("datediff", arg_types, &[temporal, temporal])
            }
            ScalarFunction::Now => expect_types("now", arg_types, &[]),
            ScalarFunction::ToDate => expect_types(
                "toDate",
                arg_types,
                &[&[ValueType::Date, ValueType::DateTime, ValueType::Number]],
            ),
            ScalarFunction::Arithmetic(op) => {
                let number: &[ValueType] = &[ValueType::Number];
                expect_types(op.name(), arg_types, &[number, number])
            }
            ScalarFunction::Upper => expect_types("upper", arg_types, &[&[ValueType::Text]]),
            ScalarFunction::Lower => expect_types("lower", arg_types, &[&[ValueType::Text]]),
            ScalarFunction::Constant(_) => expect_types(&self.name(), arg_types, &[]),
        }
    }

    /// Result type for valid argument types.
    pub fn return_type(&self, _arg_types: &[ValueType]) -> ValueType {
        match self {
            ScalarFunction::TimeComponent(_)
            | ScalarFunction::DateDiff
            | ScalarFunction::Arithmetic(_) => ValueType::Number,
            ScalarFunction::Now => ValueType::DateTime,
            ScalarFunction::ToDate => ValueType::Date,
            ScalarFunction::Upper | ScalarFunction::Lower => ValueType::Text,
            ScalarFunction::Constant(v) => v.value_type(),
        }
    }

    /// Evaluates the function. A null argument to any numeric/temporal
    /// function yields the null of the declared return type.
    pub fn evaluate(&self, args: &[Value], ctx: &EvalContext) -> QueryResult<Value> {
        match self {
            ScalarFunction::TimeComponent(component) => {
                let arg = single(args)?;
                if arg.is_null() {
                    return Ok(Value::Number(None));
                }
                Ok(Value::number(extract_component(*component, arg)?))
            }
            ScalarFunction::DateDiff => {
                let (a, b) = pair(args)?;
                match (a.as_date(), b.as_date()) {
                    (Some(da), Some(db)) => Ok(Value::number((da - db).num_days() as f64)),
                    _ => Ok(Value::Number(None)),
                }
            }
            ScalarFunction::Now => Ok(Value::DateTime(Some(ctx.now()))),
            ScalarFunction::ToDate => {
                let arg = single(args)?;
                if arg.is_null() {
                    return Ok(Value::Date(None));
                }
                match arg {
                    Value::Date(_) | Value::DateTime(_) => Ok(Value::Date(arg.as_date())),
                    Value::Number(Some(n)) => {
                        let millis = n.0.trunc() as i64;
                        chrono::DateTime::<Utc>::from_timestamp_millis(millis)
                            .map(|dt| Value::Date(Some(dt.date_naive())))
                            .ok_or_else(|| {
                                QueryError::invalid(
                                    InvalidQueryReason::InvalidFunctionArguments,
                                    format!("value {} is out of range for toDate", n.0),
                                )
                            })
                    }
                    other => Err(QueryError::Internal(format!(
                        "toDate applied to a {} value",
                        other.value_type()
                    ))),
                }
            }
            ScalarFunction::Arithmetic(op) => {
                let (a, b) = pair(args)?;
                match (a.as_number(), b.as_number()) {
                    (Some(x), Some(y)) => Ok(Value::number(op.apply(x, y))),
                    _ => Ok(Value::Number(None)),
                }
            }
            ScalarFunction::Upper => {
                let arg = single(args)?;
                Ok(match arg.as_text() {
                    Some(s) => Value::text(s.to_uppercase()),
                    None => Value::Text(None),
                })
            }
            ScalarFunction::Lower => {
                let arg = single(args)?;
                Ok(match arg.as_text() {
                    Some(s) => Value::text(s.to_lowercase()),
                    None => Value::Text(None),
                })
            }
            ScalarFunction::Constant(v) => Ok(v.clone()),
        }
    }

    /// Query-string rendering given already-rendered argument strings.
    pub fn to_query_string(&self, args: &[String]) -> String {
        match self {
            ScalarFunction::Arithmetic(op) => {
                format!("({} {} {})", args[0], op.symbol(), args[1])
            }
            ScalarFunction::Constant(v) => v.to_query_string(),
            ScalarFunction::Now => "now()".to_string(),
            _ => format!("{}({})", self.name(), args.join(", ")),
        }
    }
}

fn extract_component(component: TimeComponent, value: &Value) -> QueryResult<f64> {
    if component.reads_date() {
        let date = value.as_date().ok_or_else(|| {
            QueryError::Internal(format!(
                "{} applied to a {} value",
                component.name(),
                value.value_type()
            ))
        })?;
        Ok(match component {
            TimeComponent::Year => date.year() as f64,
            TimeComponent::Month => date.month() as f64,
            TimeComponent::Week => date.iso_week().week() as f64,
            TimeComponent::Day => date.day() as f64,
            TimeComponent::Quarter => ((date.month() - 1) / 3 + 1) as f64,
            TimeComponent::DayOfWeek => (date.weekday().num_days_from_sunday() + 1) as f64,
            _ => unreachable!(),
        })
    } else {
        let time = value.as_time_of_day().ok_or_else(|| {
            QueryError::Internal(format!(
                "{} applied to a {} value",
                component.name(),
                value.value_type()
            ))
        })?;
        Ok(match component {
            TimeComponent::Hour => time.hour() as f64,
            TimeComponent::Minute => time.minute() as f64,
            TimeComponent::Second => time.second() as f64,
            TimeComponent::Millisecond => (time.nanosecond() / 1_000_000) as f64,
            _ => unreachable!(),
        })
    }
}

fn expect_types(
    name: &str,
    arg_types: &[ValueType],
    expected: &[&[ValueType]],
) -> QueryResult<()> {
    if arg_types.len() != expected.len() {
        return Err(QueryError::invalid(
            InvalidQueryReason::InvalidFunctionArguments,
            format!(
                "the function {name:?} takes {} argument(s), got {}",
                expected.len(),
                arg_types.len()
            ),
        ));
    }
    for (position, (actual, allowed)) in arg_types.iter().zip(expected.iter()).enumerate() {
        if !allowed.contains(actual) {
            return Err(QueryError::invalid(
                InvalidQueryReason::InvalidFunctionArguments,
                format!(
                    "the function {name:?} cannot take a {actual} value as argument {}",
                    position + 1
                ),
            ));
        }
    }
    Ok(())
}

fn single(args: &[Value]) -> QueryResult<&Value> {
    args.first()
        .ok_or_else(|| QueryError::Internal("missing function argument".to_string()))
}

fn pair(args: &[Value]) -> QueryResult<(&Value, &Value)> {
    match args {
        [a, b] => Ok((a, b)),
        _ => Err(QueryError::Internal(
            "expected exactly two function arguments".to_string(),
        )),
    }
}
