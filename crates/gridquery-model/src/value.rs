use std::cmp::Ordering;
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::ModelError;

/// The six column/value types understood by the query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Number,
    Text,
    Date,
    DateTime,
    TimeOfDay,
}

impl ValueType {
    /// Canonical lowercase code used in wire formats and messages.
    pub const fn as_code(self) -> &'static str {
        match self {
            ValueType::Boolean => "boolean",
            ValueType::Number => "number",
            ValueType::Text => "text",
            ValueType::Date => "date",
            ValueType::DateTime => "datetime",
            ValueType::TimeOfDay => "timeofday",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

impl std::str::FromStr for ValueType {
    type Err = ParseValueTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "boolean" => Ok(ValueType::Boolean),
            "number" => Ok(ValueType::Number),
            "text" | "string" => Ok(ValueType::Text),
            "date" => Ok(ValueType::Date),
            "datetime" => Ok(ValueType::DateTime),
            "timeofday" => Ok(ValueType::TimeOfDay),
            _ => Err(ParseValueTypeError),
        }
    }
}

/// Failed to parse a [`ValueType`] from its code.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParseValueTypeError;

impl fmt::Display for ParseValueTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown value type code")
    }
}

impl std::error::Error for ParseValueTypeError {}

/// A typed scalar value with a per-type null inhabitant.
///
/// Every variant carries its payload in an `Option`, so a null value still
/// knows its type and [`Value::null_of`] is total. The derived `Ord` is total:
/// variants rank in declaration order, and within a variant `None` sorts
/// before any payload, which gives the "null sorts first" rule for free.
/// Cross-type ordering exists only to keep `Ord` total; the engine never
/// compares values of different types.
///
/// The serde layout is a tagged `{ "type": ..., "value": ... }` enum so the
/// representation is stable across IPC boundaries.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Boolean(Option<bool>),
    Number(Option<OrderedFloat<f64>>),
    Text(Option<String>),
    Date(Option<NaiveDate>),
    DateTime(Option<NaiveDateTime>),
    TimeOfDay(Option<NaiveTime>),
}

impl Value {
    pub fn boolean(v: bool) -> Self {
        Value::Boolean(Some(v))
    }

    pub fn number(v: f64) -> Self {
        Value::Number(Some(OrderedFloat(v)))
    }

    pub fn text(v: impl Into<String>) -> Self {
        Value::Text(Some(v.into()))
    }

    /// Builds a DATE value in the proleptic Gregorian calendar (GMT).
    ///
    /// `month` and `day` are 1-based; out-of-range dates (e.g. February 30)
    /// are rejected.
    pub fn date(year: i32, month: u32, day: u32) -> Result<Self, ModelError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(|d| Value::Date(Some(d)))
            .ok_or(ModelError::InvalidDate { year, month, day })
    }

    /// Builds a DATETIME value with millisecond precision (GMT).
    #[allow(clippy::too_many_arguments)]
    pub fn datetime(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        millisecond: u32,
    ) -> Result<Self, ModelError> {
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or(ModelError::InvalidDate { year, month, day })?;
        date.and_hms_milli_opt(hour, minute, second, millisecond)
            .map(|dt| Value::DateTime(Some(dt)))
            .ok_or(ModelError::InvalidTimeOfDay {
                hour,
                minute,
                second,
                millisecond,
            })
    }

    /// Builds a TIMEOFDAY value with millisecond precision.
    pub fn time_of_day(
        hour: u32,
        minute: u32,
        second: u32,
        millisecond: u32,
    ) -> Result<Self, ModelError> {
        NaiveTime::from_hms_milli_opt(hour, minute, second, millisecond)
            .map(|t| Value::TimeOfDay(Some(t)))
            .ok_or(ModelError::InvalidTimeOfDay {
                hour,
                minute,
                second,
                millisecond,
            })
    }

    /// The null inhabitant of the given type.
    pub const fn null_of(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Boolean => Value::Boolean(None),
            ValueType::Number => Value::Number(None),
            ValueType::Text => Value::Text(None),
            ValueType::Date => Value::Date(None),
            ValueType::DateTime => Value::DateTime(None),
            ValueType::TimeOfDay => Value::TimeOfDay(None),
        }
    }

    pub const fn value_type(&self) -> ValueType {
        match self {
            Value::Boolean(_) => ValueType::Boolean,
            Value::Number(_) => ValueType::Number,
            Value::Text(_) => ValueType::Text,
            Value::Date(_) => ValueType::Date,
            Value::DateTime(_) => ValueType::DateTime,
            Value::TimeOfDay(_) => ValueType::TimeOfDay,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(
            self,
            Value::Boolean(None)
                | Value::Number(None)
                | Value::Text(None)
                | Value::Date(None)
                | Value::DateTime(None)
                | Value::TimeOfDay(None)
        )
    }

    /// Total comparison; equivalent to `Ord::cmp`.
    ///
    /// Within a type, null sorts before every non-null and equal to itself.
    pub fn compare(&self, other: &Value) -> Ordering {
        self.cmp(other)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => *v,
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => v.map(|n| n.0),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(Some(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(v) => *v,
            Value::DateTime(v) => v.map(|dt| dt.date()),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(v) => *v,
            _ => None,
        }
    }

    pub fn as_time_of_day(&self) -> Option<NaiveTime> {
        match self {
            Value::TimeOfDay(v) => *v,
            Value::DateTime(v) => v.map(|dt| dt.time()),
            _ => None,
        }
    }

    /// Renders this value as a query-language literal the parser round-trips.
    ///
    /// Null values cannot appear as literals; calling this on one is a
    /// programming error and panics.
    pub fn to_query_string(&self) -> String {
        match self {
            Value::Boolean(Some(b)) => b.to_string(),
            Value::Number(Some(n)) => n.0.to_string(),
            Value::Text(Some(s)) => quote_text_literal(s),
            Value::Date(Some(d)) => {
                format!("DATE '{}-{}-{}'", d.year(), d.month(), d.day())
            }
            Value::DateTime(Some(dt)) => {
                let mut out = format!(
                    "DATETIME '{}-{}-{} {}:{}:{}",
                    dt.year(),
                    dt.month(),
                    dt.day(),
                    dt.hour(),
                    dt.minute(),
                    dt.second()
                );
                append_millis(&mut out, dt.time());
                out.push('\'');
                out
            }
            Value::TimeOfDay(Some(t)) => {
                let mut out =
                    format!("TIMEOFDAY '{}:{}:{}", t.hour(), t.minute(), t.second());
                append_millis(&mut out, *t);
                out.push('\'');
                out
            }
            _ => panic!("cannot render a null value as a query literal"),
        }
    }
}

fn append_millis(out: &mut String, time: NaiveTime) {
    let millis = time.nanosecond() / 1_000_000;
    if millis != 0 {
        out.push_str(&format!(".{millis:03}"));
    }
}

fn quote_text_literal(s: &str) -> String {
    let has_double = s.contains('"');
    let has_single = s.contains('\'');
    if !has_double {
        format!("\"{s}\"")
    } else if !has_single {
        format!("'{s}'")
    } else {
        panic!("cannot render a string containing both quote kinds as a query literal: {s:?}");
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::text(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(Some(value))
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(Some(value))
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(Some(value))
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        Value::TimeOfDay(Some(value))
    }
}

impl fmt::Display for Value {
    /// Plain, locale-free rendering. Nulls render as the empty string; this
    /// is the representation used by the string-shaped filter operators.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(Some(b)) => f.write_str(if *b { "true" } else { "false" }),
            Value::Number(Some(n)) => write!(f, "{}", n.0),
            Value::Text(Some(s)) => f.write_str(s),
            Value::Date(Some(d)) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(Some(dt)) => {
                write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S"))?;
                let millis = dt.time().nanosecond() / 1_000_000;
                if millis != 0 {
                    write!(f, ".{millis:03}")?;
                }
                Ok(())
            }
            Value::TimeOfDay(Some(t)) => {
                write!(f, "{}", t.format("%H:%M:%S"))?;
                let millis = t.nanosecond() / 1_000_000;
                if millis != 0 {
                    write!(f, ".{millis:03}")?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn null_sorts_before_any_value_of_the_same_type() {
        assert_eq!(
            Value::null_of(ValueType::Number).compare(&Value::number(f64::MIN)),
            Ordering::Less
        );
        assert_eq!(
            Value::number(f64::MIN).compare(&Value::null_of(ValueType::Number)),
            Ordering::Greater
        );
        assert_eq!(
            Value::null_of(ValueType::Text).compare(&Value::null_of(ValueType::Text)),
            Ordering::Equal
        );
    }

    #[test]
    fn null_text_is_distinct_from_empty_text() {
        assert_ne!(Value::null_of(ValueType::Text), Value::text(""));
        assert!(Value::null_of(ValueType::Text).is_null());
        assert!(!Value::text("").is_null());
    }

    #[test]
    fn negative_zero_equals_positive_zero() {
        assert_eq!(Value::number(-0.0), Value::number(0.0));
        assert_eq!(
            Value::number(-0.0).compare(&Value::number(0.0)),
            Ordering::Equal
        );
    }

    #[test]
    fn temporal_construction_validates_ranges() {
        assert!(Value::date(2025, 2, 30).is_err());
        assert!(Value::date(2024, 2, 29).is_ok());
        assert!(Value::time_of_day(24, 0, 0, 0).is_err());
        assert!(Value::datetime(2025, 1, 1, 23, 59, 59, 999).is_ok());
    }

    #[test]
    fn query_string_literals() {
        assert_eq!(Value::number(3.5).to_query_string(), "3.5");
        assert_eq!(Value::boolean(true).to_query_string(), "true");
        assert_eq!(Value::text("abc").to_query_string(), "\"abc\"");
        assert_eq!(Value::text("say \"hi\"").to_query_string(), "'say \"hi\"'");
        assert_eq!(
            Value::date(2021, 1, 15).unwrap().to_query_string(),
            "DATE '2021-1-15'"
        );
        assert_eq!(
            Value::time_of_day(9, 5, 0, 250).unwrap().to_query_string(),
            "TIMEOFDAY '9:5:0.250'"
        );
        assert_eq!(
            Value::datetime(2021, 12, 3, 1, 2, 3, 0)
                .unwrap()
                .to_query_string(),
            "DATETIME '2021-12-3 1:2:3'"
        );
    }

    #[test]
    #[should_panic(expected = "null value")]
    fn query_string_of_null_panics() {
        Value::null_of(ValueType::Number).to_query_string();
    }

    #[test]
    fn display_is_plain_and_empty_for_null() {
        assert_eq!(Value::number(2.0).to_string(), "2");
        assert_eq!(Value::text("x").to_string(), "x");
        assert_eq!(Value::null_of(ValueType::Date).to_string(), "");
        assert_eq!(
            Value::date(2021, 6, 3).unwrap().to_string(),
            "2021-06-03"
        );
    }

    #[test]
    fn value_type_codes_roundtrip() {
        for value_type in [
            ValueType::Boolean,
            ValueType::Number,
            ValueType::Text,
            ValueType::Date,
            ValueType::DateTime,
            ValueType::TimeOfDay,
        ] {
            assert_eq!(value_type.as_code().parse::<ValueType>(), Ok(value_type));
        }
        assert_eq!("STRING".parse::<ValueType>(), Ok(ValueType::Text));
        assert!("bits".parse::<ValueType>().is_err());
    }

    #[test]
    fn serde_roundtrip_is_stable() {
        for value in [
            Value::number(1.25),
            Value::text("abc"),
            Value::null_of(ValueType::TimeOfDay),
            Value::date(2020, 2, 29).unwrap(),
        ] {
            let json = serde_json::to_string(&value).unwrap();
            let back: Value = serde_json::from_str(&json).unwrap();
            assert_eq!(back, value);
        }
    }
}
